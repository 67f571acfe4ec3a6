use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use log::info;
use thiserror::Error;

use super::block::{Block, BlockError, Payload};
use super::pow::{target_for, PowError, ProofOfWork};
use super::storage::{BlockchainStorage, StorageError};
use super::transaction::{Transaction, TransactionError};

/// Errors that can occur during blockchain operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Block error: {0}")]
    BlockError(#[from] BlockError),

    #[error("Proof of work error: {0}")]
    ProofError(#[from] PowError),

    #[error("Lock poisoned: {0}")]
    Poisoned(&'static str),
}

/// Walks the chain from a tip back to genesis, one storage lookup per step.
///
/// Single pass: once genesis (or an error) has been yielded the iterator
/// stays exhausted.
pub struct BlockchainIterator {
    current_hash: Vec<u8>,
    storage: Arc<BlockchainStorage>,
}

impl BlockchainIterator {
    /// True once the last yielded block was genesis
    pub fn is_at_end(&self) -> bool {
        self.current_hash.is_empty()
    }
}

impl Iterator for BlockchainIterator {
    type Item = Result<Block, BlockchainError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_at_end() {
            return None;
        }

        match self.storage.get_block(&self.current_hash) {
            Ok(block) => {
                self.current_hash = block.prev_block_hash.clone();
                Some(Ok(block))
            }
            Err(err) => {
                self.current_hash.clear();
                Some(Err(err.into()))
            }
        }
    }
}

/// Represents the blockchain
#[derive(Debug)]
pub struct Blockchain {
    /// Storage for blocks and the tip
    storage: Arc<BlockchainStorage>,

    /// Leading zero bits required in every block hash of this chain
    difficulty: u32,

    /// Held across read-tip, mine and commit so appends never fork the chain
    append_lock: Mutex<()>,
}

impl Blockchain {
    /// Opens the chain stored at `path`, mining and writing the genesis
    /// block if the storage is empty
    ///
    /// # Arguments
    ///
    /// * `path` - The path to the storage directory
    /// * `difficulty` - Leading zero bits required in block hashes
    ///
    /// # Returns
    ///
    /// A Blockchain instance backed by the storage
    pub fn open<P: AsRef<Path>>(path: P, difficulty: u32) -> Result<Self, BlockchainError> {
        target_for(difficulty)?;
        let storage = BlockchainStorage::new(path)?;

        let tip = match storage.tip()? {
            Some(tip) => {
                info!("Loaded blockchain from storage, tip {}", hex::encode(&tip));
                tip
            }
            None => {
                info!("No existing blockchain found in storage, creating genesis block");
                let genesis = Block::genesis(difficulty)?;
                storage.initialize_if_empty(&genesis)?
            }
        };
        info!("Blockchain ready at difficulty {}, tip {}", difficulty, hex::encode(&tip));

        Ok(Blockchain {
            storage: Arc::new(storage),
            difficulty,
            append_lock: Mutex::new(()),
        })
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Gets the hash of the most recently appended block
    pub fn tip(&self) -> Result<Vec<u8>, BlockchainError> {
        self.storage
            .tip()?
            .ok_or_else(|| StorageError::NotFound("Tip not found".to_string()).into())
    }

    /// Mines a block carrying `payload` on top of the current tip and
    /// persists it as the new tip
    pub fn append(&self, payload: Payload) -> Result<Block, BlockchainError> {
        let _guard = self.lock_appends()?;
        self.mine_on_tip(payload)
    }

    /// Appends a block of raw data
    pub fn append_data(&self, data: impl Into<Vec<u8>>) -> Result<Block, BlockchainError> {
        self.append(Payload::Data(data.into()))
    }

    /// Appends a block of transactions
    pub fn mine_block(&self, transactions: Vec<Transaction>) -> Result<Block, BlockchainError> {
        self.append(Payload::Transactions(transactions))
    }

    fn lock_appends(&self) -> Result<MutexGuard<'_, ()>, BlockchainError> {
        self.append_lock
            .lock()
            .map_err(|_| BlockchainError::Poisoned("append lock"))
    }

    /// Callers must hold the append lock
    fn mine_on_tip(&self, payload: Payload) -> Result<Block, BlockchainError> {
        let tip = self.tip()?;
        let block = Block::new(payload, tip, self.difficulty)?;
        self.storage.commit_block(&block)?;

        info!(
            "Appended block {} after {}",
            hex::encode(&block.hash),
            hex::encode(&block.prev_block_hash)
        );
        Ok(block)
    }

    /// Iterates from the current tip back to genesis
    pub fn iter(&self) -> Result<BlockchainIterator, BlockchainError> {
        Ok(BlockchainIterator {
            current_hash: self.tip()?,
            storage: Arc::clone(&self.storage),
        })
    }

    /// Checks a block's proof of work against this chain's difficulty
    pub fn validate(&self, block: &Block) -> bool {
        ProofOfWork::new(block, self.difficulty)
            .map(|pow| pow.validate())
            .unwrap_or(false)
    }

    /// Transactions holding at least one output that is locked to `address`
    /// and not spent by any later transaction
    pub fn find_unspent_transactions(&self, address: &str) -> Result<Vec<Transaction>, BlockchainError> {
        Ok(self
            .scan_unspent(address)?
            .into_iter()
            .map(|(tx, _)| tx)
            .collect())
    }

    /// Walks tip to genesis collecting unspent outputs for `address`.
    ///
    /// Inputs are recorded as spent before older outputs are looked at; the
    /// walk runs newest first, block by block and within each block, so a
    /// spend is always seen before the output it consumes.
    fn scan_unspent(&self, address: &str) -> Result<Vec<(Transaction, Vec<usize>)>, BlockchainError> {
        let mut unspent = Vec::new();
        let mut spent: HashMap<String, HashSet<i64>> = HashMap::new();

        for block in self.iter()? {
            let block = block?;

            for tx in block.transactions().iter().rev() {
                let spent_outputs = spent.get(&tx.id_hex());
                let indices: Vec<usize> = tx
                    .outputs
                    .iter()
                    .enumerate()
                    .filter(|(index, out)| {
                        out.can_be_unlocked_with(address)
                            && !spent_outputs.map_or(false, |outs| outs.contains(&(*index as i64)))
                    })
                    .map(|(index, _)| index)
                    .collect();

                if !indices.is_empty() {
                    unspent.push((tx.clone(), indices));
                }

                if !tx.is_coinbase() {
                    for input in &tx.inputs {
                        spent
                            .entry(hex::encode(&input.txid))
                            .or_default()
                            .insert(input.vout);
                    }
                }
            }
        }

        Ok(unspent)
    }

    /// Greedily selects unspent outputs of `address` in scan order until
    /// their total reaches `amount`
    ///
    /// # Returns
    ///
    /// The accumulated value (may exceed `amount`, or fall short of it when
    /// funds are insufficient) and the selected output indices per hex txid
    pub fn find_spendable_outputs(
        &self,
        address: &str,
        amount: u64,
    ) -> Result<(u64, BTreeMap<String, Vec<usize>>), BlockchainError> {
        let mut accumulated = 0u64;
        let mut selected: BTreeMap<String, Vec<usize>> = BTreeMap::new();

        'scan: for (tx, indices) in self.scan_unspent(address)? {
            for index in indices {
                if accumulated >= amount {
                    break 'scan;
                }
                accumulated = accumulated.saturating_add(tx.outputs[index].value);
                selected.entry(tx.id_hex()).or_default().push(index);
            }
        }

        Ok((accumulated, selected))
    }

    /// Sum of all unspent outputs locked to `address`
    pub fn get_balance(&self, address: &str) -> Result<u64, BlockchainError> {
        let balance = self
            .scan_unspent(address)?
            .iter()
            .flat_map(|(tx, indices)| indices.iter().map(move |index| tx.outputs[*index].value))
            .sum();
        Ok(balance)
    }

    /// Builds a transfer of `amount` from `from` to `to` out of spendable
    /// outputs, failing with insufficient funds before anything is built
    pub fn new_utxo_transaction(&self, from: &str, to: &str, amount: u64) -> Result<Transaction, BlockchainError> {
        let (accumulated, selected) = self.find_spendable_outputs(from, amount)?;
        Ok(Transaction::new_transfer(from, to, amount, accumulated, &selected)?)
    }

    /// Transfers `amount` from `from` to `to` and mines it into a block
    /// together with a coinbase reward for `miner`.
    ///
    /// Output selection happens under the append lock, so two concurrent
    /// sends cannot pick the same outputs.
    pub fn send(&self, from: &str, to: &str, amount: u64, miner: &str) -> Result<Block, BlockchainError> {
        let _guard = self.lock_appends()?;

        let transfer = self.new_utxo_transaction(from, to, amount)?;
        let reward = Transaction::new_coinbase(miner, "")?;
        self.mine_on_tip(Payload::Transactions(vec![reward, transfer]))
    }
}
