use std::path::Path;

use log::{debug, info};
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::{Db, Tree};
use thiserror::Error;

use super::block::Block;

const BLOCKS_TREE: &[u8] = b"blocks";

/// Key of the current tip hash, stored next to the blocks
const TIP_KEY: &[u8] = b"l";

type TxResult<T> = Result<T, ConflictableTransactionError<StorageError>>;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Tip moved: expected {expected}, found {found}")]
    TipMoved { expected: String, found: String },
}

impl From<TransactionError<StorageError>> for StorageError {
    fn from(err: TransactionError<StorageError>) -> Self {
        match err {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => StorageError::DatabaseError(err),
        }
    }
}

/// Storage for blockchain data
///
/// Blocks live in one tree keyed by their hash; the tip hash sits in the
/// same tree under [`TIP_KEY`] so both can change in one transaction.
pub struct BlockchainStorage {
    /// The database instance
    db: Db,

    /// Tree for blocks and the tip pointer
    blocks: Tree,
}

impl std::fmt::Debug for BlockchainStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainStorage")
            .finish()
    }
}

impl BlockchainStorage {
    /// Opens (or creates) the storage at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let blocks = db.open_tree(BLOCKS_TREE)?;

        Ok(Self { db, blocks })
    }

    /// Gets the current tip hash, `None` if the chain was never initialized
    pub fn tip(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.blocks.get(TIP_KEY)?.map(|tip| tip.to_vec()))
    }

    /// Gets the serialized block stored under `hash`
    pub fn get(&self, hash: &[u8]) -> Result<Vec<u8>, StorageError> {
        match self.blocks.get(hash)? {
            Some(value) => Ok(value.to_vec()),
            None => Err(StorageError::NotFound(format!(
                "Block with hash {} not found",
                hex::encode(hash)
            ))),
        }
    }

    /// Gets and decodes the block stored under `hash`
    pub fn get_block(&self, hash: &[u8]) -> Result<Block, StorageError> {
        let value = self.get(hash)?;
        Block::deserialize(&value).map_err(|e| StorageError::DeserializationError(e.to_string()))
    }

    /// Writes `block` and advances the tip to it, atomically.
    ///
    /// The block is written first; the tip is then checked against the
    /// block's predecessor. If another writer advanced the tip meanwhile the
    /// transaction aborts and neither write becomes visible.
    pub fn commit_block(&self, block: &Block) -> Result<(), StorageError> {
        let value = serialize_block(block)?;

        self.blocks.transaction(|tx| -> TxResult<()> {
            put_block(tx, &block.hash, &value)?;
            let current = tx.get(TIP_KEY)?;
            if current.as_deref() != Some(block.prev_block_hash.as_slice()) {
                return Err(ConflictableTransactionError::Abort(StorageError::TipMoved {
                    expected: hex::encode(&block.prev_block_hash),
                    found: current.map(hex::encode).unwrap_or_default(),
                }));
            }
            put_tip(tx, &block.hash)?;
            Ok(())
        })?;

        self.flush()?;
        debug!("Committed block {} as new tip", hex::encode(&block.hash));
        Ok(())
    }

    /// Writes `genesis` as block and tip if no tip exists yet.
    ///
    /// # Returns
    ///
    /// The tip after the call: the genesis hash on a fresh store, or the
    /// existing tip if another caller initialized it first
    pub fn initialize_if_empty(&self, genesis: &Block) -> Result<Vec<u8>, StorageError> {
        let value = serialize_block(genesis)?;

        let tip = self.blocks.transaction(|tx| -> TxResult<Vec<u8>> {
            if let Some(existing) = tx.get(TIP_KEY)? {
                return Ok(existing.to_vec());
            }
            put_block(tx, &genesis.hash, &value)?;
            put_tip(tx, &genesis.hash)?;
            Ok(genesis.hash.clone())
        })?;

        self.flush()?;
        if tip == genesis.hash {
            info!("Initialized storage with genesis block {}", hex::encode(&tip));
        }
        Ok(tip)
    }

    /// Flushes all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

fn serialize_block(block: &Block) -> Result<Vec<u8>, StorageError> {
    block
        .serialize()
        .map_err(|e| StorageError::SerializationError(e.to_string()))
}

fn put_block(tx: &TransactionalTree, hash: &[u8], value: &[u8]) -> TxResult<()> {
    tx.insert(hash, value)?;
    Ok(())
}

fn put_tip(tx: &TransactionalTree, hash: &[u8]) -> TxResult<()> {
    tx.insert(TIP_KEY, hash)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::block::Payload;
    use tempfile::TempDir;

    const TEST_BITS: u32 = 8;

    fn open() -> (TempDir, BlockchainStorage) {
        let dir = TempDir::new().unwrap();
        let storage = BlockchainStorage::new(dir.path().join("chain")).unwrap();
        (dir, storage)
    }

    fn data_block(data: &str, prev: &[u8]) -> Block {
        Block::new(Payload::Data(data.as_bytes().to_vec()), prev.to_vec(), TEST_BITS).unwrap()
    }

    #[test]
    fn test_empty_storage() {
        let (_dir, storage) = open();

        assert_eq!(storage.tip().unwrap(), None);
        assert!(matches!(storage.get(b"missing"), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_initialize_if_empty_is_idempotent() {
        let (_dir, storage) = open();
        let genesis = Block::genesis(TEST_BITS).unwrap();
        let other = data_block("other genesis", &[]);

        let tip = storage.initialize_if_empty(&genesis).unwrap();
        assert_eq!(tip, genesis.hash);

        let tip = storage.initialize_if_empty(&other).unwrap();
        assert_eq!(tip, genesis.hash);
        assert!(matches!(storage.get(&other.hash), Err(StorageError::NotFound(_))));
        assert_eq!(storage.get_block(&genesis.hash).unwrap(), genesis);
    }

    #[test]
    fn test_commit_block_advances_tip() {
        let (_dir, storage) = open();
        let genesis = Block::genesis(TEST_BITS).unwrap();
        storage.initialize_if_empty(&genesis).unwrap();

        let block = data_block("test1", &genesis.hash);
        storage.commit_block(&block).unwrap();

        assert_eq!(storage.tip().unwrap(), Some(block.hash.clone()));
        assert_eq!(storage.get_block(&block.hash).unwrap(), block);
    }

    #[test]
    fn test_failed_commit_writes_nothing() {
        let (_dir, storage) = open();
        let genesis = Block::genesis(TEST_BITS).unwrap();
        storage.initialize_if_empty(&genesis).unwrap();

        let winner = data_block("winner", &genesis.hash);
        let loser = data_block("loser", &genesis.hash);
        storage.commit_block(&winner).unwrap();

        // loser's block insert happens inside the transaction, before the tip check fails
        let result = storage.commit_block(&loser);
        assert!(matches!(result, Err(StorageError::TipMoved { .. })));
        assert!(matches!(storage.get(&loser.hash), Err(StorageError::NotFound(_))));
        assert_eq!(storage.tip().unwrap(), Some(winner.hash));
    }

    #[test]
    fn test_commit_without_genesis_fails() {
        let (_dir, storage) = open();
        let orphan = data_block("orphan", &[1, 2, 3]);

        assert!(matches!(
            storage.commit_block(&orphan),
            Err(StorageError::TipMoved { .. })
        ));
        assert_eq!(storage.tip().unwrap(), None);
    }

    #[test]
    fn test_corrupted_value() {
        let (_dir, storage) = open();
        storage.blocks.insert(b"bad", &[0xffu8, 0x00][..]).unwrap();

        assert!(matches!(
            storage.get_block(b"bad"),
            Err(StorageError::DeserializationError(_))
        ));
    }
}
