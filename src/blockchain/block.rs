use std::borrow::Cow;
use std::fmt;
use std::time::Instant;

use chrono::Utc;
use log::info;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::pow::{PowError, ProofOfWork};
use super::transaction::Transaction;

/// Data carried by the genesis block
pub const GENESIS_DATA: &str = "Genesis Block";

/// Errors that can occur while building or encoding a block
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("Encoding error: {0}")]
    EncodingError(#[from] bincode::Error),

    #[error("Proof of work error: {0}")]
    ProofError(#[from] PowError),
}

/// What a block carries: opaque bytes or an ordered list of transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    Data(Vec<u8>),
    Transactions(Vec<Transaction>),
}

impl Payload {
    /// Bytes fed into the proof-of-work header: raw data, or the
    /// transaction digest for the ledger variant.
    pub fn header_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            Payload::Data(data) => Cow::Borrowed(data.as_slice()),
            Payload::Transactions(transactions) => Cow::Owned(hash_transactions(transactions)),
        }
    }

    pub fn transactions(&self) -> &[Transaction] {
        match self {
            Payload::Data(_) => &[],
            Payload::Transactions(transactions) => transactions,
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Data(data) => write!(f, "{}", String::from_utf8_lossy(data)),
            Payload::Transactions(transactions) => {
                write!(f, "{} transaction(s)", transactions.len())
            }
        }
    }
}

fn hash_transactions(transactions: &[Transaction]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    for tx in transactions {
        hasher.update(&tx.id);
    }
    hasher.finalize().to_vec()
}

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Creation time in seconds since the epoch
    pub timestamp: i64,

    /// Hash of the previous block, empty for genesis
    pub prev_block_hash: Vec<u8>,

    /// Hash of this block, found by the proof of work
    pub hash: Vec<u8>,

    /// Nonce that makes `hash` satisfy the difficulty target
    pub nonce: i64,

    pub payload: Payload,
}

impl Block {
    /// Creates and mines a new block on top of `prev_block_hash`
    ///
    /// # Arguments
    ///
    /// * `payload` - The data or transactions to include
    /// * `prev_block_hash` - The hash of the current tip
    /// * `difficulty` - Leading zero bits required in the hash
    ///
    /// # Returns
    ///
    /// The mined block, or the reason mining failed
    pub fn new(payload: Payload, prev_block_hash: Vec<u8>, difficulty: u32) -> Result<Self, BlockError> {
        Self::with_timestamp(payload, prev_block_hash, Utc::now().timestamp(), difficulty)
    }

    /// Creates and mines a block with a fixed timestamp
    pub fn with_timestamp(
        payload: Payload,
        prev_block_hash: Vec<u8>,
        timestamp: i64,
        difficulty: u32,
    ) -> Result<Self, BlockError> {
        let started = Instant::now();

        let mut block = Block {
            timestamp,
            prev_block_hash,
            hash: Vec::new(),
            nonce: 0,
            payload,
        };

        let (nonce, hash) = ProofOfWork::new(&block, difficulty)?.run()?;
        block.nonce = nonce;
        block.hash = hash.to_vec();

        info!(
            "Mined block {} (nonce {}) in {:.2}s",
            hex::encode(&block.hash),
            nonce,
            started.elapsed().as_secs_f64()
        );

        Ok(block)
    }

    /// Creates the first block of a chain
    pub fn genesis(difficulty: u32) -> Result<Self, BlockError> {
        Self::new(Payload::Data(GENESIS_DATA.as_bytes().to_vec()), Vec::new(), difficulty)
    }

    pub fn is_genesis(&self) -> bool {
        self.prev_block_hash.is_empty()
    }

    pub fn transactions(&self) -> &[Transaction] {
        self.payload.transactions()
    }

    /// SHA-256 over the ids of the block's transactions, in stored order
    pub fn hash_transactions(&self) -> Vec<u8> {
        hash_transactions(self.transactions())
    }

    pub fn serialize(&self) -> Result<Vec<u8>, BlockError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, BlockError> {
        Ok(bincode::deserialize(bytes)?)
    }
}
