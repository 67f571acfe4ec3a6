// Blockchain module
//
// This module contains the core ledger implementation:
// - Block structure and payload variants
// - Proof of work algorithm
// - Persistent block storage
// - Blockchain orchestration and UTXO scans
// - Transaction structure

pub mod block;
pub mod chain;
pub mod handle;
pub mod pow;
pub mod storage;
pub mod transaction;

// Re-export main components for easier access
pub use block::{Block, Payload};
pub use chain::{Blockchain, BlockchainError, BlockchainIterator};
pub use handle::ChainHandle;
pub use pow::ProofOfWork;
pub use transaction::{Transaction, TxInput, TxOutput};
