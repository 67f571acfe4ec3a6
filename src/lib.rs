//! A single-node, append-only ledger of proof-of-work blocks with
//! unspent-output accounting, persisted in sled.

pub mod api;
pub mod blockchain;
pub mod config;
