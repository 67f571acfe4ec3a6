use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Reward paid by a coinbase transaction
pub const SUBSIDY: u64 = 10;

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("Encoding error: {0}")]
    EncodingError(#[from] bincode::Error),

    #[error("Invalid transaction id: {0}")]
    InvalidTxid(#[from] hex::FromHexError),

    #[error("Transfer amount must be positive")]
    ZeroAmount,
}

/// Reference to an output of an earlier transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Id of the transaction holding the output, empty for coinbase
    pub txid: Vec<u8>,

    /// Index of the output in that transaction, -1 for coinbase
    pub vout: i64,

    /// Unlock proof, compared against the output's lock
    pub script_sig: String,
}

impl TxInput {
    pub fn can_unlock_output_with(&self, address: &str) -> bool {
        self.script_sig == address
    }
}

/// A value locked to an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: u64,

    pub script_pub_key: String,
}

impl TxOutput {
    pub fn can_be_unlocked_with(&self, address: &str) -> bool {
        self.script_pub_key == address
    }
}

/// Represents a value transfer in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// SHA-256 of the encoded inputs and outputs
    pub id: Vec<u8>,

    pub inputs: Vec<TxInput>,

    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Builds a transaction and derives its id from the content
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Result<Self, TransactionError> {
        let id = Self::compute_id(&inputs, &outputs)?;
        Ok(Transaction { id, inputs, outputs })
    }

    /// Creates a reward transaction paying [`SUBSIDY`] to `to`
    ///
    /// An empty `data` is replaced by a reward note carrying the current
    /// time and a random salt, so two rewards to the same address get
    /// different ids even when minted within the same millisecond.
    pub fn new_coinbase(to: &str, data: &str) -> Result<Self, TransactionError> {
        let data = if data.is_empty() {
            format!(
                "Reward to '{}' at {} ({:016x})",
                to,
                Utc::now().timestamp_millis(),
                rand::random::<u64>()
            )
        } else {
            data.to_string()
        };

        let input = TxInput {
            txid: Vec::new(),
            vout: -1,
            script_sig: data,
        };
        let output = TxOutput {
            value: SUBSIDY,
            script_pub_key: to.to_string(),
        };

        Self::new(vec![input], vec![output])
    }

    /// Builds a transfer from outputs selected by a spendable-output scan
    ///
    /// # Arguments
    ///
    /// * `from` - The address spending the outputs
    /// * `to` - The address receiving `amount`
    /// * `amount` - The value to transfer
    /// * `accumulated` - Total value of the selected outputs
    /// * `selected` - Hex transaction id to selected output indices
    ///
    /// # Returns
    ///
    /// The transaction, with a change output back to `from` when the
    /// selected outputs exceed `amount`
    pub fn new_transfer(
        from: &str,
        to: &str,
        amount: u64,
        accumulated: u64,
        selected: &BTreeMap<String, Vec<usize>>,
    ) -> Result<Self, TransactionError> {
        if amount == 0 {
            return Err(TransactionError::ZeroAmount);
        }
        if accumulated < amount {
            return Err(TransactionError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        let mut inputs = Vec::new();
        for (txid, outs) in selected {
            let txid = hex::decode(txid)?;
            for out in outs {
                inputs.push(TxInput {
                    txid: txid.clone(),
                    vout: *out as i64,
                    script_sig: from.to_string(),
                });
            }
        }

        let mut outputs = vec![TxOutput {
            value: amount,
            script_pub_key: to.to_string(),
        }];
        if accumulated > amount {
            outputs.push(TxOutput {
                value: accumulated - amount,
                script_pub_key: from.to_string(),
            });
        }

        Self::new(inputs, outputs)
    }

    fn compute_id(inputs: &[TxInput], outputs: &[TxOutput]) -> Result<Vec<u8>, TransactionError> {
        let encoded = bincode::serialize(&(inputs, outputs))?;
        Ok(Sha256::digest(&encoded).to_vec())
    }

    /// Checks if the transaction is a coinbase transaction
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].txid.is_empty() && self.inputs[0].vout == -1
    }

    /// Hex form of the id, used as the key of spent-output bookkeeping
    pub fn id_hex(&self) -> String {
        hex::encode(&self.id)
    }
}
