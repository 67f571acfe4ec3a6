use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::{Block, Payload, Transaction, TxInput, TxOutput};

/// A block as returned by the API, hashes hex encoded
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BlockView {
    /// Creation time in seconds since the epoch
    pub timestamp: i64,

    #[schema(value_type = Option<String>, example = "2023-01-01T12:00:00Z")]
    pub created_at: Option<DateTime<Utc>>,

    pub prev_hash: String,

    pub hash: String,

    pub nonce: i64,

    /// Leading zero bits the chain requires of every block hash
    pub difficulty: u32,

    /// Raw data, for data blocks
    pub data: Option<String>,

    /// Transactions, for ledger blocks
    pub transactions: Vec<TransactionView>,

    /// Whether the proof of work replays correctly
    pub pow_valid: bool,
}

impl BlockView {
    pub fn new(block: &Block, difficulty: u32, pow_valid: bool) -> Self {
        let data = match &block.payload {
            Payload::Data(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            Payload::Transactions(_) => None,
        };

        BlockView {
            timestamp: block.timestamp,
            created_at: DateTime::from_timestamp(block.timestamp, 0),
            prev_hash: hex::encode(&block.prev_block_hash),
            hash: hex::encode(&block.hash),
            nonce: block.nonce,
            difficulty,
            data,
            transactions: block.transactions().iter().map(TransactionView::from).collect(),
            pow_valid,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionView {
    pub id: String,
    pub coinbase: bool,
    pub inputs: Vec<InputView>,
    pub outputs: Vec<OutputView>,
}

impl From<&Transaction> for TransactionView {
    fn from(tx: &Transaction) -> Self {
        TransactionView {
            id: tx.id_hex(),
            coinbase: tx.is_coinbase(),
            inputs: tx.inputs.iter().map(InputView::from).collect(),
            outputs: tx.outputs.iter().map(OutputView::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InputView {
    pub txid: String,
    pub vout: i64,
    pub script_sig: String,
}

impl From<&TxInput> for InputView {
    fn from(input: &TxInput) -> Self {
        InputView {
            txid: hex::encode(&input.txid),
            vout: input.vout,
            script_sig: input.script_sig.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OutputView {
    pub value: u64,
    pub script_pub_key: String,
}

impl From<&TxOutput> for OutputView {
    fn from(output: &TxOutput) -> Self {
        OutputView {
            value: output.value,
            script_pub_key: output.script_pub_key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_view_of_data_block() {
        let block = Block::new(Payload::Data(b"test1".to_vec()), vec![0xab; 4], 8).unwrap();
        let view = BlockView::new(&block, 8, true);
        assert_eq!(view.difficulty, 8);

        assert_eq!(view.data.as_deref(), Some("test1"));
        assert_eq!(view.prev_hash, "abababab");
        assert_eq!(view.hash, hex::encode(&block.hash));
        assert!(view.transactions.is_empty());
        assert!(view.created_at.is_some());
    }

    #[test]
    fn test_block_view_of_ledger_block() {
        let coinbase = Transaction::new_coinbase("alice", "reward").unwrap();
        let block = Block::new(Payload::Transactions(vec![coinbase.clone()]), Vec::new(), 8).unwrap();
        let view = BlockView::new(&block, 8, false);

        assert!(view.data.is_none());
        assert_eq!(view.transactions.len(), 1);
        assert!(view.transactions[0].coinbase);
        assert_eq!(view.transactions[0].id, coinbase.id_hex());
        assert_eq!(view.transactions[0].inputs[0].vout, -1);
        assert_eq!(view.transactions[0].outputs[0].script_pub_key, "alice");
    }
}
