use std::sync::Arc;
use std::thread;

use pow_ledger::blockchain::chain::BlockchainError;
use pow_ledger::blockchain::pow::leading_zero_bits;
use pow_ledger::blockchain::transaction::TransactionError;
use pow_ledger::blockchain::{Block, Blockchain, ChainHandle, Payload, ProofOfWork, Transaction};
use tempfile::TempDir;

const TEST_BITS: u32 = 8;

fn collect(chain: &Blockchain) -> Vec<Block> {
    chain.iter().unwrap().collect::<Result<Vec<_>, _>>().unwrap()
}

#[test]
fn test_chain_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chain");

    let (genesis, tip) = {
        let handle = ChainHandle::new(&path, TEST_BITS);
        let chain = handle.get().unwrap();
        let genesis = chain.tip().unwrap();
        chain.append_data("test1").unwrap();
        let tip = chain.append_data("test2").unwrap().hash;
        (genesis, tip)
    };

    let handle = ChainHandle::new(&path, TEST_BITS);
    let chain = handle.get().unwrap();
    assert_eq!(chain.tip().unwrap(), tip);

    let blocks = collect(&chain);
    assert_eq!(blocks.len(), 3);
    assert_eq!(blocks[2].hash, genesis);
    for block in &blocks {
        assert!(chain.validate(block));
        assert!(leading_zero_bits(&block.hash) >= TEST_BITS);
    }
}

#[test]
fn test_every_block_has_one_predecessor_path() {
    let dir = TempDir::new().unwrap();
    let chain = Arc::new(Blockchain::open(dir.path().join("chain"), TEST_BITS).unwrap());

    let writers: Vec<_> = (0..3)
        .map(|i| {
            let chain = Arc::clone(&chain);
            thread::spawn(move || {
                for j in 0..3 {
                    chain.append_data(format!("writer {} entry {}", i, j)).unwrap();
                }
            })
        })
        .collect();

    // readers walk while writers append
    for _ in 0..5 {
        let blocks = collect(&chain);
        assert!(blocks.last().unwrap().is_genesis());
    }

    for writer in writers {
        writer.join().unwrap();
    }

    let blocks = collect(&chain);
    assert_eq!(blocks.len(), 10);

    let mut seen = std::collections::HashSet::new();
    for pair in blocks.windows(2) {
        assert_eq!(pair[0].prev_block_hash, pair[1].hash);
    }
    for block in &blocks {
        assert!(seen.insert(block.hash.clone()), "block visited twice");
    }
}

#[test]
fn test_stored_block_tampering_is_detected() {
    let dir = TempDir::new().unwrap();
    let chain = Blockchain::open(dir.path().join("chain"), TEST_BITS).unwrap();
    let block = chain.append_data("original").unwrap();

    let stored = collect(&chain).remove(0);
    assert_eq!(stored, block);

    let mut tampered = stored.clone();
    tampered.payload = Payload::Data(b"forged".to_vec());
    assert!(!ProofOfWork::new(&tampered, TEST_BITS).unwrap().validate());

    let mut renonced = stored;
    renonced.nonce += 1;
    assert!(!chain.validate(&renonced));
}

#[test]
fn test_spending_chain_of_transfers() {
    let dir = TempDir::new().unwrap();
    let chain = Blockchain::open(dir.path().join("chain"), TEST_BITS).unwrap();

    chain
        .mine_block(vec![Transaction::new_coinbase("A", "first reward").unwrap()])
        .unwrap();

    let to_b = chain.new_utxo_transaction("A", "B", 4).unwrap();
    chain.mine_block(vec![to_b]).unwrap();

    let to_c = chain.new_utxo_transaction("B", "C", 3).unwrap();
    chain.mine_block(vec![to_c]).unwrap();

    let back_to_a = chain.new_utxo_transaction("C", "A", 3).unwrap();
    assert_eq!(back_to_a.outputs.len(), 1);
    chain.mine_block(vec![back_to_a]).unwrap();

    assert_eq!(chain.get_balance("A").unwrap(), 9);
    assert_eq!(chain.get_balance("B").unwrap(), 1);
    assert_eq!(chain.get_balance("C").unwrap(), 0);

    let (accumulated, selected) = chain.find_spendable_outputs("A", 9).unwrap();
    assert_eq!(accumulated, 9);
    assert_eq!(selected.values().map(Vec::len).sum::<usize>(), 2);

    match chain.new_utxo_transaction("C", "A", 1) {
        Err(BlockchainError::TransactionError(TransactionError::InsufficientFunds {
            required,
            available,
        })) => {
            assert_eq!(required, 1);
            assert_eq!(available, 0);
        }
        other => panic!("expected insufficient funds, got {:?}", other),
    }
}

#[test]
fn test_concurrent_handle_callers_share_genesis() {
    let dir = TempDir::new().unwrap();
    let handle = Arc::new(ChainHandle::new(dir.path().join("chain"), TEST_BITS));

    let tips: Vec<Vec<u8>> = (0..6)
        .map(|_| {
            let handle = Arc::clone(&handle);
            thread::spawn(move || handle.get().unwrap().tip().unwrap())
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|t| t.join().unwrap())
        .collect();

    assert!(tips.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(collect(&handle.get().unwrap()).len(), 1);
}
