//! Mempool admission against a shared ledger

use ouro_consensus::crypto::KeyPair;
use ouro_consensus::ledger::{apply_block, balance_of};
use ouro_consensus::mempool::Mempool;
use ouro_consensus::transaction::{calculate_tx_id, sign_input};
use ouro_consensus::*;

fn funded(keys: &KeyPair, amount: Natural) -> (OutPoint, UtxoSet) {
    let outpoint = OutPoint {
        txid: [7; 32],
        index: 0,
    };
    let mut utxo_set = UtxoSet::new();
    utxo_set.insert(
        outpoint.clone(),
        UTXO {
            address: keys.address(),
            amount,
        },
    );
    (outpoint, utxo_set)
}

fn pay(keys: &KeyPair, from: &OutPoint, to: &str, amount: Natural) -> Transaction {
    let outputs = vec![TransactionOutput {
        address: to.to_string(),
        amount,
    }];
    Transaction {
        inputs: vec![sign_input(keys, from.txid, from.index, &outputs)],
        outputs,
        coinbase: false,
        note: None,
    }
}

#[test]
fn test_double_spend_rejected_as_conflict() {
    let alice = KeyPair::generate();
    let (outpoint, utxo_set) = funded(&alice, 100);
    let book = AddressBook::new();
    let mut mempool = Mempool::new();

    let first = pay(&alice, &outpoint, "bob", 60);
    let second = pay(&alice, &outpoint, "carol", 60);

    let admission = mempool.admit(first.clone(), &utxo_set, &book).unwrap();
    assert_eq!(admission.fee, 40);
    assert!(!admission.duplicate);

    assert_eq!(
        mempool.admit(second, &utxo_set, &book),
        Err(ConsensusError::MempoolConflict(outpoint))
    );
    assert_eq!(mempool.len(), 1);
    assert!(mempool.contains(&calculate_tx_id(&first)));
}

#[test]
fn test_resubmission_is_duplicate() {
    let alice = KeyPair::generate();
    let (outpoint, utxo_set) = funded(&alice, 100);
    let book = AddressBook::new();
    let mut mempool = Mempool::new();
    let tx = pay(&alice, &outpoint, "bob", 90);

    mempool.admit(tx.clone(), &utxo_set, &book).unwrap();
    let again = mempool.admit(tx, &utxo_set, &book).unwrap();
    assert!(again.duplicate);
    assert_eq!(again.fee, 0);
    assert_eq!(mempool.len(), 1);
}

#[test]
fn test_overspend_and_unknown_outpoint() {
    let alice = KeyPair::generate();
    let (outpoint, utxo_set) = funded(&alice, 100);
    let book = AddressBook::new();
    let mut mempool = Mempool::new();

    let greedy = pay(&alice, &outpoint, "bob", 101);
    assert!(matches!(
        mempool.admit(greedy, &utxo_set, &book),
        Err(ConsensusError::Insolvent { .. })
    ));

    let missing = OutPoint {
        txid: [9; 32],
        index: 3,
    };
    assert_eq!(
        mempool.admit(pay(&alice, &missing, "bob", 1), &utxo_set, &book),
        Err(ConsensusError::UtxoNotFound(missing))
    );
    assert!(mempool.is_empty());
}

#[test]
fn test_foreign_signer_rejected() {
    let alice = KeyPair::generate();
    let mallory = KeyPair::generate();
    let (outpoint, utxo_set) = funded(&alice, 100);
    let mut mempool = Mempool::new();

    let theft = pay(&mallory, &outpoint, "mallory", 100);
    assert!(matches!(
        mempool.admit(theft, &utxo_set, &AddressBook::new()),
        Err(ConsensusError::InvalidSignature(_))
    ));
}

#[test]
fn test_block_inclusion_prunes_pool() {
    let alice = KeyPair::generate();
    let bob = KeyPair::generate();
    let (outpoint, mut utxo_set) = funded(&alice, 100);
    let mut book = AddressBook::new();
    let mut mempool = Mempool::new();

    let tx = pay(&alice, &outpoint, &bob.address(), 100);
    mempool.admit(tx.clone(), &utxo_set, &book).unwrap();

    let engine = ConsensusEngine::default();
    let tip = ouro_consensus::block::genesis();
    let block = engine.forge_block(ouro_consensus::consensus::ForgeRequest {
        tip: &tip,
        slot: 1,
        keys: &alice,
        issuer: "alice".to_string(),
        note: String::new(),
        txs: mempool.select_for_block(MAX_BLOCK_TXS),
        timestamp: 0,
    });
    let dropped = apply_block(&block, &mut utxo_set, &mut book, &mut mempool).unwrap();

    assert!(dropped.is_empty());
    assert!(mempool.is_empty());
    assert_eq!(balance_of(&utxo_set, &bob.address()), 100);
    assert_eq!(balance_of(&utxo_set, &alice.address()), COINBASE_REWARD);
}
