//! Longest-chain selection between competing forks

use ouro_consensus::block::genesis;
use ouro_consensus::consensus::{ConsensusParams, ForgeRequest};
use ouro_consensus::crypto::KeyPair;
use ouro_consensus::ledger::rebuild_utxo_set;
use ouro_consensus::node::config::NodeSettings;
use ouro_consensus::node::message::{BlocksMessage, PeerMessage};
use ouro_consensus::node::NodeState;
use ouro_consensus::*;

/// Forge a chain of `len` blocks (genesis included) signed by `keys`
fn fork(keys: &KeyPair, len: usize) -> Vec<Block> {
    let engine = ConsensusEngine::default();
    let mut chain = vec![genesis()];
    while chain.len() < len {
        let tip = chain[chain.len() - 1].clone();
        chain.push(engine.forge_block(ForgeRequest {
            tip: &tip,
            slot: tip.slot + 1,
            keys,
            issuer: "forger".to_string(),
            note: format!("fork block {}", tip.index + 1),
            txs: vec![],
            timestamp: tip.timestamp + 2_000,
        }));
    }
    chain
}

fn observer() -> NodeState {
    let settings = NodeSettings {
        name: "observer".to_string(),
        port: 4009,
        stake: 500,
        total_stake: Some(0),
        peer_ttl_slots: DEFAULT_PEER_TTL_SLOTS,
        consensus: ConsensusParams::default(),
    };
    NodeState::new(settings, KeyPair::generate(), vec![], None).unwrap()
}

fn offer(node: &mut NodeState, blocks: &[Block]) {
    node.handle_peer_message(PeerMessage::Blocks(BlocksMessage {
        blocks: blocks.to_vec(),
    }));
}

#[test]
fn test_longer_fork_wins_in_either_order() {
    let short = fork(&KeyPair::generate(), 5);
    let long = fork(&KeyPair::generate(), 7);

    let mut a = observer();
    offer(&mut a, &short);
    assert_eq!(a.chain(), &short[..]);
    offer(&mut a, &long);
    assert_eq!(a.chain(), &long[..]);

    let mut b = observer();
    offer(&mut b, &long);
    offer(&mut b, &short);
    assert_eq!(b.chain(), &long[..]);

    assert_eq!(a.utxo_set(), b.utxo_set());
    assert_eq!(a.utxo_set().len(), 6);
}

#[test]
fn test_equal_length_keeps_current() {
    let first = fork(&KeyPair::generate(), 4);
    let second = fork(&KeyPair::generate(), 4);

    let mut node = observer();
    offer(&mut node, &first);
    offer(&mut node, &second);
    assert_eq!(node.chain(), &first[..]);
}

#[test]
fn test_broken_fork_is_ignored() {
    let good = fork(&KeyPair::generate(), 3);
    let mut broken = fork(&KeyPair::generate(), 6);
    broken[3].payload.note = "forged history".to_string();

    let mut node = observer();
    offer(&mut node, &good);
    offer(&mut node, &broken);
    assert_eq!(node.chain(), &good[..]);
}

#[test]
fn test_choose_best_chain() {
    let engine = ConsensusEngine::default();
    let a = fork(&KeyPair::generate(), 5);
    let b = fork(&KeyPair::generate(), 7);
    let mut c = fork(&KeyPair::generate(), 9);
    c[2].slot += 1;
    let d = fork(&KeyPair::generate(), 7);

    let chains = vec![a, b.clone(), c, d];
    assert_eq!(engine.choose_best_chain(&chains), Some(&b));
    assert_eq!(engine.choose_best_chain(&[]), None);
}

#[test]
fn test_adopted_ledger_matches_replay() {
    let long = fork(&KeyPair::generate(), 7);
    let mut node = observer();
    offer(&mut node, &long);

    let replayed = rebuild_utxo_set(&long, &mut AddressBook::new()).unwrap();
    assert_eq!(node.utxo_set(), &replayed);
    assert_eq!(node.slot(), long[6].slot + 1);
}
