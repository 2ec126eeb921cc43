//! UTXO ledger: block connection and chain replay

use crate::constants::*;
use crate::crypto::address_from_pubkey;
use crate::error::{ConsensusError, Result};
use crate::mempool::Mempool;
use crate::transaction::{
    apply_transaction, calculate_tx_id, input_keys, make_coinbase, validate_transaction,
};
use crate::types::*;

/// Coinbase transaction rewarding the issuer of `block`
pub fn block_coinbase(block: &Block) -> Transaction {
    make_coinbase(
        &address_from_pubkey(&block.pubkey),
        COINBASE_REWARD,
        format!("reward for block {}", block.index),
    )
}

/// GrantCoinbase: ℬ × 𝒰𝒮 → 𝒰𝒮
pub fn grant_coinbase(block: &Block, utxo_set: UtxoSet) -> UtxoSet {
    apply_transaction(&block_coinbase(block), utxo_set)
}

/// ConnectBlock: ℬ × 𝒰𝒮 × 𝒜ℬ → 𝒰𝒮
///
/// For non-genesis block b on UTXO set us:
/// 1. us' = GrantCoinbase(b, us)
/// 2. ∀tx ∈ b.txs in order: ValidateTransaction(tx, us', ab), us' = ApplyTransaction(tx, us')
/// 3. Record the issuer key and every input key in ab
/// 4. Return us'
///
/// Works on copies; `utxo_set` and `address_book` are untouched on failure.
pub fn connect_block(
    block: &Block,
    utxo_set: &UtxoSet,
    address_book: &mut AddressBook,
) -> Result<UtxoSet> {
    if block.index == 0 {
        return Ok(utxo_set.clone());
    }

    let mut book = address_book.clone();
    if !block.pubkey.is_empty() {
        book.insert(address_from_pubkey(&block.pubkey), block.pubkey.clone());
    }

    // 1. Coinbase
    let mut working = grant_coinbase(block, utxo_set.clone());

    // 2. Payload
    for (i, tx) in block.payload.txs.iter().enumerate() {
        validate_transaction(tx, &working, &book).map_err(|e| {
            ConsensusError::BlockValidation(format!(
                "transaction {} in block {}: {}",
                i, block.index, e
            ))
        })?;
        working = apply_transaction(tx, working);
        for (address, pubkey) in input_keys(tx) {
            book.insert(address, pubkey.clone());
        }
    }

    // 3. Keys
    *address_book = book;
    Ok(working)
}

/// RebuildUtxoSet: [ℬ] × 𝒜ℬ → 𝒰𝒮
///
/// Deterministic replay of a chain from an empty set.
pub fn rebuild_utxo_set(chain: &[Block], address_book: &mut AddressBook) -> Result<UtxoSet> {
    chain
        .iter()
        .try_fold(UtxoSet::new(), |utxo_set, block| {
            connect_block(block, &utxo_set, address_book)
        })
}

/// Connect `block` onto `utxo_set`, then drop its transactions from the
/// mempool and revalidate what remains.
///
/// Returns the ids of pending transactions that the block invalidated.
pub fn apply_block(
    block: &Block,
    utxo_set: &mut UtxoSet,
    address_book: &mut AddressBook,
    mempool: &mut Mempool,
) -> Result<Vec<Hash>> {
    *utxo_set = connect_block(block, utxo_set, address_book)?;
    for tx in &block.payload.txs {
        mempool.remove(&calculate_tx_id(tx));
    }
    Ok(mempool.revalidate(utxo_set, address_book))
}

/// Unspent outputs owned by `address`, ordered by outpoint
pub fn utxos_for_address(utxo_set: &UtxoSet, address: &str) -> Vec<(OutPoint, Natural)> {
    let mut utxos: Vec<_> = utxo_set
        .iter()
        .filter(|(_, utxo)| utxo.address == address)
        .map(|(outpoint, utxo)| (outpoint.clone(), utxo.amount))
        .collect();
    utxos.sort_by(|a, b| a.0.cmp(&b.0));
    utxos
}

pub fn balance_of(utxo_set: &UtxoSet, address: &str) -> Natural {
    utxo_set
        .values()
        .filter(|utxo| utxo.address == address)
        .map(|utxo| utxo.amount)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{genesis, seal};
    use crate::crypto::KeyPair;
    use crate::transaction::sign_input;

    fn child_of(prev: &Block, issuer: &KeyPair, txs: Vec<Transaction>) -> Block {
        seal(Block {
            index: prev.index + 1,
            slot: prev.slot + 1,
            prev_hash: prev.hash,
            payload: BlockPayload {
                txs,
                note: String::new(),
            },
            issuer: "test".to_string(),
            proof: Vec::new(),
            pubkey: issuer.public_bytes(),
            timestamp: prev.timestamp + 1,
            hash: [0; 32],
        })
    }

    fn reward_outpoint(block: &Block) -> OutPoint {
        OutPoint {
            txid: calculate_tx_id(&block_coinbase(block)),
            index: 0,
        }
    }

    #[test]
    fn test_connect_block_grants_reward() {
        let issuer = KeyPair::generate();
        let block = child_of(&genesis(), &issuer, vec![]);
        let mut book = AddressBook::new();
        let utxo_set = connect_block(&block, &UtxoSet::new(), &mut book).unwrap();
        assert_eq!(balance_of(&utxo_set, &issuer.address()), COINBASE_REWARD);
        assert_eq!(book.get(&issuer.address()), Some(&issuer.public_bytes()));
    }

    #[test]
    fn test_connect_genesis_is_identity() {
        let mut book = AddressBook::new();
        let utxo_set = connect_block(&genesis(), &UtxoSet::new(), &mut book).unwrap();
        assert!(utxo_set.is_empty());
        assert!(book.is_empty());
    }

    #[test]
    fn test_successive_rewards_do_not_collide() {
        let issuer = KeyPair::generate();
        let b1 = child_of(&genesis(), &issuer, vec![]);
        let b2 = child_of(&b1, &issuer, vec![]);
        let mut book = AddressBook::new();
        let utxo_set = rebuild_utxo_set(&[genesis(), b1, b2], &mut book).unwrap();
        assert_eq!(utxo_set.len(), 2);
        assert_eq!(balance_of(&utxo_set, &issuer.address()), 2 * COINBASE_REWARD);
    }

    #[test]
    fn test_connect_block_is_all_or_nothing() {
        let issuer = KeyPair::generate();
        let b1 = child_of(&genesis(), &issuer, vec![]);
        let mut book = AddressBook::new();
        let utxo_set = connect_block(&b1, &UtxoSet::new(), &mut book).unwrap();

        let stranger = KeyPair::generate();
        let outputs = vec![TransactionOutput {
            address: "bob".to_string(),
            amount: 10,
        }];
        let spent = reward_outpoint(&b1);
        let bad = Transaction {
            inputs: vec![sign_input(&stranger, spent.txid, spent.index, &outputs)],
            outputs,
            coinbase: false,
            note: None,
        };
        let b2 = child_of(&b1, &stranger, vec![bad]);
        let book_before = book.clone();
        let err = connect_block(&b2, &utxo_set, &mut book).unwrap_err();
        assert!(matches!(err, ConsensusError::BlockValidation(_)));
        assert_eq!(book, book_before);
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let issuer = KeyPair::generate();
        let b1 = child_of(&genesis(), &issuer, vec![]);
        let spent = reward_outpoint(&b1);
        let outputs = vec![
            TransactionOutput { address: "bob".to_string(), amount: 25 },
            TransactionOutput { address: issuer.address(), amount: 25 },
        ];
        let tx = Transaction {
            inputs: vec![sign_input(&issuer, spent.txid, spent.index, &outputs)],
            outputs,
            coinbase: false,
            note: None,
        };
        let b2 = child_of(&b1, &issuer, vec![tx]);
        let chain = vec![genesis(), b1, b2];

        let a = rebuild_utxo_set(&chain, &mut AddressBook::new()).unwrap();
        let b = rebuild_utxo_set(&chain, &mut AddressBook::new()).unwrap();
        assert_eq!(a, b);
        assert_eq!(balance_of(&a, "bob"), 25);
        assert_eq!(balance_of(&a, &issuer.address()), 25 + COINBASE_REWARD);
    }

    #[test]
    fn test_apply_block_prunes_mempool() {
        let issuer = KeyPair::generate();
        let b1 = child_of(&genesis(), &issuer, vec![]);
        let mut book = AddressBook::new();
        let mut utxo_set = connect_block(&b1, &UtxoSet::new(), &mut book).unwrap();

        let spent = reward_outpoint(&b1);
        let outputs = vec![TransactionOutput { address: "bob".to_string(), amount: 50 }];
        let tx = Transaction {
            inputs: vec![sign_input(&issuer, spent.txid, spent.index, &outputs)],
            outputs,
            coinbase: false,
            note: None,
        };
        let mut mempool = Mempool::new();
        mempool.admit(tx.clone(), &utxo_set, &book).unwrap();

        let b2 = child_of(&b1, &issuer, vec![tx]);
        let dropped = apply_block(&b2, &mut utxo_set, &mut book, &mut mempool).unwrap();
        assert!(dropped.is_empty());
        assert!(mempool.is_empty());
        assert_eq!(balance_of(&utxo_set, "bob"), 50);
    }

    #[test]
    fn test_utxos_for_address_sorted_and_empty() {
        let issuer = KeyPair::generate();
        let b1 = child_of(&genesis(), &issuer, vec![]);
        let b2 = child_of(&b1, &issuer, vec![]);
        let utxo_set = rebuild_utxo_set(&[genesis(), b1, b2], &mut AddressBook::new()).unwrap();
        let utxos = utxos_for_address(&utxo_set, &issuer.address());
        assert_eq!(utxos.len(), 2);
        assert!(utxos[0].0 < utxos[1].0);
        assert!(utxos_for_address(&utxo_set, "nobody").is_empty());
    }
}
