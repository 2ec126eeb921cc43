//! Transaction identity, signing and validation

use crate::crypto::{address_from_pubkey, sha256, verify_signature, KeyPair};
use crate::error::{ConsensusError, Result};
use crate::serialize::{put_u32, serialize_outputs, serialize_transaction};
use crate::types::*;
use std::collections::HashSet;

/// TxId: 𝒯𝒳 → ℋ
///
/// SHA256 of the canonical encoding, which includes the coinbase flag and
/// note so that rewards for different blocks never share an id.
pub fn calculate_tx_id(tx: &Transaction) -> Hash {
    sha256(&serialize_transaction(tx))
}

/// OutputsDigest: [Out] → ℋ
pub fn outputs_digest(outputs: &[TransactionOutput]) -> Hash {
    sha256(&serialize_outputs(outputs))
}

/// InputSighash: ℋ × ℕ × [Out] → ℋ
///
/// sighash = SHA256(prevTxId ‖ prevIndex ‖ OutputsDigest(outs))
pub fn input_sighash(prev_tx_id: &Hash, prev_index: u32, outputs: &[TransactionOutput]) -> Hash {
    let mut preimage = Vec::with_capacity(32 + 4 + 32);
    preimage.extend_from_slice(prev_tx_id);
    put_u32(&mut preimage, prev_index);
    preimage.extend_from_slice(&outputs_digest(outputs));
    sha256(&preimage)
}

/// Build a signed input that spends `(prev_tx_id, prev_index)` into `outputs`.
///
/// The signer's public key travels with the input so that any node can
/// verify it without a prior address-book entry.
pub fn sign_input(
    keys: &KeyPair,
    prev_tx_id: Hash,
    prev_index: u32,
    outputs: &[TransactionOutput],
) -> TransactionInput {
    let sighash = input_sighash(&prev_tx_id, prev_index, outputs);
    TransactionInput {
        prev_tx_id,
        prev_index,
        pubkey: Some(keys.public_bytes()),
        signature: keys.sign(&sighash),
    }
}

/// Coinbase transaction paying `amount` to `address`
pub fn make_coinbase(address: &str, amount: Natural, note: String) -> Transaction {
    Transaction {
        inputs: Vec::new(),
        outputs: vec![TransactionOutput {
            address: address.to_string(),
            amount,
        }],
        coinbase: true,
        note: Some(note),
    }
}

pub fn is_coinbase(tx: &Transaction) -> bool {
    tx.coinbase
}

/// CheckTransaction: 𝒯𝒳 → {valid, invalid}
///
/// 1. ¬tx.coinbase
/// 2. |ins| > 0 ∧ |outs| > 0
/// 3. ∀o ∈ outs: o.amount > 0
/// 4. inputs reference pairwise distinct outpoints
pub fn check_transaction(tx: &Transaction) -> Result<()> {
    if is_coinbase(tx) {
        return Err(ConsensusError::TransactionValidation(
            "coinbase transactions cannot be submitted".to_string(),
        ));
    }

    if tx.inputs.is_empty() || tx.outputs.is_empty() {
        return Err(ConsensusError::TransactionValidation(
            "empty inputs or outputs".to_string(),
        ));
    }

    for (i, output) in tx.outputs.iter().enumerate() {
        if output.amount == 0 {
            return Err(ConsensusError::TransactionValidation(format!(
                "bad output {}: amount must be positive",
                i
            )));
        }
    }

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        let outpoint = input.outpoint();
        if !seen.insert(outpoint.clone()) {
            return Err(ConsensusError::TransactionValidation(format!(
                "duplicate input {}",
                outpoint
            )));
        }
    }

    Ok(())
}

/// ValidateTransaction: 𝒯𝒳 × 𝒰𝒮 × 𝒜ℬ → ℕ
///
/// For transaction tx against UTXO view us and address book ab:
/// 1. CheckTransaction(tx)
/// 2. ∀i ∈ ins: us(i) exists, pk = i.pubkey ∨ ab(us(i).address),
///    Address(pk) = us(i).address, Verify(pk, sighash(i), i.signature)
/// 3. Σ outs ≤ Σ ins
/// 4. Return fee = Σ ins − Σ outs
pub fn validate_transaction(
    tx: &Transaction,
    utxo_set: &UtxoSet,
    address_book: &AddressBook,
) -> Result<Natural> {
    // 1. Shape
    check_transaction(tx)?;

    // 2. Inputs
    let mut total_in: Natural = 0;
    for input in &tx.inputs {
        let outpoint = input.outpoint();
        let utxo = utxo_set
            .get(&outpoint)
            .ok_or_else(|| ConsensusError::UtxoNotFound(outpoint.clone()))?;

        let pubkey = match &input.pubkey {
            Some(pubkey) => pubkey,
            None => address_book
                .get(&utxo.address)
                .ok_or_else(|| ConsensusError::UnknownKey(utxo.address.clone()))?,
        };

        if address_from_pubkey(pubkey) != utxo.address {
            return Err(ConsensusError::InvalidSignature(format!(
                "public key does not own {}",
                outpoint
            )));
        }

        let sighash = input_sighash(&input.prev_tx_id, input.prev_index, &tx.outputs);
        if !verify_signature(pubkey, &sighash, &input.signature) {
            return Err(ConsensusError::InvalidSignature(format!(
                "bad signature for {}",
                outpoint
            )));
        }

        total_in = total_in.checked_add(utxo.amount).ok_or_else(|| {
            ConsensusError::TransactionValidation("input value overflow".to_string())
        })?;
    }

    // 3. Solvency
    let total_out = tx
        .outputs
        .iter()
        .try_fold(0 as Natural, |acc, o| acc.checked_add(o.amount))
        .ok_or_else(|| {
            ConsensusError::TransactionValidation("output value overflow".to_string())
        })?;

    if total_out > total_in {
        return Err(ConsensusError::Insolvent {
            input: total_in,
            output: total_out,
        });
    }

    // 4. Fee
    Ok(total_in - total_out)
}

/// ApplyTransaction: 𝒯𝒳 × 𝒰𝒮 → 𝒰𝒮
///
/// us' = (us \ {i.outpoint | i ∈ ins}) ∪ {(txid, k) ↦ outs[k]}
pub fn apply_transaction(tx: &Transaction, mut utxo_set: UtxoSet) -> UtxoSet {
    for input in &tx.inputs {
        utxo_set.remove(&input.outpoint());
    }

    let txid = calculate_tx_id(tx);
    for (i, output) in tx.outputs.iter().enumerate() {
        utxo_set.insert(
            OutPoint {
                txid,
                index: i as u32,
            },
            UTXO {
                address: output.address.clone(),
                amount: output.amount,
            },
        );
    }

    utxo_set
}

/// Public keys carried by a transaction's inputs, paired with their addresses
pub fn input_keys(tx: &Transaction) -> impl Iterator<Item = (Address, &ByteString)> {
    tx.inputs
        .iter()
        .filter_map(|input| input.pubkey.as_ref())
        .map(|pubkey| (address_from_pubkey(pubkey), pubkey))
}
