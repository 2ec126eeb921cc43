//! Canonical byte encoding for hashing and signing
//!
//! Integers are little-endian and fixed width; variable-length fields carry a
//! u64 length prefix. Field order is fixed, so equal values always encode to
//! equal bytes.

use crate::types::*;

pub(crate) fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_i64(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    put_u64(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

pub(crate) fn put_str(out: &mut Vec<u8>, s: &str) {
    put_bytes(out, s.as_bytes());
}

fn put_input(out: &mut Vec<u8>, input: &TransactionInput) {
    out.extend_from_slice(&input.prev_tx_id);
    put_u32(out, input.prev_index);
    match &input.pubkey {
        Some(pubkey) => {
            out.push(1);
            put_bytes(out, pubkey);
        }
        None => out.push(0),
    }
    put_bytes(out, &input.signature);
}

/// Encode an output list
pub fn serialize_outputs(outputs: &[TransactionOutput]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + outputs.len() * 80);
    put_u64(&mut out, outputs.len() as u64);
    for output in outputs {
        put_str(&mut out, &output.address);
        put_u64(&mut out, output.amount);
    }
    out
}

/// Encode a whole transaction: inputs, outputs, coinbase flag, note
pub fn serialize_transaction(tx: &Transaction) -> Vec<u8> {
    let mut out = Vec::new();
    put_u64(&mut out, tx.inputs.len() as u64);
    for input in &tx.inputs {
        put_input(&mut out, input);
    }
    out.extend_from_slice(&serialize_outputs(&tx.outputs));
    out.push(tx.coinbase as u8);
    match &tx.note {
        Some(note) => {
            out.push(1);
            put_str(&mut out, note);
        }
        None => out.push(0),
    }
    out
}

/// Encode every block field except `hash`
pub fn serialize_block(block: &Block) -> Vec<u8> {
    let mut out = Vec::new();
    put_u64(&mut out, block.index);
    put_u64(&mut out, block.slot);
    out.extend_from_slice(&block.prev_hash);
    put_u64(&mut out, block.payload.txs.len() as u64);
    for tx in &block.payload.txs {
        put_bytes(&mut out, &serialize_transaction(tx));
    }
    put_str(&mut out, &block.payload.note);
    put_str(&mut out, &block.issuer);
    put_bytes(&mut out, &block.proof);
    put_bytes(&mut out, &block.pubkey);
    put_i64(&mut out, block.timestamp);
    out
}
