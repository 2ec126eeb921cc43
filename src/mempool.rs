//! Pending transaction pool with a double-spend-aware ledger overlay

use crate::error::{ConsensusError, Result};
use crate::transaction::{apply_transaction, calculate_tx_id, validate_transaction};
use crate::types::*;
use std::collections::HashMap;

/// Outcome of a successful admission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub txid: Hash,
    pub fee: Natural,
    /// Already pending; nothing was re-validated or changed
    pub duplicate: bool,
}

/// Pending transactions in admission order.
///
/// Every entry is valid against the ledger overlaid with the entries admitted
/// before it, so the pool as a whole never double-spends.
#[derive(Debug, Clone, Default)]
pub struct Mempool {
    entries: HashMap<Hash, Transaction>,
    order: Vec<Hash>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// AcceptToMemoryPool: 𝒯𝒳 × 𝒰𝒮 × 𝒜ℬ → {accepted, rejected}
    ///
    /// 1. txid ∈ pool → accepted as duplicate
    /// 2. Let us' = us with every pending tx applied in FIFO order
    /// 3. ValidateTransaction(tx, us', ab), where a missing outpoint that a
    ///    pending tx already spends is reported as a conflict
    /// 4. Append tx to the pool
    pub fn admit(
        &mut self,
        tx: Transaction,
        utxo_set: &UtxoSet,
        address_book: &AddressBook,
    ) -> Result<Admission> {
        // 1. Duplicate
        let txid = calculate_tx_id(&tx);
        if self.entries.contains_key(&txid) {
            return Ok(Admission {
                txid,
                fee: 0,
                duplicate: true,
            });
        }

        // 2. Overlay
        let overlay = self.overlay(utxo_set);

        // 3. Validate
        let fee = validate_transaction(&tx, &overlay, address_book).map_err(|e| match e {
            ConsensusError::UtxoNotFound(outpoint) if self.spends(&outpoint) => {
                ConsensusError::MempoolConflict(outpoint)
            }
            other => other,
        })?;

        // 4. Insert
        self.entries.insert(txid, tx);
        self.order.push(txid);
        Ok(Admission {
            txid,
            fee,
            duplicate: false,
        })
    }

    /// Ledger view with every pending transaction applied in admission order
    pub fn overlay(&self, utxo_set: &UtxoSet) -> UtxoSet {
        self.transactions()
            .fold(utxo_set.clone(), |view, tx| apply_transaction(tx, view))
    }

    /// Whether a pending transaction consumes `outpoint`
    pub fn spends(&self, outpoint: &OutPoint) -> bool {
        self.transactions()
            .any(|tx| tx.inputs.iter().any(|input| input.outpoint() == *outpoint))
    }

    /// Up to `max_count` pending transactions, oldest first
    pub fn select_for_block(&self, max_count: usize) -> Vec<Transaction> {
        self.transactions().take(max_count).cloned().collect()
    }

    pub fn remove(&mut self, txid: &Hash) -> Option<Transaction> {
        let tx = self.entries.remove(txid)?;
        self.order.retain(|id| id != txid);
        Some(tx)
    }

    pub fn contains(&self, txid: &Hash) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn get(&self, txid: &Hash) -> Option<&Transaction> {
        self.entries.get(txid)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Pending transactions in admission order
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.order.iter().filter_map(|txid| self.entries.get(txid))
    }

    /// Replay admission against a new ledger state, dropping entries that no
    /// longer validate. Returns the dropped ids.
    pub fn revalidate(&mut self, utxo_set: &UtxoSet, address_book: &AddressBook) -> Vec<Hash> {
        let mut view = utxo_set.clone();
        let mut kept = Vec::with_capacity(self.order.len());
        let mut dropped = Vec::new();

        for txid in std::mem::take(&mut self.order) {
            let Some(tx) = self.entries.get(&txid) else {
                continue;
            };
            if validate_transaction(tx, &view, address_book).is_ok() {
                view = apply_transaction(tx, view);
                kept.push(txid);
            } else {
                self.entries.remove(&txid);
                dropped.push(txid);
            }
        }

        self.order = kept;
        dropped
    }
}
