//! Error types for consensus and ledger validation

use crate::types::OutPoint;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("Transaction validation failed: {0}")]
    TransactionValidation(String),

    #[error("UTXO not found: {0}")]
    UtxoNotFound(OutPoint),

    #[error("Unknown public key for address {0}")]
    UnknownKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Insufficient input value: inputs {input} < outputs {output}")]
    Insolvent { input: u64, output: u64 },

    #[error("Conflicts with pending transaction spending {0}")]
    MempoolConflict(OutPoint),

    #[error("Block validation failed: {0}")]
    BlockValidation(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
