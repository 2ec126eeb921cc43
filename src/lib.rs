//! # Ouro Consensus
//!
//! Consensus and ledger engine for a minimal proof-of-stake chain, plus the
//! node that runs it.
//!
//! Block producers are elected per slot by a stake-weighted lottery over a
//! deterministic signature score. Blocks carry UTXO transactions signed with
//! secp256k1 keys; nodes follow the longest chain that links from genesis.
//!
//! ## Layout
//!
//! - `serialize`, `block`: canonical encoding and content-addressed hashing
//! - `transaction`: transaction ids, signing and validation
//! - `ledger`: UTXO set replay and block connection
//! - `mempool`: pending transactions over a double-spend-aware overlay
//! - `lottery`, `consensus`: leader election, forging, block checks, fork choice
//! - `node`: the single-owner node state machine and its tokio service
//!
//! Everything outside `node` is pure: functions take state by reference or
//! value and return new state or an error, never mutating on rejection.
//!
//! ## Usage
//!
//! ```rust
//! use ouro_consensus::block::genesis;
//! use ouro_consensus::consensus::{ConsensusEngine, ForgeRequest};
//! use ouro_consensus::crypto::KeyPair;
//! use ouro_consensus::ledger::{balance_of, rebuild_utxo_set};
//! use ouro_consensus::{AddressBook, ValidationResult, COINBASE_REWARD};
//!
//! let engine = ConsensusEngine::default();
//! let keys = KeyPair::generate();
//! let tip = genesis();
//! let block = engine.forge_block(ForgeRequest {
//!     tip: &tip,
//!     slot: 1,
//!     keys: &keys,
//!     issuer: "N4001".to_string(),
//!     note: String::new(),
//!     txs: vec![],
//!     timestamp: 0,
//! });
//! assert_eq!(engine.check_block(&block, &tip), ValidationResult::Valid);
//!
//! let chain = vec![tip, block];
//! let utxo_set = rebuild_utxo_set(&chain, &mut AddressBook::new()).unwrap();
//! assert_eq!(balance_of(&utxo_set, &keys.address()), COINBASE_REWARD);
//! ```

pub mod types;
pub mod constants;
pub mod serialize;
pub mod crypto;
pub mod block;
pub mod transaction;
pub mod ledger;
pub mod mempool;
pub mod lottery;
pub mod consensus;
pub mod node;
pub mod error;

// Re-export commonly used types
pub use types::*;
pub use constants::*;
pub use error::{ConsensusError, Result};
pub use consensus::{ConsensusEngine, ConsensusParams};
pub use node::NodeState;
