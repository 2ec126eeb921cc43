//! Block hashing and the genesis block

use crate::constants::*;
use crate::crypto::sha256;
use crate::serialize::serialize_block;
use crate::types::*;

/// BlockHash: ℬ → ℋ
///
/// SHA256 over every field except `hash` itself.
pub fn block_hash(block: &Block) -> Hash {
    sha256(&serialize_block(block))
}

/// Set `block.hash` from its contents
pub fn seal(mut block: Block) -> Block {
    block.hash = block_hash(&block);
    block
}

/// Genesis block shared by every node.
///
/// Index 0, slot 0, zero prev_hash, no proof or key, timestamp 0.
pub fn genesis() -> Block {
    seal(Block {
        index: 0,
        slot: 0,
        prev_hash: ZERO_HASH,
        payload: BlockPayload {
            txs: Vec::new(),
            note: GENESIS_NOTE.to_string(),
        },
        issuer: GENESIS_ISSUER.to_string(),
        proof: Vec::new(),
        pubkey: Vec::new(),
        timestamp: 0,
        hash: ZERO_HASH,
    })
}

/// Whether `block` is the canonical genesis block
pub fn is_genesis(block: &Block) -> bool {
    *block == genesis()
}
