//! Block forging, block checks and longest-chain fork choice

use crate::block::{block_hash, is_genesis, seal};
use crate::constants::*;
use crate::crypto::KeyPair;
use crate::lottery::{is_eligible, slot_proof, verify_slot_proof, Eligibility};
use crate::types::*;

/// Lottery and block-packing parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusParams {
    /// Active slot coefficient f in (0, 1]
    pub active_slot_coeff: f64,
    pub max_block_txs: usize,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            active_slot_coeff: DEFAULT_ACTIVE_SLOT_COEFF,
            max_block_txs: MAX_BLOCK_TXS,
        }
    }
}

/// Everything needed to forge a block on top of `tip`
#[derive(Debug)]
pub struct ForgeRequest<'a> {
    pub tip: &'a Block,
    pub slot: Natural,
    pub keys: &'a KeyPair,
    pub issuer: String,
    pub note: String,
    pub txs: Vec<Transaction>,
    pub timestamp: Integer,
}

#[derive(Debug, Clone, Default)]
pub struct ConsensusEngine {
    params: ConsensusParams,
}

impl ConsensusEngine {
    pub fn new(params: ConsensusParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    /// Slot proof and lottery outcome for `keys` at `slot` on top of `tip`
    pub fn eligibility(
        &self,
        keys: &KeyPair,
        slot: Natural,
        tip: &Block,
        stake: Natural,
        total_stake: Natural,
    ) -> (ByteString, Eligibility) {
        let proof = slot_proof(keys, slot, &tip.hash);
        let eligibility = is_eligible(&proof, stake, total_stake, self.params.active_slot_coeff);
        (proof, eligibility)
    }

    /// ForgeBlock: 𝒦 × ℬ × ℕ × [𝒯𝒳] → ℬ
    ///
    /// b = (tip.index + 1, slot, tip.hash, (note, txs), issuer,
    ///      SlotProof(k, slot, tip.hash), pk, timestamp, BlockHash(b))
    ///
    /// At most `max_block_txs` transactions are packed.
    pub fn forge_block(&self, request: ForgeRequest<'_>) -> Block {
        let ForgeRequest {
            tip,
            slot,
            keys,
            issuer,
            note,
            mut txs,
            timestamp,
        } = request;
        txs.truncate(self.params.max_block_txs);

        seal(Block {
            index: tip.index + 1,
            slot,
            prev_hash: tip.hash,
            payload: BlockPayload { txs, note },
            issuer,
            proof: slot_proof(keys, slot, &tip.hash),
            pubkey: keys.public_bytes(),
            timestamp,
            hash: ZERO_HASH,
        })
    }

    /// CheckBlock: ℬ × ℬ → {valid, invalid}
    ///
    /// 1. b.index = prev.index + 1
    /// 2. b.prev_hash = prev.hash
    /// 3. b.hash = BlockHash(b)
    /// 4. Verify(b.pubkey, (b.slot, b.prev_hash), b.proof)
    ///
    /// Whether the issuer actually won the slot is not checked: remote stake
    /// is not known reliably.
    pub fn check_block(&self, block: &Block, prev: &Block) -> ValidationResult {
        if block.index != prev.index + 1 {
            return ValidationResult::Invalid("bad index".to_string());
        }
        if block.prev_hash != prev.hash {
            return ValidationResult::Invalid("bad prevHash".to_string());
        }
        if block.hash != block_hash(block) {
            return ValidationResult::Invalid("bad hash".to_string());
        }
        if !verify_slot_proof(&block.pubkey, block.slot, &block.prev_hash, &block.proof) {
            return ValidationResult::Invalid("bad proof signature".to_string());
        }
        ValidationResult::Valid
    }

    /// A chain links when it starts at genesis and every block checks
    /// against its predecessor.
    pub fn chain_links(&self, chain: &[Block]) -> bool {
        match chain.first() {
            Some(first) if is_genesis(first) => chain
                .windows(2)
                .all(|pair| self.check_block(&pair[1], &pair[0]) == ValidationResult::Valid),
            _ => false,
        }
    }

    /// Adopt a candidate only when it links and is strictly longer
    pub fn should_adopt(&self, candidate: &[Block], current: &[Block]) -> bool {
        candidate.len() > current.len() && self.chain_links(candidate)
    }

    /// Longest linking chain; the earliest wins ties
    pub fn choose_best_chain<'a>(&self, chains: &'a [Vec<Block>]) -> Option<&'a Vec<Block>> {
        let mut best: Option<&'a Vec<Block>> = None;
        for chain in chains {
            if !self.chain_links(chain) {
                continue;
            }
            if best.map_or(true, |b| chain.len() > b.len()) {
                best = Some(chain);
            }
        }
        best
    }
}
