//! Stake-weighted slot leader lottery
//!
//! A node's slot proof is its ECDSA signature over `(slot, prev_hash)`. The
//! SHA-256 of that proof, read as a 256-bit big-endian integer, is the
//! leader score; the node may forge when the score does not exceed a
//! threshold proportional to its share of total stake.

use crate::constants::*;
use crate::crypto::{sha256, verify_signature, KeyPair};
use crate::serialize::put_u64;
use crate::types::*;
use std::cmp::Ordering;
use std::fmt;

/// 256-bit unsigned integer, little-endian limbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct U256([u64; 4]);

impl U256 {
    pub const MAX: U256 = U256([u64::MAX; 4]);

    pub fn zero() -> Self {
        U256([0; 4])
    }

    pub fn from_u64(value: u64) -> Self {
        U256([value, 0, 0, 0])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&x| x == 0)
    }

    pub fn from_be_bytes(bytes: &[u8; 32]) -> Self {
        let mut words = [0u64; 4];
        for (i, word) in words.iter_mut().enumerate() {
            let start = 32 - (i + 1) * 8;
            let mut chunk = [0u8; 8];
            chunk.copy_from_slice(&bytes[start..start + 8]);
            *word = u64::from_be_bytes(chunk);
        }
        U256(words)
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for (i, word) in self.0.iter().enumerate() {
            let start = 32 - (i + 1) * 8;
            bytes[start..start + 8].copy_from_slice(&word.to_be_bytes());
        }
        bytes
    }

    /// (self / divisor, self % divisor), or None for a zero divisor
    pub fn checked_div_rem_u64(&self, divisor: u64) -> Option<(U256, u64)> {
        if divisor == 0 {
            return None;
        }
        let mut quotient = [0u64; 4];
        let mut rem: u128 = 0;
        for i in (0..4).rev() {
            let acc = (rem << 64) | self.0[i] as u128;
            quotient[i] = (acc / divisor as u128) as u64;
            rem = acc % divisor as u128;
        }
        Some((U256(quotient), rem as u64))
    }

    pub fn checked_mul_u64(&self, factor: u64) -> Option<U256> {
        let mut result = [0u64; 4];
        let mut carry: u128 = 0;
        for (i, limb) in self.0.iter().enumerate() {
            let acc = *limb as u128 * factor as u128 + carry;
            result[i] = acc as u64;
            carry = acc >> 64;
        }
        (carry == 0).then_some(U256(result))
    }

    pub fn checked_add(&self, other: &U256) -> Option<U256> {
        let mut result = [0u64; 4];
        let mut carry = false;
        for (i, slot) in result.iter_mut().enumerate() {
            let (sum, c1) = self.0[i].overflowing_add(other.0[i]);
            let (sum, c2) = sum.overflowing_add(carry as u64);
            *slot = sum;
            carry = c1 || c2;
        }
        (!carry).then_some(U256(result))
    }
}

impl PartialOrd for U256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for U256 {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().rev().zip(other.0.iter().rev()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_be_bytes()))
    }
}

/// Digest signed as the slot proof: SHA256(slot ‖ prev_hash)
pub fn slot_digest(slot: Natural, prev_hash: &Hash) -> Hash {
    let mut preimage = Vec::with_capacity(8 + 32);
    put_u64(&mut preimage, slot);
    preimage.extend_from_slice(prev_hash);
    sha256(&preimage)
}

/// SlotProof: 𝒦 × ℕ × ℋ → 𝕊
pub fn slot_proof(keys: &KeyPair, slot: Natural, prev_hash: &Hash) -> ByteString {
    keys.sign(&slot_digest(slot, prev_hash))
}

pub fn verify_slot_proof(pubkey: &[u8], slot: Natural, prev_hash: &Hash, proof: &[u8]) -> bool {
    verify_signature(pubkey, &slot_digest(slot, prev_hash), proof)
}

/// LeaderScore: 𝕊 → [0, 2^256)
pub fn leader_score(proof: &[u8]) -> U256 {
    U256::from_be_bytes(&sha256(proof))
}

/// Threshold: ℕ × ℕ × ℝ → [0, 2^256)
///
/// threshold = ⌊clamp(f, 0, 1) · (stake / total) · 10⁶⌋ · (2^256 − 1) / 10⁶
///
/// 1. total = 0 → 0
/// 2. the scaled factor saturates at 10⁶, so stake ≥ total always wins
/// 3. the 256-bit product is exact: q·s + ⌊r·s / 10⁶⌋ for (q, r) = divmod(MAX, 10⁶)
pub fn threshold_for(stake: Natural, total: Natural, f: f64) -> U256 {
    if total == 0 {
        return U256::zero();
    }

    // NaN collapses to 0 through max()
    let f = f.max(0.0).min(1.0);
    // f · (stake / total), in that order; rounding decides slot wins
    let ratio = f * (stake as f64 / total as f64);
    let scaled = (ratio * THRESHOLD_SCALE as f64).floor();
    let scaled = if scaled >= THRESHOLD_SCALE as f64 {
        THRESHOLD_SCALE
    } else if scaled > 0.0 {
        scaled as u64
    } else {
        0
    };

    let Some((quotient, remainder)) = U256::MAX.checked_div_rem_u64(THRESHOLD_SCALE) else {
        return U256::zero();
    };
    let high = quotient.checked_mul_u64(scaled).unwrap_or(U256::MAX);
    let low = U256::from_u64(((remainder as u128 * scaled as u128) / THRESHOLD_SCALE as u128) as u64);
    high.checked_add(&low).unwrap_or(U256::MAX)
}

/// Lottery outcome for one slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eligibility {
    pub eligible: bool,
    pub score: U256,
    pub threshold: U256,
}

/// IsEligible: eligible ⟺ LeaderScore(proof) ≤ Threshold(stake, total, f)
pub fn is_eligible(proof: &[u8], stake: Natural, total: Natural, f: f64) -> Eligibility {
    let score = leader_score(proof);
    let threshold = threshold_for(stake, total, f);
    Eligibility {
        eligible: score <= threshold,
        score,
        threshold,
    }
}
