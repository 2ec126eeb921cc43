//! Hashing, addresses and ECDSA keys

use crate::error::{ConsensusError, Result};
use crate::types::*;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA256: 𝕊 → ℋ
pub fn sha256(data: &[u8]) -> Hash {
    let digest = Sha256::digest(data);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&digest);
    hash
}

/// Address: PK → hex(SHA256(pk))
pub fn address_from_pubkey(pubkey: &[u8]) -> Address {
    hex::encode(sha256(pubkey))
}

/// Whether `bytes` is a valid SEC1 secp256k1 public key
pub fn is_valid_pubkey(bytes: &[u8]) -> bool {
    PublicKey::from_slice(bytes).is_ok()
}

/// Verify a DER-encoded ECDSA signature over a 32-byte digest.
///
/// Malformed keys or signatures verify as false.
pub fn verify_signature(pubkey: &[u8], digest: &Hash, signature: &[u8]) -> bool {
    let pubkey = match PublicKey::from_slice(pubkey) {
        Ok(pk) => pk,
        Err(_) => return false,
    };
    let signature = match Signature::from_der(signature) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    let message = Message::from_digest(*digest);
    Secp256k1::verification_only()
        .verify_ecdsa(&message, &signature, &pubkey)
        .is_ok()
}

/// secp256k1 key pair used for input signatures and slot proofs
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret, public) = secp.generate_keypair(&mut secp256k1::rand::thread_rng());
        KeyPair { secret, public }
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| ConsensusError::InvalidKey(e.to_string()))?;
        let public = PublicKey::from_secret_key(&Secp256k1::signing_only(), &secret);
        Ok(KeyPair { secret, public })
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.secret_bytes()
    }

    /// Compressed SEC1 encoding (33 bytes)
    pub fn public_bytes(&self) -> ByteString {
        self.public.serialize().to_vec()
    }

    pub fn address(&self) -> Address {
        address_from_pubkey(&self.public.serialize())
    }

    /// Sign a digest. RFC 6979 nonces make the output deterministic.
    pub fn sign(&self, digest: &Hash) -> ByteString {
        let message = Message::from_digest(*digest);
        Secp256k1::signing_only()
            .sign_ecdsa(&message, &self.secret)
            .serialize_der()
            .to_vec()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(self.public.serialize()))
            .finish_non_exhaustive()
    }
}
