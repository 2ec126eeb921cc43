//! Core ledger and chain types for stake-based consensus

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Hash type: 256-bit SHA-256 digest
pub type Hash = [u8; 32];

/// Byte string type
pub type ByteString = Vec<u8>;

/// Natural number type
pub type Natural = u64;

/// Integer type
pub type Integer = i64;

/// Address: hex(SHA-256(public key encoding))
pub type Address = String;

/// OutPoint: (txid, output index)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    #[serde(with = "hex_serde::hash")]
    pub txid: Hash,
    pub index: u32,
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", hex::encode(self.txid), self.index)
    }
}

/// Transaction input spending a previous output.
///
/// `pubkey` may be omitted when the spending key is already in the address book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInput {
    #[serde(with = "hex_serde::hash")]
    pub prev_tx_id: Hash,
    pub prev_index: u32,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "hex_serde::opt_bytes"
    )]
    pub pubkey: Option<ByteString>,
    #[serde(with = "hex_serde::bytes")]
    pub signature: ByteString,
}

impl TransactionInput {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            txid: self.prev_tx_id,
            index: self.prev_index,
        }
    }
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub address: Address,
    pub amount: Natural,
}

/// Transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub coinbase: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Block payload: a free-form note plus the included transactions
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockPayload {
    #[serde(default)]
    pub txs: Vec<Transaction>,
    #[serde(default)]
    pub note: String,
}

/// Block
///
/// `hash` covers every other field; `proof` is the issuer's signature over
/// `(slot, prev_hash)` and doubles as the leader-lottery randomness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: Natural,
    pub slot: Natural,
    #[serde(with = "hex_serde::hash")]
    pub prev_hash: Hash,
    pub payload: BlockPayload,
    pub issuer: String,
    #[serde(with = "hex_serde::bytes")]
    pub proof: ByteString,
    #[serde(with = "hex_serde::bytes")]
    pub pubkey: ByteString,
    pub timestamp: Integer,
    #[serde(with = "hex_serde::hash")]
    pub hash: Hash,
}

/// UTXO: spendable output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UTXO {
    pub address: Address,
    pub amount: Natural,
}

/// UTXO Set: OutPoint → UTXO
pub type UtxoSet = HashMap<OutPoint, UTXO>;

/// Address book: address → public key encoding
pub type AddressBook = HashMap<Address, ByteString>;

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(String),
}

/// Hex (de)serializers for byte fields on the wire.
pub mod hex_serde {
    pub mod hash {
        use crate::types::Hash;
        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &Hash, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&hex::encode(value))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Hash, D::Error> {
            let s = String::deserialize(deserializer)?;
            let bytes = hex::decode(&s).map_err(D::Error::custom)?;
            Hash::try_from(bytes.as_slice())
                .map_err(|_| D::Error::custom(format!("expected 32-byte hash, got {} bytes", bytes.len())))
        }
    }

    pub mod bytes {
        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&hex::encode(value))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
            let s = String::deserialize(deserializer)?;
            hex::decode(&s).map_err(D::Error::custom)
        }
    }

    pub mod opt_bytes {
        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(s) if !s.is_empty() => hex::decode(&s).map(Some).map_err(D::Error::custom),
                _ => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outpoint_display() {
        let outpoint = OutPoint { txid: [0xab; 32], index: 3 };
        let rendered = outpoint.to_string();
        assert!(rendered.starts_with("abab"));
        assert!(rendered.ends_with(":3"));
        assert_eq!(rendered.len(), 64 + 2);
    }

    #[test]
    fn test_input_wire_names() {
        let input = TransactionInput {
            prev_tx_id: [1; 32],
            prev_index: 2,
            pubkey: None,
            signature: vec![0xde, 0xad],
        };
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["prevIndex"], 2);
        assert_eq!(json["signature"], "dead");
        assert!(json.get("pubkey").is_none());
    }

    #[test]
    fn test_transaction_optional_fields_default() {
        let json = r#"{"inputs":[],"outputs":[{"address":"aa","amount":5}]}"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert!(!tx.coinbase);
        assert_eq!(tx.note, None);
        assert_eq!(tx.outputs[0].amount, 5);
    }

    #[test]
    fn test_hash_rejects_wrong_length() {
        let json = r#"{"txid":"abcd","index":0}"#;
        assert!(serde_json::from_str::<OutPoint>(json).is_err());
    }

    #[test]
    fn test_block_wire_roundtrip_keeps_fields() {
        let block = Block {
            index: 4,
            slot: 9,
            prev_hash: [7; 32],
            payload: BlockPayload { txs: vec![], note: "hi".to_string() },
            issuer: "N4001".to_string(),
            proof: vec![1, 2, 3],
            pubkey: vec![2; 33],
            timestamp: 1_700_000_000_000,
            hash: [9; 32],
        };
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains("\"prevHash\""));
        let decoded: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, block);
    }
}
