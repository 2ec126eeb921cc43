//! Peer gossip messages
//!
//! Each message travels as one JSON object per line, tagged by `type`.

use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PeerMessage {
    Hello(HelloMessage),
    Tip(TipMessage),
    GetBlocksFrom(GetBlocksFromMessage),
    Blocks(BlocksMessage),
    Block(BlockMessage),
    Tx(TxMessage),
    Mempool(MempoolMessage),
}

/// Identity and stake announcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloMessage {
    pub name: String,
    pub port: u16,
    #[serde(default)]
    pub stake: Natural,
    #[serde(default, with = "hex_serde::bytes")]
    pub pubkey: ByteString,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipMessage {
    pub height: Natural,
    #[serde(with = "hex_serde::hash")]
    pub hash: Hash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetBlocksFromMessage {
    pub from: Natural,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlocksMessage {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMessage {
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxMessage {
    pub tx: Transaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MempoolMessage {
    pub txs: Vec<Transaction>,
}

impl PeerMessage {
    /// Encode as a single newline-terminated line
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    pub fn from_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim_end())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PeerMessage::Hello(_) => "hello",
            PeerMessage::Tip(_) => "tip",
            PeerMessage::GetBlocksFrom(_) => "getBlocksFrom",
            PeerMessage::Blocks(_) => "blocks",
            PeerMessage::Block(_) => "block",
            PeerMessage::Tx(_) => "tx",
            PeerMessage::Mempool(_) => "mempool",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::genesis;

    #[test]
    fn test_type_tags() {
        let tip = PeerMessage::Tip(TipMessage {
            height: 3,
            hash: [0xab; 32],
        });
        let json = serde_json::to_value(&tip).unwrap();
        assert_eq!(json["type"], "tip");
        assert_eq!(json["height"], 3);

        let get = PeerMessage::GetBlocksFrom(GetBlocksFromMessage { from: 0 });
        let json = serde_json::to_value(&get).unwrap();
        assert_eq!(json["type"], "getBlocksFrom");
        assert_eq!(get.kind(), "getBlocksFrom");
    }

    #[test]
    fn test_line_roundtrip() {
        let message = PeerMessage::Blocks(BlocksMessage {
            blocks: vec![genesis()],
        });
        let line = message.to_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(PeerMessage::from_line(&line).unwrap(), message);
    }

    #[test]
    fn test_hello_defaults() {
        let message = PeerMessage::from_line(r#"{"type":"hello","name":"N4002","port":4002}"#).unwrap();
        match message {
            PeerMessage::Hello(hello) => {
                assert_eq!(hello.name, "N4002");
                assert_eq!(hello.stake, 0);
                assert!(hello.pubkey.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(PeerMessage::from_line(r#"{"type":"gossip"}"#).is_err());
        assert!(PeerMessage::from_line("not json").is_err());
    }
}
