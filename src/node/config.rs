//! Command-line configuration for `ouro-node`

use crate::consensus::ConsensusParams;
use crate::constants::*;
use crate::types::Natural;
use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "ouro-node", version, about = "Minimal proof-of-stake node")]
pub struct NodeConfig {
    /// Gossip listen port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Node name announced to peers (default N<port>)
    #[arg(long)]
    pub name: Option<String>,

    /// Local stake
    #[arg(long, default_value_t = DEFAULT_STAKE)]
    pub stake: Natural,

    /// Comma-separated peer addresses (host:port)
    #[arg(long, value_delimiter = ',')]
    pub peers: Vec<String>,

    /// Slot duration in milliseconds
    #[arg(long = "slot-ms", alias = "slotMs", default_value_t = DEFAULT_SLOT_MS)]
    pub slot_ms: u64,

    /// Active slot coefficient f in (0, 1]
    #[arg(long = "f", default_value_t = DEFAULT_ACTIVE_SLOT_COEFF)]
    pub active_slot_coeff: f64,

    /// HTTP port for RPC and REST (default port + 1000)
    #[arg(long = "http-port", alias = "httpPort")]
    pub http_port: Option<u16>,

    /// Fixed total stake instead of local plus announced peer stake
    #[arg(long = "total-stake", alias = "totalStake")]
    pub total_stake: Option<Natural>,

    /// Root directory for keys and chain
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Slots after which a silent peer stops counting toward total stake (0 = never)
    #[arg(long, default_value_t = DEFAULT_PEER_TTL_SLOTS)]
    pub peer_ttl_slots: Natural,

    /// Maximum transactions per forged block
    #[arg(long, default_value_t = MAX_BLOCK_TXS)]
    pub max_block_txs: usize,
}

/// Settings the node state machine needs, independent of transport
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSettings {
    pub name: String,
    pub port: u16,
    pub stake: Natural,
    pub total_stake: Option<Natural>,
    pub peer_ttl_slots: Natural,
    pub consensus: ConsensusParams,
}

impl NodeConfig {
    pub fn node_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("N{}", self.port))
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
            .unwrap_or_else(|| self.port.saturating_add(HTTP_PORT_OFFSET))
    }

    pub fn validate(&self) -> Result<()> {
        if self.slot_ms == 0 {
            bail!("--slot-ms must be positive");
        }
        if !(self.active_slot_coeff > 0.0 && self.active_slot_coeff <= 1.0) {
            bail!("--f must be in (0, 1], got {}", self.active_slot_coeff);
        }
        if self.max_block_txs == 0 {
            bail!("--max-block-txs must be positive");
        }
        Ok(())
    }

    pub fn settings(&self) -> NodeSettings {
        NodeSettings {
            name: self.node_name(),
            port: self.port,
            stake: self.stake,
            total_stake: self.total_stake,
            peer_ttl_slots: self.peer_ttl_slots,
            consensus: ConsensusParams {
                active_slot_coeff: self.active_slot_coeff,
                max_block_txs: self.max_block_txs,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::try_parse_from(["ouro-node"]).unwrap();
        assert_eq!(config.port, 4001);
        assert_eq!(config.node_name(), "N4001");
        assert_eq!(config.stake, 500);
        assert_eq!(config.slot_ms, 2000);
        assert_eq!(config.active_slot_coeff, 0.5);
        assert_eq!(config.http_port(), 5001);
        assert!(config.peers.is_empty());
        assert!(config.total_stake.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_and_aliases() {
        let config = NodeConfig::try_parse_from([
            "ouro-node",
            "--port",
            "4002",
            "--name",
            "beta",
            "--peers",
            "127.0.0.1:4001,127.0.0.1:4003",
            "--slotMs",
            "500",
            "--f",
            "0.9",
            "--totalStake",
            "1000",
        ])
        .unwrap();
        assert_eq!(config.node_name(), "beta");
        assert_eq!(config.peers, vec!["127.0.0.1:4001", "127.0.0.1:4003"]);
        assert_eq!(config.slot_ms, 500);
        assert_eq!(config.http_port(), 5002);

        let settings = config.settings();
        assert_eq!(settings.total_stake, Some(1000));
        assert_eq!(settings.consensus.active_slot_coeff, 0.9);
    }

    #[test]
    fn test_validate_rejects_bad_f() {
        let config = NodeConfig::try_parse_from(["ouro-node", "--f", "1.5"]).unwrap();
        assert!(config.validate().is_err());
        let config = NodeConfig::try_parse_from(["ouro-node", "--slot-ms", "0"]).unwrap();
        assert!(config.validate().is_err());
    }
}
