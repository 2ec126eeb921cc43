//! Protocol and node constants

use crate::types::{Hash, Natural};

/// Fixed reward granted to the issuer of every non-genesis block
pub const COINBASE_REWARD: Natural = 50;

/// prev_hash of the genesis block
pub const ZERO_HASH: Hash = [0u8; 32];

/// Issuer name and note of the genesis block
pub const GENESIS_ISSUER: &str = "genesis";
pub const GENESIS_NOTE: &str = "genesis";

/// Default active slot coefficient f in (0, 1]
pub const DEFAULT_ACTIVE_SLOT_COEFF: f64 = 0.5;

/// Fixed-point scale applied to f * stake / total before the 256-bit multiply
pub const THRESHOLD_SCALE: u64 = 1_000_000;

/// Maximum number of mempool transactions packed into a forged block
pub const MAX_BLOCK_TXS: usize = 10;

/// Slot duration in milliseconds
pub const DEFAULT_SLOT_MS: u64 = 2_000;

/// Stake announced by a node when none is configured
pub const DEFAULT_STAKE: Natural = 500;

/// Gossip listen port when none is configured
pub const DEFAULT_PORT: u16 = 4001;

/// HTTP port defaults to the gossip port plus this offset
pub const HTTP_PORT_OFFSET: u16 = 1000;

/// Non-leader slots announce tip and hello every this many slots
pub const TIP_ANNOUNCE_INTERVAL: Natural = 5;

/// Backfill requests start this many blocks below the local tip
pub const BACKFILL_WINDOW: Natural = 10;

/// Peers silent for this many slots stop counting toward total stake
pub const DEFAULT_PEER_TTL_SLOTS: Natural = 30;

/// Delay between outbound dial attempts
pub const PEER_RECONNECT_MS: u64 = 2_000;
