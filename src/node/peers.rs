//! Peer stake table fed by `hello` gossip

use crate::types::*;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub name: String,
    pub port: u16,
    pub stake: Natural,
    pub pubkey: ByteString,
    /// Local slot tick at which the last `hello` arrived
    pub last_seen_tick: Natural,
}

/// Known peers by name. Entries not refreshed within `ttl_slots` local slot
/// ticks are evicted; a TTL of 0 keeps entries forever.
///
/// Ticks count slot timer firings, so a protocol slot jump after syncing a
/// chain does not age peers.
#[derive(Debug, Clone, Default)]
pub struct PeerTable {
    peers: HashMap<String, PeerInfo>,
    ttl_slots: Natural,
}

impl PeerTable {
    pub fn new(ttl_slots: Natural) -> Self {
        Self {
            peers: HashMap::new(),
            ttl_slots,
        }
    }

    /// Insert or refresh a peer. Returns true when the peer was not known.
    pub fn upsert(&mut self, info: PeerInfo) -> bool {
        self.peers.insert(info.name.clone(), info).is_none()
    }

    /// Drop peers last seen more than `ttl_slots` ticks before `current_tick`
    pub fn evict_stale(&mut self, current_tick: Natural) -> Vec<String> {
        if self.ttl_slots == 0 {
            return Vec::new();
        }
        let ttl = self.ttl_slots;
        let mut evicted: Vec<String> = self
            .peers
            .values()
            .filter(|peer| current_tick.saturating_sub(peer.last_seen_tick) > ttl)
            .map(|peer| peer.name.clone())
            .collect();
        for name in &evicted {
            self.peers.remove(name);
        }
        evicted.sort();
        evicted
    }

    pub fn total_stake(&self) -> Natural {
        self.peers
            .values()
            .fold(0, |acc: Natural, peer| acc.saturating_add(peer.stake))
    }

    pub fn get(&self, name: &str) -> Option<&PeerInfo> {
        self.peers.get(name)
    }

    /// Peers ordered by name
    pub fn list(&self) -> Vec<&PeerInfo> {
        let mut peers: Vec<_> = self.peers.values().collect();
        peers.sort_by(|a, b| a.name.cmp(&b.name));
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(name: &str, stake: Natural, seen: Natural) -> PeerInfo {
        PeerInfo {
            name: name.to_string(),
            port: 4002,
            stake,
            pubkey: vec![],
            last_seen_tick: seen,
        }
    }

    #[test]
    fn test_upsert_replaces_by_name() {
        let mut table = PeerTable::new(30);
        assert!(table.upsert(peer("N4002", 500, 1)));
        assert!(!table.upsert(peer("N4002", 700, 2)));
        assert_eq!(table.len(), 1);
        assert_eq!(table.total_stake(), 700);
        assert_eq!(table.get("N4002").unwrap().last_seen_tick, 2);
    }

    #[test]
    fn test_evict_stale() {
        let mut table = PeerTable::new(30);
        table.upsert(peer("old", 100, 1));
        table.upsert(peer("fresh", 200, 20));
        assert!(table.evict_stale(31).is_empty());
        assert_eq!(table.evict_stale(32), vec!["old".to_string()]);
        assert_eq!(table.total_stake(), 200);
    }

    #[test]
    fn test_zero_ttl_never_evicts() {
        let mut table = PeerTable::new(0);
        table.upsert(peer("a", 1, 0));
        assert!(table.evict_stale(1_000_000).is_empty());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_list_sorted() {
        let mut table = PeerTable::new(30);
        table.upsert(peer("b", 1, 0));
        table.upsert(peer("a", 1, 0));
        let names: Vec<_> = table.list().iter().map(|p| p.name.clone()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
