//! Node coordinator
//!
//! [`NodeState`] owns every piece of mutable node state. Its handlers are
//! synchronous and transport-free: they return [`Outbound`] effects that the
//! service layer delivers to peers.

pub mod config;
pub mod message;
pub mod peers;
pub mod rpc;
pub mod service;
pub mod storage;

use crate::block::genesis;
use crate::consensus::{ConsensusEngine, ForgeRequest};
use crate::constants::*;
use crate::crypto::{address_from_pubkey, is_valid_pubkey, KeyPair};
use crate::error::{ConsensusError, Result};
use crate::ledger::{apply_block, rebuild_utxo_set, utxos_for_address};
use crate::transaction::input_keys;
use crate::mempool::{Admission, Mempool};
use crate::types::*;
use config::NodeSettings;
use message::*;
use peers::{PeerInfo, PeerTable};
use rpc::*;
use storage::NodeStore;
use tracing::{debug, info, warn};

/// Side effect of handling an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send to every connected peer
    Broadcast(PeerMessage),
    /// Send to the peer the triggering message came from
    Reply(PeerMessage),
}

/// Result of an RPC call plus the gossip it triggered
#[derive(Debug, Clone, PartialEq)]
pub struct RpcOutcome {
    pub result: std::result::Result<RpcResult, RpcError>,
    pub effects: Vec<Outbound>,
}

pub struct NodeState {
    settings: NodeSettings,
    keys: KeyPair,
    address: Address,
    chain: Vec<Block>,
    utxo_set: UtxoSet,
    mempool: Mempool,
    address_book: AddressBook,
    peers: PeerTable,
    engine: ConsensusEngine,
    slot: Natural,
    /// Slot timer firings handled; the clock for peer freshness
    ticks: Natural,
    store: Option<NodeStore>,
}

impl NodeState {
    /// Build state from a chain, replaying it into a fresh ledger.
    ///
    /// An empty chain starts from genesis. A chain that does not link or
    /// does not replay is rejected.
    pub fn new(
        settings: NodeSettings,
        keys: KeyPair,
        chain: Vec<Block>,
        store: Option<NodeStore>,
    ) -> Result<Self> {
        let chain = if chain.is_empty() { vec![genesis()] } else { chain };
        let engine = ConsensusEngine::new(settings.consensus.clone());
        if !engine.chain_links(&chain) {
            return Err(ConsensusError::BlockValidation(
                "chain does not link from genesis".to_string(),
            ));
        }

        let mut address_book = AddressBook::new();
        let utxo_set = rebuild_utxo_set(&chain, &mut address_book)?;
        let slot = match chain.last() {
            Some(tip) if chain.len() > 1 => tip.slot + 1,
            _ => 1,
        };

        Ok(NodeState {
            address: keys.address(),
            peers: PeerTable::new(settings.peer_ttl_slots),
            settings,
            keys,
            chain,
            utxo_set,
            mempool: Mempool::new(),
            address_book,
            engine,
            slot,
            ticks: 0,
            store,
        })
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn keys(&self) -> &KeyPair {
        &self.keys
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn tip(&self) -> &Block {
        // the chain always holds at least genesis
        &self.chain[self.chain.len() - 1]
    }

    pub fn height(&self) -> Natural {
        self.tip().index
    }

    pub fn slot(&self) -> Natural {
        self.slot
    }

    pub fn utxo_set(&self) -> &UtxoSet {
        &self.utxo_set
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn address_book(&self) -> &AddressBook {
        &self.address_book
    }

    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    /// Override if configured, else local stake plus live peer stake
    pub fn total_stake(&self) -> Natural {
        self.settings
            .total_stake
            .unwrap_or_else(|| self.settings.stake.saturating_add(self.peers.total_stake()))
    }

    pub fn hello_message(&self) -> PeerMessage {
        PeerMessage::Hello(HelloMessage {
            name: self.settings.name.clone(),
            port: self.settings.port,
            stake: self.settings.stake,
            pubkey: self.keys.public_bytes(),
        })
    }

    pub fn tip_message(&self) -> PeerMessage {
        PeerMessage::Tip(TipMessage {
            height: self.height(),
            hash: self.tip().hash,
        })
    }

    /// Messages sent to a peer as soon as a connection opens
    pub fn greeting(&self) -> Vec<PeerMessage> {
        vec![
            self.hello_message(),
            self.tip_message(),
            PeerMessage::Mempool(MempoolMessage {
                txs: self.mempool.transactions().cloned().collect(),
            }),
        ]
    }

    fn backfill_from(&self) -> Natural {
        self.height().saturating_sub(BACKFILL_WINDOW)
    }

    fn persist(&self) {
        if let Some(store) = &self.store {
            if let Err(err) = store.save_chain(&self.chain) {
                warn!(?err, "failed to persist chain");
            }
        }
    }

    /// Keep the slot counter ahead of the tip
    fn advance_slot_past_tip(&mut self) {
        self.slot = self.slot.max(self.tip().slot + 1);
    }

    /// Run one slot of the leader lottery.
    ///
    /// 1. Evict stale peers
    /// 2. If eligible: forge on the tip from the mempool, apply, broadcast the
    ///    new tip and then the block
    /// 3. Every `TIP_ANNOUNCE_INTERVAL` slots announce hello, plus the tip when
    ///    nothing was forged
    /// 4. Advance the slot and the tick
    pub fn on_slot(&mut self, now_ms: Integer) -> Vec<Outbound> {
        let mut effects = Vec::new();

        // 1. Peers
        let evicted = self.peers.evict_stale(self.ticks);
        if !evicted.is_empty() {
            info!(?evicted, slot = self.slot, "evicted silent peers");
        }

        // 2. Lottery
        let slot = self.slot;
        let stake = self.settings.stake;
        let total_stake = self.total_stake();
        let tip = self.tip().clone();
        let (_, eligibility) = self
            .engine
            .eligibility(&self.keys, slot, &tip, stake, total_stake);

        let mut forged = false;
        if eligibility.eligible {
            let txs = self
                .mempool
                .select_for_block(self.engine.params().max_block_txs);
            let block = self.engine.forge_block(ForgeRequest {
                tip: &tip,
                slot,
                keys: &self.keys,
                issuer: self.settings.name.clone(),
                note: format!("Hello from {} at slot {}", self.settings.name, slot),
                txs,
                timestamp: now_ms,
            });
            match self.try_add_block(block.clone()) {
                Ok(announce) => {
                    info!(
                        index = block.index,
                        slot,
                        txs = block.payload.txs.len(),
                        threshold = %eligibility.threshold,
                        "forged block"
                    );
                    effects.extend(announce);
                    effects.push(Outbound::Broadcast(PeerMessage::Block(BlockMessage { block })));
                    forged = true;
                }
                Err(err) => warn!(%err, slot, "forged block rejected locally"),
            }
        }

        // 3. Announce
        if slot % TIP_ANNOUNCE_INTERVAL == 0 {
            if !forged {
                effects.push(Outbound::Broadcast(self.tip_message()));
            }
            effects.push(Outbound::Broadcast(self.hello_message()));
        }

        // 4. Advance
        self.slot += 1;
        self.ticks += 1;
        effects
    }

    /// Validate `block` against the tip, connect it, append and persist.
    ///
    /// On success the mempool is pruned and the new tip announced.
    pub fn try_add_block(&mut self, block: Block) -> Result<Vec<Outbound>> {
        if let ValidationResult::Invalid(reason) = self.engine.check_block(&block, self.tip()) {
            return Err(ConsensusError::BlockValidation(reason));
        }

        let dropped = apply_block(
            &block,
            &mut self.utxo_set,
            &mut self.address_book,
            &mut self.mempool,
        )?;
        if !dropped.is_empty() {
            debug!(count = dropped.len(), "dropped pending transactions invalidated by block");
        }

        info!(index = block.index, slot = block.slot, issuer = %block.issuer, "accepted block");
        self.chain.push(block);
        self.advance_slot_past_tip();
        self.persist();
        Ok(vec![Outbound::Broadcast(self.tip_message())])
    }

    /// Consider a range of remote blocks as a replacement chain.
    ///
    /// A range starting at 0 is a full candidate. A range starting at k > 0
    /// is spliced onto the local blocks `[0, k)` when it links to them;
    /// otherwise the full chain is requested. The candidate is adopted only
    /// when it is strictly longer, links from genesis and replays cleanly.
    pub fn try_adopt(&mut self, blocks: Vec<Block>) -> Vec<Outbound> {
        let Some(first) = blocks.first() else {
            return Vec::new();
        };

        let candidate = if first.index == 0 {
            blocks
        } else {
            let start = first.index as usize;
            let links = start <= self.chain.len() && first.prev_hash == self.chain[start - 1].hash;
            if !links {
                debug!(from = first.index, "block range does not link locally; requesting full chain");
                return vec![Outbound::Reply(PeerMessage::GetBlocksFrom(
                    GetBlocksFromMessage { from: 0 },
                ))];
            }
            let mut candidate = self.chain[..start].to_vec();
            candidate.extend(blocks);
            candidate
        };

        if !self.engine.should_adopt(&candidate, &self.chain) {
            debug!(len = candidate.len(), local = self.chain.len(), "ignoring candidate chain");
            return Vec::new();
        }

        let mut address_book = self.address_book.clone();
        let utxo_set = match rebuild_utxo_set(&candidate, &mut address_book) {
            Ok(utxo_set) => utxo_set,
            Err(err) => {
                debug!(%err, "candidate chain does not replay");
                return Vec::new();
            }
        };

        self.chain = candidate;
        self.utxo_set = utxo_set;
        self.address_book = address_book;
        let dropped = self.mempool.revalidate(&self.utxo_set, &self.address_book);
        self.advance_slot_past_tip();
        self.persist();
        info!(height = self.height(), dropped = dropped.len(), "adopted longer chain");
        vec![Outbound::Broadcast(self.tip_message())]
    }

    /// Admit into the mempool and record the input keys it carried
    fn admit_to_mempool(&mut self, tx: &Transaction) -> Result<Admission> {
        let admission = self
            .mempool
            .admit(tx.clone(), &self.utxo_set, &self.address_book)?;
        if !admission.duplicate {
            for (address, pubkey) in input_keys(tx) {
                self.address_book.insert(address, pubkey.clone());
            }
        }
        Ok(admission)
    }

    /// Admit a transaction; re-gossip only when it is new
    fn admit_transaction(&mut self, tx: Transaction) -> Result<(Admission, Vec<Outbound>)> {
        let admission = self.admit_to_mempool(&tx)?;
        let effects = if admission.duplicate {
            Vec::new()
        } else {
            debug!(txid = %hex::encode(admission.txid), fee = admission.fee, "mempool accepted tx");
            vec![Outbound::Broadcast(PeerMessage::Tx(TxMessage { tx }))]
        };
        Ok((admission, effects))
    }

    pub fn handle_peer_message(&mut self, message: PeerMessage) -> Vec<Outbound> {
        match message {
            PeerMessage::Hello(hello) => {
                if hello.name == self.settings.name {
                    return Vec::new();
                }
                let is_new = self.peers.upsert(PeerInfo {
                    name: hello.name.clone(),
                    port: hello.port,
                    stake: hello.stake,
                    pubkey: hello.pubkey,
                    last_seen_tick: self.ticks,
                });
                if is_new {
                    info!(peer = %hello.name, stake = hello.stake, total_stake = self.total_stake(), "peer joined");
                }
                Vec::new()
            }
            PeerMessage::Tip(tip) => {
                if tip.height > self.height() {
                    vec![Outbound::Reply(PeerMessage::GetBlocksFrom(
                        GetBlocksFromMessage {
                            from: self.backfill_from(),
                        },
                    ))]
                } else {
                    Vec::new()
                }
            }
            PeerMessage::GetBlocksFrom(request) => {
                let from = (request.from as usize).min(self.chain.len());
                vec![Outbound::Reply(PeerMessage::Blocks(BlocksMessage {
                    blocks: self.chain[from..].to_vec(),
                }))]
            }
            PeerMessage::Blocks(blocks) => self.try_adopt(blocks.blocks),
            PeerMessage::Block(BlockMessage { block }) => {
                if block.index > self.height() + 1 {
                    return vec![Outbound::Reply(PeerMessage::GetBlocksFrom(
                        GetBlocksFromMessage {
                            from: self.backfill_from(),
                        },
                    ))];
                }
                match self.try_add_block(block) {
                    Ok(effects) => effects,
                    Err(err) => {
                        debug!(%err, "dropping block");
                        Vec::new()
                    }
                }
            }
            PeerMessage::Tx(TxMessage { tx }) => match self.admit_transaction(tx) {
                Ok((_, effects)) => effects,
                Err(err) => {
                    debug!(%err, "dropping tx");
                    Vec::new()
                }
            },
            PeerMessage::Mempool(MempoolMessage { txs }) => {
                for tx in txs {
                    if let Err(err) = self.admit_to_mempool(&tx) {
                        debug!(%err, "dropping mempool entry");
                    }
                }
                Vec::new()
            }
        }
    }

    fn tip_info(&self) -> TipInfo {
        let tip = self.tip();
        TipInfo {
            height: self.height(),
            hash: tip.hash,
            slot: tip.slot,
            issuer: tip.issuer.clone(),
        }
    }

    pub fn handle_rpc(&mut self, call: RpcCall) -> RpcOutcome {
        let mut effects = Vec::new();
        let result = match call {
            RpcCall::Ping => Ok(RpcResult::Text("pong".to_string())),
            RpcCall::Whoami => Ok(RpcResult::Whoami(WhoamiInfo {
                name: self.settings.name.clone(),
                address: self.address.clone(),
                stake: self.settings.stake,
                port: self.settings.port,
            })),
            RpcCall::GetTip => Ok(RpcResult::Tip(self.tip_info())),
            RpcCall::GetMempool => {
                let txs: Vec<Transaction> = self.mempool.transactions().cloned().collect();
                Ok(RpcResult::Mempool(MempoolInfo {
                    size: txs.len(),
                    txs,
                }))
            }
            RpcCall::GetUtxo { address } => {
                let utxos = utxos_for_address(&self.utxo_set, &address)
                    .into_iter()
                    .map(|(outpoint, amount)| UtxoEntry {
                        outpoint: outpoint.to_string(),
                        amount,
                    })
                    .collect();
                Ok(RpcResult::Utxos(UtxoList { utxos }))
            }
            RpcCall::GetBlock { height } => usize::try_from(height)
                .ok()
                .and_then(|h| self.chain.get(h))
                .cloned()
                .map(RpcResult::Block)
                .ok_or(RpcError::BadHeight),
            RpcCall::SubmitTx { tx } => match self.admit_transaction(tx) {
                Ok((admission, gossip)) => {
                    effects = gossip;
                    Ok(RpcResult::Submitted(SubmitReceipt {
                        txid: admission.txid,
                        fee: admission.fee,
                    }))
                }
                Err(err) => Err(RpcError::Rejected(err.to_string())),
            },
            RpcCall::MakeAddress { pubkey } => {
                if is_valid_pubkey(&pubkey) {
                    let address = address_from_pubkey(&pubkey);
                    self.address_book.insert(address.clone(), pubkey);
                    Ok(RpcResult::Address(AddressInfo { address }))
                } else {
                    Err(RpcError::InvalidParams("pubkeyPem is not a public key".to_string()))
                }
            }
            RpcCall::GetChain { from } => {
                let from = (from as usize).min(self.chain.len());
                Ok(RpcResult::Chain(self.chain[from..].to_vec()))
            }
            RpcCall::GetPeers => Ok(RpcResult::Peers(PeersInfo {
                local: PeerSummary {
                    name: self.settings.name.clone(),
                    stake: self.settings.stake,
                },
                peers: self
                    .peers
                    .list()
                    .into_iter()
                    .map(|peer| PeerSummary {
                        name: peer.name.clone(),
                        stake: peer.stake,
                    })
                    .collect(),
            })),
        };
        RpcOutcome { result, effects }
    }
}
