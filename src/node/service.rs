//! Async runtime around [`NodeState`]
//!
//! One actor task owns the state and consumes [`NodeEvent`]s. The slot ticker,
//! TCP gossip connections and the HTTP server run in their own tasks and only
//! submit events.

use super::config::NodeConfig;
use super::message::PeerMessage;
use super::rpc::{RawRequest, RpcCall, RpcError, RpcResponse, RpcResult};
use super::storage::NodeStore;
use super::{NodeState, Outbound};
use crate::constants::PEER_RECONNECT_MS;
use anyhow::Context;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

pub type ConnectionId = u64;

type RpcReply = std::result::Result<RpcResult, RpcError>;

pub enum NodeEvent {
    Tick,
    PeerConnected {
        id: ConnectionId,
        sender: mpsc::UnboundedSender<PeerMessage>,
    },
    PeerDisconnected {
        id: ConnectionId,
    },
    Peer {
        id: ConnectionId,
        message: PeerMessage,
    },
    Rpc {
        call: RpcCall,
        reply: oneshot::Sender<RpcReply>,
    },
}

/// Cloneable entry point for RPC callers
#[derive(Clone)]
pub struct NodeHandle {
    events: mpsc::UnboundedSender<NodeEvent>,
}

impl NodeHandle {
    pub fn new(events: mpsc::UnboundedSender<NodeEvent>) -> Self {
        Self { events }
    }

    pub async fn call(&self, call: RpcCall) -> RpcReply {
        let (reply, response) = oneshot::channel();
        self.events
            .send(NodeEvent::Rpc { call, reply })
            .map_err(|_| RpcError::Unavailable)?;
        response.await.map_err(|_| RpcError::Unavailable)?
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Consume events until every sender is gone
pub async fn run_actor(mut state: NodeState, mut events: mpsc::UnboundedReceiver<NodeEvent>) {
    let mut connections: HashMap<ConnectionId, mpsc::UnboundedSender<PeerMessage>> =
        HashMap::new();

    while let Some(event) = events.recv().await {
        match event {
            NodeEvent::Tick => {
                let effects = state.on_slot(now_ms());
                deliver(&connections, None, effects);
            }
            NodeEvent::PeerConnected { id, sender } => {
                for message in state.greeting() {
                    let _ = sender.send(message);
                }
                connections.insert(id, sender);
            }
            NodeEvent::PeerDisconnected { id } => {
                connections.remove(&id);
            }
            NodeEvent::Peer { id, message } => {
                let kind = message.kind();
                let effects = state.handle_peer_message(message);
                debug!(id, kind, effects = effects.len(), "handled gossip");
                deliver(&connections, Some(id), effects);
            }
            NodeEvent::Rpc { call, reply } => {
                let outcome = state.handle_rpc(call);
                deliver(&connections, None, outcome.effects);
                let _ = reply.send(outcome.result);
            }
        }
    }
}

fn deliver(
    connections: &HashMap<ConnectionId, mpsc::UnboundedSender<PeerMessage>>,
    origin: Option<ConnectionId>,
    effects: Vec<Outbound>,
) {
    for effect in effects {
        match effect {
            Outbound::Broadcast(message) => {
                for sender in connections.values() {
                    let _ = sender.send(message.clone());
                }
            }
            Outbound::Reply(message) => {
                if let Some(sender) = origin.and_then(|id| connections.get(&id)) {
                    let _ = sender.send(message);
                }
            }
        }
    }
}

/// Pump one TCP connection: lines in become events, queued messages go out
async fn serve_connection(
    stream: TcpStream,
    id: ConnectionId,
    events: mpsc::UnboundedSender<NodeEvent>,
) {
    let (reader, mut writer) = stream.into_split();
    let (sender, mut outbox) = mpsc::unbounded_channel::<PeerMessage>();
    if events.send(NodeEvent::PeerConnected { id, sender }).is_err() {
        return;
    }

    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbox.recv().await {
            let line = match message.to_line() {
                Ok(line) => line,
                Err(err) => {
                    warn!(%err, "failed to encode gossip");
                    continue;
                }
            };
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match PeerMessage::from_line(&line) {
                    Ok(message) => {
                        if events.send(NodeEvent::Peer { id, message }).is_err() {
                            break;
                        }
                    }
                    Err(err) => debug!(id, %err, "dropping malformed gossip"),
                }
            }
            Ok(None) => break,
            Err(err) => {
                debug!(id, %err, "peer read failed");
                break;
            }
        }
    }

    let _ = events.send(NodeEvent::PeerDisconnected { id });
    writer_task.abort();
    debug!(id, "peer disconnected");
}

async fn accept_peers(
    listener: TcpListener,
    ids: Arc<AtomicU64>,
    events: mpsc::UnboundedSender<NodeEvent>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let id = ids.fetch_add(1, Ordering::Relaxed);
                debug!(%addr, id, "inbound peer");
                tokio::spawn(serve_connection(stream, id, events.clone()));
            }
            Err(err) => warn!(%err, "gossip accept failed"),
        }
    }
}

/// Keep an outbound connection to `addr`, redialing after failures
async fn dial_peer(addr: String, ids: Arc<AtomicU64>, events: mpsc::UnboundedSender<NodeEvent>) {
    while !events.is_closed() {
        match TcpStream::connect(&addr).await {
            Ok(stream) => {
                let id = ids.fetch_add(1, Ordering::Relaxed);
                info!(peer = %addr, id, "connected to peer");
                serve_connection(stream, id, events.clone()).await;
            }
            Err(err) => debug!(peer = %addr, %err, "dial failed"),
        }
        time::sleep(Duration::from_millis(PEER_RECONNECT_MS)).await;
    }
}

async fn drive_slots(slot_ms: u64, events: mpsc::UnboundedSender<NodeEvent>) {
    let mut ticker = time::interval(Duration::from_millis(slot_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if events.send(NodeEvent::Tick).is_err() {
            break;
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Deserialize)]
struct ChainQuery {
    from: Option<i64>,
}

type HttpError = (StatusCode, Json<ErrorResponse>);

fn http_error(status: StatusCode, error: &str) -> HttpError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

fn to_http_error(err: RpcError) -> HttpError {
    let status = match err {
        RpcError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    };
    http_error(status, &err.to_string())
}

/// `POST /rpc` plus the read-only REST views
pub fn router(node: NodeHandle) -> Router {
    Router::new()
        .route("/rpc", post(rpc))
        .route("/tip", get(tip))
        .route("/chain", get(chain))
        .route("/peers", get(peers))
        .fallback(not_found)
        .with_state(node)
}

async fn rpc(
    State(node): State<NodeHandle>,
    body: Bytes,
) -> std::result::Result<Json<RpcResponse>, HttpError> {
    let raw: RawRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RawRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|_| http_error(StatusCode::BAD_REQUEST, "bad json"))?
    };
    let outcome = match raw.call() {
        Ok(call) => node.call(call).await,
        Err(err) => Err(err),
    };
    Ok(Json(RpcResponse::new(raw.id, outcome)))
}

async fn query(node: &NodeHandle, call: RpcCall) -> std::result::Result<Json<RpcResult>, HttpError> {
    node.call(call).await.map(Json).map_err(to_http_error)
}

async fn tip(State(node): State<NodeHandle>) -> std::result::Result<Json<RpcResult>, HttpError> {
    query(&node, RpcCall::GetTip).await
}

async fn chain(
    State(node): State<NodeHandle>,
    Query(params): Query<ChainQuery>,
) -> std::result::Result<Json<RpcResult>, HttpError> {
    let from = params.from.unwrap_or(0).max(0) as u64;
    query(&node, RpcCall::GetChain { from }).await
}

async fn peers(State(node): State<NodeHandle>) -> std::result::Result<Json<RpcResult>, HttpError> {
    query(&node, RpcCall::GetPeers).await
}

async fn not_found() -> HttpError {
    http_error(StatusCode::NOT_FOUND, "not found")
}

/// Start the node described by `config` and run until a task fails
pub async fn run(config: NodeConfig) -> anyhow::Result<()> {
    config.validate()?;

    let store = NodeStore::open(&config.data_dir, config.port)?;
    let keys = store
        .load_or_generate_keys()
        .context("failed to load node keys")?;
    let persisted = store.load_chain()?;
    let fresh = persisted.is_none();
    let state = NodeState::new(
        config.settings(),
        keys,
        persisted.unwrap_or_default(),
        Some(store.clone()),
    )
    .context("persisted chain is not valid")?;
    if fresh {
        store.save_chain(state.chain())?;
    }

    let gossip = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind gossip port {}", config.port))?;
    let http_port = config.http_port();
    let http = TcpListener::bind(("0.0.0.0", http_port))
        .await
        .with_context(|| format!("failed to bind HTTP port {}", http_port))?;

    info!(
        name = %state.name(),
        address = %state.address(),
        height = state.height(),
        stake = config.stake,
        f = config.active_slot_coeff,
        slot_ms = config.slot_ms,
        peers = ?config.peers,
        "node started"
    );

    let (events, inbox) = mpsc::unbounded_channel();
    let ids = Arc::new(AtomicU64::new(0));
    let node = NodeHandle::new(events.clone());

    let actor = tokio::spawn(run_actor(state, inbox));
    tokio::spawn(accept_peers(gossip, ids.clone(), events.clone()));
    for peer in config.peers.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        tokio::spawn(dial_peer(peer.to_string(), ids.clone(), events.clone()));
    }
    tokio::spawn(drive_slots(config.slot_ms, events));

    info!(port = http_port, "HTTP listening (/rpc, /tip, /chain?from=0, /peers)");
    let server = tokio::spawn(async move { axum::serve(http, router(node)).await });

    tokio::select! {
        res = actor => {
            res.context("node actor panicked")?;
            anyhow::bail!("node actor stopped")
        }
        res = server => {
            res.context("HTTP server panicked")?.context("HTTP server failed")?;
            Ok(())
        }
    }
}
