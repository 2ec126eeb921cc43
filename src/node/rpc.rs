//! JSON-RPC request decoding and response shapes

use crate::types::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Body of `POST /rpc` before method dispatch
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Decoded RPC call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcCall {
    Ping,
    Whoami,
    GetTip,
    GetMempool,
    GetUtxo { address: Address },
    GetBlock { height: Integer },
    SubmitTx { tx: Transaction },
    MakeAddress { pubkey: ByteString },
    GetChain { from: Natural },
    GetPeers,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    #[error("method not found")]
    MethodNotFound,

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("bad height")]
    BadHeight,

    #[error("{0}")]
    Rejected(String),

    #[error("node unavailable")]
    Unavailable,
}

#[derive(Deserialize)]
struct AddressParams {
    address: Address,
}

#[derive(Deserialize)]
struct HeightParams {
    #[serde(default)]
    height: Integer,
}

#[derive(Deserialize)]
struct SubmitTxParams {
    tx: Transaction,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MakeAddressParams {
    pubkey_pem: String,
}

#[derive(Deserialize)]
struct FromParams {
    #[serde(default)]
    from: Natural,
}

fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T, RpcError> {
    let params = match params {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(params).map_err(|e| RpcError::InvalidParams(e.to_string()))
}

impl RpcCall {
    pub fn decode(method: &str, params: &Value) -> Result<RpcCall, RpcError> {
        let call = match method {
            "ping" => RpcCall::Ping,
            "whoami" => RpcCall::Whoami,
            "getTip" => RpcCall::GetTip,
            "getMempool" => RpcCall::GetMempool,
            "getUTXO" => {
                let AddressParams { address } = parse_params(params)?;
                RpcCall::GetUtxo { address }
            }
            "getBlock" => {
                let HeightParams { height } = parse_params(params)?;
                RpcCall::GetBlock { height }
            }
            "submitTx" => {
                let SubmitTxParams { tx } = parse_params(params)?;
                RpcCall::SubmitTx { tx }
            }
            "makeAddress" => {
                let MakeAddressParams { pubkey_pem } = parse_params(params)?;
                let pubkey = hex::decode(pubkey_pem.trim())
                    .map_err(|e| RpcError::InvalidParams(format!("pubkeyPem: {}", e)))?;
                RpcCall::MakeAddress { pubkey }
            }
            "getChain" => {
                let FromParams { from } = parse_params(params)?;
                RpcCall::GetChain { from }
            }
            "getPeers" => RpcCall::GetPeers,
            _ => return Err(RpcError::MethodNotFound),
        };
        Ok(call)
    }
}

impl RawRequest {
    pub fn call(&self) -> Result<RpcCall, RpcError> {
        RpcCall::decode(&self.method, &self.params)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WhoamiInfo {
    pub name: String,
    pub address: Address,
    pub stake: Natural,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TipInfo {
    pub height: Natural,
    #[serde(with = "hex_serde::hash")]
    pub hash: Hash,
    pub slot: Natural,
    pub issuer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MempoolInfo {
    pub size: usize,
    pub txs: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UtxoEntry {
    /// `<txid-hex>:<index>`
    pub outpoint: String,
    pub amount: Natural,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UtxoList {
    pub utxos: Vec<UtxoEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitReceipt {
    #[serde(with = "hex_serde::hash")]
    pub txid: Hash,
    pub fee: Natural,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressInfo {
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerSummary {
    pub name: String,
    pub stake: Natural,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeersInfo {
    #[serde(rename = "self")]
    pub local: PeerSummary,
    pub peers: Vec<PeerSummary>,
}

/// Successful RPC result, serialized without a wrapper
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RpcResult {
    Text(String),
    Whoami(WhoamiInfo),
    Tip(TipInfo),
    Mempool(MempoolInfo),
    Utxos(UtxoList),
    Block(Block),
    Submitted(SubmitReceipt),
    Address(AddressInfo),
    Chain(Vec<Block>),
    Peers(PeersInfo),
}

/// `{jsonrpc:"2.0", id, result?, error?}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RpcResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RpcResponse {
    pub fn new(id: Value, outcome: Result<RpcResult, RpcError>) -> Self {
        let (result, error) = match outcome {
            Ok(result) => (Some(result), None),
            Err(err) => (None, Some(err.to_string())),
        };
        RpcResponse {
            jsonrpc: "2.0",
            id,
            result,
            error,
        }
    }
}
