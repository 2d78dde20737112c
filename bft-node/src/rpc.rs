//! Administrative HTTP surface
//!
//! JSON-RPC style GET endpoints compatible with the usual
//! `abci_query?path=..&data=..` and `broadcast_tx_commit?tx=..` calls.
//! String parameters may be wrapped in double quotes; `0x` marks hex.

use crate::engine::NodeInfo;
use crate::local::{EngineState, MempoolTx};
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bft_app::{Application, InfoResponse, RequestQuery, TxResponse};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;

/// How long `broadcast_tx_commit` waits for the block
pub const BROADCAST_TIMEOUT: Duration = Duration::from_secs(10);

const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse<T> {
    pub jsonrpc: String,
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl<T> RpcResponse<T> {
    fn ok(result: T) -> Json<Self> {
        Json(Self {
            jsonrpc: "2.0".to_string(),
            id: -1,
            result: Some(result),
            error: None,
        })
    }

    fn err(code: i32, message: &str, data: impl Into<String>) -> Json<Self> {
        Json(Self {
            jsonrpc: "2.0".to_string(),
            id: -1,
            result: None,
            error: Some(RpcError {
                code,
                message: message.to_string(),
                data: data.into(),
            }),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbciQueryResponse {
    pub code: u32,
    pub log: String,
    /// Base64
    pub value: String,
    pub height: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbciQueryResult {
    pub response: AbciQueryResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastTxCommitResult {
    pub check_tx: TxResponse,
    /// Absent when `check_tx` rejected the transaction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deliver_tx: Option<TxResponse>,
    pub hash: String,
    pub height: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbciInfoResult {
    pub response: InfoResponse,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResult {
    pub node_info: NodeInfo,
    pub latest_block_height: String,
}

#[derive(Debug, Deserialize)]
pub struct AbciQueryParams {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastParams {
    pub tx: String,
}

pub fn router<A: Application>(state: Arc<EngineState<A>>) -> Router {
    Router::new()
        .route("/abci_query", get(abci_query::<A>))
        .route("/abci_info", get(abci_info::<A>))
        .route("/broadcast_tx_commit", get(broadcast_tx_commit::<A>))
        .route("/status", get(status::<A>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Strip one pair of surrounding quotes
fn unquote(param: &str) -> &str {
    param
        .strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
        .unwrap_or(param)
}

/// Quoted or bare text is taken verbatim; `0x` prefixed input is hex
pub fn decode_param(param: &str) -> Result<Bytes, String> {
    let unquoted = unquote(param);
    if unquoted.len() == param.len() {
        if let Some(hex_part) = param.strip_prefix("0x") {
            return hex::decode(hex_part)
                .map(Bytes::from)
                .map_err(|e| format!("invalid hex '{}': {}", param, e));
        }
    }
    Ok(Bytes::copy_from_slice(unquoted.as_bytes()))
}

async fn abci_query<A: Application>(
    State(state): State<Arc<EngineState<A>>>,
    Query(params): Query<AbciQueryParams>,
) -> Json<RpcResponse<AbciQueryResult>> {
    let data = match decode_param(&params.data) {
        Ok(data) => data,
        Err(e) => return RpcResponse::err(INVALID_PARAMS, "Invalid params", e),
    };

    let response = state.query(RequestQuery::new(unquote(&params.path), data));
    RpcResponse::ok(AbciQueryResult {
        response: AbciQueryResponse {
            code: response.code,
            log: response.log,
            value: BASE64.encode(&response.value),
            height: state.height().to_string(),
        },
    })
}

async fn abci_info<A: Application>(
    State(state): State<Arc<EngineState<A>>>,
) -> Json<RpcResponse<AbciInfoResult>> {
    RpcResponse::ok(AbciInfoResult {
        response: state.info(),
    })
}

async fn status<A: Application>(
    State(state): State<Arc<EngineState<A>>>,
) -> Json<RpcResponse<StatusResult>> {
    RpcResponse::ok(StatusResult {
        node_info: state.node_info.clone(),
        latest_block_height: state.height().to_string(),
    })
}

async fn broadcast_tx_commit<A: Application>(
    State(state): State<Arc<EngineState<A>>>,
    Query(params): Query<BroadcastParams>,
) -> Json<RpcResponse<BroadcastTxCommitResult>> {
    let tx = match decode_param(&params.tx) {
        Ok(tx) => tx,
        Err(e) => return RpcResponse::err(INVALID_PARAMS, "Invalid params", e),
    };
    let hash = hex::encode_upper(Sha256::digest(&tx));

    let check_tx = state.check_tx(&tx);
    if !check_tx.is_ok() {
        return RpcResponse::ok(BroadcastTxCommitResult {
            check_tx,
            deliver_tx: None,
            hash,
            height: "0".to_string(),
        });
    }

    let (reply, outcome) = oneshot::channel();
    if state.mempool.send(MempoolTx { tx, reply }).await.is_err() {
        return RpcResponse::err(INTERNAL_ERROR, "Internal error", "mempool is closed");
    }

    match tokio::time::timeout(BROADCAST_TIMEOUT, outcome).await {
        Ok(Ok(outcome)) => RpcResponse::ok(BroadcastTxCommitResult {
            check_tx,
            deliver_tx: Some(outcome.response),
            hash,
            height: outcome.height.to_string(),
        }),
        Ok(Err(_)) => RpcResponse::err(INTERNAL_ERROR, "Internal error", "node is shutting down"),
        Err(_) => RpcResponse::err(
            INTERNAL_ERROR,
            "Internal error",
            "timed out waiting for tx to be included in a block",
        ),
    }
}
