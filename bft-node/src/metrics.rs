//! Prometheus metrics for the local engine

use crate::{NodeError, NodeResult};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct EngineMetrics {
    registry: Registry,
    pub block_height: IntGauge,
    pub txs_delivered: IntCounter,
    pub txs_rejected: IntCounter,
}

impl EngineMetrics {
    pub fn new() -> NodeResult<Self> {
        let registry = Registry::new();
        let block_height = IntGauge::new("bft_block_height", "Height of the last committed block")
            .map_err(metrics_error)?;
        let txs_delivered = IntCounter::new(
            "bft_txs_delivered_total",
            "Transactions accepted by deliver_tx",
        )
        .map_err(metrics_error)?;
        let txs_rejected = IntCounter::new(
            "bft_txs_rejected_total",
            "Transactions rejected by check_tx or deliver_tx",
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(block_height.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(txs_delivered.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(txs_rejected.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            block_height,
            txs_delivered,
            txs_rejected,
        })
    }

    /// Text exposition format
    pub fn render(&self) -> NodeResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| NodeError::Engine(e.to_string()))
    }
}

fn metrics_error(err: prometheus::Error) -> NodeError {
    NodeError::Engine(format!("Metrics error: {}", err))
}

/// `GET /metrics`
pub fn router(metrics: Arc<EngineMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(serve_metrics))
        .with_state(metrics)
}

async fn serve_metrics(State(metrics): State<Arc<EngineMetrics>>) -> Response {
    match metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
