//! HTTP client for a node's administrative RPC

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bft_app::NodeStatus;
use bft_node::rpc::{AbciQueryResult, RpcResponse};
use bft_node::PortFamily;
use reqwest::Client;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct AdminClient {
    http: Client,
    base_url: String,
}

impl AdminClient {
    /// Client for node `index` of the local cluster
    pub fn for_node(index: usize) -> Result<Self> {
        let port = PortFamily::Rpc.port(index)?;
        Self::new(format!("http://127.0.0.1:{}", port))
    }

    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;

        let status = response.status();
        let body = response.text().await.context("failed to read response body")?;
        if !status.is_success() {
            bail!("{} returned {}: {}", url, status, body);
        }
        Ok(body)
    }

    /// Switch the node's behavior; returns the raw response
    pub async fn change_status(&self, status: NodeStatus) -> Result<String> {
        self.get(
            "/abci_query",
            &[
                ("path", quoted("status")),
                ("data", quoted(status.as_str())),
            ],
        )
        .await
    }

    /// Submit a value and wait for its block; returns the raw response
    pub async fn broadcast_tx(&self, value: i64) -> Result<String> {
        self.get("/broadcast_tx_commit", &[("tx", quoted(&value.to_string()))])
            .await
    }

    /// Committed state of the node
    pub async fn query_state(&self) -> Result<String> {
        let body = self
            .get("/abci_query", &[("path", quoted("state"))])
            .await?;
        let response: RpcResponse<AbciQueryResult> =
            serde_json::from_str(&body).context("malformed abci_query response")?;

        if let Some(error) = response.error {
            bail!("{}: {}", error.message, error.data);
        }
        let result = response
            .result
            .ok_or_else(|| anyhow!("abci_query response has no result"))?;
        let value = BASE64
            .decode(result.response.value)
            .context("state value is not base64")?;
        String::from_utf8(value).context("state value is not UTF-8")
    }
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", value)
}
