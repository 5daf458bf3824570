// blockfill/core/rpc/src/client.rs

use crate::types::{parse_height, HeightMethod, RpcRequest, RpcResponse, METHOD_GET_BLOCK};
use crate::{BlockPayload, BlockSource, Height, RpcError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcClientConfig {
    /// Node endpoint, e.g. `http://127.0.0.1:8332`
    pub url: String,

    /// Whole-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Method used to read the node's current height
    #[serde(default)]
    pub height_method: HeightMethod,
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8332".to_string(),
            request_timeout_secs: default_request_timeout(),
            height_method: HeightMethod::default(),
        }
    }
}

/// JSON-RPC 2.0 client for the remote node
pub struct JsonRpcClient {
    url: String,
    client: Client,
    height_method: HeightMethod,
    request_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(config: &RpcClientConfig) -> Result<Self, RpcError> {
        let url = config.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(RpcError::InvalidEndpoint(config.url.clone()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| RpcError::InvalidEndpoint(e.to_string()))?;

        Ok(Self {
            url: url.to_string(),
            client,
            height_method: config.height_method,
            request_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Make RPC call
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = RpcRequest::new(method, params, id);
        trace!(method, id, "RPC request");

        let response = self.client.post(&self.url).json(&request).send().await?;

        // Nodes commonly put the JSON-RPC error envelope in a 4xx/5xx body,
        // so the status code alone is not conclusive.
        let status = response.status();
        let body = response.bytes().await?;
        let envelope: RpcResponse = serde_json::from_slice(&body).map_err(|e| {
            if status.is_success() {
                RpcError::Decode(e.to_string())
            } else {
                RpcError::Transport(format!("HTTP {}", status))
            }
        })?;

        envelope.into_result()
    }
}

#[async_trait]
impl BlockSource for JsonRpcClient {
    async fn latest_height(&self) -> Result<Height, RpcError> {
        let result = self.call(self.height_method.as_str(), json!({})).await?;
        let height = parse_height(&result)?;
        debug!(height, method = self.height_method.as_str(), "Remote height");
        Ok(height)
    }

    async fn fetch_block(&self, height: Height) -> Result<BlockPayload, RpcError> {
        let result = self
            .call(METHOD_GET_BLOCK, json!({ "height": height }))
            .await?;
        let bytes = serde_json::to_vec(&result).map_err(|e| RpcError::Decode(e.to_string()))?;
        Ok(BlockPayload::from(bytes))
    }
}
