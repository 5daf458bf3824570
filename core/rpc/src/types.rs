// blockfill/core/rpc/src/types.rs

use crate::{Height, RpcError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which method the node exposes for its current height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeightMethod {
    #[default]
    GetLatestBlockHeight,
    GetBlockCount,
}

impl HeightMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeightMethod::GetLatestBlockHeight => "getlatestblockheight",
            HeightMethod::GetBlockCount => "getblockcount",
        }
    }
}

pub const METHOD_GET_BLOCK: &str = "getblock";

/// JSON-RPC request
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub params: Value,
    pub id: u64,
}

impl<'a> RpcRequest<'a> {
    pub fn new(method: &'a str, params: Value, id: u64) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
            id,
        }
    }
}

/// JSON-RPC response
#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
    #[serde(default)]
    pub id: Option<Value>,
}

/// JSON-RPC error
#[derive(Debug, Deserialize)]
pub struct RpcErrorObject {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl RpcResponse {
    /// Collapse the envelope: an `error` member wins, a missing or null
    /// `result` is a decode failure.
    pub fn into_result(self) -> Result<Value, RpcError> {
        if let Some(error) = self.error {
            return Err(RpcError::Remote {
                code: error.code,
                message: error.message,
            });
        }
        match self.result {
            Some(Value::Null) | None => Err(RpcError::Decode("response has no result".to_string())),
            Some(result) => Ok(result),
        }
    }
}

/// Heights arrive as JSON numbers, decimal strings, or `0x` hex strings
/// depending on the node.
pub fn parse_height(value: &Value) -> Result<Height, RpcError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| RpcError::Decode(format!("height is not a u64: {}", n))),
        Value::String(s) => {
            let parsed = match s.strip_prefix("0x") {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => s.parse::<u64>(),
            };
            parsed.map_err(|e| RpcError::Decode(format!("invalid height {:?}: {}", s, e)))
        }
        other => Err(RpcError::Decode(format!("unexpected height value: {}", other))),
    }
}
