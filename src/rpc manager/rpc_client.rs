//! JSON-RPC 2.0 client over HTTP
//!
//! The submission endpoints benchmarked here are non-standard methods
//! (`realtime_sendRawTransaction`, `eth_sendRawTransactionSync`,
//! `zks_sendRawTransactionWithDetailedOutput`), so requests are built by hand
//! and the result is interpreted loosely: a string result is the identifier,
//! an object result carries it in `transactionHash`.

use super::rpc_errors::{RpcManagerError, RpcResult};
use super::ChainRpc;
use crate::tx_builder::SignedPayload;
use alloy::primitives::Address;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

/// HTTP JSON-RPC client bound to one RPC URL
#[derive(Debug)]
pub struct JsonRpcClient {
    http: reqwest::Client,
    url: String,
    timeout_ms: u64,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> RpcResult<Self> {
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(RpcManagerError::Configuration(format!(
                "RPC URL must be http(s): '{}'",
                url
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcManagerError::Configuration(e.to_string()))?;

        Ok(Self {
            http,
            url,
            timeout_ms: timeout.as_millis() as u64,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue one JSON-RPC call and return its `result`
    #[instrument(skip(self, params), fields(endpoint = %self.url))]
    pub async fn request(&self, method: &str, params: Value) -> RpcResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcManagerError::from_reqwest(e, &self.url, self.timeout_ms))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RpcManagerError::from_reqwest(e, &self.url, self.timeout_ms))?;

        let envelope: JsonRpcResponse = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) if !status.is_success() => {
                return Err(RpcManagerError::Transport {
                    endpoint: self.url.clone(),
                    message: format!("HTTP {}: {}", status, e),
                })
            }
            Err(e) => {
                return Err(RpcManagerError::InvalidResponse {
                    endpoint: self.url.clone(),
                    message: e.to_string(),
                })
            }
        };

        if let Some(err) = envelope.error {
            return Err(RpcManagerError::RpcResponse {
                endpoint: self.url.clone(),
                message: err.message,
                code: Some(err.code),
            });
        }

        debug!(method = %method, id = id, "RPC call completed");
        envelope
            .result
            .ok_or_else(|| RpcManagerError::InvalidResponse {
                endpoint: self.url.clone(),
                message: format!("{} returned no result", method),
            })
    }

    fn quantity(&self, method: &str, value: &Value) -> RpcResult<u128> {
        parse_quantity(value).ok_or_else(|| RpcManagerError::InvalidResponse {
            endpoint: self.url.clone(),
            message: format!("{} returned a non-quantity result: {}", method, value),
        })
    }
}

#[async_trait]
impl ChainRpc for JsonRpcClient {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn next_sequence(&self, address: Address) -> RpcResult<u64> {
        let value = self
            .request(
                "eth_getTransactionCount",
                json!([format!("{:#x}", address), "pending"]),
            )
            .await?;
        let count = self.quantity("eth_getTransactionCount", &value)?;
        u64::try_from(count).map_err(|_| RpcManagerError::InvalidResponse {
            endpoint: self.url.clone(),
            message: format!("transaction count {} exceeds u64", count),
        })
    }

    async fn live_fee_rate(&self) -> RpcResult<u128> {
        let value = self.request("eth_gasPrice", json!([])).await?;
        self.quantity("eth_gasPrice", &value)
    }

    async fn submit(&self, method: &str, payload: &SignedPayload) -> RpcResult<String> {
        let value = self.request(method, json!([payload.to_hex()])).await?;
        extract_identifier(&value).ok_or_else(|| RpcManagerError::InvalidResponse {
            endpoint: self.url.clone(),
            message: format!("{} returned no transaction hash: {}", method, value),
        })
    }
}

/// Parse a JSON-RPC quantity (`"0x1a"`, or a plain number)
pub fn parse_quantity(value: &Value) -> Option<u128> {
    match value {
        Value::String(s) => {
            let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
            if digits.is_empty() {
                return None;
            }
            u128::from_str_radix(digits, 16).ok()
        }
        Value::Number(n) => n.as_u64().map(u128::from),
        _ => None,
    }
}

/// Pull the transaction identifier out of a submission result
pub fn extract_identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => ["transactionHash", "hash"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .or_else(|| map.get("receipt").and_then(extract_identifier)),
        _ => None,
    }
}
