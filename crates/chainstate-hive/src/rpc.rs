//! JSON-RPC 2.0 wire types and the HTTP client used to talk to a Hive node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use chainstate_core::ProviderError;

/// JSON-RPC request ID (string, number or null).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Number(u64),
    String(String),
    Null,
}

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: RpcId,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id: RpcId::Number(id),
        }
    }
}

/// Error object of a failed call. Nodes may attach `data`; it is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    pub id: RpcId,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// The result value, or the node's error as a [`ProviderError::Rpc`].
    /// A missing result reads as `null`.
    pub fn into_result(self) -> Result<Value, ProviderError> {
        match self.error {
            Some(err) => Err(ProviderError::Rpc {
                code: err.code,
                message: err.message,
            }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Minimal JSON-RPC client over HTTP POST.
pub struct HiveRpcClient {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl HiveRpcClient {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            http,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call `method` and return the raw result value.
    pub async fn call_value(&self, method: &str, params: Vec<Value>) -> Result<Value, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);
        tracing::trace!(id, method, url = %self.url, "rpc request");

        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Http(format!("HTTP {status}: {body}")));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        let response: JsonRpcResponse = serde_json::from_str(&body)?;
        response.into_result()
    }

    /// Call `method` and decode the result into `T`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, ProviderError> {
        let value = self.call_value(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serialization() {
        let req = JsonRpcRequest::new(7, "condenser_api.get_block", vec![json!(100)]);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"condenser_api.get_block\""));
        assert!(json.contains("\"params\":[100]"));
        assert!(json.contains("\"id\":7"));
    }

    #[test]
    fn response_into_result_ok() {
        let resp: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":{"head_block_number":5}}"#)
                .unwrap();
        assert_eq!(resp.into_result().unwrap()["head_block_number"], 5);
    }

    #[test]
    fn response_missing_result_is_null() {
        let resp: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert_eq!(resp.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn response_error_maps_to_rpc() {
        let resp: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":"a","error":{"code":-32603,"message":"Internal Error","data":{"stack":[]}}}"#,
        )
        .unwrap();
        assert_eq!(resp.id, RpcId::String("a".into()));
        match resp.into_result() {
            Err(ProviderError::Rpc { code, message }) => {
                assert_eq!(code, -32603);
                assert_eq!(message, "Internal Error");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
