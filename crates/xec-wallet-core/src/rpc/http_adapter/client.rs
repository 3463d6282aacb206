use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bitcoin::Txid;
use reqwest::header;
use tracing::{debug, trace, warn};

use crate::error::{CoreError, RpcError};

use super::super::Broadcaster;
use super::connection::{http_endpoint, NodeCredentials};
use super::protocol::{broadcast_error, parse_jsonrpc_error, JsonRpcRequest, JsonRpcResponse};

/// eCash node JSON-RPC client over HTTP(S).
pub struct HttpRpcClient {
    client: reqwest::Client,
    url: reqwest::Url,
    auth: Option<NodeCredentials>,
    next_id: AtomicU64,
}

impl HttpRpcClient {
    /// Create a client for an `http://` or `https://` endpoint.
    ///
    /// Authentication precedence:
    /// 1. explicit `user` + `pass`
    /// 2. cookie file (`username:password`) from `cookie_file`
    /// 3. no auth
    pub fn new(
        connection: &str,
        user: Option<&str>,
        pass: Option<&str>,
        cookie_file: Option<&Path>,
    ) -> Result<Self, CoreError> {
        let url = http_endpoint("node rpc url", connection)?;
        let auth = NodeCredentials::resolve(user, pass, cookie_file)?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| CoreError::InvalidConfig(format!("http client: {e}")))?;

        Ok(Self {
            client,
            url,
            auth,
            next_id: AtomicU64::new(initial_request_id()),
        })
    }

    async fn rpc_call(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(
            rpc.id = id,
            rpc.method = method,
            rpc.params = params.len(),
            "rpc call"
        );
        let req = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        let mut builder = self
            .client
            .post(self.url.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .json(&req);
        if let Some(auth) = &self.auth {
            builder = builder.basic_auth(&auth.user, Some(&auth.password));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        let status = response.status();

        let body = response
            .text()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        debug!(rpc.id = id, rpc.method = method, %status, body_len = body.len(), "rpc response");
        trace!(rpc.id = id, rpc.method = method, body = %body, "rpc response body");

        let decoded: JsonRpcResponse = serde_json::from_str(&body).map_err(|e| {
            RpcError::InvalidResponse(format!("decode JSON-RPC response: {e}; body={body}"))
        })?;

        if let Some(err) = decoded.error {
            return Err(parse_jsonrpc_error(err));
        }

        Ok(decoded.result.unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait]
impl Broadcaster for HttpRpcClient {
    async fn broadcast_raw_transaction(&self, hex: &str) -> Result<Txid, CoreError> {
        let result = self
            .rpc_call("sendrawtransaction", vec![serde_json::json!(hex)])
            .await
            .map_err(|e| {
                warn!(error = %e, "sendrawtransaction failed");
                broadcast_error(e)
            })?;
        parse_txid(&result)
    }
}

fn parse_txid(value: &serde_json::Value) -> Result<Txid, CoreError> {
    let raw = value.as_str().ok_or_else(|| {
        RpcError::InvalidResponse(format!("expected txid string, got {value}"))
    })?;
    raw.parse()
        .map_err(|e| RpcError::InvalidResponse(format!("invalid txid `{raw}`: {e}")).into())
}

fn initial_request_id() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_txid_result() {
        let hex = "4db25a4b2f0b57415ce25fab6d9cb3ac2bbb444ff493dc16d0615a11ad06c875";
        let txid = parse_txid(&serde_json::json!(hex)).expect("txid must parse");
        assert_eq!(txid.to_string(), hex);
    }

    #[test]
    fn non_string_result_is_invalid_response() {
        let err = parse_txid(&serde_json::json!(42)).expect_err("number is not a txid");
        assert!(matches!(err, CoreError::Rpc(RpcError::InvalidResponse(_))));
    }

    #[test]
    fn rejects_bad_connection_before_building_client() {
        assert!(HttpRpcClient::new("ftp://node", None, None, None).is_err());
        assert!(HttpRpcClient::new("http://127.0.0.1:8332", Some("u"), None, None).is_err());
        assert!(HttpRpcClient::new("http://127.0.0.1:8332", Some("u"), Some("p"), None).is_ok());
    }
}
