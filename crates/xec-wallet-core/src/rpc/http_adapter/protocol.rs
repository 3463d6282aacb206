use crate::error::{CoreError, RpcError};

#[derive(serde::Serialize)]
pub(super) struct JsonRpcRequest<'a> {
    pub(super) jsonrpc: &'static str,
    pub(super) id: u64,
    pub(super) method: &'a str,
    pub(super) params: Vec<serde_json::Value>,
}

#[derive(serde::Deserialize)]
pub(super) struct JsonRpcResponse {
    pub(super) result: Option<serde_json::Value>,
    pub(super) error: Option<serde_json::Value>,
}

/// Turn a JSON-RPC error object into an `RpcError`.
///
/// `{"code": <int>, "message": <string>}` becomes `ServerError`; anything
/// else is an `InvalidResponse` carrying the raw JSON.
pub(super) fn parse_jsonrpc_error(err: serde_json::Value) -> RpcError {
    #[derive(serde::Deserialize)]
    struct JsonRpcError {
        code: i64,
        message: String,
    }

    match serde_json::from_value::<JsonRpcError>(err.clone()) {
        Ok(parsed) => RpcError::ServerError {
            code: parsed.code,
            message: parsed.message,
        },
        Err(_) => RpcError::InvalidResponse(format!("non-standard JSON-RPC error: {err}")),
    }
}

/// Map a failed `sendrawtransaction` call. Node rejections keep the node's
/// message text exactly; transport and decoding failures stay RPC errors.
pub(super) fn broadcast_error(err: RpcError) -> CoreError {
    match err {
        RpcError::ServerError { message, .. } => CoreError::BroadcastRejected(message),
        other => CoreError::Rpc(other),
    }
}
