use bitcoin::{Amount, Txid};
use rust_decimal::Decimal;

use crate::types::TokenId;

/// Failures talking to a JSON-RPC endpoint.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("HTTP error: {0}")]
    Transport(String),

    #[error("RPC server error {code}: {message}")]
    ServerError { code: i64, message: String },

    #[error("invalid RPC response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The signing wallet is missing its primary path or carries a key that
    /// does not control the address it claims.
    #[error("Invalid wallet")]
    InvalidWallet,

    #[error("Insufficient funds")]
    InsufficientFunds { available: Amount, required: Amount },

    /// Display text matches the node's own rejection so callers can treat
    /// both the same way.
    #[error("dust")]
    DustAmount { amount: Amount, threshold: Amount },

    /// Rejection text from the broadcast capability, unmodified.
    #[error("{0}")]
    BroadcastRejected(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid address `{address}`: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("invalid recipients: {0}")]
    InvalidRecipients(String),

    #[error("message too long: OP_RETURN script is {size} bytes, limit is {limit}")]
    MessageTooLong { size: usize, limit: usize },

    #[error("insufficient token balance for {token_id}: have {available}, need {required}")]
    InsufficientTokens {
        token_id: TokenId,
        available: Decimal,
        required: Decimal,
    },

    #[error("invalid token config: {0}")]
    InvalidTokenConfig(String),

    #[error("no signing key for address {0}")]
    MissingSigningKey(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("invalid transaction data: {0}")]
    InvalidTxData(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("transaction not found: {0}")]
    TxNotFound(Txid),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_keep_their_wire_text() {
        assert_eq!(CoreError::InvalidWallet.to_string(), "Invalid wallet");
        assert_eq!(
            CoreError::InsufficientFunds {
                available: Amount::from_sat(10),
                required: Amount::from_sat(11),
            }
            .to_string(),
            "Insufficient funds"
        );
        assert_eq!(
            CoreError::DustAmount {
                amount: Amount::from_sat(549),
                threshold: Amount::from_sat(550),
            }
            .to_string(),
            "dust"
        );
    }

    #[test]
    fn broadcast_rejection_is_verbatim() {
        let text = "too-long-mempool-chain, too many unconfirmed ancestors [limit: 25] (code 64)";
        assert_eq!(CoreError::BroadcastRejected(text.into()).to_string(), text);
    }

    #[test]
    fn rpc_error_converts_transparently() {
        let err: CoreError = RpcError::Transport("connection refused".into()).into();
        assert_eq!(err.to_string(), "HTTP error: connection refused");
    }
}
