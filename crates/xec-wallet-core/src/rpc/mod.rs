//! External capabilities: chain data and transaction broadcast.
//!
//! Defines the [`ChainSource`] and [`Broadcaster`] traits the builders and
//! the sync layer are written against, an HTTP JSON-RPC broadcaster
//! ([`HttpRpcClient`]) and test fakes (`mock`).

mod http_adapter;
#[cfg(test)]
pub mod mock;

pub use http_adapter::HttpRpcClient;
pub(crate) use http_adapter::explorer_base;

use async_trait::async_trait;
use bitcoin::Txid;

use crate::error::CoreError;
use crate::types::{HistoryPage, HydratedUtxoDetails, RawTx, TokenId, TokenInfo, TxRef};

/// Write side: submit a signed transaction.
///
/// Implementations report node rejections as
/// [`CoreError::BroadcastRejected`] carrying the node's text unchanged and
/// must not retry.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast_raw_transaction(&self, hex: &str) -> Result<Txid, CoreError>;
}

/// Read side: indexer queries the wallet needs.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Unspent outputs of `addresses` with token annotations resolved.
    async fn get_hydrated_utxos(
        &self,
        addresses: &[String],
    ) -> Result<HydratedUtxoDetails, CoreError>;

    /// One history page per address, in the order given.
    async fn get_tx_history(&self, addresses: &[String]) -> Result<Vec<HistoryPage>, CoreError>;

    /// Fetch one transaction with its input addresses resolved.
    async fn get_transaction(&self, tx: &TxRef) -> Result<RawTx, CoreError>;

    /// Fetch many transactions, preserving order.
    async fn get_transactions(&self, txs: &[TxRef]) -> Result<Vec<RawTx>, CoreError> {
        let mut results = Vec::with_capacity(txs.len());
        for tx in txs {
            results.push(self.get_transaction(tx).await?);
        }
        Ok(results)
    }

    async fn get_token_info(&self, token_id: &TokenId) -> Result<TokenInfo, CoreError>;
}
