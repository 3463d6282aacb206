//! File-backed chain source.
//!
//! A snapshot directory holds indexer responses captured ahead of time:
//!
//! - `utxos.json`: a hydration response (`{"slpUtxos": [...]}`)
//! - `history.json`: an array of `{address, transactions}` pages
//! - `transactions.json`: an array of raw transactions
//! - `tokens.json`: an array of token metadata records
//!
//! Missing files read as empty.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use xec_wallet_core::rpc::ChainSource;
use xec_wallet_core::types::{
    AddressUtxos, HistoryPage, HydratedUtxoDetails, RawTx, TokenId, TokenInfo, TxRef,
};
use xec_wallet_core::CoreError;

pub struct SnapshotSource {
    dir: PathBuf,
}

impl SnapshotSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn read<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T, CoreError> {
        let path = self.dir.join(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => parse(&path, &content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "snapshot file absent");
                Ok(T::default())
            }
            Err(e) => Err(CoreError::Io(e)),
        }
    }
}

fn parse<T: DeserializeOwned>(path: &Path, content: &str) -> Result<T, CoreError> {
    serde_json::from_str(content)
        .map_err(|e| CoreError::InvalidTxData(format!("{}: {e}", path.display())))
}

#[async_trait]
impl ChainSource for SnapshotSource {
    async fn get_hydrated_utxos(
        &self,
        addresses: &[String],
    ) -> Result<HydratedUtxoDetails, CoreError> {
        let snapshot: HydratedUtxoDetails = self.read("utxos.json").await?;
        // Answer in request order, one group per requested address.
        let slp_utxos = addresses
            .iter()
            .map(|address| {
                snapshot
                    .slp_utxos
                    .iter()
                    .find(|g| &g.address == address)
                    .cloned()
                    .unwrap_or_else(|| AddressUtxos {
                        address: address.clone(),
                        utxos: Vec::new(),
                    })
            })
            .collect();
        Ok(HydratedUtxoDetails { slp_utxos })
    }

    async fn get_tx_history(&self, addresses: &[String]) -> Result<Vec<HistoryPage>, CoreError> {
        let pages: Vec<HistoryPage> = self.read("history.json").await?;
        Ok(addresses
            .iter()
            .map(|address| {
                pages
                    .iter()
                    .find(|p| &p.address == address)
                    .cloned()
                    .unwrap_or_else(|| HistoryPage {
                        address: address.clone(),
                        transactions: Vec::new(),
                    })
            })
            .collect())
    }

    async fn get_transaction(&self, tx: &TxRef) -> Result<RawTx, CoreError> {
        let txs: Vec<RawTx> = self.read("transactions.json").await?;
        txs.into_iter()
            .find(|raw| raw.txid == tx.txid)
            .map(|raw| RawTx {
                address: Some(tx.address.clone()),
                ..raw
            })
            .ok_or(CoreError::TxNotFound(tx.txid))
    }

    async fn get_transactions(&self, refs: &[TxRef]) -> Result<Vec<RawTx>, CoreError> {
        let txs: Vec<RawTx> = self.read("transactions.json").await?;
        refs.iter()
            .map(|r| {
                txs.iter()
                    .find(|raw| raw.txid == r.txid)
                    .cloned()
                    .map(|raw| RawTx {
                        address: Some(r.address.clone()),
                        ..raw
                    })
                    .ok_or(CoreError::TxNotFound(r.txid))
            })
            .collect()
    }

    async fn get_token_info(&self, token_id: &TokenId) -> Result<TokenInfo, CoreError> {
        let tokens: Vec<TokenInfo> = self.read("tokens.json").await?;
        tokens
            .into_iter()
            .find(|t| &t.token_id == token_id)
            .ok_or_else(|| CoreError::InvalidTxData(format!("no metadata for token {token_id}")))
    }
}
