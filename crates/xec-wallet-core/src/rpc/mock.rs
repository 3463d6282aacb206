use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bitcoin::consensus::encode::deserialize_hex;
use bitcoin::{Transaction, Txid};

use crate::error::CoreError;
use crate::types::{
    AddressUtxos, HistoryEntry, HistoryPage, HydratedUtxoDetails, RawTx, TokenId, TokenInfo,
    TxRef,
};

use super::{Broadcaster, ChainSource};

/// Records every broadcast and answers with the transaction's own txid, or
/// with a fixed rejection.
#[derive(Default)]
pub struct MockBroadcaster {
    rejection: Option<String>,
    broadcasts: Mutex<Vec<String>>,
}

impl MockBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every broadcast with `text`, as a node would.
    pub fn with_rejection(mut self, text: &str) -> Self {
        self.rejection = Some(text.to_owned());
        self
    }

    pub fn broadcasts(&self) -> Vec<String> {
        self.broadcasts.lock().expect("broadcast log lock").clone()
    }

    pub fn last_txid(&self) -> Option<Txid> {
        let hex = self.broadcasts().pop()?;
        let tx: Transaction = deserialize_hex(&hex).ok()?;
        Some(tx.compute_txid())
    }
}

#[async_trait]
impl Broadcaster for MockBroadcaster {
    async fn broadcast_raw_transaction(&self, hex: &str) -> Result<Txid, CoreError> {
        self.broadcasts
            .lock()
            .expect("broadcast log lock")
            .push(hex.to_owned());
        if let Some(text) = &self.rejection {
            return Err(CoreError::BroadcastRejected(text.clone()));
        }
        let tx: Transaction = deserialize_hex(hex)
            .map_err(|e| CoreError::InvalidTxData(format!("undecodable broadcast: {e}")))?;
        Ok(tx.compute_txid())
    }
}

/// An in-memory indexer populated via the builder pattern. Hydration calls
/// are logged so tests can check batching.
pub struct MockChainSource {
    utxos: HashMap<String, AddressUtxos>,
    history: HashMap<String, Vec<HistoryEntry>>,
    transactions: HashMap<Txid, RawTx>,
    tokens: HashMap<TokenId, TokenInfo>,
    hydrate_calls: Mutex<Vec<usize>>,
}

impl MockChainSource {
    pub fn builder() -> MockChainSourceBuilder {
        MockChainSourceBuilder {
            utxos: HashMap::new(),
            history: HashMap::new(),
            transactions: HashMap::new(),
            tokens: HashMap::new(),
        }
    }

    /// Address count of each hydration request, in call order.
    pub fn hydrate_calls(&self) -> Vec<usize> {
        self.hydrate_calls.lock().expect("call log lock").clone()
    }
}

pub struct MockChainSourceBuilder {
    utxos: HashMap<String, AddressUtxos>,
    history: HashMap<String, Vec<HistoryEntry>>,
    transactions: HashMap<Txid, RawTx>,
    tokens: HashMap<TokenId, TokenInfo>,
}

impl MockChainSourceBuilder {
    pub fn with_utxos(mut self, group: AddressUtxos) -> Self {
        self.utxos.insert(group.address.clone(), group);
        self
    }

    pub fn with_history(mut self, address: &str, entries: Vec<HistoryEntry>) -> Self {
        self.history.insert(address.to_owned(), entries);
        self
    }

    pub fn with_tx(mut self, tx: RawTx) -> Self {
        self.transactions.insert(tx.txid, tx);
        self
    }

    pub fn with_token(mut self, info: TokenInfo) -> Self {
        self.tokens.insert(info.token_id, info);
        self
    }

    pub fn build(self) -> MockChainSource {
        MockChainSource {
            utxos: self.utxos,
            history: self.history,
            transactions: self.transactions,
            tokens: self.tokens,
            hydrate_calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChainSource for MockChainSource {
    async fn get_hydrated_utxos(
        &self,
        addresses: &[String],
    ) -> Result<HydratedUtxoDetails, CoreError> {
        self.hydrate_calls
            .lock()
            .expect("call log lock")
            .push(addresses.len());
        let slp_utxos = addresses
            .iter()
            .map(|a| {
                self.utxos.get(a).cloned().unwrap_or_else(|| AddressUtxos {
                    address: a.clone(),
                    utxos: Vec::new(),
                })
            })
            .collect();
        Ok(HydratedUtxoDetails { slp_utxos })
    }

    async fn get_tx_history(&self, addresses: &[String]) -> Result<Vec<HistoryPage>, CoreError> {
        Ok(addresses
            .iter()
            .map(|a| HistoryPage {
                address: a.clone(),
                transactions: self.history.get(a).cloned().unwrap_or_default(),
            })
            .collect())
    }

    async fn get_transaction(&self, tx: &TxRef) -> Result<RawTx, CoreError> {
        self.transactions
            .get(&tx.txid)
            .cloned()
            .map(|raw| RawTx {
                address: Some(tx.address.clone()),
                ..raw
            })
            .ok_or(CoreError::TxNotFound(tx.txid))
    }

    async fn get_token_info(&self, token_id: &TokenId) -> Result<TokenInfo, CoreError> {
        self.tokens
            .get(token_id)
            .cloned()
            .ok_or_else(|| CoreError::InvalidTxData(format!("unknown token {token_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;

    #[tokio::test]
    async fn unknown_addresses_hydrate_empty() {
        let source = MockChainSource::builder()
            .with_utxos(AddressUtxos {
                address: address_from_byte(1),
                utxos: vec![base_utxo(1, 0, 1_000)],
            })
            .build();
        let details = source
            .get_hydrated_utxos(&[address_from_byte(1), address_from_byte(2)])
            .await
            .unwrap();
        assert_eq!(details.slp_utxos.len(), 2);
        assert_eq!(details.slp_utxos[0].utxos.len(), 1);
        assert!(details.slp_utxos[1].utxos.is_empty());
        assert_eq!(source.hydrate_calls(), vec![2]);
    }

    #[tokio::test]
    async fn missing_transaction_is_not_found() {
        let source = MockChainSource::builder().build();
        let txref = TxRef {
            txid: txid_from_byte(9),
            height: 1,
            address: address_from_byte(1),
        };
        let err = source.get_transaction(&txref).await.unwrap_err();
        assert!(matches!(err, CoreError::TxNotFound(t) if t == txid_from_byte(9)));
    }

    #[tokio::test]
    async fn rejection_is_recorded_and_returned() {
        let broadcaster = MockBroadcaster::new().with_rejection("Network Error");
        let err = broadcaster
            .broadcast_raw_transaction("00")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Network Error");
        assert_eq!(broadcaster.broadcasts(), vec!["00".to_owned()]);
    }
}
