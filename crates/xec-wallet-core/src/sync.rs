//! Async orchestration over a [`ChainSource`]: balance loading and history
//! assembly.

use std::collections::HashMap;

use futures::future::try_join_all;
use tracing::{debug, info};

use crate::address::OwnedAddresses;
use crate::classify::{classify_utxos, flatten_hydrated_batches};
use crate::error::CoreError;
use crate::history::{flatten_transactions, parse_tx_data};
use crate::profile::NetworkProfile;
use crate::rpc::ChainSource;
use crate::token_history::parse_token_info_for_tx_history;
use crate::types::{ClassifiedBalances, HistoryItem, TokenId, TokenInfo};

/// Hydrate `addresses` in batches and classify the combined result.
///
/// Batches are requested concurrently; their responses are concatenated
/// in address order before classification.
pub async fn load_balances(
    source: &dyn ChainSource,
    addresses: &[String],
    profile: &NetworkProfile,
) -> Result<ClassifiedBalances, CoreError> {
    let batch_size = profile.hydrate_batch_size.max(1);
    let batches = try_join_all(
        addresses
            .chunks(batch_size)
            .map(|chunk| source.get_hydrated_utxos(chunk)),
    )
    .await?;
    debug!(
        addresses = addresses.len(),
        batches = batches.len(),
        "hydrated wallet outputs"
    );

    let balances = classify_utxos(&flatten_hydrated_batches(batches));
    info!(
        spendable = balances.spendable.len(),
        token_outputs = balances.token_outputs.len(),
        tokens = balances.tokens.len(),
        "classified wallet outputs"
    );
    Ok(balances)
}

/// Build the display history for the wallet's addresses.
///
/// Token metadata is fetched once per distinct token id; a failed lookup
/// fails the whole load.
pub async fn load_history(
    source: &dyn ChainSource,
    addresses: &[String],
    profile: &NetworkProfile,
) -> Result<Vec<HistoryItem>, CoreError> {
    let owned = OwnedAddresses::from_strings(
        addresses.iter().map(String::as_str),
        &profile.address_prefix,
    )?;

    let pages = source.get_tx_history(addresses).await?;
    let refs = flatten_transactions(&pages, profile.tx_history_count);
    let raw = source.get_transactions(&refs).await?;
    let parsed = parse_tx_data(&raw, &owned, &profile.address_prefix);

    let mut token_ids: Vec<TokenId> = parsed
        .iter()
        .filter_map(|tx| tx.token.as_ref().map(|t| t.token_id))
        .collect();
    token_ids.sort_unstable();
    token_ids.dedup();
    let infos: HashMap<TokenId, TokenInfo> =
        try_join_all(token_ids.iter().map(|id| source.get_token_info(id)))
            .await?
            .into_iter()
            .map(|info| (info.token_id, info))
            .collect();

    let items = parsed
        .into_iter()
        .map(|tx| {
            let token_details = match tx.token.as_ref().map(|t| t.token_id) {
                Some(id) => {
                    let info = infos.get(&id).ok_or_else(|| {
                        CoreError::InvalidTxData(format!("no metadata returned for token {id}"))
                    })?;
                    Some(parse_token_info_for_tx_history(&tx, info)?)
                }
                None => None,
            };
            Ok(HistoryItem { tx, token_details })
        })
        .collect::<Result<Vec<_>, CoreError>>()?;

    info!(entries = items.len(), "loaded transaction history");
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::mock::MockChainSource;
    use crate::script::slp_send_script;
    use crate::test_util::*;
    use crate::types::{AddressUtxos, HistoryEntry, TxCategory};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn balances_hydrate_in_batches() {
        let token_id = token_id_from_byte(5);
        let addresses: Vec<String> = (1..=5).map(address_from_byte).collect();
        let source = MockChainSource::builder()
            .with_utxos(AddressUtxos {
                address: addresses[0].clone(),
                utxos: vec![base_utxo(1, 0, 10_000)],
            })
            .with_utxos(AddressUtxos {
                address: addresses[4].clone(),
                utxos: vec![token_utxo(2, 1, &token_id, "12.5", 1), base_utxo(3, 0, 700)],
            })
            .build();
        let profile = NetworkProfile {
            hydrate_batch_size: 2,
            ..NetworkProfile::mainnet()
        };

        let balances = load_balances(&source, &addresses, &profile).await.unwrap();
        assert_eq!(source.hydrate_calls(), vec![2, 2, 1]);
        assert_eq!(balances.spendable.len(), 2);
        assert_eq!(balances.spendable_balance().to_sat(), 10_700);
        assert_eq!(balances.tokens[&token_id].balance, dec!(12.5));
    }

    #[tokio::test]
    async fn history_enriches_token_events() {
        let token_id = token_id_from_byte(6);
        let me = address_from_byte(1);
        let them = address_from_byte(9);
        let coin = make_raw_tx(1, vec![tx_input(&them, 5_000)], vec![p2pkh_txout(&me, 1_000)]);
        let token = make_raw_tx(
            2,
            vec![tx_input(&me, 546), tx_input(&me, 2_000)],
            vec![
                op_return_txout(slp_send_script(&token_id, &[150]).unwrap()),
                p2pkh_txout(&them, 546),
            ],
        );
        let source = MockChainSource::builder()
            .with_history(
                &me,
                vec![
                    HistoryEntry {
                        tx_hash: token.txid,
                        height: 0,
                    },
                    HistoryEntry {
                        tx_hash: coin.txid,
                        height: 700_000,
                    },
                ],
            )
            .with_tx(coin)
            .with_tx(token)
            .with_token(TokenInfo {
                token_id,
                name: "Two Places".into(),
                ticker: "TWO".into(),
                decimals: 2,
                document_url: None,
                initial_supply: None,
            })
            .build();

        let items = load_history(&source, &[me], &NetworkProfile::mainnet())
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].tx.category, TxCategory::Token);
        let details = items[0].token_details.as_ref().unwrap();
        assert_eq!(details.qty_sent, dec!(1.5));
        assert_eq!(items[1].tx.category, TxCategory::Coin);
        assert!(items[1].token_details.is_none());
    }

    #[tokio::test]
    async fn history_respects_profile_limit() {
        let me = address_from_byte(1);
        let txs: Vec<_> = (1..=4)
            .map(|b| {
                make_raw_tx(
                    b,
                    vec![tx_input(&address_from_byte(9), 900)],
                    vec![p2pkh_txout(&me, 600)],
                )
            })
            .collect();
        let mut builder = MockChainSource::builder().with_history(
            &me,
            txs.iter()
                .map(|tx| HistoryEntry {
                    tx_hash: tx.txid,
                    height: 1,
                })
                .collect(),
        );
        for tx in txs {
            builder = builder.with_tx(tx);
        }
        let profile = NetworkProfile {
            tx_history_count: 3,
            ..NetworkProfile::mainnet()
        };

        let items = load_history(&builder.build(), &[me], &profile).await.unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].tx.txid, txid_from_byte(1));
    }

    #[tokio::test]
    async fn missing_transaction_fails_the_load() {
        let me = address_from_byte(1);
        let source = MockChainSource::builder()
            .with_history(
                &me,
                vec![HistoryEntry {
                    tx_hash: txid_from_byte(3),
                    height: 1,
                }],
            )
            .build();
        let err = load_history(&source, &[me], &NetworkProfile::mainnet())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::TxNotFound(_)));
    }
}
