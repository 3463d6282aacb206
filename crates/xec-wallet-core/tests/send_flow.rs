use std::sync::{Mutex, Once};

use async_trait::async_trait;
use bitcoin::consensus::encode::deserialize_hex;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use bitcoin::{Amount, Network, OutPoint, PrivateKey, Transaction, Txid};
use rust_decimal_macros::dec;

use xec_wallet_core::address::{CashAddress, OwnedAddresses};
use xec_wallet_core::history::parse_tx_data;
use xec_wallet_core::rpc::Broadcaster;
use xec_wallet_core::script::{cashtab_message_script, slp_send_script};
use xec_wallet_core::send::send_xec;
use xec_wallet_core::token::create_token;
use xec_wallet_core::types::{
    Direction, RawOutput, RawTx, RawTxInput, RawTxOutput, Recipient, Recipients, SendRequest,
    TokenConfig, TokenId, TxCategory,
};
use xec_wallet_core::wallet::{WalletPath, PRIMARY_PATH};
use xec_wallet_core::{CoreError, NetworkProfile, Wallet};

static TRACING_INIT: Once = Once::new();

fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new("xec_wallet_core=debug")
                }),
            )
            .with_target(true)
            .with_test_writer()
            .try_init();
    });
}

/// Accepts every transaction, or rejects every one with a node's text.
#[derive(Default)]
struct RecordingBroadcaster {
    rejection: Option<&'static str>,
    sent: Mutex<Vec<String>>,
}

impl RecordingBroadcaster {
    fn rejecting(text: &'static str) -> Self {
        Self {
            rejection: Some(text),
            ..Self::default()
        }
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().expect("broadcast log").clone()
    }
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn broadcast_raw_transaction(&self, hex: &str) -> Result<Txid, CoreError> {
        self.sent.lock().expect("broadcast log").push(hex.to_owned());
        if let Some(text) = self.rejection {
            return Err(CoreError::BroadcastRejected(text.to_owned()));
        }
        let tx: Transaction = deserialize_hex(hex).expect("broadcast hex must decode");
        Ok(tx.compute_txid())
    }
}

fn wallet() -> Wallet {
    let secp = Secp256k1::new();
    let key = PrivateKey::new(
        SecretKey::from_slice(&[0x11; 32]).expect("valid secret"),
        Network::Bitcoin,
    );
    let hash = key.public_key(&secp).pubkey_hash().to_byte_array();
    Wallet {
        name: "integration".into(),
        paths: vec![WalletPath {
            path: PRIMARY_PATH,
            address: CashAddress::p2pkh("ecash", hash).to_string(),
            wif: key.to_wif(),
        }],
    }
}

fn funding(wallet: &Wallet, sats: u64) -> Vec<RawOutput> {
    vec![RawOutput {
        outpoint: OutPoint::new(Txid::from_byte_array([0xaa; 32]), 0),
        value: Amount::from_sat(sats),
        address: wallet.paths[0].address.clone(),
        token: None,
    }]
}

fn stranger() -> String {
    CashAddress::p2pkh("ecash", [0x77; 20]).to_string()
}

fn single(amount: Option<&str>) -> SendRequest {
    SendRequest {
        fee_rate: None,
        message: None,
        recipients: Recipients::Single {
            address: stranger(),
            amount: amount.map(str::to_owned),
        },
    }
}

#[tokio::test]
async fn null_amount_is_a_silent_no_op() {
    init_tracing();
    let broadcaster = RecordingBroadcaster::default();
    let empty_wallet = Wallet {
        name: String::new(),
        paths: Vec::new(),
    };

    let result = send_xec(
        &broadcaster,
        &empty_wallet,
        &[],
        &single(None),
        &NetworkProfile::mainnet(),
    )
    .await
    .expect("null amount is not an error");
    assert!(result.is_none());
    assert!(broadcaster.sent().is_empty());
}

#[tokio::test]
async fn spends_entire_balance_less_fee_and_no_more() {
    init_tracing();
    let wallet = wallet();
    let utxos = funding(&wallet, 100_000);
    let profile = NetworkProfile::mainnet();
    let broadcaster = RecordingBroadcaster::default();

    let url = send_xec(&broadcaster, &wallet, &utxos, &single(Some("997.71")), &profile)
        .await
        .expect("balance minus fee is spendable")
        .expect("amount present");
    let sent = broadcaster.sent();
    let tx: Transaction = deserialize_hex(&sent[0]).unwrap();
    assert_eq!(url, format!("{}/tx/{}", profile.explorer_url, tx.compute_txid()));
    assert_eq!(tx.output.len(), 1, "zero change must not create an output");
    assert_eq!(tx.output[0].value, Amount::from_sat(99_771));

    let err = send_xec(&broadcaster, &wallet, &utxos, &single(Some("997.72")), &profile)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InsufficientFunds { .. }));
    assert_eq!(err.to_string(), "Insufficient funds");
    assert_eq!(broadcaster.sent().len(), 1);
}

#[tokio::test]
async fn dust_boundary_is_inclusive() {
    init_tracing();
    let wallet = wallet();
    let utxos = funding(&wallet, 100_000);
    let profile = NetworkProfile::mainnet();
    let broadcaster = RecordingBroadcaster::default();

    let err = send_xec(&broadcaster, &wallet, &utxos, &single(Some("5.49")), &profile)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "dust");

    let err = send_xec(&broadcaster, &wallet, &utxos, &single(Some("5.49999999")), &profile)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "dust");
    assert!(broadcaster.sent().is_empty());

    send_xec(&broadcaster, &wallet, &utxos, &single(Some("5.5")), &profile)
        .await
        .expect("exactly dust is relayable");
}

#[tokio::test]
async fn node_rejections_pass_through_verbatim() {
    init_tracing();
    let wallet = wallet();
    let utxos = funding(&wallet, 100_000);
    let profile = NetworkProfile::mainnet();

    for text in [
        "dust",
        "insufficient priority",
        "txn-mempool-conflict",
        "Network Error",
    ] {
        let broadcaster = RecordingBroadcaster::rejecting(text);
        let request = SendRequest {
            fee_rate: Some(dec!(2)),
            message: Some("hello".into()),
            recipients: Recipients::Many(vec![Recipient {
                address: stranger(),
                amount: "10".into(),
            }]),
        };
        let err = send_xec(&broadcaster, &wallet, &utxos, &request, &profile)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), text);
        assert_eq!(broadcaster.sent().len(), 1);
    }
}

#[tokio::test]
async fn create_token_rejects_invalid_wallet_before_broadcast() {
    init_tracing();
    let mut broken = wallet();
    broken.paths[0].wif = "not-a-wif".into();
    let utxos = funding(&broken, 100_000);
    let broadcaster = RecordingBroadcaster::default();
    let config = TokenConfig {
        name: "Integration".into(),
        ticker: "INT".into(),
        decimals: 2,
        initial_quantity: dec!(100),
        document_url: None,
        document_hash: None,
        mint_baton_vout: None,
    };

    let err = create_token(
        &broadcaster,
        &broken,
        &utxos,
        None,
        &config,
        &NetworkProfile::mainnet(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_string(), "Invalid wallet");
    assert!(broadcaster.sent().is_empty());
}

#[test]
fn history_categorizes_coin_message_and_token_events() {
    let wallet = wallet();
    let me = wallet.paths[0].address.clone();
    let them = stranger();
    let owned = OwnedAddresses::from_strings(wallet.addresses(), "ecash").unwrap();
    let script_of = |a: &str| CashAddress::parse(a, "ecash").unwrap().script_pubkey();
    let input = |address: &str| RawTxInput {
        address: Some(address.to_owned()),
        value: Some(Amount::from_sat(5_000)),
    };
    let output = |address: &str, sats: u64| RawTxOutput {
        value: Amount::from_sat(sats),
        script_pub_key: script_of(address),
    };
    let raw = |b: u8, vin, vout| RawTx {
        txid: Txid::from_byte_array([b; 32]),
        confirmations: 1,
        height: Some(800_000),
        blocktime: None,
        vin,
        vout,
        address: Some(me.clone()),
    };
    let token_id = TokenId([0x42; 32]);

    let txs = vec![
        raw(1, vec![input(&them)], vec![output(&me, 2_000)]),
        raw(
            2,
            vec![input(&me)],
            vec![
                RawTxOutput {
                    value: Amount::ZERO,
                    script_pub_key: cashtab_message_script("thanks").unwrap(),
                },
                output(&them, 1_000),
                output(&me, 3_700),
            ],
        ),
        raw(
            3,
            vec![input(&them)],
            vec![
                RawTxOutput {
                    value: Amount::ZERO,
                    script_pub_key: slp_send_script(&token_id, &[25, 75]).unwrap(),
                },
                output(&me, 546),
                output(&them, 546),
            ],
        ),
    ];

    let parsed = parse_tx_data(&txs, &owned, "ecash");
    assert_eq!(parsed[0].category, TxCategory::Coin);
    assert_eq!(parsed[0].direction, Direction::Received);
    assert_eq!(parsed[0].amount_received, Amount::from_sat(2_000));

    assert_eq!(parsed[1].category, TxCategory::Message);
    assert_eq!(parsed[1].direction, Direction::Sent);
    assert_eq!(parsed[1].amount_sent, Amount::from_sat(1_000));
    assert_eq!(parsed[1].message.as_ref().unwrap().text, "thanks");

    assert_eq!(parsed[2].category, TxCategory::Token);
    assert_eq!(parsed[2].token.as_ref().unwrap().raw_delta, 25);
}
