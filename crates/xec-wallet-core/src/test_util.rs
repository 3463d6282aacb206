//! Shared test helpers for `xec-wallet-core` unit tests.
//!
//! Deterministic txids, token ids and addresses built from a single byte,
//! indexer records, raw outputs, raw history transactions and a signing
//! wallet whose keys are derived at runtime from fixed secrets.

use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use bitcoin::{Amount, Network, OutPoint, PrivateKey, ScriptBuf, Txid};
use rust_decimal::Decimal;

use crate::address::CashAddress;
use crate::types::{
    HydratedUtxo, RawOutput, RawTx, RawTxInput, RawTxOutput, TokenAnnotation, TokenId,
    TokenUtxoType,
};
use crate::wallet::{Wallet, WalletPath, PRIMARY_PATH, TOKEN_PATH};

// ==============================================================================
// Identifier Helpers
// ==============================================================================

/// Create a deterministic `Txid` from a single distinguishing byte.
pub fn txid_from_byte(b: u8) -> Txid {
    let mut bytes = [0u8; 32];
    bytes[0] = b;
    Txid::from_byte_array(bytes)
}

pub fn token_id_from_byte(b: u8) -> TokenId {
    TokenId([b; 32])
}

/// An `ecash:` P2PKH address nobody in the tests holds a key for.
pub fn address_from_byte(b: u8) -> String {
    CashAddress::p2pkh("ecash", [b; 20]).to_string()
}

// ==============================================================================
// Indexer Records
// ==============================================================================

/// A plain base-coin record as the indexer returns it (no token fields).
pub fn base_utxo(txid_byte: u8, vout: u32, sats: u64) -> HydratedUtxo {
    HydratedUtxo {
        txid: txid_from_byte(txid_byte),
        vout,
        value: Amount::from_sat(sats),
        height: Some(700_000),
        is_valid: None,
        token_id: None,
        token_qty: None,
        utxo_type: None,
        decimals: None,
        token_ticker: None,
        token_name: None,
    }
}

/// A valid token record carrying `qty` display units at 546 sats.
pub fn token_utxo(
    txid_byte: u8,
    vout: u32,
    token_id: &TokenId,
    qty: &str,
    decimals: u32,
) -> HydratedUtxo {
    HydratedUtxo {
        is_valid: Some(true),
        token_id: Some(token_id.to_string()),
        token_qty: Some(serde_json::Value::String(qty.to_owned())),
        utxo_type: Some("token".into()),
        decimals: Some(decimals),
        token_ticker: Some("TST".into()),
        token_name: Some("Test Token".into()),
        ..base_utxo(txid_byte, vout, 546)
    }
}

pub fn baton_utxo(txid_byte: u8, vout: u32, token_id: &TokenId, decimals: u32) -> HydratedUtxo {
    HydratedUtxo {
        token_qty: None,
        utxo_type: Some("minting-baton".into()),
        ..token_utxo(txid_byte, vout, token_id, "0", decimals)
    }
}

// ==============================================================================
// Raw Outputs
// ==============================================================================

pub fn raw_base_output(txid_byte: u8, vout: u32, sats: u64, address: &str) -> RawOutput {
    RawOutput {
        outpoint: OutPoint::new(txid_from_byte(txid_byte), vout),
        value: Amount::from_sat(sats),
        address: address.to_owned(),
        token: None,
    }
}

pub fn raw_token_output(
    txid_byte: u8,
    vout: u32,
    address: &str,
    token_id: &TokenId,
    quantity: Decimal,
    decimals: u32,
) -> RawOutput {
    RawOutput {
        token: Some(TokenAnnotation {
            token_id: *token_id,
            quantity,
            utxo_type: TokenUtxoType::Token,
            is_valid: true,
            decimals,
            ticker: Some("TST".into()),
            name: Some("Test Token".into()),
        }),
        ..raw_base_output(txid_byte, vout, 546, address)
    }
}

// ==============================================================================
// Wallet
// ==============================================================================

/// Paths 1899 (primary), 145 and 245, keyed by secrets `[1; 32]`, `[2; 32]`
/// and `[3; 32]`.
pub fn test_wallet() -> Wallet {
    let secp = Secp256k1::new();
    let path = |path: u32, secret: u8| {
        let sk = SecretKey::from_slice(&[secret; 32]).expect("valid secret");
        let key = PrivateKey::new(sk, Network::Bitcoin);
        let hash = key.public_key(&secp).pubkey_hash().to_byte_array();
        WalletPath {
            path,
            address: CashAddress::p2pkh("ecash", hash).to_string(),
            wif: key.to_wif(),
        }
    };
    Wallet {
        name: "test".into(),
        paths: vec![path(PRIMARY_PATH, 1), path(145, 2), path(TOKEN_PATH, 3)],
    }
}

/// Base-coin outputs held by the wallet's primary address.
pub fn wallet_utxos(wallet: &Wallet, sats: &[u64]) -> Vec<RawOutput> {
    sats.iter()
        .enumerate()
        .map(|(i, s)| raw_base_output(0x10 + i as u8, 0, *s, &wallet.paths[0].address))
        .collect()
}

// ==============================================================================
// History Transactions
// ==============================================================================

pub fn tx_input(address: &str, sats: u64) -> RawTxInput {
    RawTxInput {
        address: Some(address.to_owned()),
        value: Some(Amount::from_sat(sats)),
    }
}

pub fn p2pkh_txout(address: &str, sats: u64) -> RawTxOutput {
    let script_pubkey = CashAddress::parse(address, "ecash")
        .map(|a| a.script_pubkey())
        .unwrap_or_default();
    RawTxOutput {
        value: Amount::from_sat(sats),
        script_pub_key: script_pubkey,
    }
}

pub fn op_return_txout(script: ScriptBuf) -> RawTxOutput {
    RawTxOutput {
        value: Amount::ZERO,
        script_pub_key: script,
    }
}

pub fn make_raw_tx(txid_byte: u8, vin: Vec<RawTxInput>, vout: Vec<RawTxOutput>) -> RawTx {
    RawTx {
        txid: txid_from_byte(txid_byte),
        confirmations: 3,
        height: Some(700_100),
        blocktime: Some(1_650_000_000),
        vin,
        vout,
        address: None,
    }
}
