//! Domain types for the wallet engine.
//!
//! Contains the indexer wire records (`HydratedUtxo`, `RawTx`,
//! `HistoryPage`), the classified balance model, send and token requests,
//! and the parsed history events produced for display.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bitcoin::hashes::Hash;
use bitcoin::hex::{DisplayHex, FromHex};
use bitcoin::{Amount, OutPoint, ScriptBuf, Transaction, Txid};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ==============================================================================
// Token Identifier
// ==============================================================================

/// A 32-byte SLP token id, stored in the byte order it appears in scripts
/// and explorers (the genesis txid as displayed).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub [u8; 32]);

impl TokenId {
    /// Token ids are the txid of the GENESIS transaction.
    pub fn from_genesis_txid(txid: &Txid) -> Self {
        let mut bytes = txid.to_byte_array();
        bytes.reverse();
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_slice().to_lower_hex_string())
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenId({self})")
    }
}

impl FromStr for TokenId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes =
            Vec::<u8>::from_hex(s.trim()).map_err(|e| format!("invalid token id `{s}`: {e}"))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| format!("invalid token id `{s}`: expected 32 bytes"))?;
        Ok(Self(bytes))
    }
}

impl Serialize for TokenId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TokenId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ==============================================================================
// Hydrated UTXOs (indexer wire format)
// ==============================================================================

/// One unspent output as returned by the token indexer's hydration call.
///
/// Token fields are kept loose on purpose: the classifier decides whether
/// they form a usable annotation and treats anything malformed as plain
/// base coin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydratedUtxo {
    pub txid: Txid,
    pub vout: u32,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub value: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<i32>,
    #[serde(default)]
    pub is_valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    /// Decimal string in token display units; some indexers emit a number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_qty: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utxo_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_ticker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressUtxos {
    pub address: String,
    pub utxos: Vec<HydratedUtxo>,
}

/// Hydration response: outputs grouped by the address they pay to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydratedUtxoDetails {
    pub slp_utxos: Vec<AddressUtxos>,
}

// ==============================================================================
// Classified Outputs
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenUtxoType {
    Token,
    MintingBaton,
}

/// Token-layer annotation attached to an output by the indexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAnnotation {
    pub token_id: TokenId,
    /// Quantity in token display units.
    pub quantity: Decimal,
    pub utxo_type: TokenUtxoType,
    pub is_valid: bool,
    pub decimals: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// An unspent output together with the address that can spend it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOutput {
    pub outpoint: OutPoint,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub value: Amount,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenAnnotation>,
}

impl RawOutput {
    /// Whether the output's token annotation is usable at all.
    pub fn valid_token(&self) -> Option<&TokenAnnotation> {
        self.token.as_ref().filter(|t| t.is_valid)
    }
}

/// Aggregated holdings of one token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub token_id: TokenId,
    pub balance: Decimal,
    pub has_baton: bool,
    pub decimals: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Result of partitioning a wallet's outputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedBalances {
    /// Base-coin outputs safe to spend for XEC sends and fees.
    pub spendable: Vec<RawOutput>,
    /// Outputs carrying a valid token quantity or a minting baton.
    pub token_outputs: Vec<RawOutput>,
    /// Token-tagged outputs whose validity is unknown or whose annotation
    /// cannot be read. Never spent and not counted in any balance.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub held: Vec<RawOutput>,
    pub tokens: BTreeMap<TokenId, TokenBalance>,
}

impl ClassifiedBalances {
    pub fn spendable_balance(&self) -> Amount {
        self.spendable.iter().map(|o| o.value).sum()
    }
}

// ==============================================================================
// Send Requests
// ==============================================================================

/// One destination of a multi-recipient send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub address: String,
    /// Display-denominated amount.
    pub amount: String,
}

impl FromStr for Recipient {
    type Err = String;

    /// Parses the `address,amount` form used by batch-send inputs.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, amount) = s
            .split_once(',')
            .ok_or_else(|| format!("expected `address,amount`, got `{s}`"))?;
        let address = address.trim();
        let amount = amount.trim();
        if address.is_empty() || amount.is_empty() {
            return Err(format!("expected `address,amount`, got `{s}`"));
        }
        Ok(Self {
            address: address.to_owned(),
            amount: amount.to_owned(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipients {
    /// A single destination. A `None` amount makes the send a no-op.
    Single {
        address: String,
        amount: Option<String>,
    },
    Many(Vec<Recipient>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendRequest {
    /// Satoshis per byte; the profile default applies when absent.
    pub fee_rate: Option<Decimal>,
    pub message: Option<String>,
    pub recipients: Recipients,
}

// ==============================================================================
// Token Requests
// ==============================================================================

/// Parameters of a new token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenConfig {
    pub name: String,
    pub ticker: String,
    pub decimals: u32,
    /// Initial supply in display units.
    pub initial_quantity: Decimal,
    #[serde(default)]
    pub document_url: Option<String>,
    /// Hex-encoded 32-byte hash of the document.
    #[serde(default)]
    pub document_hash: Option<String>,
    /// Output index that receives a minting baton; `None` fixes supply.
    #[serde(default)]
    pub mint_baton_vout: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSendRequest {
    pub token_id: TokenId,
    /// Quantity in token display units.
    pub amount: Decimal,
    pub receiver: String,
}

/// A fully signed transaction ready for broadcast.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub tx: Transaction,
    pub hex: String,
    pub txid: Txid,
    pub fee: Amount,
}

// ==============================================================================
// Transaction History
// ==============================================================================

/// One entry of an address history page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(alias = "txHash")]
    pub tx_hash: Txid,
    /// Block height; zero or negative for mempool transactions.
    pub height: i32,
}

/// History of one address, as served by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub address: String,
    pub transactions: Vec<HistoryEntry>,
}

/// A flattened history entry that remembers which wallet address it was
/// fetched for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRef {
    pub txid: Txid,
    pub height: i32,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTxInput {
    /// Address of the spent output, when the indexer resolved it.
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, with = "bitcoin::amount::serde::as_sat::opt")]
    pub value: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTxOutput {
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub value: Amount,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: ScriptBuf,
}

/// A confirmed (or mempool) transaction as delivered by the fetch capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTx {
    pub txid: Txid,
    #[serde(default)]
    pub confirmations: u32,
    #[serde(default)]
    pub height: Option<i32>,
    #[serde(default)]
    pub blocktime: Option<u64>,
    pub vin: Vec<RawTxInput>,
    pub vout: Vec<RawTxOutput>,
    /// The wallet address whose history surfaced this transaction.
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Sent,
    Received,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxCategory {
    Coin,
    Token,
    Message,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxMessage {
    pub text: String,
    /// Whether the message carried this wallet family's app prefix.
    pub is_cashtab: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlpTxType {
    Genesis,
    Mint,
    Send,
}

/// A token quantity assigned to one output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTransfer {
    pub vout: u32,
    pub address: Option<String>,
    /// Quantity in raw token units.
    pub quantity: u64,
    pub to_wallet: bool,
    /// Output pays back to an address that funded the token inputs.
    pub to_sender: bool,
}

/// Token movement decoded from a transaction's SLP output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenActivity {
    pub token_id: TokenId,
    pub tx_type: SlpTxType,
    pub transfers: Vec<TokenTransfer>,
    /// Raw quantity moved from (negative) or to (positive) the wallet.
    pub raw_delta: i128,
}

/// A categorized history event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTx {
    pub txid: Txid,
    pub confirmations: u32,
    pub height: Option<i32>,
    pub blocktime: Option<u64>,
    pub direction: Direction,
    pub category: TxCategory,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub amount_sent: Amount,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub amount_received: Amount,
    pub reply_address: Option<String>,
    pub destination_address: Option<String>,
    pub message: Option<TxMessage>,
    pub token: Option<TokenActivity>,
}

/// Token metadata from the indexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub token_id: TokenId,
    pub name: String,
    pub ticker: String,
    pub decimals: u32,
    #[serde(default)]
    pub document_url: Option<String>,
    #[serde(default)]
    pub initial_supply: Option<Decimal>,
}

/// Display-ready token figures for one history event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTxDetails {
    pub token_id: TokenId,
    pub token_name: String,
    pub token_ticker: String,
    pub tx_type: SlpTxType,
    /// Signed quantity in display units.
    pub quantity: Decimal,
    pub qty_sent: Decimal,
    pub qty_received: Decimal,
}

/// A history event with token details attached when it moved a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    #[serde(flatten)]
    pub tx: ParsedTx,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_details: Option<TokenTxDetails>,
}
