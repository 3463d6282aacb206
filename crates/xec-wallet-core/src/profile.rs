//! Network profile: the policy constants that shape every transaction.
//!
//! Fee rate, dust thresholds, denomination scale and explorer URLs are
//! carried as data so that a deployment can swap them without touching
//! builder code. `NetworkProfile::mainnet()` holds the eCash defaults.

use std::path::Path;

use bitcoin::Amount;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::rpc::explorer_base;

/// Relay policy limit for a single OP_RETURN output script.
pub const OP_RETURN_MAX_BYTES: usize = 223;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkProfile {
    pub ticker: String,
    /// CashAddr prefix used when rendering addresses (`ecash`).
    pub address_prefix: String,
    /// Decimal places between the display unit and the satoshi.
    pub cash_decimals: u32,
    /// Satoshis per byte used when a request does not name its own rate.
    pub default_fee_rate: Decimal,
    /// Smallest base-coin output the network relays.
    pub dust_sats: u64,
    /// Value attached to each token-carrying output.
    pub token_dust_sats: u64,
    pub explorer_url: String,
    pub token_explorer_url: String,
    /// Upper bound on flattened history entries.
    pub tx_history_count: usize,
    /// Addresses hydrated per indexer request.
    pub hydrate_batch_size: usize,
    pub op_return_max_bytes: usize,
}

impl NetworkProfile {
    pub fn mainnet() -> Self {
        Self {
            ticker: "XEC".into(),
            address_prefix: "ecash".into(),
            cash_decimals: 2,
            default_fee_rate: Decimal::new(101, 2),
            dust_sats: 550,
            token_dust_sats: 546,
            explorer_url: "https://explorer.bitcoinabc.org".into(),
            token_explorer_url: "https://explorer.be.cash".into(),
            tx_history_count: 10,
            hydrate_batch_size: 20,
            op_return_max_bytes: OP_RETURN_MAX_BYTES,
        }
    }

    pub fn testnet() -> Self {
        Self {
            address_prefix: "ectest".into(),
            explorer_url: "https://texplorer.bitcoinabc.org".into(),
            token_explorer_url: "https://texplorer.bitcoinabc.org".into(),
            ..Self::mainnet()
        }
    }

    pub fn dust_threshold(&self) -> Amount {
        Amount::from_sat(self.dust_sats)
    }

    pub fn token_dust(&self) -> Amount {
        Amount::from_sat(self.token_dust_sats)
    }

    /// Parse a JSON profile; absent fields fall back to mainnet values.
    pub fn from_json_str(content: &str) -> Result<Self, CoreError> {
        let mut profile: Self = serde_json::from_str(content)
            .map_err(|e| CoreError::InvalidConfig(format!("network profile: {e}")))?;
        profile.explorer_url = explorer_base("explorerUrl", &profile.explorer_url)?;
        profile.token_explorer_url =
            explorer_base("tokenExplorerUrl", &profile.token_explorer_url)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.default_fee_rate.is_sign_negative() || self.default_fee_rate.is_zero() {
            return Err(CoreError::InvalidConfig(
                "defaultFeeRate must be positive".into(),
            ));
        }
        if self.cash_decimals > 9 {
            return Err(CoreError::InvalidConfig(
                "cashDecimals must be between 0 and 9".into(),
            ));
        }
        if self.hydrate_batch_size == 0 {
            return Err(CoreError::InvalidConfig(
                "hydrateBatchSize must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for NetworkProfile {
    fn default() -> Self {
        Self::mainnet()
    }
}
