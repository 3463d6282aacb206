//! Token metadata enrichment for parsed history events.

use rust_decimal::Decimal;

use crate::error::CoreError;
use crate::types::{ParsedTx, TokenInfo, TokenTxDetails};
use crate::units::rescale_signed;

/// Attach display figures to a token event.
///
/// The raw delta is rescaled by the token's decimals; its sign decides
/// whether the magnitude is reported as sent or received.
pub fn parse_token_info_for_tx_history(
    tx: &ParsedTx,
    info: &TokenInfo,
) -> Result<TokenTxDetails, CoreError> {
    let activity = tx.token.as_ref().ok_or_else(|| {
        CoreError::InvalidTxData(format!("transaction {} carries no token activity", tx.txid))
    })?;
    if activity.token_id != info.token_id {
        return Err(CoreError::InvalidTxData(format!(
            "token info for {} does not match transaction token {}",
            info.token_id, activity.token_id
        )));
    }

    let quantity = rescale_signed(activity.raw_delta, info.decimals)?;
    let (qty_sent, qty_received) = if quantity.is_sign_negative() {
        (quantity.abs(), Decimal::ZERO)
    } else {
        (Decimal::ZERO, quantity)
    };

    Ok(TokenTxDetails {
        token_id: info.token_id,
        token_name: info.name.clone(),
        token_ticker: info.ticker.clone(),
        tx_type: activity.tx_type,
        quantity,
        qty_sent,
        qty_received,
    })
}
