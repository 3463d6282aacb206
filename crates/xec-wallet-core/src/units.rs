//! Conversions between display amounts and integer smallest units.
//!
//! All arithmetic stays in `Decimal` or integers; a display amount that
//! needs more decimal places than the unit allows is rejected rather than
//! rounded.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::CoreError;

/// Largest scale a token or coin may declare.
pub const MAX_DECIMALS: u32 = 9;

/// Parse a user-supplied decimal string without rounding.
pub fn parse_decimal(raw: &str) -> Result<Decimal, CoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidAmount("empty amount".into()));
    }
    Decimal::from_str_exact(trimmed)
        .map_err(|e| CoreError::InvalidAmount(format!("`{trimmed}`: {e}")))
}

/// Convert a display amount into smallest units at `decimals` precision.
///
/// Fails on negative values, on more fractional digits than `decimals`, and
/// on values that do not fit a `u64`.
pub fn to_smallest_denomination(amount: Decimal, decimals: u32) -> Result<u64, CoreError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(CoreError::InvalidAmount(format!("{amount} is negative")));
    }
    let normalized = amount.normalize();
    if normalized.scale() > decimals {
        return Err(CoreError::InvalidAmount(format!(
            "{amount} has more than {decimals} decimal places"
        )));
    }
    let factor = scale_factor(decimals)?;
    normalized
        .checked_mul(factor)
        .and_then(|v| v.to_u64())
        .ok_or_else(|| CoreError::InvalidAmount(format!("{amount} is out of range")))
}

/// Render smallest units as an exact display amount.
pub fn from_smallest_denomination(units: u64, decimals: u32) -> Decimal {
    // `decimals` is bounded by MAX_DECIMALS everywhere it is sourced, well
    // under the 28-digit scale limit.
    Decimal::from_i128_with_scale(i128::from(units), decimals.min(MAX_DECIMALS))
}

/// Rescale a signed raw token quantity by `10^-decimals`.
pub fn rescale_signed(raw: i128, decimals: u32) -> Result<Decimal, CoreError> {
    if decimals > MAX_DECIMALS {
        return Err(CoreError::InvalidAmount(format!(
            "{decimals} decimals exceeds the maximum of {MAX_DECIMALS}"
        )));
    }
    Decimal::try_from_i128_with_scale(raw, decimals)
        .map_err(|e| CoreError::InvalidAmount(format!("{raw} at scale {decimals}: {e}")))
}

fn scale_factor(decimals: u32) -> Result<Decimal, CoreError> {
    if decimals > MAX_DECIMALS {
        return Err(CoreError::InvalidAmount(format!(
            "{decimals} decimals exceeds the maximum of {MAX_DECIMALS}"
        )));
    }
    Ok(Decimal::from(10u64.pow(decimals)))
}
