//! Byte-accurate fee estimation for P2PKH transactions.

use bitcoin::{Amount, VarInt};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::CoreError;
use crate::profile::NetworkProfile;

/// Signed P2PKH input: outpoint, script length, push(sig+hashtype), push(pubkey), sequence.
pub const P2PKH_INPUT_BYTES: usize = 148;
/// P2PKH output: value, script length, 25-byte script.
pub const P2PKH_OUTPUT_BYTES: usize = 34;
const VERSION_BYTES: usize = 4;
const LOCKTIME_BYTES: usize = 4;
const OUTPUT_VALUE_BYTES: usize = 8;

/// The parts of a candidate transaction that determine its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxShape {
    pub inputs: usize,
    pub p2pkh_outputs: usize,
    /// Length of an OP_RETURN output script, when one is present.
    pub op_return_len: Option<usize>,
}

impl TxShape {
    pub fn new(inputs: usize, p2pkh_outputs: usize) -> Self {
        Self {
            inputs,
            p2pkh_outputs,
            op_return_len: None,
        }
    }

    pub fn with_op_return(mut self, script_len: usize) -> Self {
        self.op_return_len = Some(script_len);
        self
    }

    pub fn output_count(&self) -> usize {
        self.p2pkh_outputs + usize::from(self.op_return_len.is_some())
    }

    /// Serialized size in bytes once every input carries a signature.
    pub fn estimated_size(&self) -> usize {
        let op_return = self
            .op_return_len
            .map(|len| OUTPUT_VALUE_BYTES + VarInt(len as u64).size() + len)
            .unwrap_or(0);

        VERSION_BYTES
            + VarInt(self.inputs as u64).size()
            + self.inputs * P2PKH_INPUT_BYTES
            + VarInt(self.output_count() as u64).size()
            + self.p2pkh_outputs * P2PKH_OUTPUT_BYTES
            + op_return
            + LOCKTIME_BYTES
    }
}

/// `ceil(fee_rate * bytes)` in satoshis; never rounds down.
#[must_use]
pub fn compute_fee(shape: &TxShape, fee_rate: Decimal) -> Amount {
    let bytes = Decimal::from(shape.estimated_size() as u64);
    let sats = fee_rate
        .checked_mul(bytes)
        .map(|fee| fee.ceil())
        .and_then(|fee| fee.to_u64())
        .unwrap_or(u64::MAX);
    Amount::from_sat(sats)
}

/// The requested rate, or the profile default, in sat/B. Zero and negative
/// rates are rejected.
pub fn resolve_fee_rate(
    requested: Option<Decimal>,
    profile: &NetworkProfile,
) -> Result<Decimal, CoreError> {
    let rate = requested.unwrap_or(profile.default_fee_rate);
    if rate.is_sign_negative() || rate.is_zero() {
        return Err(CoreError::InvalidAmount(format!(
            "fee rate {rate} must be positive"
        )));
    }
    Ok(rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn two_in_two_out_matches_calibrated_fee() {
        let shape = TxShape::new(2, 2);
        assert_eq!(shape.estimated_size(), 374);
        assert_eq!(compute_fee(&shape, dec!(1.01)), Amount::from_sat(378));
    }

    #[test]
    fn one_in_two_out_fee() {
        let shape = TxShape::new(1, 2);
        assert_eq!(shape.estimated_size(), 226);
        assert_eq!(compute_fee(&shape, dec!(1.01)), Amount::from_sat(229));
    }

    #[test]
    fn fee_always_rounds_up() {
        // 192 bytes at 1.001 sat/B is 192.192.
        let shape = TxShape::new(1, 1);
        assert_eq!(shape.estimated_size(), 192);
        assert_eq!(compute_fee(&shape, dec!(1.001)), Amount::from_sat(193));
        assert_eq!(compute_fee(&shape, dec!(1)), Amount::from_sat(192));
    }

    #[test]
    fn op_return_counts_its_exact_bytes() {
        let base = TxShape::new(1, 2);
        let with_msg = base.with_op_return(20);
        // value(8) + varint(1) + script(20)
        assert_eq!(with_msg.estimated_size() - base.estimated_size(), 29);
        assert_eq!(with_msg.output_count(), 3);
    }

    #[test]
    fn large_input_counts_use_wider_varints() {
        let shape = TxShape::new(253, 1);
        assert_eq!(
            shape.estimated_size(),
            4 + 3 + 253 * P2PKH_INPUT_BYTES + 1 + P2PKH_OUTPUT_BYTES + 4
        );
    }

    #[test]
    fn fee_rate_defaults_to_profile_and_rejects_non_positive() {
        let profile = NetworkProfile::mainnet();
        assert_eq!(resolve_fee_rate(None, &profile).unwrap(), dec!(1.01));
        assert_eq!(resolve_fee_rate(Some(dec!(2.5)), &profile).unwrap(), dec!(2.5));
        for rate in [dec!(-1), dec!(0), dec!(-0.01)] {
            let err = resolve_fee_rate(Some(rate), &profile).unwrap_err();
            assert!(matches!(err, CoreError::InvalidAmount(_)), "{rate}: {err:?}");
        }
    }
}
