//! Base-coin send: input selection, output construction, signing and
//! broadcast.

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::transaction::Version;
use bitcoin::{Amount, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, info};

use crate::address::CashAddress;
use crate::error::CoreError;
use crate::fee::{compute_fee, resolve_fee_rate, TxShape};
use crate::profile::NetworkProfile;
use crate::rpc::Broadcaster;
use crate::script::cashtab_message_script;
use crate::types::{RawOutput, Recipients, SendRequest, SignedTransaction};
use crate::units::{from_smallest_denomination, parse_decimal, to_smallest_denomination};
use crate::wallet::{Signer, Wallet};

/// Build and sign a base-coin send without broadcasting it.
///
/// Returns `Ok(None)` when a single recipient has no amount yet; nothing is
/// validated in that case. Otherwise the wallet is validated first, then
/// every destination, then funds.
pub fn build_send_transaction(
    wallet: &Wallet,
    utxos: &[RawOutput],
    request: &SendRequest,
    profile: &NetworkProfile,
) -> Result<Option<SignedTransaction>, CoreError> {
    let raw_destinations: Vec<(&str, &str)> = match &request.recipients {
        Recipients::Single { amount: None, .. } => {
            debug!("send requested without an amount");
            return Ok(None);
        }
        Recipients::Single {
            address,
            amount: Some(amount),
        } => vec![(address.as_str(), amount.as_str())],
        Recipients::Many(list) => list
            .iter()
            .map(|r| (r.address.as_str(), r.amount.as_str()))
            .collect(),
    };

    let signer = wallet.signer(&profile.address_prefix)?;

    if raw_destinations.is_empty() {
        return Err(CoreError::InvalidRecipients("no destinations".into()));
    }

    let mut destinations = Vec::with_capacity(raw_destinations.len());
    for (address, amount) in raw_destinations {
        let address = CashAddress::parse(address, &profile.address_prefix)?;
        let amount = parse_display_amount(amount, profile)?;
        destinations.push(TxOut {
            value: amount,
            script_pubkey: address.script_pubkey(),
        });
    }

    let message = request
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(|m| message_output(m, profile))
        .transpose()?;

    let fee_rate = resolve_fee_rate(request.fee_rate, profile)?;
    let target = sum_amounts(destinations.iter().map(|o| o.value))?;
    let p2pkh_outputs = destinations.len() + 1;
    let op_return_len = message.as_ref().map(|o| o.script_pubkey.len());

    let selection = select_inputs(&[], utxos, target, fee_rate, |inputs| TxShape {
        inputs,
        p2pkh_outputs,
        op_return_len,
    })?;

    let mut outputs = Vec::with_capacity(destinations.len() + 2);
    outputs.extend(message);
    outputs.extend(destinations);
    let change = selection.remainder(target);
    if change >= profile.dust_threshold() {
        let change_address = signer.change_address(selection.inputs.first());
        outputs.push(TxOut {
            value: change,
            script_pubkey: change_address.script_pubkey(),
        });
    } else {
        debug!(change = change.to_sat(), "change below dust left to fee");
    }

    finalize_transaction(&signer, selection.inputs, outputs).map(Some)
}

/// Build, sign and broadcast a base-coin send; returns the explorer link.
///
/// Broadcast failures are returned exactly as the broadcaster reported them.
pub async fn send_xec(
    broadcaster: &dyn Broadcaster,
    wallet: &Wallet,
    utxos: &[RawOutput],
    request: &SendRequest,
    profile: &NetworkProfile,
) -> Result<Option<String>, CoreError> {
    let Some(signed) = build_send_transaction(wallet, utxos, request, profile)? else {
        return Ok(None);
    };
    let txid = broadcaster.broadcast_raw_transaction(&signed.hex).await?;
    info!(%txid, fee = signed.fee.to_sat(), "broadcast send");
    Ok(Some(format!("{}/tx/{}", profile.explorer_url, txid)))
}

// ==============================================================================
// Shared Building Blocks
// ==============================================================================

/// Parse a display amount and enforce positivity and the dust threshold.
pub(crate) fn parse_display_amount(
    raw: &str,
    profile: &NetworkProfile,
) -> Result<Amount, CoreError> {
    let value = parse_decimal(raw)?;
    if value.is_sign_negative() || value.is_zero() {
        return Err(CoreError::InvalidAmount(format!("`{raw}` must be positive")));
    }

    // Dust is judged on the exact display value, before any precision check.
    let threshold = profile.dust_threshold();
    let threshold_display = from_smallest_denomination(threshold.to_sat(), profile.cash_decimals);
    if value < threshold_display {
        let truncated = value.round_dp_with_strategy(profile.cash_decimals, RoundingStrategy::ToZero);
        let amount = to_smallest_denomination(truncated, profile.cash_decimals)
            .map(Amount::from_sat)
            .unwrap_or(Amount::ZERO);
        return Err(CoreError::DustAmount { amount, threshold });
    }

    let sats = to_smallest_denomination(value, profile.cash_decimals)?;
    Ok(Amount::from_sat(sats))
}

fn message_output(message: &str, profile: &NetworkProfile) -> Result<TxOut, CoreError> {
    let script = cashtab_message_script(message)?;
    check_op_return_size(&script, profile)?;
    Ok(TxOut {
        value: Amount::ZERO,
        script_pubkey: script,
    })
}

pub(crate) fn check_op_return_size(
    script: &ScriptBuf,
    profile: &NetworkProfile,
) -> Result<(), CoreError> {
    if script.len() > profile.op_return_max_bytes {
        return Err(CoreError::MessageTooLong {
            size: script.len(),
            limit: profile.op_return_max_bytes,
        });
    }
    Ok(())
}

pub(crate) fn sum_amounts(amounts: impl IntoIterator<Item = Amount>) -> Result<Amount, CoreError> {
    amounts
        .into_iter()
        .try_fold(Amount::ZERO, |acc, a| acc.checked_add(a))
        .ok_or_else(|| CoreError::InvalidAmount("total amount overflows".into()))
}

/// Inputs chosen to fund a transaction.
#[derive(Debug)]
pub(crate) struct Selection {
    pub inputs: Vec<RawOutput>,
    pub input_total: Amount,
    pub fee: Amount,
}

impl Selection {
    /// Value left after paying `target` and the fee. Only valid for a
    /// selection that covers both.
    pub fn remainder(&self, target: Amount) -> Amount {
        self.input_total
            .checked_sub(target)
            .and_then(|r| r.checked_sub(self.fee))
            .unwrap_or(Amount::ZERO)
    }
}

/// Accumulate `candidates` in order after the mandatory `fixed` inputs,
/// re-pricing the fee after every addition, until the inputs cover
/// `target` plus the fee for the current shape.
pub(crate) fn select_inputs(
    fixed: &[RawOutput],
    candidates: &[RawOutput],
    target: Amount,
    fee_rate: Decimal,
    shape_for: impl Fn(usize) -> TxShape,
) -> Result<Selection, CoreError> {
    let covers = |total: Amount, fee: Amount| {
        target
            .checked_add(fee)
            .is_some_and(|required| total >= required)
    };

    let mut inputs = fixed.to_vec();
    let mut input_total = sum_amounts(fixed.iter().map(|o| o.value))?;
    let mut fee = compute_fee(&shape_for(inputs.len()), fee_rate);

    for candidate in candidates {
        if !inputs.is_empty() && covers(input_total, fee) {
            break;
        }
        inputs.push(candidate.clone());
        input_total = input_total
            .checked_add(candidate.value)
            .ok_or_else(|| CoreError::InvalidAmount("input total overflows".into()))?;
        fee = compute_fee(&shape_for(inputs.len()), fee_rate);
    }

    if inputs.is_empty() || !covers(input_total, fee) {
        let available = sum_amounts(fixed.iter().chain(candidates).map(|o| o.value))?;
        let required = target.checked_add(fee).unwrap_or(Amount::MAX);
        debug!(
            available = available.to_sat(),
            required = required.to_sat(),
            "insufficient funds"
        );
        return Err(CoreError::InsufficientFunds {
            available,
            required,
        });
    }

    debug!(
        inputs = inputs.len(),
        input_total = input_total.to_sat(),
        fee = fee.to_sat(),
        "selected inputs"
    );
    Ok(Selection {
        inputs,
        input_total,
        fee,
    })
}

/// Assemble a version 2 transaction spending `inputs`, sign it and
/// serialize it.
pub(crate) fn finalize_transaction(
    signer: &Signer,
    inputs: Vec<RawOutput>,
    outputs: Vec<TxOut>,
) -> Result<SignedTransaction, CoreError> {
    let mut tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: inputs
            .iter()
            .map(|o| TxIn {
                previous_output: o.outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
            .collect(),
        output: outputs,
    };
    signer.sign_transaction(&mut tx, &inputs)?;

    let input_total = sum_amounts(inputs.iter().map(|o| o.value))?;
    let output_total = sum_amounts(tx.output.iter().map(|o| o.value))?;
    let fee = input_total.checked_sub(output_total).ok_or_else(|| {
        CoreError::Signing(format!(
            "outputs ({output_total}) exceed inputs ({input_total})"
        ))
    })?;

    let hex = serialize_hex(&tx);
    let txid = tx.compute_txid();
    debug!(%txid, bytes = hex.len() / 2, fee = fee.to_sat(), "built transaction");
    Ok(SignedTransaction { tx, hex, txid, fee })
}
