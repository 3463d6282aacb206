//! UTXO classification: spendable base coin versus token holdings.

use bitcoin::OutPoint;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::types::{
    ClassifiedBalances, HydratedUtxo, HydratedUtxoDetails, RawOutput, TokenAnnotation,
    TokenBalance, TokenId, TokenUtxoType,
};
use crate::units::MAX_DECIMALS;

// ==============================================================================
// Batch Flattening
// ==============================================================================

/// Concatenate hydration responses fetched in address batches.
///
/// The result is indistinguishable from a single unbatched response over
/// the same addresses in the same order.
pub fn flatten_hydrated_batches(
    batches: impl IntoIterator<Item = HydratedUtxoDetails>,
) -> HydratedUtxoDetails {
    HydratedUtxoDetails {
        slp_utxos: batches.into_iter().flat_map(|b| b.slp_utxos).collect(),
    }
}

/// How one indexer record takes part in classification.
#[derive(Debug, Clone, PartialEq)]
pub enum HydratedRecord {
    /// A usable output: plain base coin, an explicitly invalid token
    /// output, or a well-formed valid token annotation.
    Output(RawOutput),
    /// Tagged with a token id but not usable as a token: validity unknown
    /// or annotation malformed. Such an output may still carry tokens, so
    /// it is neither spent nor counted.
    Held(RawOutput),
}

/// Convert one indexer record tagged with the address it pays to.
pub fn record_from_hydrated(address: &str, utxo: &HydratedUtxo) -> HydratedRecord {
    let mut output = RawOutput {
        outpoint: OutPoint::new(utxo.txid, utxo.vout),
        value: utxo.value,
        address: address.to_owned(),
        token: None,
    };
    match parse_annotation(utxo) {
        Annotation::Plain => HydratedRecord::Output(output),
        Annotation::Token(token) => {
            output.token = Some(token);
            HydratedRecord::Output(output)
        }
        Annotation::Unusable => HydratedRecord::Held(output),
    }
}

enum Annotation {
    Plain,
    Token(TokenAnnotation),
    Unusable,
}

fn parse_annotation(utxo: &HydratedUtxo) -> Annotation {
    let Some(raw_id) = utxo.token_id.as_deref() else {
        return Annotation::Plain;
    };
    let is_valid = match utxo.is_valid {
        Some(false) => return Annotation::Plain,
        Some(true) => true,
        None => {
            debug!(txid = %utxo.txid, vout = utxo.vout, "token validity unknown; holding output");
            return Annotation::Unusable;
        }
    };

    let token_id: TokenId = match raw_id.parse() {
        Ok(id) => id,
        Err(e) => {
            debug!(txid = %utxo.txid, vout = utxo.vout, error = %e, "unreadable token id; holding output");
            return Annotation::Unusable;
        }
    };

    let utxo_type = match utxo.utxo_type.as_deref() {
        Some("minting-baton") => TokenUtxoType::MintingBaton,
        _ => TokenUtxoType::Token,
    };

    let quantity = match (&utxo.token_qty, utxo_type) {
        (None, TokenUtxoType::MintingBaton) => Decimal::ZERO,
        (None, TokenUtxoType::Token) => {
            debug!(txid = %utxo.txid, vout = utxo.vout, "token output without quantity");
            return Annotation::Unusable;
        }
        (Some(value), _) => match quantity_from_json(value) {
            Some(q) => q,
            None => {
                debug!(txid = %utxo.txid, vout = utxo.vout, qty = %value, "unparsable token quantity");
                return Annotation::Unusable;
            }
        },
    };

    // Missing decimals fall back to the quantity's own scale.
    let decimals = utxo
        .decimals
        .unwrap_or_else(|| quantity.normalize().scale());
    if decimals > MAX_DECIMALS || quantity.normalize().scale() > decimals {
        debug!(
            txid = %utxo.txid,
            vout = utxo.vout,
            decimals,
            %quantity,
            "token quantity does not fit declared decimals"
        );
        return Annotation::Unusable;
    }

    Annotation::Token(TokenAnnotation {
        token_id,
        quantity,
        utxo_type,
        is_valid,
        decimals,
        ticker: utxo.token_ticker.clone(),
        name: utxo.token_name.clone(),
    })
}

fn quantity_from_json(value: &serde_json::Value) -> Option<Decimal> {
    let text = match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let quantity = Decimal::from_str_exact(text.trim()).ok()?;
    (!quantity.is_sign_negative()).then_some(quantity)
}

// ==============================================================================
// Classification
// ==============================================================================

/// Classify a hydration response in a single pass over its records.
///
/// Records tagged with a token id that cannot be read as a valid token go
/// to `held`; everything else is placed as [`classify_outputs`] would.
pub fn classify_utxos(details: &HydratedUtxoDetails) -> ClassifiedBalances {
    let mut classified = ClassifiedBalances::default();
    for group in &details.slp_utxos {
        for utxo in &group.utxos {
            match record_from_hydrated(&group.address, utxo) {
                HydratedRecord::Output(output) => place_output(&mut classified, output),
                HydratedRecord::Held(output) => classified.held.push(output),
            }
        }
    }
    log_summary(&classified);
    classified
}

/// Partition outputs in a single pass.
///
/// Valid token outputs with a non-zero quantity add to their token's
/// balance; valid minting batons flag the token but add nothing. Both are
/// kept out of the spendable set. Everything else, including zero-quantity
/// token outputs, is spendable base coin in input order.
pub fn classify_outputs(outputs: &[RawOutput]) -> ClassifiedBalances {
    let mut classified = ClassifiedBalances::default();
    for output in outputs {
        place_output(&mut classified, output.clone());
    }
    log_summary(&classified);
    classified
}

fn place_output(classified: &mut ClassifiedBalances, output: RawOutput) {
    let Some(token) = output.valid_token() else {
        classified.spendable.push(output);
        return;
    };
    let is_baton = token.utxo_type == TokenUtxoType::MintingBaton;
    if !is_baton && token.quantity.is_zero() {
        classified.spendable.push(output);
        return;
    }

    let entry = classified
        .tokens
        .entry(token.token_id)
        .or_insert_with(|| TokenBalance {
            token_id: token.token_id,
            balance: Decimal::ZERO,
            has_baton: false,
            decimals: token.decimals,
            ticker: None,
            name: None,
        });
    if entry.ticker.is_none() {
        entry.ticker.clone_from(&token.ticker);
    }
    if entry.name.is_none() {
        entry.name.clone_from(&token.name);
    }

    if is_baton {
        entry.has_baton = true;
    } else {
        match entry.balance.checked_add(token.quantity) {
            Some(sum) => entry.balance = sum,
            None => warn!(
                token_id = %token.token_id,
                outpoint = %output.outpoint,
                "token balance overflow; output left out of the total"
            ),
        }
    }
    classified.token_outputs.push(output);
}

fn log_summary(classified: &ClassifiedBalances) {
    debug!(
        spendable = classified.spendable.len(),
        token_outputs = classified.token_outputs.len(),
        held = classified.held.len(),
        tokens = classified.tokens.len(),
        "classified outputs"
    );
}
