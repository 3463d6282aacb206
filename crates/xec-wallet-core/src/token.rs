//! SLP token transactions: GENESIS (create) and SEND.

use bitcoin::hex::FromHex;
use bitcoin::{Amount, TxOut};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::address::CashAddress;
use crate::error::CoreError;
use crate::fee::TxShape;
use crate::profile::NetworkProfile;
use crate::rpc::Broadcaster;
use crate::script::{slp_genesis_script, slp_send_script, GenesisFields};
use crate::fee::resolve_fee_rate;
use crate::send::{check_op_return_size, finalize_transaction, select_inputs};
use crate::types::{
    ClassifiedBalances, RawOutput, SignedTransaction, TokenConfig, TokenSendRequest,
    TokenUtxoType,
};
use crate::units::{from_smallest_denomination, to_smallest_denomination, MAX_DECIMALS};
use crate::wallet::Wallet;

/// Output index that receives a minting baton.
pub const MINT_BATON_VOUT: u8 = 2;

// ==============================================================================
// Genesis
// ==============================================================================

/// Build and sign a GENESIS transaction.
///
/// Output 0 is the GENESIS script, output 1 receives the whole initial
/// supply at the wallet's primary address, output 2 the minting baton when
/// one is requested, followed by base-coin change.
pub fn build_genesis_transaction(
    wallet: &Wallet,
    utxos: &[RawOutput],
    fee_rate: Option<Decimal>,
    config: &TokenConfig,
    profile: &NetworkProfile,
) -> Result<SignedTransaction, CoreError> {
    let signer = wallet.signer(&profile.address_prefix)?;
    let fee_rate = resolve_fee_rate(fee_rate, profile)?;

    let script = slp_genesis_script(&genesis_fields(config)?)?;
    check_op_return_size(&script, profile)?;

    let mint_address = signer.primary_address().clone();
    let mut outputs = vec![
        TxOut {
            value: Amount::ZERO,
            script_pubkey: script,
        },
        TxOut {
            value: profile.token_dust(),
            script_pubkey: mint_address.script_pubkey(),
        },
    ];
    if config.mint_baton_vout.is_some() {
        outputs.push(TxOut {
            value: profile.token_dust(),
            script_pubkey: mint_address.script_pubkey(),
        });
    }

    let token_outputs = outputs.len() - 1;
    let target = profile
        .token_dust()
        .checked_mul(token_outputs as u64)
        .ok_or_else(|| CoreError::InvalidAmount("token dust overflows".into()))?;
    let op_return_len = outputs[0].script_pubkey.len();
    let selection = select_inputs(&[], utxos, target, fee_rate, |inputs| {
        TxShape::new(inputs, token_outputs + 1).with_op_return(op_return_len)
    })?;

    let change = selection.remainder(target);
    if change >= profile.dust_threshold() {
        outputs.push(TxOut {
            value: change,
            script_pubkey: mint_address.script_pubkey(),
        });
    }

    debug!(
        ticker = %config.ticker,
        decimals = config.decimals,
        baton = config.mint_baton_vout.is_some(),
        "building genesis"
    );
    finalize_transaction(&signer, selection.inputs, outputs)
}

/// Create a token; returns the token explorer link for the genesis tx.
pub async fn create_token(
    broadcaster: &dyn Broadcaster,
    wallet: &Wallet,
    utxos: &[RawOutput],
    fee_rate: Option<Decimal>,
    config: &TokenConfig,
    profile: &NetworkProfile,
) -> Result<String, CoreError> {
    let signed = build_genesis_transaction(wallet, utxos, fee_rate, config, profile)?;
    let txid = broadcaster.broadcast_raw_transaction(&signed.hex).await?;
    info!(%txid, ticker = %config.ticker, "broadcast genesis");
    Ok(format!("{}/tx/{}", profile.token_explorer_url, txid))
}

fn genesis_fields(config: &TokenConfig) -> Result<GenesisFields<'_>, CoreError> {
    if config.ticker.trim().is_empty() || config.name.trim().is_empty() {
        return Err(CoreError::InvalidTokenConfig(
            "name and ticker are required".into(),
        ));
    }
    if config.decimals > MAX_DECIMALS {
        return Err(CoreError::InvalidTokenConfig(format!(
            "decimals must be between 0 and {MAX_DECIMALS}, got {}",
            config.decimals
        )));
    }
    let initial_quantity = to_smallest_denomination(config.initial_quantity, config.decimals)
        .map_err(|e| CoreError::InvalidTokenConfig(format!("initial quantity: {e}")))?;

    let document_hash = match config.document_hash.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => {
            let bytes = Vec::<u8>::from_hex(raw)
                .map_err(|e| CoreError::InvalidTokenConfig(format!("document hash: {e}")))?;
            let hash: [u8; 32] = bytes.try_into().map_err(|_| {
                CoreError::InvalidTokenConfig("document hash must be 32 bytes".into())
            })?;
            Some(hash)
        }
    };

    let mint_baton_vout = match config.mint_baton_vout {
        None => None,
        Some(MINT_BATON_VOUT) => Some(MINT_BATON_VOUT),
        Some(other) => {
            return Err(CoreError::InvalidTokenConfig(format!(
                "mint baton must go to output {MINT_BATON_VOUT}, got {other}"
            )))
        }
    };

    Ok(GenesisFields {
        ticker: config.ticker.trim(),
        name: config.name.trim(),
        document_url: config.document_url.as_deref().unwrap_or("").trim(),
        document_hash,
        decimals: config.decimals as u8,
        mint_baton_vout,
        initial_quantity,
    })
}

// ==============================================================================
// Send
// ==============================================================================

/// Build and sign an SLP SEND.
///
/// Output 0 is the SEND script, output 1 the receiver, output 2 the token
/// change back to the first token input's address when the selected token
/// inputs exceed the amount, then base-coin change to the primary address.
pub fn build_token_send_transaction(
    wallet: &Wallet,
    balances: &ClassifiedBalances,
    fee_rate: Option<Decimal>,
    request: &TokenSendRequest,
    profile: &NetworkProfile,
) -> Result<SignedTransaction, CoreError> {
    let signer = wallet.signer(&profile.address_prefix)?;
    let fee_rate = resolve_fee_rate(fee_rate, profile)?;

    if balances.spendable.is_empty() {
        return Err(CoreError::InsufficientFunds {
            available: Amount::ZERO,
            required: profile.token_dust(),
        });
    }
    if request.amount.is_sign_negative() || request.amount.is_zero() {
        return Err(CoreError::InvalidAmount(format!(
            "token amount {} must be positive",
            request.amount
        )));
    }
    let receiver = CashAddress::parse(&request.receiver, &profile.address_prefix)?;

    let candidates: Vec<&RawOutput> = balances
        .token_outputs
        .iter()
        .filter(|o| {
            o.valid_token().is_some_and(|t| {
                t.token_id == request.token_id && t.utxo_type == TokenUtxoType::Token
            })
        })
        .collect();
    let decimals = candidates
        .first()
        .and_then(|o| o.token.as_ref())
        .map(|t| t.decimals)
        .or_else(|| balances.tokens.get(&request.token_id).map(|b| b.decimals))
        .unwrap_or(0);
    let send_raw = to_smallest_denomination(request.amount, decimals)?;

    let mut token_inputs = Vec::new();
    let mut selected_raw: u64 = 0;
    for output in &candidates {
        if selected_raw >= send_raw {
            break;
        }
        let Some(token) = output.token.as_ref() else {
            continue;
        };
        let raw = to_smallest_denomination(token.quantity, decimals)?;
        selected_raw = selected_raw
            .checked_add(raw)
            .ok_or_else(|| CoreError::InvalidAmount("token total overflows".into()))?;
        token_inputs.push((*output).clone());
    }
    if selected_raw < send_raw {
        return Err(CoreError::InsufficientTokens {
            token_id: request.token_id,
            available: from_smallest_denomination(selected_raw, decimals),
            required: request.amount,
        });
    }

    let token_change = selected_raw - send_raw;
    let mut quantities = vec![send_raw];
    if token_change > 0 {
        quantities.push(token_change);
    }
    let script = slp_send_script(&request.token_id, &quantities)?;
    check_op_return_size(&script, profile)?;

    let mut outputs = vec![
        TxOut {
            value: Amount::ZERO,
            script_pubkey: script,
        },
        TxOut {
            value: profile.token_dust(),
            script_pubkey: receiver.script_pubkey(),
        },
    ];
    if token_change > 0 {
        let change_address = signer.change_address(token_inputs.first());
        outputs.push(TxOut {
            value: profile.token_dust(),
            script_pubkey: change_address.script_pubkey(),
        });
    }

    let token_outputs = quantities.len();
    let target = profile
        .token_dust()
        .checked_mul(token_outputs as u64)
        .ok_or_else(|| CoreError::InvalidAmount("token dust overflows".into()))?;
    let op_return_len = outputs[0].script_pubkey.len();
    let selection = select_inputs(
        &token_inputs,
        &balances.spendable,
        target,
        fee_rate,
        |inputs| TxShape::new(inputs, token_outputs + 1).with_op_return(op_return_len),
    )?;

    let change = selection.remainder(target);
    if change >= profile.dust_threshold() {
        outputs.push(TxOut {
            value: change,
            script_pubkey: signer.primary_address().script_pubkey(),
        });
    }

    debug!(
        token_id = %request.token_id,
        send_raw,
        token_change,
        token_inputs = token_inputs.len(),
        "building token send"
    );
    finalize_transaction(&signer, selection.inputs, outputs)
}

/// Send tokens; returns the explorer link.
pub async fn send_token(
    broadcaster: &dyn Broadcaster,
    wallet: &Wallet,
    balances: &ClassifiedBalances,
    fee_rate: Option<Decimal>,
    request: &TokenSendRequest,
    profile: &NetworkProfile,
) -> Result<String, CoreError> {
    let signed = build_token_send_transaction(wallet, balances, fee_rate, request, profile)?;
    let txid = broadcaster.broadcast_raw_transaction(&signed.hex).await?;
    info!(%txid, token_id = %request.token_id, "broadcast token send");
    Ok(format!("{}/tx/{}", profile.explorer_url, txid))
}
