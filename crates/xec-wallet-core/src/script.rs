//! OP_RETURN encoding and decoding: app messages and SLP token scripts.

use bitcoin::opcodes::all::OP_RETURN;
use bitcoin::script::Instruction;
use bitcoin::{Script, ScriptBuf};

use crate::error::CoreError;
use crate::types::{SlpTxType, TokenId, TxMessage};

/// Lokad prefix of messages written by this wallet family.
pub const CASHTAB_PREFIX: [u8; 4] = [0x00, 0x74, 0x61, 0x62];
/// Lokad prefix of the Simple Ledger Protocol.
pub const SLP_LOKAD: [u8; 4] = *b"SLP\0";
const SLP_TOKEN_TYPE_FUNGIBLE: u8 = 0x01;
/// SEND carries at most 19 output quantities.
pub const SLP_MAX_SEND_OUTPUTS: usize = 19;

const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const MAX_PUSH: usize = 520;

// ==============================================================================
// Push Encoding
// ==============================================================================

/// Append one data push. Empty pushes use `OP_PUSHDATA1 0x00`, the form SLP
/// parsers expect for absent fields.
fn push_data(script: &mut Vec<u8>, data: &[u8]) -> Result<(), CoreError> {
    match data.len() {
        0 => script.extend_from_slice(&[OP_PUSHDATA1, 0x00]),
        len @ 1..=75 => script.push(len as u8),
        len @ 76..=255 => script.extend_from_slice(&[OP_PUSHDATA1, len as u8]),
        len @ 256..=MAX_PUSH => {
            script.push(OP_PUSHDATA2);
            script.extend_from_slice(&(len as u16).to_le_bytes());
        }
        len => {
            return Err(CoreError::InvalidTxData(format!(
                "push of {len} bytes exceeds {MAX_PUSH}"
            )))
        }
    }
    script.extend_from_slice(data);
    Ok(())
}

fn op_return_with_lokad(lokad: &[u8; 4]) -> Vec<u8> {
    let mut script = vec![OP_RETURN.to_u8()];
    script.push(lokad.len() as u8);
    script.extend_from_slice(lokad);
    script
}

// ==============================================================================
// Messages
// ==============================================================================

/// `OP_RETURN 0x04 00746162 <message>`
pub fn cashtab_message_script(message: &str) -> Result<ScriptBuf, CoreError> {
    let mut script = op_return_with_lokad(&CASHTAB_PREFIX);
    push_data(&mut script, message.as_bytes())?;
    Ok(ScriptBuf::from_bytes(script))
}

pub fn is_op_return(script: &Script) -> bool {
    script.as_bytes().first() == Some(&OP_RETURN.to_u8())
}

fn has_lokad(script: &Script, lokad: &[u8; 4]) -> bool {
    let bytes = script.as_bytes();
    bytes.len() >= 6 && bytes[0] == OP_RETURN.to_u8() && bytes[1] == 0x04 && &bytes[2..6] == lokad
}

pub fn is_slp_script(script: &Script) -> bool {
    has_lokad(script, &SLP_LOKAD)
}

pub fn is_cashtab_message(script: &Script) -> bool {
    has_lokad(script, &CASHTAB_PREFIX)
}

/// Data pushes following the leading OP_RETURN. Non-push opcodes are
/// skipped; parsing stops at the first malformed push.
pub fn op_return_pushes(script: &Script) -> Vec<Vec<u8>> {
    if !is_op_return(script) {
        return Vec::new();
    }
    let mut pushes = Vec::new();
    for instruction in script.instructions().skip(1) {
        match instruction {
            Ok(Instruction::PushBytes(bytes)) => pushes.push(bytes.as_bytes().to_vec()),
            Ok(Instruction::Op(_)) => {}
            Err(_) => break,
        }
    }
    pushes
}

/// Decode the text of an OP_RETURN message output.
///
/// Messages with the app prefix drop the prefix push; any other OP_RETURN
/// has all of its pushes decoded, joined by a space. Invalid UTF-8 is
/// replaced rather than rejected.
pub fn decode_message(script: &Script) -> Option<TxMessage> {
    if !is_op_return(script) || is_slp_script(script) {
        return None;
    }
    let is_cashtab = is_cashtab_message(script);
    let pushes = op_return_pushes(script);
    let body = if is_cashtab { &pushes[1..] } else { &pushes[..] };
    let text = body
        .iter()
        .map(|p| String::from_utf8_lossy(p).into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    Some(TxMessage { text, is_cashtab })
}

// ==============================================================================
// SLP Encoding
// ==============================================================================

/// Fields of a GENESIS script, quantity already in raw token units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisFields<'a> {
    pub ticker: &'a str,
    pub name: &'a str,
    pub document_url: &'a str,
    pub document_hash: Option<[u8; 32]>,
    pub decimals: u8,
    pub mint_baton_vout: Option<u8>,
    pub initial_quantity: u64,
}

/// `OP_RETURN "SLP\0" 0x01 "GENESIS" ticker name url hash decimals baton qty`
pub fn slp_genesis_script(fields: &GenesisFields<'_>) -> Result<ScriptBuf, CoreError> {
    let mut script = op_return_with_lokad(&SLP_LOKAD);
    push_data(&mut script, &[SLP_TOKEN_TYPE_FUNGIBLE])?;
    push_data(&mut script, b"GENESIS")?;
    push_data(&mut script, fields.ticker.as_bytes())?;
    push_data(&mut script, fields.name.as_bytes())?;
    push_data(&mut script, fields.document_url.as_bytes())?;
    match &fields.document_hash {
        Some(hash) => push_data(&mut script, hash)?,
        None => push_data(&mut script, &[])?,
    }
    push_data(&mut script, &[fields.decimals])?;
    match fields.mint_baton_vout {
        Some(vout) => push_data(&mut script, &[vout])?,
        None => push_data(&mut script, &[])?,
    }
    push_data(&mut script, &fields.initial_quantity.to_be_bytes())?;
    Ok(ScriptBuf::from_bytes(script))
}

/// `OP_RETURN "SLP\0" 0x01 "SEND" token_id qty...`; quantity `i` goes to
/// output `i + 1`.
pub fn slp_send_script(token_id: &TokenId, quantities: &[u64]) -> Result<ScriptBuf, CoreError> {
    if quantities.is_empty() || quantities.len() > SLP_MAX_SEND_OUTPUTS {
        return Err(CoreError::InvalidTxData(format!(
            "SEND needs 1 to {SLP_MAX_SEND_OUTPUTS} quantities, got {}",
            quantities.len()
        )));
    }
    let mut script = op_return_with_lokad(&SLP_LOKAD);
    push_data(&mut script, &[SLP_TOKEN_TYPE_FUNGIBLE])?;
    push_data(&mut script, b"SEND")?;
    push_data(&mut script, token_id.as_bytes())?;
    for qty in quantities {
        push_data(&mut script, &qty.to_be_bytes())?;
    }
    Ok(ScriptBuf::from_bytes(script))
}

// ==============================================================================
// SLP Parsing
// ==============================================================================

/// A decoded SLP type-1 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlpMessage {
    Genesis {
        ticker: String,
        name: String,
        decimals: u8,
        mint_baton_vout: Option<u8>,
        initial_quantity: u64,
    },
    Mint {
        token_id: TokenId,
        mint_baton_vout: Option<u8>,
        quantity: u64,
    },
    Send {
        token_id: TokenId,
        quantities: Vec<u64>,
    },
}

impl SlpMessage {
    pub fn tx_type(&self) -> SlpTxType {
        match self {
            Self::Genesis { .. } => SlpTxType::Genesis,
            Self::Mint { .. } => SlpTxType::Mint,
            Self::Send { .. } => SlpTxType::Send,
        }
    }

    /// Raw quantities keyed by the output index that receives them.
    pub fn output_quantities(&self) -> Vec<(u32, u64)> {
        match self {
            Self::Genesis {
                initial_quantity, ..
            } => vec![(1, *initial_quantity)],
            Self::Mint { quantity, .. } => vec![(1, *quantity)],
            Self::Send { quantities, .. } => quantities
                .iter()
                .enumerate()
                .map(|(i, q)| (i as u32 + 1, *q))
                .collect(),
        }
    }
}

/// Parse an SLP OP_RETURN. Returns `None` for anything that is not a
/// well-formed fungible GENESIS, MINT or SEND.
pub fn parse_slp(script: &Script) -> Option<SlpMessage> {
    if !is_slp_script(script) {
        return None;
    }
    let pushes = op_return_pushes(script);
    let [_lokad, token_type, tx_type, rest @ ..] = pushes.as_slice() else {
        return None;
    };
    if token_type.as_slice() != [SLP_TOKEN_TYPE_FUNGIBLE].as_slice() {
        return None;
    }

    match tx_type.as_slice() {
        b"GENESIS" => {
            let [ticker, name, _url, hash, decimals, baton, qty] = rest else {
                return None;
            };
            if !(hash.is_empty() || hash.len() == 32) {
                return None;
            }
            let [decimals] = decimals.as_slice() else {
                return None;
            };
            if *decimals > 9 {
                return None;
            }
            Some(SlpMessage::Genesis {
                ticker: String::from_utf8_lossy(ticker).into_owned(),
                name: String::from_utf8_lossy(name).into_owned(),
                decimals: *decimals,
                mint_baton_vout: parse_baton(baton)?,
                initial_quantity: parse_u64_be(qty)?,
            })
        }
        b"MINT" => {
            let [token_id, baton, qty] = rest else {
                return None;
            };
            Some(SlpMessage::Mint {
                token_id: parse_token_id(token_id)?,
                mint_baton_vout: parse_baton(baton)?,
                quantity: parse_u64_be(qty)?,
            })
        }
        b"SEND" => {
            let [token_id, amounts @ ..] = rest else {
                return None;
            };
            if amounts.is_empty() || amounts.len() > SLP_MAX_SEND_OUTPUTS {
                return None;
            }
            let quantities = amounts
                .iter()
                .map(|a| parse_u64_be(a))
                .collect::<Option<Vec<_>>>()?;
            Some(SlpMessage::Send {
                token_id: parse_token_id(token_id)?,
                quantities,
            })
        }
        _ => None,
    }
}

fn parse_u64_be(bytes: &[u8]) -> Option<u64> {
    let arr: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(arr))
}

fn parse_token_id(bytes: &[u8]) -> Option<TokenId> {
    let arr: [u8; 32] = bytes.try_into().ok()?;
    Some(TokenId(arr))
}

/// Outer `None` rejects the script; inner `None` means no baton.
fn parse_baton(bytes: &[u8]) -> Option<Option<u8>> {
    match bytes {
        [] => Some(None),
        [vout] if *vout >= 2 => Some(Some(*vout)),
        _ => None,
    }
}
