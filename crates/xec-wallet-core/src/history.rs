//! Transaction history: page flattening and per-transaction categorization.

use bitcoin::Amount;
use tracing::{debug, trace};

use crate::address::{CashAddress, OwnedAddresses};
use crate::script::{decode_message, is_op_return, is_slp_script, parse_slp, SlpMessage};
use crate::types::{
    Direction, HistoryPage, ParsedTx, RawTx, SlpTxType, TokenActivity, TokenId, TokenTransfer,
    TxCategory, TxMessage, TxRef,
};

/// Concatenate history pages in order, tagging each entry with its page's
/// address, and keep at most `limit` entries.
///
/// No sorting and no deduplication: a transaction touching two wallet
/// addresses appears once per page it is listed in.
pub fn flatten_transactions(pages: &[HistoryPage], limit: usize) -> Vec<TxRef> {
    pages
        .iter()
        .flat_map(|page| {
            page.transactions.iter().map(|entry| TxRef {
                txid: entry.tx_hash,
                height: entry.height,
                address: page.address.clone(),
            })
        })
        .take(limit)
        .collect()
}

/// Categorize raw transactions from the wallet's point of view.
pub fn parse_tx_data(txs: &[RawTx], owned: &OwnedAddresses, prefix: &str) -> Vec<ParsedTx> {
    txs.iter().map(|tx| parse_tx(tx, owned, prefix)).collect()
}

/// Categorize one transaction.
///
/// Direction is `Sent` when any input belongs to the wallet. A token
/// script makes the event a token event even if a message is attached;
/// otherwise a message makes it a message event; otherwise it is a coin
/// event. Outgoing amounts exclude outputs back to the wallet.
pub fn parse_tx(tx: &RawTx, owned: &OwnedAddresses, prefix: &str) -> ParsedTx {
    let input_addresses: Vec<CashAddress> = tx
        .vin
        .iter()
        .filter_map(|input| input.address.as_deref())
        .filter_map(|a| CashAddress::parse(a, prefix).ok())
        .collect();
    let outgoing = input_addresses.iter().any(|a| owned.contains(a));
    let direction = if outgoing {
        Direction::Sent
    } else {
        Direction::Received
    };

    let mut amount_sent = Amount::ZERO;
    let mut amount_received = Amount::ZERO;
    let mut destination_address = None;
    let mut message: Option<TxMessage> = None;
    let mut slp: Option<SlpMessage> = None;

    for output in &tx.vout {
        let script = &output.script_pub_key;
        if is_slp_script(script) {
            if slp.is_none() {
                slp = parse_slp(script);
            }
            continue;
        }
        if is_op_return(script) {
            if message.is_none() {
                message = decode_message(script);
            }
            continue;
        }

        let Some(address) = CashAddress::from_script(script, prefix) else {
            trace!(txid = %tx.txid, "skipping non-standard output");
            continue;
        };
        match (owned.contains(&address), outgoing) {
            (true, true) => {}
            (true, false) => amount_received += output.value,
            (false, true) => {
                amount_sent += output.value;
                destination_address.get_or_insert_with(|| address.to_string());
            }
            (false, false) => {}
        }
    }

    let token = slp.map(|msg| token_activity(tx, &msg, owned, &input_addresses, outgoing, prefix));
    let category = match (&token, &message) {
        (Some(_), _) => TxCategory::Token,
        (None, Some(_)) => TxCategory::Message,
        (None, None) => TxCategory::Coin,
    };

    debug!(txid = %tx.txid, ?direction, ?category, "parsed transaction");
    ParsedTx {
        txid: tx.txid,
        confirmations: tx.confirmations,
        height: tx.height,
        blocktime: tx.blocktime,
        direction,
        category,
        amount_sent,
        amount_received,
        reply_address: input_addresses
            .first()
            .map(|a| a.with_prefix(prefix).to_string()),
        destination_address,
        message,
        token,
    }
}

/// Map an SLP message onto the transaction's outputs and compute the raw
/// quantity that entered or left the wallet.
fn token_activity(
    tx: &RawTx,
    msg: &SlpMessage,
    owned: &OwnedAddresses,
    input_addresses: &[CashAddress],
    outgoing: bool,
    prefix: &str,
) -> TokenActivity {
    let token_id = match msg {
        SlpMessage::Genesis { .. } => TokenId::from_genesis_txid(&tx.txid),
        SlpMessage::Mint { token_id, .. } | SlpMessage::Send { token_id, .. } => *token_id,
    };

    let senders = OwnedAddresses::new(input_addresses.iter().cloned());
    let transfers: Vec<TokenTransfer> = msg
        .output_quantities()
        .into_iter()
        .filter(|(_, qty)| *qty > 0)
        .filter_map(|(vout, quantity)| {
            let output = tx.vout.get(vout as usize)?;
            let address = CashAddress::from_script(&output.script_pub_key, prefix);
            Some(TokenTransfer {
                vout,
                to_wallet: address.as_ref().is_some_and(|a| owned.contains(a)),
                to_sender: address.as_ref().is_some_and(|a| senders.contains(a)),
                address: address.map(|a| a.to_string()),
                quantity,
            })
        })
        .collect();

    let sum = |pred: fn(&TokenTransfer) -> bool| -> i128 {
        transfers
            .iter()
            .filter(|t| pred(t))
            .map(|t| i128::from(t.quantity))
            .sum()
    };
    let raw_delta = match msg.tx_type() {
        SlpTxType::Genesis | SlpTxType::Mint => sum(|_| true),
        SlpTxType::Send if outgoing => -sum(|t| !t.to_wallet && !t.to_sender),
        SlpTxType::Send => sum(|t| t.to_wallet && !t.to_sender),
    };

    TokenActivity {
        token_id,
        tx_type: msg.tx_type(),
        transfers,
        raw_delta,
    }
}
