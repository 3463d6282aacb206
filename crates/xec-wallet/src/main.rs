mod cli;
mod snapshot;

use clap::Parser;
use eyre::{eyre, WrapErr};
use serde::Serialize;

use xec_wallet_core::fee::{compute_fee, resolve_fee_rate, TxShape};
use xec_wallet_core::rpc::HttpRpcClient;
use xec_wallet_core::types::{
    Recipients, SendRequest, SignedTransaction, TokenConfig, TokenSendRequest,
};
use xec_wallet_core::{send, sync, token, NetworkProfile, Wallet};

use cli::{Cli, Command, GlobalArgs, NetworkChoice};
use snapshot::SnapshotSource;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();

    let global = &args.global;
    let profile = load_profile(global)?;
    let source = SnapshotSource::new(&global.snapshot_dir);

    match args.command {
        Command::Balance => {
            let wallet = load_wallet(global)?;
            let balances = sync::load_balances(&source, &wallet_addresses(&wallet), &profile)
                .await
                .context("load balances")?;
            print_json(&balances)?;
        }
        Command::Fee {
            inputs,
            outputs,
            op_return_bytes,
            fee_rate,
        } => {
            let mut shape = TxShape::new(inputs, outputs);
            if let Some(len) = op_return_bytes {
                shape = shape.with_op_return(len);
            }
            let rate = resolve_fee_rate(fee_rate, &profile)?;
            print_json(&serde_json::json!({
                "sizeBytes": shape.estimated_size(),
                "feeRate": rate,
                "feeSats": compute_fee(&shape, rate).to_sat(),
            }))?;
        }
        Command::Send {
            address,
            amount,
            to,
            message,
            fee_rate,
        } => {
            let wallet = load_wallet(global)?;
            let recipients = match address {
                Some(address) => Recipients::Single { address, amount },
                None if to.is_empty() => {
                    return Err(eyre!("either --address/--amount or --to is required"));
                }
                None => Recipients::Many(to),
            };
            let request = SendRequest {
                fee_rate,
                message,
                recipients,
            };
            let balances = sync::load_balances(&source, &wallet_addresses(&wallet), &profile)
                .await
                .context("load balances")?;

            let utxos = &balances.spendable;
            if global.dry_run {
                match send::build_send_transaction(&wallet, utxos, &request, &profile)? {
                    Some(signed) => print_signed(&signed)?,
                    None => println!("nothing to send"),
                }
            } else {
                let rpc = connect(global)?;
                match send::send_xec(&rpc, &wallet, utxos, &request, &profile).await? {
                    Some(url) => println!("{url}"),
                    None => println!("nothing to send"),
                }
            }
        }
        Command::CreateToken {
            name,
            ticker,
            decimals,
            quantity,
            document_url,
            document_hash,
            mint_baton,
            fee_rate,
        } => {
            let wallet = load_wallet(global)?;
            let config = TokenConfig {
                name,
                ticker,
                decimals,
                initial_quantity: quantity,
                document_url,
                document_hash,
                mint_baton_vout: mint_baton.then_some(token::MINT_BATON_VOUT),
            };
            let balances = sync::load_balances(&source, &wallet_addresses(&wallet), &profile)
                .await
                .context("load balances")?;

            if global.dry_run {
                let signed = token::build_genesis_transaction(
                    &wallet,
                    &balances.spendable,
                    fee_rate,
                    &config,
                    &profile,
                )?;
                print_signed(&signed)?;
            } else {
                let rpc = connect(global)?;
                let url = token::create_token(
                    &rpc,
                    &wallet,
                    &balances.spendable,
                    fee_rate,
                    &config,
                    &profile,
                )
                .await?;
                println!("{url}");
            }
        }
        Command::SendToken {
            token_id,
            amount,
            receiver,
            fee_rate,
        } => {
            let wallet = load_wallet(global)?;
            let request = TokenSendRequest {
                token_id,
                amount,
                receiver,
            };
            let balances = sync::load_balances(&source, &wallet_addresses(&wallet), &profile)
                .await
                .context("load balances")?;

            if global.dry_run {
                let signed = token::build_token_send_transaction(
                    &wallet, &balances, fee_rate, &request, &profile,
                )?;
                print_signed(&signed)?;
            } else {
                let rpc = connect(global)?;
                let url =
                    token::send_token(&rpc, &wallet, &balances, fee_rate, &request, &profile)
                        .await?;
                println!("{url}");
            }
        }
        Command::History => {
            let wallet = load_wallet(global)?;
            let items = sync::load_history(&source, &wallet_addresses(&wallet), &profile)
                .await
                .context("load history")?;
            print_json(&items)?;
        }
    }

    Ok(())
}

fn load_profile(global: &GlobalArgs) -> eyre::Result<NetworkProfile> {
    match &global.profile {
        Some(path) => NetworkProfile::from_json_file(path)
            .wrap_err_with(|| format!("load network profile {}", path.display())),
        None => Ok(match global.network {
            NetworkChoice::Mainnet => NetworkProfile::mainnet(),
            NetworkChoice::Testnet => NetworkProfile::testnet(),
        }),
    }
}

fn load_wallet(global: &GlobalArgs) -> eyre::Result<Wallet> {
    let path = global
        .wallet
        .as_ref()
        .ok_or_else(|| eyre!("--wallet is required for this command"))?;
    Wallet::from_json_file(path).wrap_err_with(|| format!("load wallet {}", path.display()))
}

fn wallet_addresses(wallet: &Wallet) -> Vec<String> {
    wallet.addresses().map(str::to_owned).collect()
}

fn connect(global: &GlobalArgs) -> eyre::Result<HttpRpcClient> {
    HttpRpcClient::new(
        &global.rpc_url,
        global.rpc_user.as_deref(),
        global.rpc_pass.as_deref(),
        global.rpc_cookie_file.as_deref(),
    )
    .wrap_err("configure node RPC client")
}

fn print_signed(signed: &SignedTransaction) -> eyre::Result<()> {
    print_json(&serde_json::json!({
        "txid": signed.txid.to_string(),
        "feeSats": signed.fee.to_sat(),
        "hex": signed.hex,
    }))
}

fn print_json<T: Serialize>(value: &T) -> eyre::Result<()> {
    let rendered = serde_json::to_string_pretty(value).wrap_err("serialize output")?;
    println!("{rendered}");
    Ok(())
}
