use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;

use xec_wallet_core::types::{Recipient, TokenId};

/// xec-wallet: build, sign and broadcast eCash and SLP token transactions.
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Built-in network profile.
    #[arg(long, value_enum, default_value = "mainnet", env = "XEC_WALLET_NETWORK", global = true)]
    pub network: NetworkChoice,

    /// JSON network profile; absent fields take the mainnet values.
    #[arg(long, env = "XEC_WALLET_PROFILE", global = true)]
    pub profile: Option<PathBuf>,

    /// Directory of indexer snapshot files used as the chain source.
    #[arg(long, default_value = ".", env = "XEC_WALLET_SNAPSHOT_DIR", global = true)]
    pub snapshot_dir: PathBuf,

    /// Wallet JSON file (name, paths with address and WIF).
    #[arg(long, env = "XEC_WALLET_WALLET", global = true)]
    pub wallet: Option<PathBuf>,

    /// Node JSON-RPC URL used for broadcast.
    #[arg(long, default_value = "http://127.0.0.1:8332", env = "XEC_WALLET_RPC_URL", global = true)]
    pub rpc_url: String,

    #[arg(long, env = "XEC_WALLET_RPC_USER", global = true)]
    pub rpc_user: Option<String>,

    #[arg(long, env = "XEC_WALLET_RPC_PASS", global = true)]
    pub rpc_pass: Option<String>,

    /// Cookie file with `user:password`, used when no user/pass is given.
    #[arg(long, env = "XEC_WALLET_RPC_COOKIE_FILE", global = true)]
    pub rpc_cookie_file: Option<PathBuf>,

    /// Print the signed transaction instead of broadcasting it.
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum NetworkChoice {
    Mainnet,
    Testnet,
}

#[derive(Subcommand)]
pub enum Command {
    /// Classify the wallet's outputs and print balances.
    Balance,

    /// Estimate the fee for a transaction shape.
    Fee {
        #[arg(long)]
        inputs: usize,

        /// P2PKH outputs, change included.
        #[arg(long)]
        outputs: usize,

        /// Length of an OP_RETURN script, if the transaction carries one.
        #[arg(long)]
        op_return_bytes: Option<usize>,

        #[arg(long)]
        fee_rate: Option<Decimal>,
    },

    /// Send XEC to one address or to many.
    Send {
        /// Single destination address.
        #[arg(long, conflicts_with = "to")]
        address: Option<String>,

        /// Amount in XEC for the single destination; omitting it sends nothing.
        #[arg(long)]
        amount: Option<String>,

        /// Repeated `address,amount` destinations.
        #[arg(long)]
        to: Vec<Recipient>,

        /// Text to attach as an OP_RETURN message.
        #[arg(long)]
        message: Option<String>,

        #[arg(long)]
        fee_rate: Option<Decimal>,
    },

    /// Create a new SLP token.
    CreateToken {
        #[arg(long)]
        name: String,

        #[arg(long)]
        ticker: String,

        #[arg(long, default_value = "0")]
        decimals: u32,

        /// Initial supply in display units.
        #[arg(long)]
        quantity: Decimal,

        #[arg(long)]
        document_url: Option<String>,

        /// Hex-encoded 32-byte document hash.
        #[arg(long)]
        document_hash: Option<String>,

        /// Create a minting baton at output 2.
        #[arg(long)]
        mint_baton: bool,

        #[arg(long)]
        fee_rate: Option<Decimal>,
    },

    /// Send SLP tokens.
    SendToken {
        #[arg(long)]
        token_id: TokenId,

        /// Quantity in token display units.
        #[arg(long)]
        amount: Decimal,

        #[arg(long)]
        receiver: String,

        #[arg(long)]
        fee_rate: Option<Decimal>,
    },

    /// Print the categorized transaction history.
    History,
}
