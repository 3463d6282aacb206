pub mod address;
pub mod classify;
pub mod error;
pub mod fee;
pub mod history;
pub mod profile;
pub mod rpc;
pub mod script;
pub mod send;
pub mod sync;
pub mod token;
pub mod token_history;
pub mod types;
pub mod units;
pub mod wallet;

#[cfg(test)]
mod test_util;

pub use error::CoreError;
pub use profile::NetworkProfile;
pub use wallet::Wallet;
