//! JSON-RPC broadcaster for eCash node endpoints.
//!
//! Implements [`Broadcaster`](super::Broadcaster) with `sendrawtransaction`
//! over `reqwest`, with basic or cookie-file auth.

mod client;
mod connection;
mod protocol;

pub use client::HttpRpcClient;
pub(crate) use connection::explorer_base;
