//! Core logic for the Telegram ⇄ Jabber relay.
//!
//! Accounts, the balance ledger, top-up tokens, login sessions and the command
//! dispatcher live here. Telegram and XMPP are reached only through ports
//! (`MessagingPort`, `BridgeTransport`) implemented in adapter crates.

pub mod accounts;
pub mod bridge;
pub mod catalog;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod ledger;
pub mod logging;
pub mod messaging;
pub mod session;
pub mod tokens;

#[cfg(test)]
mod test_support;

pub use errors::{Error, Result};
