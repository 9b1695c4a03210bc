//! HTTP implementation of the Orbit ledger boundary.
//!
//! [`HttpLedgerClient`] talks to a Hiro-compatible node API. Transaction
//! construction and signing are delegated to a [`TransactionEncoder`].

pub mod client;
pub mod encoder;
pub mod wire;

pub use client::{DEFAULT_DEPLOY_FEE, HttpLedgerClient, HttpLedgerOptions};
pub use encoder::{DeployRequest, EncodeError, TransactionEncoder};
