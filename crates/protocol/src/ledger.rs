//! The remote ledger boundary.
//!
//! Everything the core knows about the network goes through [`LedgerClient`].
//! `orbit-ledger` provides the HTTP implementation; tests provide mocks.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::config::Credential;
use crate::types::{AccountState, Artifact, ContractId, Network, TxId, TxStatus};

/// Boxed future returned by [`LedgerClient`] methods.
pub type LedgerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LedgerError>> + Send + 'a>>;

/// Errors returned by a ledger client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("not found: {0}")]
    NotFound(String),

    /// The network refused the submission (analysis/compilation failure,
    /// bad nonce, contract already exists...). Resubmitting won't help.
    #[error("rejected: {reason}")]
    Rejected { reason: String },

    #[error("decode error: {0}")]
    Decode(String),
}

impl LedgerError {
    /// Returns true if the same request may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Transport(_) | LedgerError::Timeout => true,
            LedgerError::Api { status, .. } => *status == 429 || *status >= 500,
            LedgerError::NotFound(_) | LedgerError::Rejected { .. } | LedgerError::Decode(_) => {
                false
            }
        }
    }
}

/// Read-only query against a deployed contract.
///
/// With `function == None` the query fetches the contract interface, which
/// is the cheapest way to prove the contract exists and is callable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOnlyQuery {
    pub contract: ContractId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

impl ReadOnlyQuery {
    /// Interface lookup for `contract`.
    pub fn interface(contract: ContractId) -> Self {
        Self {
            contract,
            function: None,
            args: Vec::new(),
            sender: None,
        }
    }
}

/// Node/API health snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub network_id: u32,
    pub block_height: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
}

/// Abstract client for the remote ledger.
///
/// Implementations must be cheap to share behind an `Arc`; the orchestrator
/// and verifier call them from many tasks at once.
pub trait LedgerClient: Send + Sync {
    /// Network this client talks to.
    fn network(&self) -> Network;

    /// Submits a contract deployment and returns its transaction id.
    fn submit<'a>(
        &'a self,
        artifact: &'a Artifact,
        source: &'a str,
        credential: &'a Credential,
    ) -> LedgerFuture<'a, TxId>;

    /// Fetches the account state for `address`.
    fn get_account<'a>(&'a self, address: &'a str) -> LedgerFuture<'a, AccountState>;

    /// Fetches the status of a transaction.
    fn get_transaction<'a>(&'a self, tx_id: &'a str) -> LedgerFuture<'a, TxStatus>;

    /// Performs a read-only contract call (or interface fetch).
    fn call_read_only<'a>(&'a self, query: &'a ReadOnlyQuery) -> LedgerFuture<'a, serde_json::Value>;

    /// Lists contracts deployed by `address`.
    fn get_deployed_contracts<'a>(&'a self, address: &'a str) -> LedgerFuture<'a, Vec<ContractId>>;

    /// Fetches node info (chain height, network id).
    fn get_network_info(&self) -> LedgerFuture<'_, NetworkInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(LedgerError::Transport("reset".into()).is_retryable());
        assert!(LedgerError::Timeout.is_retryable());
        assert!(LedgerError::Api { status: 503, body: String::new() }.is_retryable());
        assert!(LedgerError::Api { status: 429, body: String::new() }.is_retryable());
        assert!(!LedgerError::Api { status: 400, body: String::new() }.is_retryable());
        assert!(!LedgerError::Rejected { reason: "bad".into() }.is_retryable());
        assert!(!LedgerError::NotFound("tx".into()).is_retryable());
    }

    #[test]
    fn interface_query_serializes_minimal() {
        let q = ReadOnlyQuery::interface(ContractId::new("ST1", "token"));
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json, serde_json::json!({ "contract": "ST1.token" }));
    }
}
