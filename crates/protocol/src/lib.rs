//! Shared types for the Orbit deployment core.
//!
//! Artifacts, categories, lifecycle states, network/account/transaction
//! snapshots, injected configuration, and the [`LedgerClient`] trait that
//! forms the only network boundary.

pub mod config;
pub mod constants;
pub mod duration;
pub mod ledger;
pub mod types;

// Re-export primary types for convenience.
pub use config::{ConfigError, Credential, NetworkConfig};
pub use ledger::{LedgerClient, LedgerError, LedgerFuture, NetworkInfo, ReadOnlyQuery};
pub use types::{
    AccountState, Artifact, ArtifactId, ArtifactStatus, Category, ContractId, Network, TxId,
    TxState, TxStatus,
};
