//! Transaction encoding boundary.
//!
//! Building and signing the ledger's binary transaction format is not done
//! here; callers inject an encoder that turns a deploy request into bytes
//! ready to broadcast.

use orbit_protocol::{Credential, Network};

/// Everything an encoder needs to build one contract-deploy transaction.
#[derive(Debug, Clone)]
pub struct DeployRequest<'a> {
    pub network: Network,
    pub contract_name: &'a str,
    pub source: &'a str,
    pub deployer: &'a str,
    pub nonce: u64,
    /// Fee in micro-units.
    pub fee: u64,
    pub credential: &'a Credential,
}

/// Error raised by an encoder.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transaction encoding failed: {0}")]
pub struct EncodeError(pub String);

/// Builds signed, serialized deploy transactions.
pub trait TransactionEncoder: Send + Sync {
    fn encode_deploy(&self, request: &DeployRequest<'_>) -> Result<Vec<u8>, EncodeError>;
}
