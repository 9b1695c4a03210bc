//! Monitor error types.

use std::time::Duration;

use orbit_protocol::{LedgerError, TxId};

/// Errors produced by network monitor queries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MonitorError {
    #[error("network unavailable after {attempts} attempts: {last_error}")]
    NetworkUnavailable { attempts: u32, last_error: String },

    #[error("transaction {tx_id} not confirmed within {waited:?}")]
    ConfirmationTimeout { tx_id: TxId, waited: Duration },

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("cancelled")]
    Cancelled,
}
