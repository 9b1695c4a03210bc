//! Verifier error types.

use orbit_protocol::ConfigError;

/// Errors that prevent a verification from producing a report.
///
/// Failing checks are not errors; they are reported in the
/// [`VerificationReport`](crate::VerificationReport).
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("verification worker failed: {0}")]
    Task(String),
}
