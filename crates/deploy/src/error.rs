//! Deploy error types.

use orbit_protocol::{ArtifactId, ArtifactStatus, ConfigError};

/// Errors reading or writing deployment records.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: u32, supported: u32 },

    #[error("record is for network {found}, expected {expected}")]
    NetworkMismatch { expected: String, found: String },
}

/// Errors that abort a deployment run.
///
/// Per-artifact failures are not errors; they are reported in the
/// [`DeploymentResult`](crate::types::DeploymentResult).
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("record error: {0}")]
    Record(#[from] RecordError),

    #[error("artifact {artifact}: illegal transition {from} -> {to}")]
    InvalidTransition {
        artifact: ArtifactId,
        from: ArtifactStatus,
        to: ArtifactStatus,
    },

    #[error("artifact {0} is not part of the plan")]
    UnknownArtifact(ArtifactId),

    #[error("worker task failed: {0}")]
    Task(String),
}
