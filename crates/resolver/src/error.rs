//! Resolver error and warning types.

use std::fmt;
use std::path::PathBuf;

use orbit_protocol::ArtifactId;
use serde::Serialize;

/// Errors produced while reading a manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("artifact {artifact}: unsafe source path {path:?}")]
    UnsafePath { artifact: ArtifactId, path: String },

    #[error("artifact {artifact}: unknown category {value:?}")]
    InvalidCategory { artifact: ArtifactId, value: String },

    #[error("invalid artifact name {0:?}")]
    InvalidName(String),
}

/// Errors that make a manifest unplannable.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("duplicate artifact: {0}")]
    DuplicateArtifact(ArtifactId),

    #[error("artifact {artifact} depends on unknown artifact {dependency}")]
    UnknownDependency {
        artifact: ArtifactId,
        dependency: ArtifactId,
    },

    #[error("cyclic dependency among: {}", .members.join(", "))]
    CyclicDependency { members: Vec<ArtifactId> },

    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
}

/// Recoverable problems found while resolving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolveWarning {
    /// The manifest lists a source that the scan did not find. The artifact
    /// still resolves; submission will fail it.
    MissingSource { artifact: ArtifactId, path: String },
}

impl fmt::Display for ResolveWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveWarning::MissingSource { artifact, path } => {
                write!(f, "{artifact}: source {path} not found")
            }
        }
    }
}
