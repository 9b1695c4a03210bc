//! Scanner error types.

use std::path::PathBuf;

/// Errors produced while scanning a project tree.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("scan root not found or not a directory: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("invalid pattern {pattern:?}: {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("path not indexed: {0}")]
    NotIndexed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
