//! Metadata scanner for Orbit projects.
//!
//! One recursive pass over the project tree builds a [`FileIndex`] that
//! every later discovery query reads from. Excluded directories are pruned
//! before descent; content hashes are computed lazily and invalidated on
//! size or modification-time change.

pub mod error;
pub mod hash;
pub mod index;
pub mod patterns;
pub mod scan;

pub use error::ScanError;
pub use index::{FileIndex, FileRecord, ScanStats, ScanWarning};
pub use patterns::{ClassMatcher, DEFAULT_EXCLUDE_DIRS, FileClass};
pub use scan::{ScanOptions, scan};
