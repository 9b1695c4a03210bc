//! In-memory file index produced by a scan.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use serde::Serialize;
use tracing::{debug, trace};

use crate::error::ScanError;
use crate::hash::hash_file;
use crate::patterns::FileClass;

/// Metadata for one indexed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// Path relative to the scan root, `/`-separated.
    pub path: String,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub classes: BTreeSet<FileClass>,
    /// Hex SHA-256, filled lazily.
    pub hash: Option<String>,
}

impl FileRecord {
    pub fn has_class(&self, class: FileClass) -> bool {
        self.classes.contains(&class)
    }
}

/// A recoverable problem encountered during the scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanWarning {
    pub path: String,
    pub message: String,
}

impl fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Counters collected during the traversal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub directories_visited: usize,
    pub files_indexed: usize,
    /// Relative paths of directories that were pruned, sorted.
    pub pruned: Vec<String>,
}

/// Index of every file found under a root.
///
/// Records are keyed by relative path and iterate in path order. The table
/// sits behind a mutex so lazy hashing can run from any thread; callers only
/// ever receive clones.
#[derive(Debug)]
pub struct FileIndex {
    root: PathBuf,
    records: Mutex<BTreeMap<String, FileRecord>>,
    stats: ScanStats,
    warnings: Vec<ScanWarning>,
}

impl FileIndex {
    pub(crate) fn new(
        root: PathBuf,
        records: BTreeMap<String, FileRecord>,
        stats: ScanStats,
        warnings: Vec<ScanWarning>,
    ) -> Self {
        Self {
            root,
            records: Mutex::new(records),
            stats,
            warnings,
        }
    }

    fn table(&self) -> MutexGuard<'_, BTreeMap<String, FileRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for an indexed relative path.
    pub fn absolute_path(&self, rel_path: &str) -> PathBuf {
        self.root.join(rel_path)
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    pub fn contains(&self, rel_path: &str) -> bool {
        self.table().contains_key(rel_path)
    }

    pub fn get(&self, rel_path: &str) -> Option<FileRecord> {
        self.table().get(rel_path).cloned()
    }

    /// All records in path order.
    pub fn records(&self) -> Vec<FileRecord> {
        self.table().values().cloned().collect()
    }

    /// Records matching `class`, in path order.
    pub fn files_of(&self, class: FileClass) -> Vec<FileRecord> {
        self.table()
            .values()
            .filter(|r| r.has_class(class))
            .cloned()
            .collect()
    }

    pub fn manifest_files(&self) -> Vec<FileRecord> {
        self.files_of(FileClass::Manifest)
    }

    pub fn artifact_sources(&self) -> Vec<FileRecord> {
        self.files_of(FileClass::ArtifactSource)
    }

    pub fn history_files(&self) -> Vec<FileRecord> {
        self.files_of(FileClass::DeploymentHistory)
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    pub fn warnings(&self) -> &[ScanWarning] {
        &self.warnings
    }

    /// Returns the content hash of an indexed file.
    ///
    /// The stored hash is reused while the file's size and modification time
    /// match the record; otherwise the file is rehashed and the record updated.
    pub fn content_hash(&self, rel_path: &str) -> Result<String, ScanError> {
        let cached = {
            let table = self.table();
            let record = table
                .get(rel_path)
                .ok_or_else(|| ScanError::NotIndexed(rel_path.to_string()))?;
            (record.size, record.modified, record.hash.clone())
        };

        let abs = self.absolute_path(rel_path);
        let meta = std::fs::metadata(&abs)?;
        let modified = meta.modified().ok();
        if let (size, stored_mtime, Some(hash)) = &cached
            && *size == meta.len()
            && *stored_mtime == modified
        {
            trace!(path = rel_path, "content hash reused");
            return Ok(hash.clone());
        }

        // Hash outside the lock.
        let hash = hash_file(&abs)?;
        debug!(path = rel_path, "content hash computed");

        if let Some(record) = self.table().get_mut(rel_path) {
            record.size = meta.len();
            record.modified = modified;
            record.hash = Some(hash.clone());
        }
        Ok(hash)
    }
}
