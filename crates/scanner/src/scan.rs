//! Single-pass directory traversal.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::ScanError;
use crate::hash::hash_file;
use crate::index::{FileIndex, FileRecord, ScanStats, ScanWarning};
use crate::patterns::{ClassMatcher, DEFAULT_EXCLUDE_DIRS, ExcludeMatcher, FileClass};

/// Options controlling a scan.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Gitignore-style patterns for directories that are never entered.
    pub exclude_dirs: Vec<String>,
    /// Skip directories whose name starts with `.`.
    pub skip_hidden: bool,
    /// Hash artifact sources during the pass instead of lazily.
    pub hash_sources: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|s| s.to_string()).collect(),
            skip_hidden: true,
            hash_sources: false,
        }
    }
}

struct Walk<'a> {
    root: &'a Path,
    options: &'a ScanOptions,
    classes: ClassMatcher,
    exclude: ExcludeMatcher,
    records: BTreeMap<String, FileRecord>,
    stats: ScanStats,
    warnings: Vec<ScanWarning>,
}

/// Scans `root` once and builds a [`FileIndex`].
///
/// Excluded directories are pruned before descent. Symlinks are not
/// followed. Unreadable entries become warnings.
pub fn scan(root: &Path, options: &ScanOptions) -> Result<FileIndex, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::RootNotFound(root.to_path_buf()));
    }

    let mut walk = Walk {
        root,
        options,
        classes: ClassMatcher::new(root)?,
        exclude: ExcludeMatcher::new(root, &options.exclude_dirs, options.skip_hidden)?,
        records: BTreeMap::new(),
        stats: ScanStats::default(),
        warnings: Vec::new(),
    };

    walk.walk_dir(root.to_path_buf())?;

    let Walk {
        records,
        mut stats,
        mut warnings,
        ..
    } = walk;
    stats.files_indexed = records.len();
    stats.pruned.sort();
    warnings.sort_by(|a, b| a.path.cmp(&b.path));

    info!(
        root = %root.display(),
        files = stats.files_indexed,
        dirs = stats.directories_visited,
        pruned = stats.pruned.len(),
        "scan complete"
    );

    Ok(FileIndex::new(root.to_path_buf(), records, stats, warnings))
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

impl Walk<'_> {
    fn warn(&mut self, path: String, message: String) {
        warn!(path = %path, %message, "scan warning");
        self.warnings.push(ScanWarning { path, message });
    }

    fn walk_dir(&mut self, current: PathBuf) -> Result<(), ScanError> {
        let entries = match std::fs::read_dir(&current) {
            Ok(entries) => entries,
            // The root itself must be readable.
            Err(e) if current == self.root => return Err(e.into()),
            Err(e) => {
                self.warn(relative(self.root, &current), e.to_string());
                return Ok(());
            }
        };
        self.stats.directories_visited += 1;

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    self.warn(relative(self.root, &current), e.to_string());
                    continue;
                }
            };
            let path = entry.path();
            let rel = relative(self.root, &path);

            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(e) => {
                    self.warn(rel, e.to_string());
                    continue;
                }
            };

            if file_type.is_symlink() {
                debug!(path = %rel, "symlink not followed");
            } else if file_type.is_dir() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if self.exclude.is_excluded(&rel, &name) {
                    debug!(path = %rel, "pruned");
                    self.stats.pruned.push(rel);
                    continue;
                }
                self.walk_dir(path)?;
            } else if file_type.is_file() {
                self.index_file(&path, rel);
            }
        }

        Ok(())
    }

    fn index_file(&mut self, path: &Path, rel: String) {
        let classes: BTreeSet<FileClass> = self.classes.classify(&rel).into_iter().collect();

        let (size, modified) = match std::fs::metadata(path) {
            Ok(meta) => (meta.len(), meta.modified().ok()),
            Err(e) => {
                self.warn(rel.clone(), e.to_string());
                (0, None)
            }
        };

        let hash = if self.options.hash_sources && classes.contains(&FileClass::ArtifactSource) {
            match hash_file(path) {
                Ok(h) => Some(h),
                Err(e) => {
                    self.warn(rel.clone(), format!("hash failed: {e}"));
                    None
                }
            }
        } else {
            None
        };

        self.records.insert(
            rel.clone(),
            FileRecord {
                path: rel,
                size,
                modified,
                classes,
                hash,
            },
        );
    }
}
