//! File classes and compiled glob matchers.
//!
//! Patterns use gitignore syntax: a pattern without a slash matches at any
//! depth, a pattern with a slash is anchored at the scan root.

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Classes a file can belong to. A file may match several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileClass {
    Manifest,
    ArtifactSource,
    DeploymentHistory,
    Configuration,
}

impl FileClass {
    pub const ALL: [FileClass; 4] = [
        FileClass::Manifest,
        FileClass::ArtifactSource,
        FileClass::DeploymentHistory,
        FileClass::Configuration,
    ];

    /// Glob patterns for this class, in evaluation order.
    pub fn patterns(&self) -> &'static [&'static str] {
        match self {
            FileClass::Manifest => &["Clarinet.toml"],
            FileClass::ArtifactSource => &["*.clar"],
            FileClass::DeploymentHistory => &[
                "deployment/*.json",
                "deployment/**/*.json",
                "manifest.json",
                "deployments.json",
            ],
            FileClass::Configuration => &[".env", "stacksorbit.toml", "settings/*.toml"],
        }
    }
}

/// Default directory names pruned during a scan.
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    ".stacksorbit",
    "logs",
    "target",
    "__pycache__",
    ".venv",
    "venv",
    "env",
];

/// Compiles a list of gitignore-style patterns rooted at `root`.
pub(crate) fn compile(root: &Path, patterns: &[impl AsRef<str>]) -> Result<Gitignore, ScanError> {
    let mut builder = GitignoreBuilder::new(root);
    for pattern in patterns {
        let pattern = pattern.as_ref();
        builder
            .add_line(None, pattern)
            .map_err(|e| ScanError::Pattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
    }
    builder.build().map_err(|e| ScanError::Pattern {
        pattern: patterns
            .iter()
            .map(|p| p.as_ref())
            .collect::<Vec<_>>()
            .join(", "),
        reason: e.to_string(),
    })
}

/// All file-class matchers, compiled once per scan.
pub struct ClassMatcher {
    matchers: Vec<(FileClass, Gitignore)>,
}

impl ClassMatcher {
    pub fn new(root: &Path) -> Result<Self, ScanError> {
        let matchers = FileClass::ALL
            .into_iter()
            .map(|class| compile(root, class.patterns()).map(|m| (class, m)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { matchers })
    }

    /// Returns every class whose patterns match `rel_path` (a file, relative
    /// to the root, `/`-separated).
    pub fn classify(&self, rel_path: &str) -> Vec<FileClass> {
        self.matchers
            .iter()
            .filter(|(_, m)| m.matched(rel_path, false).is_ignore())
            .map(|(class, _)| *class)
            .collect()
    }
}

/// Directory exclusion filter.
pub struct ExcludeMatcher {
    matcher: Gitignore,
    skip_hidden: bool,
}

impl ExcludeMatcher {
    pub fn new(root: &Path, patterns: &[String], skip_hidden: bool) -> Result<Self, ScanError> {
        Ok(Self {
            matcher: compile(root, patterns)?,
            skip_hidden,
        })
    }

    /// Returns true if the directory at `rel_path` must not be entered.
    pub fn is_excluded(&self, rel_path: &str, name: &str) -> bool {
        if self.skip_hidden && name.starts_with('.') {
            return true;
        }
        self.matcher.matched(rel_path, true).is_ignore()
    }
}
