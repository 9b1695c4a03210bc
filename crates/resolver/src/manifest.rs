//! Project manifest model and the `Clarinet.toml` reader.

use std::collections::BTreeMap;
use std::path::{Component, Path};

use orbit_protocol::{ArtifactId, Category};
use serde::Deserialize;
use tracing::debug;

use crate::error::ManifestError;

/// Manifest file name read by [`ClarinetManifestReader`].
pub const MANIFEST_FILE: &str = "Clarinet.toml";

/// One declared artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub name: ArtifactId,
    /// Source path relative to the project root, `/`-separated.
    pub path: String,
    pub depends_on: Vec<ArtifactId>,
    /// Explicit category; overrides name-based dispatch.
    pub category: Option<Category>,
}

impl ManifestEntry {
    pub fn new(name: impl Into<ArtifactId>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            depends_on: Vec::new(),
            category: None,
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ArtifactId>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }
}

/// The declared set of artifacts for a project.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Manifest {
    pub project_name: Option<String>,
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Builds a manifest programmatically, validating names and paths.
    ///
    /// Duplicate names are kept; the resolver reports them.
    pub fn from_entries(
        project_name: Option<String>,
        entries: Vec<ManifestEntry>,
    ) -> Result<Self, ManifestError> {
        let entries = entries
            .into_iter()
            .map(|mut entry| {
                validate_name(&entry.name)?;
                entry.path = normalize_source_path(&entry.name, &entry.path)?;
                Ok(entry)
            })
            .collect::<Result<Vec<_>, ManifestError>>()?;
        Ok(Self {
            project_name,
            entries,
        })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Artifact names in declaration order.
    pub fn names(&self) -> Vec<ArtifactId> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_name(name: &str) -> Result<(), ManifestError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ManifestError::InvalidName(name.to_string()))
    }
}

/// Normalizes a manifest source path to a `/`-separated path relative to the
/// project root. Absolute paths and `..` that climb above the root are rejected.
pub fn normalize_source_path(artifact: &str, raw: &str) -> Result<String, ManifestError> {
    let unsafe_path = || ManifestError::UnsafePath {
        artifact: artifact.to_string(),
        path: raw.to_string(),
    };

    let unified = raw.replace('\\', "/");
    if unified.is_empty() || unified.starts_with('/') {
        return Err(unsafe_path());
    }

    let mut parts: Vec<String> = Vec::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(unsafe_path());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(unsafe_path()),
        }
    }
    if parts.is_empty() {
        return Err(unsafe_path());
    }
    Ok(parts.join("/"))
}

/// Source of the project manifest.
pub trait ManifestReader {
    fn read(&self, project_root: &Path) -> Result<Manifest, ManifestError>;
}

/// Reads `Clarinet.toml`.
///
/// ```toml
/// [project]
/// name = "demo"
///
/// [contracts.token]
/// path = "contracts/token.clar"
/// depends_on = ["sip-010-trait"]
/// category = "tokens"   # optional
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ClarinetManifestReader;

#[derive(Deserialize)]
struct RawManifest {
    #[serde(default)]
    project: Option<RawProject>,
    #[serde(default)]
    contracts: BTreeMap<String, RawContract>,
}

#[derive(Deserialize)]
struct RawProject {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawContract {
    path: String,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    category: Option<String>,
}

impl ClarinetManifestReader {
    /// Parses manifest text.
    pub fn parse(&self, content: &str) -> Result<Manifest, ManifestError> {
        let raw: RawManifest = toml::from_str(content)?;

        let entries = raw
            .contracts
            .into_iter()
            .map(|(name, contract)| {
                let category = contract
                    .category
                    .map(|value| {
                        value
                            .parse::<Category>()
                            .map_err(|_| ManifestError::InvalidCategory {
                                artifact: name.clone(),
                                value,
                            })
                    })
                    .transpose()?;
                Ok(ManifestEntry {
                    name,
                    path: contract.path,
                    depends_on: contract.depends_on,
                    category,
                })
            })
            .collect::<Result<Vec<_>, ManifestError>>()?;

        Manifest::from_entries(raw.project.and_then(|p| p.name), entries)
    }
}

impl ManifestReader for ClarinetManifestReader {
    fn read(&self, project_root: &Path) -> Result<Manifest, ManifestError> {
        let path = project_root.join(MANIFEST_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ManifestError::NotFound(path));
            }
            Err(e) => return Err(e.into()),
        };
        let manifest = self.parse(&content)?;
        debug!(path = %path.display(), artifacts = manifest.len(), "manifest read");
        Ok(manifest)
    }
}
