//! Manifest-to-plan resolution.

use std::collections::{BTreeMap, BTreeSet};

use orbit_protocol::{Artifact, ArtifactId};
use orbit_scanner::FileIndex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::category::classify;
use crate::error::{ResolveError, ResolveWarning};
use crate::graph::topological_order;
use crate::infer::referenced_contracts;
use crate::manifest::Manifest;
use crate::plan::{DeploymentPlan, pack_batches};

/// Default maximum artifacts per batch.
pub const DEFAULT_BATCH_SIZE: usize = 5;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolveOptions {
    pub batch_size: usize,
    /// Infer edges from source for artifacts that declare no dependencies.
    pub infer_dependencies: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            infer_dependencies: false,
        }
    }
}

/// Resolves a manifest against a scanned project into a deployment plan.
///
/// Sources missing from `index` become warnings. With
/// `infer_dependencies`, artifacts without declared dependencies pick up
/// edges to other manifest artifacts referenced from their source.
pub fn resolve(
    manifest: &Manifest,
    index: &FileIndex,
    options: &ResolveOptions,
) -> Result<DeploymentPlan, ResolveError> {
    resolve_inner(manifest, Some(index), options)
}

/// Resolves a manifest without a file index: no source checks, no inference.
pub fn resolve_manifest(
    manifest: &Manifest,
    options: &ResolveOptions,
) -> Result<DeploymentPlan, ResolveError> {
    resolve_inner(manifest, None, options)
}

fn resolve_inner(
    manifest: &Manifest,
    index: Option<&FileIndex>,
    options: &ResolveOptions,
) -> Result<DeploymentPlan, ResolveError> {
    if options.batch_size == 0 {
        return Err(ResolveError::InvalidBatchSize);
    }

    let mut artifacts: BTreeMap<ArtifactId, Artifact> = BTreeMap::new();
    for entry in manifest.entries() {
        if artifacts.contains_key(&entry.name) {
            return Err(ResolveError::DuplicateArtifact(entry.name.clone()));
        }
        let category = entry.category.unwrap_or_else(|| classify(&entry.name));
        let artifact = Artifact::new(entry.name.clone(), entry.path.clone(), category)
            .with_dependencies(entry.depends_on.iter().cloned());
        artifacts.insert(entry.name.clone(), artifact);
    }

    for artifact in artifacts.values() {
        if let Some(dependency) = artifact
            .dependencies
            .iter()
            .find(|d| !artifacts.contains_key(*d))
        {
            return Err(ResolveError::UnknownDependency {
                artifact: artifact.id.clone(),
                dependency: dependency.clone(),
            });
        }
    }

    let mut warnings = Vec::new();
    if let Some(index) = index {
        for artifact in artifacts.values() {
            if !index.contains(&artifact.source_path) {
                warn!(artifact = %artifact.id, path = %artifact.source_path, "source not found");
                warnings.push(ResolveWarning::MissingSource {
                    artifact: artifact.id.clone(),
                    path: artifact.source_path.clone(),
                });
            }
        }
        if options.infer_dependencies {
            infer_edges(&mut artifacts, index);
        }
    }

    let mut dependents: BTreeMap<ArtifactId, BTreeSet<ArtifactId>> = BTreeMap::new();
    for artifact in artifacts.values() {
        for dep in &artifact.dependencies {
            dependents
                .entry(dep.clone())
                .or_default()
                .insert(artifact.id.clone());
        }
    }

    let order = topological_order(&artifacts, &dependents)?;
    let batches = pack_batches(&order, &artifacts, options.batch_size);

    info!(
        artifacts = artifacts.len(),
        batches = batches.len(),
        warnings = warnings.len(),
        "deployment plan resolved"
    );

    Ok(DeploymentPlan::new(batches, artifacts, dependents, warnings))
}

fn infer_edges(artifacts: &mut BTreeMap<ArtifactId, Artifact>, index: &FileIndex) {
    let known: BTreeSet<ArtifactId> = artifacts.keys().cloned().collect();
    for artifact in artifacts.values_mut() {
        if !artifact.dependencies.is_empty() || !index.contains(&artifact.source_path) {
            continue;
        }
        let source = match std::fs::read_to_string(index.absolute_path(&artifact.source_path)) {
            Ok(source) => source,
            Err(e) => {
                warn!(artifact = %artifact.id, error = %e, "cannot read source for inference");
                continue;
            }
        };
        for name in referenced_contracts(&source) {
            if name != artifact.id && known.contains(&name) {
                debug!(artifact = %artifact.id, dependency = %name, "inferred dependency");
                artifact.dependencies.insert(name);
            }
        }
    }
}
