//! The deployment plan produced by the resolver.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use orbit_protocol::{Artifact, ArtifactId};
use serde::Serialize;

use crate::error::ResolveWarning;

/// Network-independent, batched deployment order.
///
/// Invariant: for every edge A depends on B, B sits in an earlier batch
/// than A.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentPlan {
    batches: Vec<Vec<ArtifactId>>,
    artifacts: BTreeMap<ArtifactId, Artifact>,
    dependents: BTreeMap<ArtifactId, BTreeSet<ArtifactId>>,
    #[serde(skip)]
    batch_of: BTreeMap<ArtifactId, usize>,
    warnings: Vec<ResolveWarning>,
}

impl DeploymentPlan {
    pub(crate) fn new(
        batches: Vec<Vec<ArtifactId>>,
        artifacts: BTreeMap<ArtifactId, Artifact>,
        dependents: BTreeMap<ArtifactId, BTreeSet<ArtifactId>>,
        warnings: Vec<ResolveWarning>,
    ) -> Self {
        let batch_of = batches
            .iter()
            .enumerate()
            .flat_map(|(i, batch)| batch.iter().map(move |id| (id.clone(), i)))
            .collect();
        Self {
            batches,
            artifacts,
            dependents,
            batch_of,
            warnings,
        }
    }

    pub fn batches(&self) -> &[Vec<ArtifactId>] {
        &self.batches
    }

    pub fn artifact(&self, id: &str) -> Option<&Artifact> {
        self.artifacts.get(id)
    }

    /// All artifacts keyed by id.
    pub fn artifacts(&self) -> &BTreeMap<ArtifactId, Artifact> {
        &self.artifacts
    }

    /// Direct dependencies of `id`.
    pub fn dependencies_of(&self, id: &str) -> Vec<ArtifactId> {
        self.artifacts
            .get(id)
            .map(|a| a.dependencies.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Direct dependents of `id`.
    pub fn dependents_of(&self, id: &str) -> Vec<ArtifactId> {
        self.dependents
            .get(id)
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every artifact that depends on `id`, directly or not, sorted.
    pub fn transitive_dependents(&self, id: &str) -> Vec<ArtifactId> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            if let Some(children) = self.dependents.get(current) {
                for child in children {
                    if seen.insert(child.clone()) {
                        queue.push_back(child);
                    }
                }
            }
        }
        seen.into_iter().collect()
    }

    pub fn batch_index_of(&self, id: &str) -> Option<usize> {
        self.batch_of.get(id).copied()
    }

    /// Artifacts in deployment order, batches flattened.
    pub fn order(&self) -> Vec<ArtifactId> {
        self.batches.iter().flatten().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn warnings(&self) -> &[ResolveWarning] {
        &self.warnings
    }
}

/// Packs a topological order into batches of at most `batch_size`.
///
/// Each artifact goes into the earliest batch after all of its
/// dependencies' batches that still has room.
pub(crate) fn pack_batches(
    order: &[ArtifactId],
    artifacts: &BTreeMap<ArtifactId, Artifact>,
    batch_size: usize,
) -> Vec<Vec<ArtifactId>> {
    let mut batches: Vec<Vec<ArtifactId>> = Vec::new();
    let mut batch_of: BTreeMap<&str, usize> = BTreeMap::new();

    for id in order {
        let earliest = artifacts[id]
            .dependencies
            .iter()
            .filter_map(|d| batch_of.get(d.as_str()))
            .map(|i| i + 1)
            .max()
            .unwrap_or(0);

        let slot = (earliest..batches.len())
            .find(|&i| batches[i].len() < batch_size)
            .unwrap_or_else(|| {
                batches.push(Vec::new());
                batches.len() - 1
            });
        batches[slot].push(id.clone());
        batch_of.insert(id, slot);
    }
    batches
}
