//! Topological ordering and cycle detection.

use std::collections::{BTreeMap, BTreeSet};

use orbit_protocol::{Artifact, ArtifactId};

use crate::error::ResolveError;

/// Orders artifacts so every dependency precedes its dependents.
///
/// Kahn's algorithm; among ready artifacts the lowest
/// `(category priority, name)` goes first, so the order is deterministic.
/// All dependencies must already be known artifacts.
pub fn topological_order(
    artifacts: &BTreeMap<ArtifactId, Artifact>,
    dependents: &BTreeMap<ArtifactId, BTreeSet<ArtifactId>>,
) -> Result<Vec<ArtifactId>, ResolveError> {
    let mut in_degree: BTreeMap<&str, usize> = artifacts
        .iter()
        .map(|(id, a)| (id.as_str(), a.dependencies.len()))
        .collect();

    let key = |id: &str| (artifacts[id].category.priority(), id.to_string());
    let mut ready: BTreeSet<(u8, ArtifactId)> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| key(id))
        .collect();

    let mut order = Vec::with_capacity(artifacts.len());
    while let Some((_, id)) = ready.pop_first() {
        if let Some(children) = dependents.get(&id) {
            for child in children {
                if let Some(d) = in_degree.get_mut(child.as_str()) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(key(child));
                    }
                }
            }
        }
        order.push(id);
    }

    if order.len() < artifacts.len() {
        return Err(ResolveError::CyclicDependency {
            members: cycle_members(artifacts),
        });
    }
    Ok(order)
}

/// Every artifact that sits on a cycle, sorted.
///
/// Tarjan's strongly connected components; a component counts if it has more
/// than one member or a self-loop.
pub fn cycle_members(artifacts: &BTreeMap<ArtifactId, Artifact>) -> Vec<ArtifactId> {
    struct Tarjan<'a> {
        artifacts: &'a BTreeMap<ArtifactId, Artifact>,
        index: usize,
        indices: BTreeMap<&'a str, usize>,
        lowlink: BTreeMap<&'a str, usize>,
        stack: Vec<&'a str>,
        on_stack: BTreeSet<&'a str>,
        members: BTreeSet<ArtifactId>,
    }

    impl<'a> Tarjan<'a> {
        fn visit(&mut self, v: &'a str) {
            self.indices.insert(v, self.index);
            self.lowlink.insert(v, self.index);
            self.index += 1;
            self.stack.push(v);
            self.on_stack.insert(v);

            let artifacts = self.artifacts;
            for w in &artifacts[v].dependencies {
                let w = w.as_str();
                if !artifacts.contains_key(w) {
                    continue;
                }
                if !self.indices.contains_key(w) {
                    self.visit(w);
                    let low = self.lowlink[v].min(self.lowlink[w]);
                    self.lowlink.insert(v, low);
                } else if self.on_stack.contains(w) {
                    let low = self.lowlink[v].min(self.indices[w]);
                    self.lowlink.insert(v, low);
                }
            }

            if self.lowlink[v] == self.indices[v] {
                let mut component = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack.remove(w);
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                let self_loop = artifacts[v].dependencies.contains(v);
                if component.len() > 1 || self_loop {
                    self.members.extend(component.into_iter().map(str::to_string));
                }
            }
        }
    }

    let mut tarjan = Tarjan {
        artifacts,
        index: 0,
        indices: BTreeMap::new(),
        lowlink: BTreeMap::new(),
        stack: Vec::new(),
        on_stack: BTreeSet::new(),
        members: BTreeSet::new(),
    };
    for id in artifacts.keys() {
        if !tarjan.indices.contains_key(id.as_str()) {
            tarjan.visit(id);
        }
    }
    tarjan.members.into_iter().collect()
}
