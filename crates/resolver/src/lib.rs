//! Dependency resolver for Orbit.
//!
//! Reads the project manifest, assigns categories, orders artifacts with a
//! deterministic topological sort and packs them into batches that can be
//! deployed together.

pub mod category;
pub mod error;
pub mod graph;
pub mod infer;
pub mod manifest;
pub mod plan;
pub mod resolve;

pub use error::{ManifestError, ResolveError, ResolveWarning};
pub use manifest::{ClarinetManifestReader, Manifest, ManifestEntry, ManifestReader};
pub use plan::DeploymentPlan;
pub use resolve::{DEFAULT_BATCH_SIZE, ResolveOptions, resolve, resolve_manifest};
