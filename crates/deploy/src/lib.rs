//! Deployment orchestration for Orbit.
//!
//! Takes a resolved [`DeploymentPlan`](orbit_resolver::DeploymentPlan),
//! submits its artifacts batch by batch, and keeps a durable per-network
//! record so interrupted runs resume where they stopped.

pub mod error;
pub mod orchestrator;
pub mod record;
pub mod retry;
pub mod types;
pub mod writer;

pub use error::{DeployError, RecordError};
pub use orchestrator::Orchestrator;
pub use record::{DeploymentRecord, JsonRecordStore, MemoryRecordStore, RecordEntry, RecordStore};
pub use retry::RetryPolicy;
pub use types::{
    ArtifactReport, DeployEvent, DeployMode, DeploySettings, DeploymentOutcome, DeploymentResult,
    FailureReason, PlanSummary, SkipReason,
};
pub use writer::RecordWriter;
