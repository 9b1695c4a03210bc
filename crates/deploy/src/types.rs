//! Deploy configuration, events and results.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use orbit_protocol::{ArtifactId, ArtifactStatus, ContractId, Network, TxId, TxState};
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// How artifacts within a batch are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DeployMode {
    Sequential,
    Parallel { max_concurrency: usize },
}

/// Orchestrator settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeploySettings {
    /// Root that artifact source paths are relative to.
    pub project_root: PathBuf,
    /// Fee reserved per artifact during the balance preflight, in
    /// micro-units. `0` disables the preflight.
    pub min_fee: u64,
    #[serde(with = "orbit_protocol::duration::secs")]
    pub confirmation_timeout: Duration,
    pub retry: RetryPolicy,
    /// Attach full error text to failed artifacts.
    pub verbose_errors: bool,
    /// List the deployer's contracts once before the run and treat plan
    /// artifacts already on chain as deployed, record or not.
    pub reconcile_chain: bool,
    pub event_capacity: usize,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            min_fee: 0,
            confirmation_timeout: Duration::from_secs(300),
            retry: RetryPolicy::default(),
            verbose_errors: false,
            reconcile_chain: false,
            event_capacity: 256,
        }
    }
}

/// Why an artifact failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Source unreadable or rejected by the network.
    Compilation { reason: String },
    InsufficientBalance { required: u64, available: u64 },
    /// Transport failures outlasted the retry budget.
    Network { attempts: u32 },
    /// The transaction landed but did not succeed.
    Aborted {
        state: TxState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
    },
    ConfirmationTimeout { tx_id: TxId },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Compilation { reason } => write!(f, "compilation error: {reason}"),
            FailureReason::InsufficientBalance {
                required,
                available,
            } => write!(
                f,
                "insufficient balance: need {required} micro-units, {available} available"
            ),
            FailureReason::Network { attempts } => {
                write!(f, "network error after {attempts} attempt(s)")
            }
            FailureReason::Aborted { state, result } => match result {
                Some(r) => write!(f, "transaction aborted ({state:?}): {r}"),
                None => write!(f, "transaction aborted ({state:?})"),
            },
            FailureReason::ConfirmationTimeout { tx_id } => {
                write!(f, "confirmation timed out for {tx_id}")
            }
        }
    }
}

/// Why an artifact was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// `root` failed; this artifact depends on it, directly or not.
    DependencyFailed { root: ArtifactId },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DependencyFailed { root } => write!(f, "dependency {root} failed"),
        }
    }
}

/// Progress events emitted during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeployEvent {
    RunStarted {
        network: Network,
        artifacts: usize,
        batches: usize,
        dry_run: bool,
    },
    BatchStarted {
        index: usize,
        artifacts: Vec<ArtifactId>,
    },
    StatusChanged {
        artifact: ArtifactId,
        from: ArtifactStatus,
        to: ArtifactStatus,
    },
    Retrying {
        artifact: ArtifactId,
        attempt: u32,
        #[serde(with = "orbit_protocol::duration::millis")]
        delay: Duration,
        error: String,
    },
    BatchCompleted {
        index: usize,
    },
    RunFinished {
        outcome: DeploymentOutcome,
    },
}

/// Overall classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentOutcome {
    Success,
    PartialFailure,
    Failed,
    Interrupted,
    DryRun,
}

/// Per-artifact line of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactReport {
    pub id: ArtifactId,
    pub status: ArtifactStatus,
    pub batch: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<TxId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<ContractId>,
    pub attempts: u32,
    /// Failure or skip summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Full error text, only with `verbose_errors`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub artifacts: usize,
    pub batches: usize,
}

/// Result of [`Orchestrator::deploy`](crate::Orchestrator::deploy).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentResult {
    pub network: Network,
    pub dry_run: bool,
    pub plan: PlanSummary,
    /// Sorted by artifact id.
    pub artifacts: Vec<ArtifactReport>,
    /// Confirmed during this run.
    pub successful: Vec<ArtifactId>,
    /// Confirmed before this run started.
    pub already_deployed: Vec<ArtifactId>,
    pub failed: Vec<(ArtifactId, FailureReason)>,
    pub skipped: Vec<(ArtifactId, SkipReason)>,
    /// Never started because the run was cancelled.
    pub interrupted: Vec<ArtifactId>,
    /// Dry run only: artifacts a real run would submit or re-poll.
    pub would_submit: Vec<ArtifactId>,
}

impl DeploymentResult {
    pub fn outcome(&self) -> DeploymentOutcome {
        if self.dry_run {
            return DeploymentOutcome::DryRun;
        }
        if !self.interrupted.is_empty() {
            return DeploymentOutcome::Interrupted;
        }
        if self.failed.is_empty() && self.skipped.is_empty() {
            return DeploymentOutcome::Success;
        }
        if self.successful.is_empty() && self.already_deployed.is_empty() {
            DeploymentOutcome::Failed
        } else {
            DeploymentOutcome::PartialFailure
        }
    }

    pub fn report(&self, id: &str) -> Option<&ArtifactReport> {
        self.artifacts.iter().find(|r| r.id == id)
    }
}
