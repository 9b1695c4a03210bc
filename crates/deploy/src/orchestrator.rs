//! Batch deployment orchestrator.
//!
//! Walks a [`DeploymentPlan`] batch by batch, submitting artifacts through
//! the ledger and waiting for confirmation through the monitor. Every state
//! transition is written to the deployment record before the run moves on,
//! so an interrupted run resumes without resubmitting confirmed work.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use orbit_monitor::{MonitorError, NetworkMonitor};
use orbit_protocol::{
    ArtifactId, ArtifactStatus, ConfigError, ContractId, LedgerClient, LedgerError,
    NetworkConfig, TxId,
};
use orbit_resolver::DeploymentPlan;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::DeployError;
use crate::record::{DeploymentRecord, RecordEntry, RecordStore};
use crate::types::{
    ArtifactReport, DeployEvent, DeployMode, DeploySettings, DeploymentResult, FailureReason,
    PlanSummary, SkipReason,
};
use crate::writer::RecordWriter;

/// Deploys plans onto one network.
pub struct Orchestrator {
    ledger: Arc<dyn LedgerClient>,
    monitor: Arc<NetworkMonitor>,
    store: Arc<dyn RecordStore>,
    network: NetworkConfig,
    settings: DeploySettings,
    events_tx: mpsc::Sender<DeployEvent>,
    events_rx: Option<mpsc::Receiver<DeployEvent>>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        monitor: Arc<NetworkMonitor>,
        store: Arc<dyn RecordStore>,
        network: NetworkConfig,
        settings: DeploySettings,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(settings.event_capacity.max(1));
        Self {
            ledger,
            monitor,
            store,
            network,
            settings,
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<DeployEvent>> {
        self.events_rx.take()
    }

    /// Returns a cancellation token for this orchestrator's runs.
    ///
    /// Cancelling stops new artifacts and batches from starting; work already
    /// in flight finishes and is recorded.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn validate(&self, mode: DeployMode) -> Result<(), ConfigError> {
        self.network.validate()?;
        if let DeployMode::Parallel { max_concurrency: 0 } = mode {
            return Err(ConfigError::InvalidSetting {
                name: "max_concurrency",
                reason: "must be at least 1".into(),
            });
        }
        if self.settings.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "retry.max_attempts",
                reason: "must be at least 1".into(),
            });
        }
        if self.ledger.network() != self.network.network {
            return Err(ConfigError::InvalidSetting {
                name: "network",
                reason: format!(
                    "ledger client targets {}, configuration targets {}",
                    self.ledger.network(),
                    self.network.network
                ),
            });
        }
        Ok(())
    }

    fn emit(&self, event: DeployEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            trace!("deploy event dropped: {e}");
        }
    }

    /// Deploys `plan`.
    ///
    /// With `dry_run` nothing is submitted and no network call is made; the
    /// result lists what a real run would do given the stored record.
    pub async fn deploy(
        &self,
        plan: &DeploymentPlan,
        mode: DeployMode,
        dry_run: bool,
    ) -> Result<DeploymentResult, DeployError> {
        self.validate(mode)?;

        let network = self.network.network;
        let deployer = self.network.deployer_address.clone();
        let loaded = self.store.load(network)?.filter(|record| {
            if record.deployer == deployer {
                true
            } else {
                warn!(
                    recorded = %record.deployer,
                    configured = %deployer,
                    "record belongs to another deployer, starting fresh"
                );
                false
            }
        });
        let mut record = loaded.unwrap_or_else(|| DeploymentRecord::new(network, deployer.clone()));

        let mut already = BTreeSet::new();
        let mut resume = BTreeMap::new();
        let mut timed_out = BTreeMap::new();
        for (id, entry) in &record.artifacts {
            if plan.artifact(id).is_none() {
                continue;
            }
            match (entry.status, &entry.tx_id, &entry.failure) {
                (ArtifactStatus::Confirmed, _, _) => {
                    already.insert(id.clone());
                }
                (ArtifactStatus::AwaitingConfirmation, Some(tx), _) => {
                    resume.insert(id.clone(), tx.clone());
                }
                (
                    ArtifactStatus::Failed,
                    _,
                    Some(FailureReason::ConfirmationTimeout { tx_id }),
                ) => {
                    timed_out.insert(id.clone(), tx_id.clone());
                }
                _ => {}
            }
        }

        info!(
            %network,
            artifacts = plan.len(),
            batches = plan.batches().len(),
            already_deployed = already.len(),
            resuming = resume.len() + timed_out.len(),
            dry_run,
            "deployment started"
        );
        self.emit(DeployEvent::RunStarted {
            network,
            artifacts: plan.len(),
            batches: plan.batches().len(),
            dry_run,
        });

        if dry_run {
            let mut polled = resume;
            polled.extend(timed_out);
            let result = dry_run_result(plan, &record, &already, &polled);
            self.emit(DeployEvent::RunFinished {
                outcome: result.outcome(),
            });
            return Ok(result);
        }

        if self.settings.reconcile_chain {
            for id in self.on_chain(plan, &already).await {
                info!(artifact = %id, "already on chain");
                resume.remove(&id);
                timed_out.remove(&id);
                let address = ContractId::new(deployer.clone(), id.clone());
                record.artifacts.insert(id.clone(), RecordEntry::on_chain(address));
                already.insert(id);
            }
        }

        for (id, tx_id) in timed_out {
            if self.landed_or_pending(&id, &tx_id).await {
                resume.insert(id, tx_id);
            }
        }

        for id in plan.artifacts().keys() {
            if already.contains(id) {
                continue;
            }
            let reopened = match (resume.get(id), record.artifacts.get(id)) {
                (Some(tx_id), Some(previous)) => RecordEntry::awaiting(previous, tx_id.clone()),
                _ => RecordEntry::pending(),
            };
            record.artifacts.insert(id.clone(), reopened);
        }
        let mut writer = RecordWriter::new(Arc::clone(&self.store), record);
        writer.flush()?;

        let run = Arc::new(Run {
            ledger: Arc::clone(&self.ledger),
            monitor: Arc::clone(&self.monitor),
            network: self.network.clone(),
            settings: self.settings.clone(),
            plan: plan.clone(),
            writer: Mutex::new(writer),
            resume,
            events: self.events_tx.clone(),
            raw_errors: std::sync::Mutex::new(BTreeMap::new()),
        });

        for (index, batch) in plan.batches().iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(batch = index, "cancelled, no further batches started");
                break;
            }
            debug!(batch = index, artifacts = batch.len(), "batch started");
            self.emit(DeployEvent::BatchStarted {
                index,
                artifacts: batch.clone(),
            });

            run.preflight(batch).await?;
            match mode {
                DeployMode::Sequential => {
                    for id in batch {
                        if self.cancel.is_cancelled() {
                            break;
                        }
                        run.process(id).await?;
                    }
                }
                DeployMode::Parallel { max_concurrency } => {
                    self.run_parallel(&run, batch, max_concurrency).await?;
                }
            }

            self.emit(DeployEvent::BatchCompleted { index });
        }

        let result = run.result(&already).await;
        info!(
            outcome = ?result.outcome(),
            successful = result.successful.len(),
            failed = result.failed.len(),
            skipped = result.skipped.len(),
            interrupted = result.interrupted.len(),
            "deployment finished"
        );
        self.emit(DeployEvent::RunFinished {
            outcome: result.outcome(),
        });
        Ok(result)
    }

    /// Plan artifacts not yet confirmed that the deployer already has on
    /// chain. A failed listing is logged and treated as empty.
    async fn on_chain(
        &self,
        plan: &DeploymentPlan,
        already: &BTreeSet<ArtifactId>,
    ) -> BTreeSet<ArtifactId> {
        let deployer = &self.network.deployer_address;
        match self.monitor.query_deployed_contracts(deployer, true).await {
            Ok(contracts) => contracts
                .into_iter()
                .filter(|c| &c.deployer == deployer)
                .map(|c| c.name)
                .filter(|name| plan.artifact(name).is_some() && !already.contains(name))
                .collect(),
            Err(e) => {
                warn!(error = %e, "deployed contract listing unavailable, continuing");
                BTreeSet::new()
            }
        }
    }

    /// Whether a transaction left behind by a confirmation timeout should be
    /// re-polled. Only a transaction known to have dropped or aborted is
    /// given up, so its artifact is submitted again.
    async fn landed_or_pending(&self, id: &str, tx_id: &str) -> bool {
        match self.monitor.query_transaction(tx_id, true).await {
            Ok(status) if status.state.is_terminal() && !status.is_confirmed() => {
                info!(artifact = %id, tx = %tx_id, state = ?status.state, "earlier transaction did not land, resubmitting");
                false
            }
            Ok(_) => true,
            Err(e) => {
                debug!(artifact = %id, tx = %tx_id, error = %e, "earlier transaction not visible yet, re-polling");
                true
            }
        }
    }

    /// Runs one batch on a bounded pool. Returns once every started artifact
    /// is terminal.
    async fn run_parallel(
        &self,
        run: &Arc<Run>,
        batch: &[ArtifactId],
        max_concurrency: usize,
    ) -> Result<(), DeployError> {
        let semaphore = Arc::new(Semaphore::new(max_concurrency));
        let mut tasks = JoinSet::new();

        for id in batch {
            if self.cancel.is_cancelled() {
                break;
            }
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    permit.map_err(|e| DeployError::Task(e.to_string()))?
                }
            };
            let run = Arc::clone(run);
            let id = id.clone();
            tasks.spawn(async move {
                let _permit = permit;
                run.process(&id).await
            });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| DeployError::Task(e.to_string()))
                .and_then(|r| r);
            if let Err(e) = outcome {
                error!(error = %e, "deploy worker failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Outcome of submitting one artifact.
enum Submission {
    Sent(TxId),
    /// Rejected on retry, but the contract is already on chain.
    OnChain,
    Failed(FailureReason, String),
}

/// State shared by the workers of one run.
struct Run {
    ledger: Arc<dyn LedgerClient>,
    monitor: Arc<NetworkMonitor>,
    network: NetworkConfig,
    settings: DeploySettings,
    plan: DeploymentPlan,
    writer: Mutex<RecordWriter>,
    /// Artifacts with an earlier transaction to re-poll instead of resubmitting.
    resume: BTreeMap<ArtifactId, TxId>,
    events: mpsc::Sender<DeployEvent>,
    /// Full error text per artifact, reported with `verbose_errors`.
    raw_errors: std::sync::Mutex<BTreeMap<ArtifactId, String>>,
}

impl Run {
    fn emit(&self, event: DeployEvent) {
        if let Err(e) = self.events.try_send(event) {
            trace!("deploy event dropped: {e}");
        }
    }

    async fn status(&self, id: &str) -> Option<ArtifactStatus> {
        self.writer.lock().await.status(id)
    }

    async fn transition(
        &self,
        id: &str,
        to: ArtifactStatus,
        update: impl FnOnce(&mut RecordEntry),
    ) -> Result<(), DeployError> {
        let from = self.writer.lock().await.transition(id, to, update)?;
        debug!(artifact = %id, %from, %to, "status changed");
        self.emit(DeployEvent::StatusChanged {
            artifact: id.to_string(),
            from,
            to,
        });
        Ok(())
    }

    /// Marks `id` failed and skips every dependent that has not started.
    async fn fail(
        &self,
        id: &str,
        reason: FailureReason,
        raw: Option<String>,
    ) -> Result<(), DeployError> {
        warn!(artifact = %id, reason = %reason, "artifact failed");
        if let Some(raw) = raw
            && let Ok(mut errors) = self.raw_errors.lock()
        {
            errors.insert(id.to_string(), raw);
        }
        let summary = reason.to_string();
        self.transition(id, ArtifactStatus::Failed, |e| {
            e.failure = Some(reason);
            e.last_error = Some(summary);
        })
        .await?;

        for dependent in self.plan.transitive_dependents(id) {
            if matches!(
                self.status(&dependent).await,
                Some(ArtifactStatus::Pending | ArtifactStatus::Queued)
            ) {
                let skip = SkipReason::DependencyFailed {
                    root: id.to_string(),
                };
                info!(artifact = %dependent, root = %id, "skipped");
                self.transition(&dependent, ArtifactStatus::Skipped, |e| {
                    e.last_error = Some(skip.to_string());
                    e.skip = Some(skip);
                })
                .await?;
            }
        }
        Ok(())
    }

    /// Root failure behind a dependency that is not confirmed.
    async fn skip_root(&self, dependency: &str) -> ArtifactId {
        let writer = self.writer.lock().await;
        match writer.record().entry(dependency).and_then(|e| e.skip.as_ref()) {
            Some(SkipReason::DependencyFailed { root }) => root.clone(),
            None => dependency.to_string(),
        }
    }

    /// Reserves `min_fee` per submittable artifact against the deployer's
    /// live balance; artifacts that do not fit fail.
    async fn preflight(&self, batch: &[ArtifactId]) -> Result<(), DeployError> {
        let min_fee = self.settings.min_fee;
        if min_fee == 0 {
            return Ok(());
        }

        let mut candidates = Vec::new();
        {
            let writer = self.writer.lock().await;
            for id in batch {
                if self.resume.contains_key(id)
                    || writer.status(id) != Some(ArtifactStatus::Pending)
                {
                    continue;
                }
                let deps_ready = self.plan.dependencies_of(id).iter().all(|d| {
                    writer.status(d) == Some(ArtifactStatus::Confirmed)
                });
                if deps_ready {
                    candidates.push(id.clone());
                }
            }
        }
        if candidates.is_empty() {
            return Ok(());
        }

        let account = match self
            .monitor
            .query_account(&self.network.deployer_address, true)
            .await
        {
            Ok(account) => account,
            Err(e) => {
                warn!(error = %e, "balance preflight unavailable, continuing");
                return Ok(());
            }
        };

        let mut available = account.balance;
        for id in candidates {
            if available >= min_fee {
                available -= min_fee;
                continue;
            }
            self.transition(&id, ArtifactStatus::Queued, |_| {}).await?;
            self.fail(
                &id,
                FailureReason::InsufficientBalance {
                    required: min_fee,
                    available,
                },
                None,
            )
            .await?;
        }
        Ok(())
    }

    /// Drives one artifact to a terminal state.
    async fn process(&self, id: &str) -> Result<(), DeployError> {
        if let Some(tx_id) = self.resume.get(id) {
            info!(artifact = %id, tx = %tx_id, "resuming confirmation");
            return self.confirm(id, tx_id).await;
        }
        if self.status(id).await != Some(ArtifactStatus::Pending) {
            return Ok(());
        }
        let artifact = self
            .plan
            .artifact(id)
            .ok_or_else(|| DeployError::UnknownArtifact(id.to_string()))?;

        for dep in &artifact.dependencies {
            if self.status(dep).await != Some(ArtifactStatus::Confirmed) {
                let skip = SkipReason::DependencyFailed {
                    root: self.skip_root(dep).await,
                };
                info!(artifact = %id, dependency = %dep, "dependency not confirmed, skipped");
                return self
                    .transition(id, ArtifactStatus::Skipped, |e| {
                        e.last_error = Some(skip.to_string());
                        e.skip = Some(skip);
                    })
                    .await;
            }
        }

        self.transition(id, ArtifactStatus::Queued, |_| {}).await?;

        let path = self.settings.project_root.join(&artifact.source_path);
        let source = match tokio::fs::read_to_string(&path).await {
            Ok(source) => source,
            Err(e) => {
                let reason = FailureReason::Compilation {
                    reason: format!("cannot read source {}: {e}", artifact.source_path),
                };
                return self.fail(id, reason, Some(e.to_string())).await;
            }
        };

        self.transition(id, ArtifactStatus::Submitting, |_| {}).await?;

        let address = ContractId::new(self.network.deployer_address.clone(), id);
        let tx_id = match self.submit(id, &source).await? {
            Submission::Sent(tx_id) => tx_id,
            Submission::OnChain => {
                info!(artifact = %id, "contract found on chain after an interrupted submission");
                self.transition(id, ArtifactStatus::AwaitingConfirmation, |e| {
                    e.address = Some(address);
                })
                .await?;
                return self
                    .transition(id, ArtifactStatus::Confirmed, |e| e.last_error = None)
                    .await;
            }
            Submission::Failed(reason, raw) => return self.fail(id, reason, Some(raw)).await,
        };

        let recorded_tx = tx_id.clone();
        self.transition(id, ArtifactStatus::AwaitingConfirmation, |e| {
            e.tx_id = Some(recorded_tx);
            e.address = Some(address);
        })
        .await?;

        self.confirm(id, &tx_id).await
    }

    /// Submits with bounded retries. The error is fatal to the run; a failed
    /// [`Submission`] only to the artifact.
    async fn submit(&self, id: &str, source: &str) -> Result<Submission, DeployError> {
        let artifact = self
            .plan
            .artifact(id)
            .ok_or_else(|| DeployError::UnknownArtifact(id.to_string()))?;
        let policy = &self.settings.retry;
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.writer
                .lock()
                .await
                .update(id, |e| e.attempts = attempt)?;

            match self
                .ledger
                .submit(artifact, source, &self.network.credential)
                .await
            {
                Ok(tx_id) => {
                    info!(artifact = %id, tx = %tx_id, attempt, "submitted");
                    return Ok(Submission::Sent(tx_id));
                }
                Err(LedgerError::Rejected { reason }) => {
                    // an earlier attempt may have reached the node before failing
                    if attempt > 1 && self.deployed_on_chain(id).await {
                        return Ok(Submission::OnChain);
                    }
                    let raw = format!("rejected: {reason}");
                    return Ok(Submission::Failed(FailureReason::Compilation { reason }, raw));
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = policy.delay_for_attempt(attempt);
                    warn!(artifact = %id, attempt, error = %e, ?delay, "submission failed, retrying");
                    self.emit(DeployEvent::Retrying {
                        artifact: id.to_string(),
                        attempt,
                        delay,
                        error: e.to_string(),
                    });
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Ok(Submission::Failed(
                        FailureReason::Network { attempts: attempt },
                        e.to_string(),
                    ));
                }
            }
        }
    }

    async fn deployed_on_chain(&self, id: &str) -> bool {
        let deployer = &self.network.deployer_address;
        match self.monitor.query_deployed_contracts(deployer, true).await {
            Ok(contracts) => contracts
                .iter()
                .any(|c| &c.deployer == deployer && c.name == id),
            Err(e) => {
                debug!(artifact = %id, error = %e, "deployed contract listing unavailable");
                false
            }
        }
    }

    async fn confirm(&self, id: &str, tx_id: &str) -> Result<(), DeployError> {
        let waited = self
            .monitor
            .wait_for_confirmation(tx_id, self.settings.confirmation_timeout)
            .await;
        match waited {
            Ok(status) if status.is_confirmed() => {
                info!(artifact = %id, tx = %tx_id, "confirmed");
                self.transition(id, ArtifactStatus::Confirmed, |e| {
                    e.last_error = None;
                })
                .await
            }
            Ok(status) => {
                let raw = format!("{:?}: {}", status.state, status.result.clone().unwrap_or_default());
                self.fail(
                    id,
                    FailureReason::Aborted {
                        state: status.state,
                        result: status.result,
                    },
                    Some(raw),
                )
                .await
            }
            Err(e @ MonitorError::ConfirmationTimeout { .. }) => {
                self.fail(
                    id,
                    FailureReason::ConfirmationTimeout {
                        tx_id: tx_id.to_string(),
                    },
                    Some(e.to_string()),
                )
                .await
            }
            Err(e) => {
                let attempts = match &e {
                    MonitorError::NetworkUnavailable { attempts, .. } => *attempts,
                    _ => 1,
                };
                self.fail(id, FailureReason::Network { attempts }, Some(e.to_string()))
                    .await
            }
        }
    }

    async fn result(&self, already: &BTreeSet<ArtifactId>) -> DeploymentResult {
        let writer = self.writer.lock().await;
        let record = writer.record();
        let raw_errors = self
            .raw_errors
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default();

        let mut result = empty_result(&self.plan, self.network.network, false);
        for id in self.plan.artifacts().keys() {
            let entry = record.entry(id).cloned().unwrap_or_else(RecordEntry::pending);
            match entry.status {
                ArtifactStatus::Confirmed if already.contains(id) => {
                    result.already_deployed.push(id.clone())
                }
                ArtifactStatus::Confirmed => result.successful.push(id.clone()),
                ArtifactStatus::Failed => result.failed.push((
                    id.clone(),
                    entry
                        .failure
                        .clone()
                        .unwrap_or(FailureReason::Network { attempts: entry.attempts }),
                )),
                ArtifactStatus::Skipped => result.skipped.push((
                    id.clone(),
                    entry.skip.clone().unwrap_or(SkipReason::DependencyFailed {
                        root: String::new(),
                    }),
                )),
                _ => result.interrupted.push(id.clone()),
            }

            let detail = entry
                .failure
                .as_ref()
                .map(ToString::to_string)
                .or_else(|| entry.skip.as_ref().map(ToString::to_string));
            let error = if self.settings.verbose_errors {
                raw_errors.get(id).cloned()
            } else {
                None
            };
            result
                .artifacts
                .push(report(&self.plan, id, &entry, detail, error));
        }
        result
    }
}

fn report(
    plan: &DeploymentPlan,
    id: &str,
    entry: &RecordEntry,
    detail: Option<String>,
    error: Option<String>,
) -> ArtifactReport {
    ArtifactReport {
        id: id.to_string(),
        status: entry.status,
        batch: plan.batch_index_of(id).unwrap_or_default(),
        tx_id: entry.tx_id.clone(),
        address: entry.address.clone(),
        attempts: entry.attempts,
        detail,
        error,
    }
}

fn empty_result(
    plan: &DeploymentPlan,
    network: orbit_protocol::Network,
    dry_run: bool,
) -> DeploymentResult {
    DeploymentResult {
        network,
        dry_run,
        plan: PlanSummary {
            artifacts: plan.len(),
            batches: plan.batches().len(),
        },
        artifacts: Vec::new(),
        successful: Vec::new(),
        already_deployed: Vec::new(),
        failed: Vec::new(),
        skipped: Vec::new(),
        interrupted: Vec::new(),
        would_submit: Vec::new(),
    }
}

fn dry_run_result(
    plan: &DeploymentPlan,
    record: &DeploymentRecord,
    already: &BTreeSet<ArtifactId>,
    resume: &BTreeMap<ArtifactId, TxId>,
) -> DeploymentResult {
    let mut result = empty_result(plan, record.network, true);
    for id in plan.artifacts().keys() {
        let entry = match record.entry(id) {
            Some(entry) if already.contains(id) || resume.contains_key(id) => entry.clone(),
            _ => RecordEntry::pending(),
        };
        if already.contains(id) {
            result.already_deployed.push(id.clone());
        } else {
            result.would_submit.push(id.clone());
        }
        result.artifacts.push(report(plan, id, &entry, None, None));
    }
    result
}
