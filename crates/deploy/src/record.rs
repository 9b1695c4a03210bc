//! Durable per-network deployment records.
//!
//! One JSON document per network under
//! `<project>/.stacksorbit/deployments/<network>.json`, rewritten atomically
//! after every artifact state transition.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use orbit_protocol::constants::{RECORD_SCHEMA_VERSION, STATE_DIR};
use orbit_protocol::{ArtifactId, ArtifactStatus, ContractId, Network, TxId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RecordError;
use crate::types::{FailureReason, SkipReason};

/// Persisted state of one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub status: ArtifactStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<TxId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<ContractId>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<SkipReason>,
    pub updated_at: DateTime<Utc>,
}

impl RecordEntry {
    pub fn pending() -> Self {
        Self {
            status: ArtifactStatus::Pending,
            tx_id: None,
            address: None,
            attempts: 0,
            last_error: None,
            failure: None,
            skip: None,
            updated_at: Utc::now(),
        }
    }

    /// Entry reopened for a new run that re-polls `tx_id`. Attempts and
    /// address carry over from `previous`.
    pub fn awaiting(previous: &RecordEntry, tx_id: TxId) -> Self {
        Self {
            status: ArtifactStatus::AwaitingConfirmation,
            tx_id: Some(tx_id),
            address: previous.address.clone(),
            attempts: previous.attempts,
            ..Self::pending()
        }
    }

    /// Entry for a contract found on chain without a record of its own.
    pub fn on_chain(address: ContractId) -> Self {
        Self {
            status: ArtifactStatus::Confirmed,
            address: Some(address),
            ..Self::pending()
        }
    }
}

/// Snapshot of a network's deployment state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub schema_version: u32,
    pub network: Network,
    pub deployer: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub artifacts: BTreeMap<ArtifactId, RecordEntry>,
}

impl DeploymentRecord {
    pub fn new(network: Network, deployer: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            schema_version: RECORD_SCHEMA_VERSION,
            network,
            deployer: deployer.into(),
            created_at: now,
            updated_at: now,
            artifacts: BTreeMap::new(),
        }
    }

    pub fn entry(&self, id: &str) -> Option<&RecordEntry> {
        self.artifacts.get(id)
    }

    pub fn status(&self, id: &str) -> Option<ArtifactStatus> {
        self.artifacts.get(id).map(|e| e.status)
    }

    fn with_status(&self, status: ArtifactStatus) -> BTreeSet<ArtifactId> {
        self.artifacts
            .iter()
            .filter(|(_, e)| e.status == status)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn confirmed(&self) -> BTreeSet<ArtifactId> {
        self.with_status(ArtifactStatus::Confirmed)
    }

    pub fn failed(&self) -> BTreeSet<ArtifactId> {
        self.with_status(ArtifactStatus::Failed)
    }

    pub fn skipped(&self) -> BTreeSet<ArtifactId> {
        self.with_status(ArtifactStatus::Skipped)
    }
}

/// Storage for deployment records.
pub trait RecordStore: Send + Sync {
    fn load(&self, network: Network) -> Result<Option<DeploymentRecord>, RecordError>;
    fn save(&self, record: &DeploymentRecord) -> Result<(), RecordError>;
}

/// Stores records as pretty-printed JSON files, one per network.
#[derive(Debug, Clone)]
pub struct JsonRecordStore {
    dir: PathBuf,
}

impl JsonRecordStore {
    /// Store rooted at an explicit directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store at `<project_root>/.stacksorbit/deployments`.
    pub fn for_project(project_root: &Path) -> Self {
        Self::new(project_root.join(STATE_DIR).join("deployments"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, network: Network) -> PathBuf {
        self.dir.join(format!("{}.json", network.as_str()))
    }
}

impl RecordStore for JsonRecordStore {
    fn load(&self, network: Network) -> Result<Option<DeploymentRecord>, RecordError> {
        let path = self.path_for(network);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // Check the version before the full decode so a newer layout gets a
        // clear error instead of a field mismatch.
        let raw: serde_json::Value = serde_json::from_slice(&data)?;
        let found = raw
            .get("schema_version")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0) as u32;
        if found > RECORD_SCHEMA_VERSION {
            return Err(RecordError::UnsupportedSchema {
                found,
                supported: RECORD_SCHEMA_VERSION,
            });
        }

        let record: DeploymentRecord = serde_json::from_value(raw)?;
        if record.network != network {
            return Err(RecordError::NetworkMismatch {
                expected: network.to_string(),
                found: record.network.to_string(),
            });
        }
        debug!(path = %path.display(), artifacts = record.artifacts.len(), "record loaded");
        Ok(Some(record))
    }

    fn save(&self, record: &DeploymentRecord) -> Result<(), RecordError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(record.network);

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut tmp, record)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| RecordError::Io(e.error))?;
        Ok(())
    }
}

/// In-memory store, for tests and dry tooling.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<Network, DeploymentRecord>>,
    saves: AtomicUsize,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a record.
    pub fn with_record(record: DeploymentRecord) -> Self {
        let store = Self::default();
        if let Ok(mut records) = store.records.lock() {
            records.insert(record.network, record);
        }
        store
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn get(&self, network: Network) -> Option<DeploymentRecord> {
        self.records.lock().ok()?.get(&network).cloned()
    }
}

impl RecordStore for MemoryRecordStore {
    fn load(&self, network: Network) -> Result<Option<DeploymentRecord>, RecordError> {
        Ok(self.get(network))
    }

    fn save(&self, record: &DeploymentRecord) -> Result<(), RecordError> {
        if let Ok(mut records) = self.records.lock() {
            records.insert(record.network, record.clone());
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
