//! Single writer for the run's deployment record.

use std::sync::Arc;

use chrono::Utc;
use orbit_protocol::{ArtifactStatus, Network};

use crate::error::{DeployError, RecordError};
use crate::record::{DeploymentRecord, RecordEntry, RecordStore};

/// Owns the in-flight record and writes it through to the store.
///
/// Shared between workers behind an async mutex, so every transition is
/// applied and flushed before the next one starts.
pub struct RecordWriter {
    store: Arc<dyn RecordStore>,
    record: DeploymentRecord,
}

impl RecordWriter {
    pub fn new(store: Arc<dyn RecordStore>, record: DeploymentRecord) -> Self {
        Self { store, record }
    }

    pub fn record(&self) -> &DeploymentRecord {
        &self.record
    }

    pub fn network(&self) -> Network {
        self.record.network
    }

    pub fn status(&self, id: &str) -> Option<ArtifactStatus> {
        self.record.status(id)
    }

    /// Moves `id` to `to`, applies `update` to its entry, and flushes.
    ///
    /// Returns the previous status.
    pub fn transition(
        &mut self,
        id: &str,
        to: ArtifactStatus,
        update: impl FnOnce(&mut RecordEntry),
    ) -> Result<ArtifactStatus, DeployError> {
        let entry = self
            .record
            .artifacts
            .get_mut(id)
            .ok_or_else(|| DeployError::UnknownArtifact(id.to_string()))?;
        let from = entry.status;
        if !from.can_transition_to(to) {
            return Err(DeployError::InvalidTransition {
                artifact: id.to_string(),
                from,
                to,
            });
        }
        entry.status = to;
        entry.updated_at = Utc::now();
        update(entry);
        self.flush()?;
        Ok(from)
    }

    /// Applies `update` without a status change and flushes.
    pub fn update(
        &mut self,
        id: &str,
        update: impl FnOnce(&mut RecordEntry),
    ) -> Result<(), DeployError> {
        let entry = self
            .record
            .artifacts
            .get_mut(id)
            .ok_or_else(|| DeployError::UnknownArtifact(id.to_string()))?;
        update(entry);
        entry.updated_at = Utc::now();
        self.flush()?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), RecordError> {
        self.record.updated_at = Utc::now();
        self.store.save(&self.record)
    }
}
