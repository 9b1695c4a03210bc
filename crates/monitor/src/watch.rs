//! Snapshot and follow streams over the monitor.

use std::sync::Arc;
use std::time::Duration;

use orbit_protocol::{AccountState, TxId, TxStatus};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::monitor::NetworkMonitor;

/// What a watch stream observes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchTarget {
    Account(String),
    Transaction(TxId),
}

impl WatchTarget {
    fn label(&self) -> &str {
        match self {
            WatchTarget::Account(a) => a,
            WatchTarget::Transaction(t) => t,
        }
    }
}

/// One observation from a watch stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    Account(AccountState),
    Transaction(TxStatus),
    Error { target: String, message: String },
}

const WATCH_CHANNEL_CAPACITY: usize = 32;

impl NetworkMonitor {
    /// Streams snapshots of `target`.
    ///
    /// Without `follow` the stream yields one snapshot and closes. With
    /// `follow` it yields one per `interval` until the monitor's cancel token
    /// fires, the receiver is dropped, or a watched transaction reaches a
    /// terminal state. Query errors are delivered as [`MonitorEvent::Error`].
    pub fn watch(
        self: &Arc<Self>,
        target: WatchTarget,
        follow: bool,
        bypass_cache: bool,
        interval: Duration,
    ) -> mpsc::Receiver<MonitorEvent> {
        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let monitor = Arc::clone(self);
        let cancel = self.cancel_token();

        tokio::spawn(async move {
            loop {
                let (event, done) = match &target {
                    WatchTarget::Account(address) => {
                        match monitor.query_account(address, bypass_cache).await {
                            Ok(account) => (MonitorEvent::Account(account), false),
                            Err(e) => (error_event(&target, e), false),
                        }
                    }
                    WatchTarget::Transaction(tx_id) => {
                        match monitor.query_transaction(tx_id, bypass_cache).await {
                            Ok(status) => {
                                let terminal = status.state.is_terminal();
                                (MonitorEvent::Transaction(status), terminal)
                            }
                            Err(e) => (error_event(&target, e), false),
                        }
                    }
                };

                if tx.send(event).await.is_err() || done || !follow {
                    break;
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            debug!(target = target.label(), "watch stream closed");
        });

        rx
    }
}

fn error_event(target: &WatchTarget, e: impl std::fmt::Display) -> MonitorEvent {
    MonitorEvent::Error {
        target: target.label().to_string(),
        message: e.to_string(),
    }
}
