//! Network monitor: cached queries with backoff and confirmation polling.

use std::sync::Arc;
use std::time::Duration;

use orbit_protocol::{
    AccountState, ContractId, LedgerClient, LedgerError, LedgerFuture, Network, NetworkInfo,
    TxState, TxStatus,
};
use serde::Deserialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::backoff::{BackoffPolicy, ConfirmationPolicy};
use crate::cache::{Cacheable, DEFAULT_CACHE_TTL, Fingerprint, QueryCache};
use crate::error::MonitorError;

/// Monitor configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    #[serde(with = "orbit_protocol::duration::secs")]
    pub cache_ttl: Duration,
    pub backoff: BackoffPolicy,
    pub confirmation: ConfirmationPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            backoff: BackoffPolicy::default(),
            confirmation: ConfirmationPolicy::default(),
        }
    }
}

/// Queries one network through a [`LedgerClient`], caching results and
/// retrying transport failures.
pub struct NetworkMonitor {
    ledger: Arc<dyn LedgerClient>,
    cache: QueryCache,
    config: MonitorConfig,
    cancel: CancellationToken,
}

impl NetworkMonitor {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: MonitorConfig) -> Self {
        Self {
            ledger,
            cache: QueryCache::new(config.cache_ttl),
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn network(&self) -> Network {
        self.ledger.network()
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Token that stops backoff sleeps and watch streams.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn query_account(
        &self,
        address: &str,
        bypass_cache: bool,
    ) -> Result<AccountState, MonitorError> {
        self.cached(Fingerprint::new("account", &[address]), bypass_cache, || {
            self.ledger.get_account(address)
        })
        .await
    }

    pub async fn query_transaction(
        &self,
        tx_id: &str,
        bypass_cache: bool,
    ) -> Result<TxStatus, MonitorError> {
        self.cached(Fingerprint::new("transaction", &[tx_id]), bypass_cache, || {
            self.ledger.get_transaction(tx_id)
        })
        .await
    }

    pub async fn query_deployed_contracts(
        &self,
        address: &str,
        bypass_cache: bool,
    ) -> Result<Vec<ContractId>, MonitorError> {
        self.cached(Fingerprint::new("contracts", &[address]), bypass_cache, || {
            self.ledger.get_deployed_contracts(address)
        })
        .await
    }

    pub async fn network_info(&self, bypass_cache: bool) -> Result<NetworkInfo, MonitorError> {
        self.cached(Fingerprint::new("info", &[]), bypass_cache, || {
            self.ledger.get_network_info()
        })
        .await
    }

    async fn cached<'f, T, F>(
        &self,
        key: Fingerprint,
        bypass_cache: bool,
        call: F,
    ) -> Result<T, MonitorError>
    where
        T: Cacheable,
        F: FnMut() -> LedgerFuture<'f, T>,
    {
        if !bypass_cache && let Some(hit) = self.cache.get::<T>(&key) {
            return Ok(hit);
        }
        let value = self.with_retry(key.method, call).await?;
        self.cache.insert(key, value.clone());
        Ok(value)
    }

    /// Runs `call` until it succeeds, fails with a non-retryable error, or
    /// fails `max_consecutive_failures` times in a row.
    async fn with_retry<'f, T, F>(&self, what: &str, mut call: F) -> Result<T, MonitorError>
    where
        F: FnMut() -> LedgerFuture<'f, T>,
    {
        let policy = &self.config.backoff;
        let max_attempts = policy.max_consecutive_failures.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    if attempt >= max_attempts {
                        warn!(query = what, attempts = attempt, error = %e, "network unavailable");
                        return Err(MonitorError::NetworkUnavailable {
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }
                    let delay = policy.delay_for_attempt(attempt);
                    debug!(query = what, attempt, error = %e, ?delay, "query failed, backing off");
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(MonitorError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Polls a transaction (always bypassing the cache) until it reaches a
    /// terminal state or `timeout` elapses.
    ///
    /// The poll interval starts at the policy's initial interval, doubles up
    /// to its cap, and resets whenever the observed state changes. A
    /// transaction the node does not know yet counts as pending.
    pub async fn wait_for_confirmation(
        &self,
        tx_id: &str,
        timeout: Duration,
    ) -> Result<TxStatus, MonitorError> {
        let policy = &self.config.confirmation;
        let deadline = Instant::now() + timeout;
        let mut interval = policy.initial_interval;
        let mut last_state: Option<TxState> = None;

        loop {
            match self.query_transaction(tx_id, true).await {
                Ok(status) => {
                    if last_state != Some(status.state) {
                        info!(tx = tx_id, state = ?status.state, "transaction status");
                        last_state = Some(status.state);
                        interval = policy.initial_interval;
                    }
                    if status.state.is_terminal() {
                        return Ok(status);
                    }
                }
                Err(MonitorError::Ledger(LedgerError::NotFound(_))) => {
                    trace!(tx = tx_id, "transaction not visible yet");
                }
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(tx = tx_id, ?timeout, "confirmation timeout");
                return Err(MonitorError::ConfirmationTimeout {
                    tx_id: tx_id.to_string(),
                    waited: timeout,
                });
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(MonitorError::Cancelled),
                _ = tokio::time::sleep(interval.min(deadline - now)) => {}
            }
            interval = policy.next_interval(interval);
        }
    }
}
