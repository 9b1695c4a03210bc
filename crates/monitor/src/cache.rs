//! TTL cache for monitor queries.
//!
//! One cache per monitor, bound to one network. Entries are keyed by a
//! fingerprint of the query method and its parameters.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use orbit_protocol::{AccountState, ContractId, NetworkInfo, TxStatus};
use serde::Serialize;
use tokio::time::Instant;
use tracing::trace;

/// Default time-to-live for cached results.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

/// Cache key: query method plus ordered parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub method: &'static str,
    pub params: Vec<String>,
}

impl Fingerprint {
    pub fn new(method: &'static str, params: &[&str]) -> Self {
        Self {
            method,
            params: params.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// A cached query result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    Account(AccountState),
    Transaction(TxStatus),
    Contracts(Vec<ContractId>),
    Info(NetworkInfo),
}

/// Result types the monitor caches.
pub trait Cacheable: Clone + Sized {
    fn into_cached(self) -> CachedValue;
    fn from_cached(value: &CachedValue) -> Option<Self>;
}

impl Cacheable for AccountState {
    fn into_cached(self) -> CachedValue {
        CachedValue::Account(self)
    }
    fn from_cached(value: &CachedValue) -> Option<Self> {
        match value {
            CachedValue::Account(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl Cacheable for TxStatus {
    fn into_cached(self) -> CachedValue {
        CachedValue::Transaction(self)
    }
    fn from_cached(value: &CachedValue) -> Option<Self> {
        match value {
            CachedValue::Transaction(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl Cacheable for Vec<ContractId> {
    fn into_cached(self) -> CachedValue {
        CachedValue::Contracts(self)
    }
    fn from_cached(value: &CachedValue) -> Option<Self> {
        match value {
            CachedValue::Contracts(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl Cacheable for NetworkInfo {
    fn into_cached(self) -> CachedValue {
        CachedValue::Info(self)
    }
    fn from_cached(value: &CachedValue) -> Option<Self> {
        match value {
            CachedValue::Info(v) => Some(v.clone()),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    value: CachedValue,
    expires_at: Instant,
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Debug)]
pub struct QueryCache {
    ttl: Duration,
    entries: Mutex<HashMap<Fingerprint, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a live entry, counting a hit or a miss.
    pub fn get<T: Cacheable>(&self, key: &Fingerprint) -> Option<T> {
        let now = Instant::now();
        let found = self.entries.lock().ok().and_then(|mut entries| {
            let state = entries
                .get(key)
                .map(|entry| (entry.expires_at > now, T::from_cached(&entry.value)));
            match state {
                Some((true, value)) => value,
                Some((false, _)) => {
                    entries.remove(key);
                    None
                }
                None => None,
            }
        });
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(method = key.method, "cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(method = key.method, "cache miss");
        }
        found
    }

    /// Stores (or refreshes) an entry.
    pub fn insert<T: Cacheable>(&self, key: Fingerprint, value: T) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key,
                CacheEntry {
                    value: value.into_cached(),
                    expires_at: Instant::now() + self.ttl,
                },
            );
        }
    }

    pub fn invalidate(&self, key: &Fingerprint) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.lock().map(|e| e.len()).unwrap_or(0),
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}
