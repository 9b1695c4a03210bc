//! Network monitor for Orbit.
//!
//! Wraps a [`LedgerClient`](orbit_protocol::LedgerClient) with a per-network
//! TTL cache, exponential backoff on transport failures, transaction
//! confirmation polling and watch streams.

pub mod backoff;
pub mod cache;
pub mod error;
pub mod monitor;
pub mod watch;

pub use backoff::{BackoffPolicy, ConfirmationPolicy};
pub use cache::{CacheStats, DEFAULT_CACHE_TTL, Fingerprint, QueryCache};
pub use error::MonitorError;
pub use monitor::{MonitorConfig, NetworkMonitor};
pub use watch::{MonitorEvent, WatchTarget};
