use std::time::Duration;

/// Current schema version of persisted deployment records.
pub const RECORD_SCHEMA_VERSION: u32 = 1;

/// Micro-units per whole STX.
pub const MICRO_PER_STX: u64 = 1_000_000;

/// Default Hiro API endpoint for mainnet.
pub const MAINNET_API_URL: &str = "https://api.hiro.so";

/// Default Hiro API endpoint for testnet.
pub const TESTNET_API_URL: &str = "https://api.testnet.hiro.so";

/// Default endpoint of a local devnet node.
pub const DEVNET_API_URL: &str = "http://localhost:20443";

/// Timeout for a single HTTP request against the ledger API.
pub const LEDGER_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Project-relative directory holding Orbit state (records, caches).
pub const STATE_DIR: &str = ".stacksorbit";
