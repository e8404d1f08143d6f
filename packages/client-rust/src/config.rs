//! Client configuration types.

use std::path::PathBuf;
use std::time::Duration;

use sheetsync_core::BackoffPolicy;

/// Top-level configuration for the client runtime.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the `SheetSync` server API, e.g. `http://localhost:5500/api/v1`.
    pub api_base_url: String,
    /// Directory holding persisted tables, preferences and session.
    pub data_dir: PathBuf,
    /// Per-request HTTP timeout. A timed-out fetch counts as a provider failure.
    pub request_timeout: Duration,
    /// Sheet (tab) whose values are synced.
    pub sheet_name: String,
    /// How long an issued token is trusted locally before re-login is forced.
    pub session_ttl: Duration,
    /// Polling behaviour of the sync engine.
    pub sync: SyncConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5500/api/v1".to_string(),
            data_dir: PathBuf::from(".sheetsync"),
            request_timeout: Duration::from_secs(30),
            sheet_name: "Sheet1".to_string(),
            session_ttl: Duration::from_secs(60 * 60),
            sync: SyncConfig::default(),
        }
    }
}

/// Sync engine configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Interval growth and reset rules.
    pub backoff: BackoffPolicy,
    /// Capacity of the sync event broadcast channel.
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            event_capacity: 64,
        }
    }
}
