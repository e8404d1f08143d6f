use std::time::Duration;

use sheetsync_core::{SyncError, TableId};

/// Result of one fetch cycle or forced sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Poll cycle saw a new tag and replaced the rows.
    Changed,
    /// Poll cycle saw the stored tag; rows untouched.
    Unchanged,
    /// Poll cycle fetch failed; rows untouched.
    Failed(SyncError),
    /// Forced `refresh` overwrote the rows.
    Refreshed,
    /// First-time `connect` stored the sheet id and rows.
    Connected,
}

/// Broadcast after every cycle and forced sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    pub table_id: TableId,
    pub outcome: SyncOutcome,
    /// Delay before the next poll cycle, `None` when the table is not polling.
    pub next_interval: Option<Duration>,
}
