//! Sheet polling: per-table adaptive fetch cycles and forced syncs.

mod engine;
mod events;
mod preferences;

pub use engine::SyncEngine;
pub use events::{SyncEvent, SyncOutcome};
pub use preferences::SyncPreferences;
