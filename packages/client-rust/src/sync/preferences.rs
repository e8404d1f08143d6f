//! Persisted per-table "sync enabled" flags.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use sheetsync_core::TableId;
use tracing::warn;

use crate::persist::{load_json, KeyValueStore, SnapshotWriter, SYNC_PREFERENCES_KEY};

/// Table id to enabled map, written back on every change.
pub struct SyncPreferences {
    store: Arc<dyn KeyValueStore>,
    writer: SnapshotWriter,
    enabled: RwLock<BTreeMap<TableId, bool>>,
}

impl SyncPreferences {
    /// Loads the persisted map. An unreadable record is logged and dropped.
    #[must_use]
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let enabled = match load_json::<BTreeMap<TableId, bool>>(store.as_ref(), SYNC_PREFERENCES_KEY) {
            Ok(map) => map.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "discarding unreadable sync preferences");
                BTreeMap::new()
            }
        };
        Self {
            store,
            writer: SnapshotWriter::new(SYNC_PREFERENCES_KEY),
            enabled: RwLock::new(enabled),
        }
    }

    #[must_use]
    pub fn is_enabled(&self, id: &TableId) -> bool {
        self.enabled.read().get(id).copied().unwrap_or(false)
    }

    /// Whether a flag, on or off, was ever recorded for `id`.
    #[must_use]
    pub fn contains(&self, id: &TableId) -> bool {
        self.enabled.read().contains_key(id)
    }

    /// Records the flag and persists the whole map once the lock is released.
    pub fn set(&self, id: &TableId, enabled: bool) {
        let snapshot = {
            let mut map = self.enabled.write();
            map.insert(id.clone(), enabled);
            self.writer.take(&*map)
        };
        if let Err(e) = snapshot.and_then(|s| self.writer.write(self.store.as_ref(), s)) {
            warn!(table_id = %id, error = %e, "failed to persist sync preferences");
        }
    }

    /// Ids whose flag is `true`, in id order.
    #[must_use]
    pub fn enabled_ids(&self) -> Vec<TableId> {
        self.enabled
            .read()
            .iter()
            .filter(|(_, on)| **on)
            .map(|(id, _)| id.clone())
            .collect()
    }
}
