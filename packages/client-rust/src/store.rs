//! In-memory, persisted collection of table definitions.
//!
//! Mutations are copy-on-write at the table level: each produces a new
//! `Arc<Table>`, and the collection plus the current-table pointer are
//! swapped together under one write lock, so readers never observe a torn
//! state. The whole table list is serialized under that lock and written
//! back to the [`KeyValueStore`] after it is released; a failed write is
//! logged and the in-memory state stays authoritative.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use sheetsync_core::{Column, NewColumn, SyncError, SyncResult, SyncUpdate, Table, TableId};
use tracing::{debug, warn};

use crate::persist::{load_json, KeyValueStore, Snapshot, SnapshotWriter, TABLES_KEY};

// ---------------------------------------------------------------------------
// Observers
// ---------------------------------------------------------------------------

/// Observer for table store mutations.
///
/// Called after the mutation is visible to readers, outside the store lock.
pub trait StoreObserver: Send + Sync {
    /// Called after a table is created.
    fn on_created(&self, table: &Table);

    /// Called after a column is appended to a table.
    fn on_columns_changed(&self, table: &Table);

    /// Called after a sync rewrote a table's rows and tag.
    fn on_synced(&self, table: &Table);

    /// Called after the current table changed.
    fn on_current_changed(&self, table: &Table);
}

/// Composite observer that fans out to multiple observers.
#[derive(Default)]
pub struct CompositeStoreObserver {
    observers: Vec<Arc<dyn StoreObserver>>,
}

impl CompositeStoreObserver {
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn StoreObserver>>) -> Self {
        Self { observers }
    }

    pub fn add(&mut self, observer: Arc<dyn StoreObserver>) {
        self.observers.push(observer);
    }
}

impl StoreObserver for CompositeStoreObserver {
    fn on_created(&self, table: &Table) {
        for observer in &self.observers {
            observer.on_created(table);
        }
    }

    fn on_columns_changed(&self, table: &Table) {
        for observer in &self.observers {
            observer.on_columns_changed(table);
        }
    }

    fn on_synced(&self, table: &Table) {
        for observer in &self.observers {
            observer.on_synced(table);
        }
    }

    fn on_current_changed(&self, table: &Table) {
        for observer in &self.observers {
            observer.on_current_changed(table);
        }
    }
}

// ---------------------------------------------------------------------------
// TableStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    tables: Vec<Arc<Table>>,
    current: Option<TableId>,
}

impl StoreState {
    fn position(&self, id: &TableId) -> Option<usize> {
        self.tables.iter().position(|t| &t.id == id)
    }
}

/// Owner of all table definitions.
pub struct TableStore {
    state: RwLock<StoreState>,
    persistence: Arc<dyn KeyValueStore>,
    writer: SnapshotWriter,
    observer: CompositeStoreObserver,
}

impl TableStore {
    /// Loads the persisted table list once. A corrupt record is logged,
    /// removed, and the store starts empty.
    #[must_use]
    pub fn load(persistence: Arc<dyn KeyValueStore>, observers: Vec<Arc<dyn StoreObserver>>) -> Self {
        let tables = match load_json::<Vec<Table>>(persistence.as_ref(), TABLES_KEY) {
            Ok(tables) => tables.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "discarding unreadable stored tables");
                if let Err(e) = persistence.remove(TABLES_KEY) {
                    warn!(error = %e, "failed to remove stored tables");
                }
                Vec::new()
            }
        };
        debug!(count = tables.len(), "loaded tables");

        Self {
            state: RwLock::new(StoreState {
                tables: tables.into_iter().map(Arc::new).collect(),
                current: None,
            }),
            persistence,
            writer: SnapshotWriter::new(TABLES_KEY),
            observer: CompositeStoreObserver::new(observers),
        }
    }

    /// Creates a table whose initial columns are all sheet-sourced, and
    /// makes it current.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] for a blank table or column name, or
    /// two columns whose names differ only in case.
    pub fn create(&self, name: &str, columns: Vec<NewColumn>) -> SyncResult<Arc<Table>> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SyncError::Validation("table name must not be blank".to_string()));
        }
        let mut seen = BTreeSet::new();
        for column in &columns {
            check_column_name(&column.name, &seen)?;
            seen.insert(column.name.trim().to_lowercase());
        }

        let table = Arc::new(Table {
            id: TableId::generate(),
            name: name.to_string(),
            columns: columns
                .into_iter()
                .map(|c| Column::new(c.name.trim(), c.column_type, true))
                .collect(),
            rows: Vec::new(),
            google_sheet_id: None,
            last_synced_ms: None,
            etag: None,
        });

        let snapshot = {
            let mut state = self.state.write();
            state.tables.push(Arc::clone(&table));
            state.current = Some(table.id.clone());
            self.snapshot(&state.tables)
        };
        self.persist(snapshot);

        debug!(table_id = %table.id, name = %table.name, "table created");
        self.observer.on_created(&table);
        self.observer.on_current_changed(&table);
        Ok(table)
    }

    /// Returns the table with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if no such table exists.
    pub fn get(&self, id: &TableId) -> SyncResult<Arc<Table>> {
        self.find(id).ok_or_else(|| SyncError::NotFound(id.clone()))
    }

    /// Returns the table with `id`, or `None`.
    #[must_use]
    pub fn find(&self, id: &TableId) -> Option<Arc<Table>> {
        let state = self.state.read();
        state.position(id).map(|i| Arc::clone(&state.tables[i]))
    }

    /// Resolves a user-supplied reference: an exact id, else a
    /// case-insensitive table name.
    #[must_use]
    pub fn resolve(&self, reference: &str) -> Option<Arc<Table>> {
        let state = self.state.read();
        state
            .tables
            .iter()
            .find(|t| t.id.as_str() == reference)
            .or_else(|| {
                state
                    .tables
                    .iter()
                    .find(|t| t.name.eq_ignore_ascii_case(reference))
            })
            .cloned()
    }

    /// All tables in creation order.
    #[must_use]
    pub fn tables(&self) -> Vec<Arc<Table>> {
        self.state.read().tables.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().tables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().tables.is_empty()
    }

    /// The currently selected table, always read from the collection.
    #[must_use]
    pub fn current(&self) -> Option<Arc<Table>> {
        let state = self.state.read();
        let id = state.current.as_ref()?;
        state.position(id).map(|i| Arc::clone(&state.tables[i]))
    }

    /// Selects the table with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if no such table exists.
    pub fn set_current(&self, id: &TableId) -> SyncResult<Arc<Table>> {
        let table = {
            let mut state = self.state.write();
            let i = state
                .position(id)
                .ok_or_else(|| SyncError::NotFound(id.clone()))?;
            state.current = Some(id.clone());
            Arc::clone(&state.tables[i])
        };
        self.observer.on_current_changed(&table);
        Ok(table)
    }

    /// Appends a dashboard-only column (never touched by sync).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] for an unknown id and
    /// [`SyncError::Validation`] for a blank or case-duplicate name.
    pub fn add_column(&self, id: &TableId, column: NewColumn) -> SyncResult<Arc<Table>> {
        let table = self.replace(id, |table| {
            let existing: BTreeSet<String> = table.columns.iter().map(Column::key).collect();
            check_column_name(&column.name, &existing)?;
            table
                .columns
                .push(Column::new(column.name.trim(), column.column_type, false));
            Ok(())
        })?;
        debug!(table_id = %id, column = %column.name.trim(), "column added");
        self.observer.on_columns_changed(&table);
        Ok(table)
    }

    /// Atomically replaces rows, tag and sync time, and the sheet id when
    /// the update carries one. Used only by the sync engine.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if no such table exists.
    pub fn apply_sync(&self, id: &TableId, update: SyncUpdate) -> SyncResult<Arc<Table>> {
        let table = self.replace(id, move |table| {
            table.rows = update.rows;
            table.etag = Some(update.etag);
            table.last_synced_ms = Some(update.last_synced_ms);
            if let Some(sheet_id) = update.google_sheet_id {
                table.google_sheet_id = Some(sheet_id);
            }
            Ok(())
        })?;
        self.observer.on_synced(&table);
        Ok(table)
    }

    /// Copy-on-write update of one table under the store lock. The write
    /// back happens after the lock is released.
    fn replace<F>(&self, id: &TableId, mutate: F) -> SyncResult<Arc<Table>>
    where
        F: FnOnce(&mut Table) -> SyncResult<()>,
    {
        let (next, snapshot) = {
            let mut state = self.state.write();
            let i = state
                .position(id)
                .ok_or_else(|| SyncError::NotFound(id.clone()))?;
            let mut next = Table::clone(&state.tables[i]);
            mutate(&mut next)?;
            let next = Arc::new(next);
            state.tables[i] = Arc::clone(&next);
            (next, self.snapshot(&state.tables))
        };
        self.persist(snapshot);
        Ok(next)
    }

    fn snapshot(&self, tables: &[Arc<Table>]) -> Option<Snapshot> {
        let records: Vec<&Table> = tables.iter().map(AsRef::as_ref).collect();
        self.writer
            .take(&records)
            .map_err(|e| warn!(error = %e, "failed to serialize tables"))
            .ok()
    }

    fn persist(&self, snapshot: Option<Snapshot>) {
        let Some(snapshot) = snapshot else { return };
        if let Err(e) = self.writer.write(self.persistence.as_ref(), snapshot) {
            warn!(error = %e, "failed to persist tables");
        }
    }
}

fn check_column_name(name: &str, existing: &BTreeSet<String>) -> SyncResult<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SyncError::Validation("column name must not be blank".to_string()));
    }
    if existing.contains(&name.to_lowercase()) {
        return Err(SyncError::Validation(format!(
            "column {name:?} collides with an existing column (names are case-insensitive)"
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Counting observer shared by the store and engine tests.

    use std::sync::atomic::{AtomicUsize, Ordering};

    use sheetsync_core::Table;

    use super::StoreObserver;

    /// Test observer that counts how many times each method is called.
    #[derive(Default)]
    #[allow(clippy::struct_field_names)]
    pub struct CountingObserver {
        pub created_count: AtomicUsize,
        pub columns_count: AtomicUsize,
        pub synced_count: AtomicUsize,
        pub current_count: AtomicUsize,
    }

    impl CountingObserver {
        pub fn synced(&self) -> usize {
            self.synced_count.load(Ordering::SeqCst)
        }
    }

    impl StoreObserver for CountingObserver {
        fn on_created(&self, _: &Table) {
            self.created_count.fetch_add(1, Ordering::SeqCst);
        }
        fn on_columns_changed(&self, _: &Table) {
            self.columns_count.fetch_add(1, Ordering::SeqCst);
        }
        fn on_synced(&self, _: &Table) {
            self.synced_count.fetch_add(1, Ordering::SeqCst);
        }
        fn on_current_changed(&self, _: &Table) {
            self.current_count.fetch_add(1, Ordering::SeqCst);
        }
    }
}
