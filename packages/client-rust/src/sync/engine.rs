//! Per-table polling engine.
//!
//! Each polled table owns exactly one spawned task that runs a fetch cycle,
//! then sleeps for the table's current interval, until it is cancelled or
//! finds its table gone or disconnected. All fetches for one table, whether
//! from the poll task or a forced `refresh`/`connect`, run under a per-table
//! async lock, so they never overlap.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sheetsync_core::{
    project, BackoffPolicy, ClockSource, PollInterval, SyncError, SyncResult, SyncUpdate, Table,
    TableId,
};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::{SyncEvent, SyncOutcome};
use super::preferences::SyncPreferences;
use crate::config::SyncConfig;
use crate::fetcher::SheetFetcher;
use crate::persist::KeyValueStore;
use crate::store::TableStore;

/// Handle of one running poll task.
struct PollHandle {
    /// Distinguishes this task from a later one for the same table.
    generation: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

enum CycleStep {
    Continue,
    Stop,
}

struct EngineInner {
    store: Arc<TableStore>,
    fetcher: SheetFetcher,
    prefs: SyncPreferences,
    policy: BackoffPolicy,
    clock: Arc<dyn ClockSource>,
    pollers: DashMap<TableId, PollHandle>,
    intervals: DashMap<TableId, PollInterval>,
    cycle_locks: DashMap<TableId, Arc<Mutex<()>>>,
    events: broadcast::Sender<SyncEvent>,
    next_generation: AtomicU64,
}

/// Owns every table's polling task and forced-sync entry points.
///
/// Dropping the engine cancels all poll tasks without waiting for them;
/// call [`SyncEngine::shutdown`] to also wait.
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    #[must_use]
    pub fn new(
        store: Arc<TableStore>,
        fetcher: SheetFetcher,
        persistence: Arc<dyn KeyValueStore>,
        config: &SyncConfig,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(EngineInner {
                store,
                fetcher,
                prefs: SyncPreferences::load(persistence),
                policy: config.backoff.clone(),
                clock,
                pollers: DashMap::new(),
                intervals: DashMap::new(),
                cycle_locks: DashMap::new(),
                events,
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Turns polling on for `id`: persists the preference and, unless a poll
    /// task already runs, starts one whose first cycle fires immediately.
    ///
    /// Poll failures never surface here; they only lengthen the interval.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] for an unknown table.
    pub fn enable(&self, id: &TableId) -> SyncResult<()> {
        self.inner.store.get(id)?;
        self.inner.prefs.set(id, true);
        if self.inner.start_polling(id) {
            info!(table_id = %id, "polling enabled");
        }
        Ok(())
    }

    /// Turns polling off for `id` and cancels its pending cycle. An in-flight
    /// fetch is not interrupted; its result is discarded. Idempotent.
    ///
    /// An id that is neither a table nor has a recorded preference leaves
    /// the persisted preferences untouched.
    pub fn disable(&self, id: &TableId) {
        if self.inner.store.find(id).is_some() || self.inner.prefs.contains(id) {
            self.inner.prefs.set(id, false);
        }
        if let Some((_, handle)) = self.inner.pollers.remove(id) {
            handle.cancel.cancel();
            info!(table_id = %id, "polling disabled");
        }
        self.inner.intervals.remove(id);
    }

    /// Persisted preference for `id`.
    #[must_use]
    pub fn is_enabled(&self, id: &TableId) -> bool {
        self.inner.prefs.is_enabled(id)
    }

    /// Whether a poll task currently runs for `id`.
    #[must_use]
    pub fn is_polling(&self, id: &TableId) -> bool {
        self.inner.pollers.contains_key(id)
    }

    /// Delay the poll task will wait after its current or next cycle.
    #[must_use]
    pub fn current_interval(&self, id: &TableId) -> Option<Duration> {
        self.inner.intervals.get(id).map(|i| i.as_duration())
    }

    /// Forced sync of a connected table: always overwrites rows and tag,
    /// whether or not the sheet changed. Resets the interval of a polling
    /// table but never starts or stops polling.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotFound`] for an unknown table
    /// - [`SyncError::Validation`] if the table has no sheet
    /// - fetch errors, with the table left untouched
    pub async fn refresh(&self, id: &TableId) -> SyncResult<Arc<Table>> {
        let table = self.inner.store.get(id)?;
        let sheet_id = table.google_sheet_id.clone().ok_or_else(|| {
            SyncError::Validation(format!("table {id} is not connected to a sheet"))
        })?;
        let table = self.inner.force_sync(id, &sheet_id, false).await?;
        info!(table_id = %id, rows = table.rows.len(), "table refreshed");
        self.inner.emit(id, SyncOutcome::Refreshed);
        Ok(table)
    }

    /// Binds a table to `sheet_id` with a forced sync. On success the sheet
    /// id is stored and, if the preference is on, polling is (re)started.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotFound`] for an unknown table
    /// - [`SyncError::Validation`] for a blank sheet id
    /// - fetch errors, with the table left without a sheet id
    pub async fn connect(&self, id: &TableId, sheet_id: &str) -> SyncResult<Arc<Table>> {
        self.inner.store.get(id)?;
        let sheet_id = sheet_id.trim();
        let table = self.inner.force_sync(id, sheet_id, true).await?;
        info!(table_id = %id, sheet_id, rows = table.rows.len(), "sheet connected");
        if self.inner.prefs.is_enabled(id) && self.inner.start_polling(id) {
            info!(table_id = %id, "polling resumed after connect");
        }
        self.inner.emit(id, SyncOutcome::Connected);
        Ok(table)
    }

    /// Makes `id` the current table; a polling table's interval is reset to
    /// base so a viewed table refreshes promptly.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] for an unknown table.
    pub fn select(&self, id: &TableId) -> SyncResult<Arc<Table>> {
        let table = self.inner.store.set_current(id)?;
        self.inner.reset_interval(id);
        Ok(table)
    }

    /// Starts polling every existing table whose preference is on. Returns
    /// how many poll tasks were started.
    pub fn resume(&self) -> usize {
        let mut started = 0;
        for id in self.inner.prefs.enabled_ids() {
            if self.inner.store.find(&id).is_none() {
                debug!(table_id = %id, "skipping preference of unknown table");
                continue;
            }
            if self.inner.start_polling(&id) {
                started += 1;
            }
        }
        info!(started, "polling resumed");
        started
    }

    /// Receiver of every subsequent [`SyncEvent`].
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Cancels every poll task and waits for each to finish. Preferences
    /// are kept, so [`SyncEngine::resume`] picks them up again.
    pub async fn shutdown(&self) {
        let ids: Vec<TableId> = self.inner.pollers.iter().map(|e| e.key().clone()).collect();
        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((_, handle)) = self.inner.pollers.remove(&id) {
                handle.cancel.cancel();
                tasks.push(handle.task);
            }
            self.inner.intervals.remove(&id);
        }
        let count = tasks.len();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "poll task ended abnormally");
            }
        }
        info!(stopped = count, "sync engine shut down");
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        for entry in &self.inner.pollers {
            entry.value().cancel.cancel();
        }
    }
}

impl EngineInner {
    /// Spawns a poll task for `id` unless one already runs. Returns whether
    /// a task was started.
    fn start_polling(self: &Arc<Self>, id: &TableId) -> bool {
        match self.pollers.entry(id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let cancel = CancellationToken::new();
                self.intervals
                    .insert(id.clone(), PollInterval::new(&self.policy));
                let task = tokio::spawn(poll_loop(
                    Arc::clone(self),
                    id.clone(),
                    generation,
                    cancel.clone(),
                ));
                slot.insert(PollHandle {
                    generation,
                    cancel,
                    task,
                });
                true
            }
        }
    }

    fn cycle_lock(&self, id: &TableId) -> Arc<Mutex<()>> {
        Arc::clone(&self.cycle_locks.entry(id.clone()).or_default())
    }

    /// Applies `update` to a polling table's interval. `None` once the table
    /// stopped polling.
    fn update_interval(
        &self,
        id: &TableId,
        update: impl FnOnce(&mut PollInterval, &BackoffPolicy),
    ) -> Option<Duration> {
        let mut interval = self.intervals.get_mut(id)?;
        update(&mut *interval, &self.policy);
        Some(interval.as_duration())
    }

    fn reset_interval(&self, id: &TableId) -> Option<Duration> {
        self.update_interval(id, PollInterval::reset)
    }

    fn emit(&self, id: &TableId, outcome: SyncOutcome) {
        let event = SyncEvent {
            table_id: id.clone(),
            outcome,
            next_interval: self.intervals.get(id).map(|i| i.as_duration()),
        };
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Fetch, project and unconditionally apply, under the cycle lock.
    async fn force_sync(&self, id: &TableId, sheet_id: &str, connect: bool) -> SyncResult<Arc<Table>> {
        let lock = self.cycle_lock(id);
        let _guard = lock.lock().await;

        let sheet = self.fetcher.fetch(sheet_id).await?;
        // Re-read after the fetch: columns may have changed meanwhile.
        let table = self.store.get(id)?;
        let rows = project(&sheet.rows, &table.sheet_sourced_names());
        let table = self.store.apply_sync(
            id,
            SyncUpdate {
                rows,
                etag: sheet.etag,
                last_synced_ms: self.clock.now(),
                google_sheet_id: connect.then(|| sheet_id.to_string()),
            },
        )?;
        self.reset_interval(id);
        Ok(table)
    }

    /// One poll cycle: fetch, compare tags, apply on change, adjust the
    /// interval.
    async fn cycle(&self, id: &TableId, cancel: &CancellationToken) -> CycleStep {
        let lock = self.cycle_lock(id);
        let _guard = lock.lock().await;
        if cancel.is_cancelled() {
            return CycleStep::Stop;
        }

        let Some(table) = self.store.find(id) else {
            debug!(table_id = %id, "table gone, polling stops");
            return CycleStep::Stop;
        };
        let Some(sheet_id) = table.google_sheet_id.clone() else {
            debug!(table_id = %id, "table has no sheet, polling stops");
            return CycleStep::Stop;
        };

        let fetched = self.fetcher.fetch(&sheet_id).await;
        if cancel.is_cancelled() {
            debug!(table_id = %id, "polling disabled during fetch, result discarded");
            return CycleStep::Stop;
        }
        let Some(table) = self.store.find(id) else {
            debug!(table_id = %id, "table gone, polling stops");
            return CycleStep::Stop;
        };

        let (outcome, next) = match fetched {
            Ok(sheet) if table.etag.as_deref() == Some(sheet.etag.as_str()) => {
                let next = self.update_interval(id, PollInterval::grow_unchanged);
                debug!(table_id = %id, etag = %sheet.etag, "sheet unchanged");
                (SyncOutcome::Unchanged, next)
            }
            Ok(sheet) => {
                let rows = project(&sheet.rows, &table.sheet_sourced_names());
                let update = SyncUpdate {
                    rows,
                    etag: sheet.etag,
                    last_synced_ms: self.clock.now(),
                    google_sheet_id: None,
                };
                if let Err(e) = self.store.apply_sync(id, update) {
                    debug!(table_id = %id, error = %e, "table gone, polling stops");
                    return CycleStep::Stop;
                }
                let next = self.reset_interval(id);
                info!(table_id = %id, rows = sheet.rows.len(), "sheet changed, rows replaced");
                (SyncOutcome::Changed, next)
            }
            Err(e) => {
                let next = self.update_interval(id, PollInterval::grow_error);
                warn!(table_id = %id, error = %e, next_ms = ?next.map(|d| d.as_millis()), "sheet fetch failed");
                (SyncOutcome::Failed(e), next)
            }
        };

        if next.is_none() {
            return CycleStep::Stop;
        }
        self.emit(id, outcome);
        CycleStep::Continue
    }

    fn current_delay(&self, id: &TableId) -> Option<Duration> {
        self.intervals.get(id).map(|i| i.as_duration())
    }
}

async fn poll_loop(
    inner: Arc<EngineInner>,
    id: TableId,
    generation: u64,
    cancel: CancellationToken,
) {
    debug!(table_id = %id, generation, "poll task started");
    loop {
        if cancel.is_cancelled() {
            break;
        }
        if matches!(inner.cycle(&id, &cancel).await, CycleStep::Stop) {
            break;
        }
        let Some(delay) = inner.current_delay(&id) else {
            break;
        };
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    // A later enable may already have replaced this task's handle.
    if inner
        .pollers
        .remove_if(&id, |_, handle| handle.generation == generation)
        .is_some()
    {
        inner.intervals.remove(&id);
    }
    debug!(table_id = %id, generation, "poll task stopped");
}

#[cfg(test)]
mod tests {
    use sheetsync_core::{ManualClock, NewColumn, Row};
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;
    use crate::fetcher::testing::{Reply, ScriptedProvider};
    use crate::persist::{MemoryStore, SYNC_PREFERENCES_KEY};
    use crate::store::testing::CountingObserver;
    use crate::store::StoreObserver;

    struct Harness {
        engine: SyncEngine,
        store: Arc<TableStore>,
        provider: Arc<ScriptedProvider>,
        clock: Arc<ManualClock>,
        persistence: Arc<MemoryStore>,
    }

    fn harness(replies: Vec<Reply>) -> Harness {
        harness_on(Arc::new(MemoryStore::new()), replies)
    }

    fn harness_on(persistence: Arc<MemoryStore>, replies: Vec<Reply>) -> Harness {
        harness_observed(persistence, replies, Vec::new())
    }

    fn harness_observed(
        persistence: Arc<MemoryStore>,
        replies: Vec<Reply>,
        observers: Vec<Arc<dyn StoreObserver>>,
    ) -> Harness {
        let provider = Arc::new(ScriptedProvider::new(replies));
        let clock = Arc::new(ManualClock::new(1_000));
        let store = Arc::new(TableStore::load(persistence.clone(), observers));
        let engine = SyncEngine::new(
            Arc::clone(&store),
            SheetFetcher::new(provider.clone(), "Sheet1"),
            persistence.clone(),
            &SyncConfig::default(),
            clock.clone(),
        );
        Harness {
            engine,
            store,
            provider,
            clock,
            persistence,
        }
    }

    /// "People": sheet-sourced `Name`, dashboard-only `Notes`.
    fn people(store: &TableStore) -> TableId {
        let table = store.create("People", vec![NewColumn::text("Name")]).unwrap();
        store.add_column(&table.id, NewColumn::text("Notes")).unwrap();
        table.id.clone()
    }

    fn row(name: &str) -> Row {
        Row::from([("name".to_string(), name.to_string())])
    }

    fn alice(etag: &str) -> Reply {
        Reply::sheet(etag, &[&["Name", "Email"], &["Alice", "a@x.com"]])
    }

    fn bob(etag: &str) -> Reply {
        Reply::sheet(etag, &[&["Name", "Email"], &["Bob", "b@x.com"]])
    }

    fn ms(millis: u64) -> Option<Duration> {
        Some(Duration::from_millis(millis))
    }

    async fn next_event(rx: &mut broadcast::Receiver<SyncEvent>) -> SyncEvent {
        rx.recv().await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn connect_projects_only_sheet_sourced_columns() {
        let h = harness(vec![alice("e1")]);
        let id = people(&h.store);

        let table = h.engine.connect(&id, "sheet-1").await.unwrap();

        assert_eq!(table.rows, vec![row("Alice")]);
        assert_eq!(table.etag.as_deref(), Some("e1"));
        assert_eq!(table.google_sheet_id.as_deref(), Some("sheet-1"));
        assert_eq!(table.last_synced_ms, Some(1_000));
        assert!(!h.engine.is_polling(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connect_leaves_table_unconnected() {
        let h = harness(vec![Reply::Fail(SyncError::Provider("down".into()))]);
        let id = people(&h.store);

        let err = h.engine.connect(&id, "sheet-1").await.unwrap_err();

        assert!(matches!(err, SyncError::Provider(_)));
        let table = h.store.get(&id).unwrap();
        assert!(table.google_sheet_id.is_none());
        assert!(table.etag.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_unknown_table_is_not_found() {
        let h = harness(vec![alice("e1")]);
        let err = h
            .engine
            .connect(&TableId::from("missing"), "sheet-1")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
        assert_eq!(h.provider.fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_tag_grows_interval_and_keeps_rows() {
        let h = harness(vec![alice("e1")]);
        let id = people(&h.store);
        h.engine.connect(&id, "sheet-1").await.unwrap();
        h.clock.advance(5_000);
        let mut rx = h.engine.subscribe();

        h.engine.enable(&id).unwrap();

        let first = next_event(&mut rx).await;
        assert_eq!(first.outcome, SyncOutcome::Unchanged);
        assert_eq!(first.next_interval, ms(7_500));
        let second = next_event(&mut rx).await;
        assert_eq!(second.next_interval, ms(11_250));
        let third = next_event(&mut rx).await;
        assert_eq!(third.next_interval, ms(16_875));

        let table = h.store.get(&id).unwrap();
        assert_eq!(table.rows, vec![row("Alice")]);
        assert_eq!(table.last_synced_ms, Some(1_000));
        h.engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn new_tag_replaces_rows_and_resets_interval() {
        let h = harness(vec![alice("e1"), alice("e1"), bob("e2")]);
        let id = people(&h.store);
        h.engine.connect(&id, "sheet-1").await.unwrap();
        let mut rx = h.engine.subscribe();

        h.engine.enable(&id).unwrap();
        let first = next_event(&mut rx).await;
        assert_eq!(first.next_interval, ms(7_500));

        h.clock.set(9_000);
        let second = next_event(&mut rx).await;
        assert_eq!(second.outcome, SyncOutcome::Changed);
        assert_eq!(second.next_interval, ms(5_000));

        let table = h.store.get(&id).unwrap();
        assert_eq!(table.rows, vec![row("Bob")]);
        assert_eq!(table.etag.as_deref(), Some("e2"));
        assert_eq!(table.last_synced_ms, Some(9_000));
        h.engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn store_sync_runs_only_when_the_tag_changes() {
        let observer = Arc::new(CountingObserver::default());
        let h = harness_observed(
            Arc::new(MemoryStore::new()),
            vec![alice("e1"), alice("e1"), bob("e2")],
            vec![observer.clone()],
        );
        let id = people(&h.store);

        h.engine.connect(&id, "sheet-1").await.unwrap();
        assert_eq!(observer.synced(), 1);

        let mut rx = h.engine.subscribe();
        h.engine.enable(&id).unwrap();
        assert_eq!(next_event(&mut rx).await.outcome, SyncOutcome::Unchanged);
        assert_eq!(observer.synced(), 1);

        assert_eq!(next_event(&mut rx).await.outcome, SyncOutcome::Changed);
        assert_eq!(observer.synced(), 2);
        h.engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn table_without_sheet_columns_still_polls() {
        let h = harness(vec![Reply::sheet("e1", &[&["Name"], &["A"], &["B"]])]);
        let id = h.store.create("Blank", Vec::new()).unwrap().id.clone();

        let table = h.engine.connect(&id, "sheet-1").await.unwrap();
        assert_eq!(table.rows, vec![Row::new(), Row::new()]);

        let mut rx = h.engine.subscribe();
        h.engine.enable(&id).unwrap();
        let first = next_event(&mut rx).await;
        assert_eq!(first.outcome, SyncOutcome::Unchanged);
        assert_eq!(first.next_interval, ms(7_500));
        let second = next_event(&mut rx).await;
        assert_eq!(second.next_interval, ms(11_250));

        h.provider
            .push(Reply::sheet("e2", &[&["Name"], &["A"], &["B"], &["C"]]));
        let third = next_event(&mut rx).await;
        assert_eq!(third.outcome, SyncOutcome::Changed);
        assert_eq!(third.next_interval, ms(5_000));
        let table = h.store.get(&id).unwrap();
        assert_eq!(table.rows.len(), 3);
        assert!(table.rows.iter().all(Row::is_empty));
        h.engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failures_double_interval_up_to_cap() {
        let h = harness(vec![
            alice("e1"),
            Reply::Fail(SyncError::Provider("503".into())),
        ]);
        let id = people(&h.store);
        h.engine.connect(&id, "sheet-1").await.unwrap();
        let mut rx = h.engine.subscribe();

        h.engine.enable(&id).unwrap();
        let mut seen = Vec::new();
        for _ in 0..6 {
            let event = next_event(&mut rx).await;
            assert!(matches!(event.outcome, SyncOutcome::Failed(SyncError::Provider(_))));
            seen.push(event.next_interval.unwrap().as_millis());
        }

        assert_eq!(seen, vec![10_000, 20_000, 40_000, 80_000, 120_000, 120_000]);
        assert_eq!(h.store.get(&id).unwrap().rows, vec![row("Alice")]);
        h.engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_after_error_backoff_keeps_long_interval() {
        let h = harness(vec![
            alice("e1"),
            Reply::Fail(SyncError::Provider("503".into())),
            Reply::Fail(SyncError::Provider("503".into())),
            Reply::Fail(SyncError::Provider("503".into())),
            Reply::Fail(SyncError::Provider("503".into())),
            alice("e1"),
        ]);
        let id = people(&h.store);
        h.engine.connect(&id, "sheet-1").await.unwrap();
        let mut rx = h.engine.subscribe();

        h.engine.enable(&id).unwrap();
        for _ in 0..4 {
            next_event(&mut rx).await;
        }
        assert_eq!(h.engine.current_interval(&id), ms(80_000));

        let event = next_event(&mut rx).await;
        assert_eq!(event.outcome, SyncOutcome::Unchanged);
        assert_eq!(event.next_interval, ms(80_000));
        h.engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disable_is_idempotent() {
        let h = harness(vec![alice("e1")]);
        let id = people(&h.store);

        h.engine.disable(&id);
        h.engine.disable(&id);
        h.engine.disable(&TableId::from("never-existed"));

        assert!(!h.engine.is_enabled(&id));
        assert!(!h.engine.is_polling(&id));
        assert!(h.engine.current_interval(&id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_an_unknown_id_records_nothing() {
        let h = harness(vec![alice("e1")]);
        let id = people(&h.store);

        h.engine.disable(&TableId::from("never-existed"));
        assert!(h.persistence.get(SYNC_PREFERENCES_KEY).unwrap().is_none());

        h.engine.disable(&id);
        assert_eq!(
            h.persistence.get(SYNC_PREFERENCES_KEY).unwrap().as_deref(),
            Some(format!(r#"{{"{id}":false}}"#).as_str())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_disable_enable_keeps_a_single_poll_chain() {
        let h = harness(vec![alice("e1")]);
        let id = people(&h.store);
        h.engine.connect(&id, "sheet-1").await.unwrap();

        h.engine.enable(&id).unwrap();
        h.engine.disable(&id);
        h.engine.enable(&id).unwrap();
        h.engine.enable(&id).unwrap();

        // One chain polls at 0, 7.5, 18.75 and 35.625 s; the next is past 60 s.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.provider.fetch_count(), 1 + 4);
        assert!(h.engine.is_polling(&id));
        h.engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disable_during_fetch_discards_result() {
        let h = harness(vec![
            alice("e1"),
            Reply::Delayed(Duration::from_secs(10), Box::new(bob("e2"))),
        ]);
        let id = people(&h.store);
        h.engine.connect(&id, "sheet-1").await.unwrap();
        let mut rx = h.engine.subscribe();

        h.engine.enable(&id).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.provider.fetch_count(), 2);
        h.engine.disable(&id);
        tokio::time::sleep(Duration::from_secs(30)).await;

        let table = h.store.get(&id).unwrap();
        assert_eq!(table.rows, vec![row("Alice")]);
        assert_eq!(table.etag.as_deref(), Some("e1"));
        assert_eq!(h.provider.fetch_count(), 2);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert!(!h.engine.is_polling(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn unconnected_table_ends_chain_until_connect() {
        let h = harness(vec![alice("e1")]);
        let id = people(&h.store);

        h.engine.enable(&id).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(h.engine.is_enabled(&id));
        assert!(!h.engine.is_polling(&id));
        assert_eq!(h.provider.fetch_count(), 0);

        h.engine.connect(&id, "sheet-1").await.unwrap();
        assert!(h.engine.is_polling(&id));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.provider.fetch_count(), 2);
        h.engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_overwrites_even_with_same_tag() {
        let h = harness(vec![
            alice("e1"),
            Reply::sheet("e1", &[&["Name"], &["Carol"]]),
        ]);
        let id = people(&h.store);
        h.engine.connect(&id, "sheet-1").await.unwrap();
        let mut rx = h.engine.subscribe();

        let table = h.engine.refresh(&id).await.unwrap();

        assert_eq!(table.rows, vec![row("Carol")]);
        assert!(!h.engine.is_polling(&id));
        let event = next_event(&mut rx).await;
        assert_eq!(event.outcome, SyncOutcome::Refreshed);
        assert_eq!(event.next_interval, None);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_errors() {
        let h = harness(vec![
            alice("e1"),
            Reply::Fail(SyncError::Format("short".into())),
        ]);
        let id = people(&h.store);

        assert!(matches!(
            h.engine.refresh(&id).await,
            Err(SyncError::Validation(_))
        ));
        assert!(matches!(
            h.engine.refresh(&TableId::from("missing")).await,
            Err(SyncError::NotFound(_))
        ));

        h.engine.connect(&id, "sheet-1").await.unwrap();
        assert!(matches!(
            h.engine.refresh(&id).await,
            Err(SyncError::Format(_))
        ));
        assert_eq!(h.store.get(&id).unwrap().rows, vec![row("Alice")]);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_and_select_reset_a_polling_interval() {
        let h = harness(vec![alice("e1")]);
        let id = people(&h.store);
        h.engine.connect(&id, "sheet-1").await.unwrap();
        let mut rx = h.engine.subscribe();

        h.engine.enable(&id).unwrap();
        next_event(&mut rx).await;
        next_event(&mut rx).await;
        assert_eq!(h.engine.current_interval(&id), ms(11_250));

        h.engine.select(&id).unwrap();
        assert_eq!(h.engine.current_interval(&id), ms(5_000));

        next_event(&mut rx).await;
        assert_eq!(h.engine.current_interval(&id), ms(7_500));
        h.engine.refresh(&id).await.unwrap();
        assert_eq!(h.engine.current_interval(&id), ms(5_000));
        assert!(h.engine.is_polling(&id));
        h.engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn resume_restarts_enabled_tables() {
        let persistence = Arc::new(MemoryStore::new());
        let first = harness_on(persistence.clone(), vec![alice("e1")]);
        let id = people(&first.store);
        first.engine.connect(&id, "sheet-1").await.unwrap();
        first.engine.enable(&id).unwrap();
        first.engine.shutdown().await;
        assert!(!first.engine.is_polling(&id));
        drop(first);

        let second = harness_on(persistence, vec![alice("e1")]);
        assert!(second.engine.is_enabled(&id));
        assert!(!second.engine.is_polling(&id));

        assert_eq!(second.engine.resume(), 1);
        assert!(second.engine.is_polling(&id));
        second.engine.shutdown().await;
        assert!(second.persistence.get(crate::persist::SYNC_PREFERENCES_KEY).unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_every_table() {
        let h = harness(vec![alice("e1")]);
        let a = people(&h.store);
        let b = people(&h.store);
        h.engine.connect(&a, "sheet-a").await.unwrap();
        h.engine.connect(&b, "sheet-b").await.unwrap();
        h.engine.enable(&a).unwrap();
        h.engine.enable(&b).unwrap();

        h.engine.shutdown().await;

        assert!(!h.engine.is_polling(&a));
        assert!(!h.engine.is_polling(&b));
        assert!(h.engine.is_enabled(&a));
    }
}
