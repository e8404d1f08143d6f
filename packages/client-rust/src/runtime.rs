//! Wiring of the client components from a [`ClientConfig`].

use std::sync::Arc;

use anyhow::Context;
use sheetsync_core::{ClockSource, SystemClock};

use crate::config::ClientConfig;
use crate::fetcher::SheetFetcher;
use crate::http::ApiClient;
use crate::persist::{JsonFileStore, KeyValueStore};
use crate::provider::HttpSheetProvider;
use crate::session::{AuthClient, Session};
use crate::store::{StoreObserver, TableStore};
use crate::sync::SyncEngine;

/// All client components, sharing one persistence backend and session.
pub struct ClientRuntime {
    pub auth: AuthClient,
    pub store: Arc<TableStore>,
    pub engine: SyncEngine,
}

impl ClientRuntime {
    /// Opens the JSON file store under `config.data_dir` and builds every
    /// component on top of it.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be created or the HTTP
    /// client cannot be initialized.
    pub fn open(config: &ClientConfig) -> anyhow::Result<Self> {
        let persistence = JsonFileStore::open(&config.data_dir)
            .with_context(|| format!("opening data dir {}", config.data_dir.display()))?;
        Self::with_store(config, Arc::new(persistence), Vec::new(), Arc::new(SystemClock))
    }

    /// Builds the components over an explicit backend, observers and clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn with_store(
        config: &ClientConfig,
        persistence: Arc<dyn KeyValueStore>,
        observers: Vec<Arc<dyn StoreObserver>>,
        clock: Arc<dyn ClockSource>,
    ) -> anyhow::Result<Self> {
        let api = ApiClient::new(&config.api_base_url, config.request_timeout)?;
        let session = Arc::new(Session::load(
            Arc::clone(&persistence),
            Arc::clone(&clock),
            config.session_ttl,
        ));
        let provider = Arc::new(HttpSheetProvider::new(api.clone(), Arc::clone(&session)));
        let store = Arc::new(TableStore::load(Arc::clone(&persistence), observers));
        let engine = SyncEngine::new(
            Arc::clone(&store),
            SheetFetcher::new(provider, config.sheet_name.clone()),
            persistence,
            &config.sync,
            clock,
        );
        Ok(Self {
            auth: AuthClient::new(api, session),
            store,
            engine,
        })
    }
}
