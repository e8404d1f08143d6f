//! Network module with deferred startup lifecycle.
//!
//! `new()` creates shared state, `start()` binds the TCP listener, and
//! `serve()` accepts connections until the shutdown future resolves. Binding
//! separately lets callers learn the OS-assigned port before serving.

use std::future::Future;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::{NetworkConfig, TlsConfig};
use super::handlers::{
    check_handler, health_handler, liveness_handler, login_handler, metadata_handler,
    readiness_handler, sheet_data_handler, signup_handler, AppState, Services,
};
use super::middleware::{build_http_layers, track_in_flight};
use super::shutdown::ShutdownController;

/// Manages the full HTTP server lifecycle.
///
/// 1. `new()` -- allocates shared state (services, shutdown controller)
/// 2. `start()` -- binds the TCP listener to the configured address
/// 3. `serve()` -- serves until shutdown is signalled, then drains
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    services: Services,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, services: Services) -> Self {
        Self {
            config,
            listener: None,
            services,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /health/live`, `GET /health/ready` -- probes
    /// - `GET /api/v1/health` -- detailed health
    /// - `POST /api/v1/user/signup`, `POST /api/v1/user/login`
    /// - `GET /api/v1/user/check` -- bearer token required
    /// - `POST /api/v1/sheets/metadata`, `POST /api/v1/sheets/sheetdata` --
    ///   bearer token required
    pub fn build_router(&self) -> Router {
        let state = AppState::new(
            self.services.clone(),
            Arc::clone(&self.shutdown),
            Arc::new(self.config.clone()),
        );

        let api = Router::new()
            .route("/health", get(health_handler))
            .route("/user/signup", post(signup_handler))
            .route("/user/login", post(login_handler))
            .route("/user/check", get(check_handler))
            .route("/sheets/metadata", post(metadata_handler))
            .route("/sheets/sheetdata", post(sheet_data_handler));

        Router::new()
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .nest("/api/v1", api)
            .layer(middleware::from_fn_with_state(state.clone(), track_in_flight))
            .layer(build_http_layers(&self.config))
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which differs from the configured one
    /// when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, "TCP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then drains in-flight requests for
    /// up to the configured drain timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first, TLS material
    /// cannot be loaded, or the server hits a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = self.build_router();

        self.shutdown.set_ready();

        if let Some(tls) = &self.config.tls {
            serve_tls(listener, router, tls, shutdown).await?;
        } else {
            info!("serving plain HTTP");
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await?;
        }

        drain(&self.shutdown, &self.config).await;
        Ok(())
    }
}

/// Serves TLS connections using `axum-server` with rustls, reusing the
/// pre-bound listener.
async fn serve_tls(
    listener: TcpListener,
    router: Router,
    tls: &TlsConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load TLS certificates: {e}"))?;

    let addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();

    tokio::spawn(async move {
        shutdown.await;
        shutdown_handle.graceful_shutdown(None);
    });

    info!(%addr, "serving TLS");

    axum_server::from_tcp_rustls(std_listener, rustls_config)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}

async fn drain(shutdown: &ShutdownController, config: &NetworkConfig) {
    shutdown.trigger_shutdown();
    if shutdown.wait_for_drain(config.drain_timeout).await {
        info!("all requests drained");
    } else {
        warn!(
            remaining = shutdown.in_flight_count(),
            "drain timeout expired with requests in flight"
        );
    }
}
