//! HTTP handler definitions for the `SheetSync` server.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for building the router.

pub mod health;
pub mod sheets;
pub mod user;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use sheets::{metadata_handler, sheet_data_handler};
pub use user::{check_handler, login_handler, signup_handler};

use std::sync::Arc;
use std::time::Instant;

use super::{NetworkConfig, ShutdownController};
use crate::auth::{TokenIssuer, UserStore};
use crate::sheets::SheetSource;

/// Application services shared by every request, built once at startup.
#[derive(Clone)]
pub struct Services {
    pub users: Arc<UserStore>,
    pub tokens: Arc<TokenIssuer>,
    pub sheets: Arc<dyn SheetSource>,
    /// Tab read by `/sheets/sheetdata` when the request names none.
    pub default_sheet_name: Arc<str>,
}

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserStore>,
    pub tokens: Arc<TokenIssuer>,
    pub sheets: Arc<dyn SheetSource>,
    pub default_sheet_name: Arc<str>,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    pub config: Arc<NetworkConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(services: Services, shutdown: Arc<ShutdownController>, config: Arc<NetworkConfig>) -> Self {
        Self {
            users: services.users,
            tokens: services.tokens,
            sheets: services.sheets,
            default_sheet_name: services.default_sheet_name,
            shutdown,
            config,
            start_time: Instant::now(),
        }
    }
}
