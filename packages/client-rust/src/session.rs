//! Local auth session and the login/signup client.
//!
//! The credential is persisted under [`SESSION_KEY`]. A token older than the
//! session TTL is treated as expired: it is cleared and reported as absent.
//! Any `Auth` failure from an authenticated call also clears it, forcing the
//! user to log in again.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sheetsync_core::messages::{AuthPayload, LoginRequest, SignupRequest, UserProfile};
use sheetsync_core::{ClockSource, SyncError, SyncResult};
use tracing::{info, warn};

use crate::http::ApiClient;
use crate::persist::{load_json, save_json, KeyValueStore, SESSION_KEY};

/// Persisted bearer credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub token: String,
    pub user: UserProfile,
    /// Milliseconds since Unix epoch when the token was obtained.
    pub issued_at_ms: u64,
}

/// Holds the current credential, if any.
pub struct Session {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn ClockSource>,
    ttl_ms: u64,
    credential: RwLock<Option<Credential>>,
}

impl Session {
    /// Loads any persisted credential. A corrupt record is logged and dropped.
    #[must_use]
    pub fn load(store: Arc<dyn KeyValueStore>, clock: Arc<dyn ClockSource>, ttl: Duration) -> Self {
        let credential = match load_json::<Credential>(store.as_ref(), SESSION_KEY) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "discarding unreadable stored session");
                if let Err(e) = store.remove(SESSION_KEY) {
                    warn!(error = %e, "failed to remove stored session");
                }
                None
            }
        };
        Self {
            store,
            clock,
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
            credential: RwLock::new(credential),
        }
    }

    /// Returns the bearer token if one is held and still fresh.
    pub fn token(&self) -> Option<String> {
        self.fresh().map(|c| c.token)
    }

    /// Returns the token or [`SyncError::Auth`] when logged out or expired.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Auth`] if no fresh credential is held.
    pub fn require_token(&self) -> SyncResult<String> {
        self.token()
            .ok_or_else(|| SyncError::Auth("not logged in".to_string()))
    }

    /// Returns the logged-in user if the credential is still fresh.
    pub fn user(&self) -> Option<UserProfile> {
        self.fresh().map(|c| c.user)
    }

    pub fn is_authenticated(&self) -> bool {
        self.fresh().is_some()
    }

    /// Stores a newly issued credential.
    pub fn establish(&self, payload: AuthPayload) {
        let credential = Credential {
            token: payload.token,
            user: payload.user,
            issued_at_ms: self.clock.now(),
        };
        if let Err(e) = save_json(self.store.as_ref(), SESSION_KEY, &credential) {
            warn!(error = %e, "failed to persist session");
        }
        *self.credential.write() = Some(credential);
    }

    /// Drops the credential from memory and from the persistent store.
    pub fn clear(&self) {
        let had = self.credential.write().take().is_some();
        if let Err(e) = self.store.remove(SESSION_KEY) {
            warn!(error = %e, "failed to remove stored session");
        }
        if had {
            info!("session cleared");
        }
    }

    /// Clears the session if `err` is an authentication failure, then
    /// hands the error back.
    pub fn observe_error(&self, err: SyncError) -> SyncError {
        if matches!(err, SyncError::Auth(_)) {
            self.clear();
        }
        err
    }

    fn fresh(&self) -> Option<Credential> {
        let current = self.credential.read().clone()?;
        if self.clock.now().saturating_sub(current.issued_at_ms) > self.ttl_ms {
            info!(user = %current.user.email, "session expired");
            self.clear();
            return None;
        }
        Some(current)
    }
}

/// Calls the server's user endpoints and keeps the [`Session`] in step.
pub struct AuthClient {
    api: ApiClient,
    session: Arc<Session>,
}

impl AuthClient {
    #[must_use]
    pub fn new(api: ApiClient, session: Arc<Session>) -> Self {
        Self { api, session }
    }

    /// Logs in and stores the issued credential.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Auth`] on bad credentials, [`SyncError::Provider`]
    /// if the server is unreachable.
    pub async fn login(&self, email: &str, password: &str) -> SyncResult<UserProfile> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let payload: AuthPayload = self.api.post("user/login", &body, None).await?;
        let user = payload.user.clone();
        self.session.establish(payload);
        info!(email = %user.email, "logged in");
        Ok(user)
    }

    /// Registers a new account and stores the issued credential.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] for a duplicate e-mail or rejected
    /// input, [`SyncError::Provider`] if the server is unreachable.
    pub async fn signup(&self, name: &str, email: &str, password: &str) -> SyncResult<UserProfile> {
        let body = SignupRequest {
            email: email.to_string(),
            name: name.to_string(),
            password: password.to_string(),
        };
        let payload: AuthPayload = self.api.post("user/signup", &body, None).await?;
        let user = payload.user.clone();
        self.session.establish(payload);
        info!(email = %user.email, "signed up");
        Ok(user)
    }

    /// Asks the server whether the held token is still valid.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Auth`] (and clears the session) if it is not.
    pub async fn check(&self) -> SyncResult<UserProfile> {
        let token = self.session.require_token()?;
        self.api
            .get("user/check", Some(&token))
            .await
            .map_err(|e| self.session.observe_error(e))
    }

    pub fn logout(&self) {
        self.session.clear();
    }

    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}
