//! Thin JSON client for the `SheetSync` server API.
//!
//! Unwraps the `{success, message, data}` envelope and maps HTTP failures
//! onto the shared [`SyncError`] taxonomy.

use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sheetsync_core::messages::ApiResponse;
use sheetsync_core::{SyncError, SyncResult};

/// HTTP client bound to one API base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Builds a client with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Provider`] if the TLS backend cannot be initialized.
    pub fn new(base_url: &str, timeout: Duration) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Provider(format!("http client init failed: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// POSTs `body` as JSON and returns the envelope's `data`.
    ///
    /// # Errors
    ///
    /// See [`map_status`] for the status-to-error mapping; transport failures
    /// and timeouts are [`SyncError::Provider`].
    pub async fn post<B, T>(&self, path: &str, body: &B, token: Option<&str>) -> SyncResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let req = self.http.post(self.url(path)).json(body);
        send(with_bearer(req, token)).await
    }

    /// GETs `path` and returns the envelope's `data`.
    ///
    /// # Errors
    ///
    /// Same mapping as [`ApiClient::post`].
    pub async fn get<T: DeserializeOwned>(&self, path: &str, token: Option<&str>) -> SyncResult<T> {
        let req = self.http.get(self.url(path));
        send(with_bearer(req, token)).await
    }
}

fn with_bearer(req: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => req.bearer_auth(token),
        None => req,
    }
}

async fn send<T: DeserializeOwned>(req: RequestBuilder) -> SyncResult<T> {
    let resp = req
        .send()
        .await
        .map_err(|e| SyncError::Provider(format!("request failed: {e}")))?;
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| SyncError::Provider(format!("read body failed: {e}")))?;

    if !status.is_success() {
        let message = serde_json::from_str::<ApiResponse<serde_json::Value>>(&text)
            .map(|env| env.message)
            .unwrap_or(text);
        return Err(map_status(status, message));
    }

    let envelope: ApiResponse<T> = serde_json::from_str(&text)
        .map_err(|e| SyncError::Provider(format!("unexpected response body: {e}")))?;
    envelope
        .data
        .ok_or_else(|| SyncError::Provider(format!("response carried no data: {}", envelope.message)))
}

/// Maps a non-success HTTP status onto the error taxonomy.
///
/// - `401` becomes [`SyncError::Auth`]
/// - `400`, `409` and `422` become [`SyncError::Validation`]
/// - everything else becomes [`SyncError::Provider`]
#[must_use]
pub fn map_status(status: StatusCode, message: String) -> SyncError {
    match status {
        StatusCode::UNAUTHORIZED => SyncError::Auth(message),
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            SyncError::Validation(message)
        }
        other => SyncError::Provider(format!("{other}: {message}")),
    }
}
