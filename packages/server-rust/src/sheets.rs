//! Spreadsheet service seam and the Google Sheets v4 client behind it.
//!
//! Responses are passed through as raw JSON; the client decides which
//! fields it needs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ApiError;

/// Failures reaching the spreadsheet service.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Google API key is not configured")]
    MissingApiKey,
    #[error("upstream request failed: {0}")]
    Transport(String),
    #[error("upstream returned {status}")]
    Status { status: u16, body: Value },
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        let message = err.to_string();
        let detail = match err {
            UpstreamError::Status { body, .. } => Some(body),
            UpstreamError::MissingApiKey | UpstreamError::Transport(_) => None,
        };
        ApiError::Upstream { message, detail }
    }
}

/// Source of spreadsheet metadata and value grids.
#[async_trait]
pub trait SheetSource: Send + Sync {
    /// Spreadsheet resource; carries the `etag` used for change detection.
    async fn metadata(&self, spreadsheet_id: &str) -> Result<Value, UpstreamError>;

    /// Value range covering the whole `sheet_name` tab.
    async fn values(&self, spreadsheet_id: &str, sheet_name: &str) -> Result<Value, UpstreamError>;
}

/// Google Sheets API v4 over HTTPS with an API key.
pub struct GoogleSheetsClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl GoogleSheetsClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://sheets.googleapis.com";

    /// # Errors
    ///
    /// Returns an error for an unparsable base URL or if the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("{base_url} cannot be used as a base URL");
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url,
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    /// `{base}/v4/spreadsheets/{id}[/values/{sheet}]`, segments percent-encoded.
    fn endpoint(&self, spreadsheet_id: &str, sheet_name: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v4", "spreadsheets", spreadsheet_id]);
            if let Some(sheet) = sheet_name {
                segments.extend(["values", sheet]);
            }
        }
        url
    }

    async fn get(&self, url: Url) -> Result<Value, UpstreamError> {
        let key = self.api_key.as_deref().ok_or(UpstreamError::MissingApiKey)?;
        debug!(path = url.path(), "calling spreadsheet service");
        let resp = self
            .http
            .get(url)
            .query(&[("key", key)])
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.without_url().to_string()))?;

        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| UpstreamError::Transport(format!("unreadable body: {e}")))?;
        if status.is_success() {
            Ok(body)
        } else {
            warn!(status = status.as_u16(), "spreadsheet service rejected request");
            Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl SheetSource for GoogleSheetsClient {
    async fn metadata(&self, spreadsheet_id: &str) -> Result<Value, UpstreamError> {
        self.get(self.endpoint(spreadsheet_id, None)).await
    }

    async fn values(&self, spreadsheet_id: &str, sheet_name: &str) -> Result<Value, UpstreamError> {
        self.get(self.endpoint(spreadsheet_id, Some(sheet_name))).await
    }
}
