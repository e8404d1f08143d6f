//! Sheet-data provider seam.
//!
//! [`SheetProvider`] is the black-box boundary to the spreadsheet service.
//! [`HttpSheetProvider`] reaches it through the `SheetSync` server's
//! authenticated proxy endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use sheetsync_core::messages::{SpreadsheetMetadata, SpreadsheetRequest, ValueRange};
use sheetsync_core::SyncResult;

use crate::http::ApiClient;
use crate::session::Session;

/// Source of spreadsheet metadata and cell values.
#[async_trait]
pub trait SheetProvider: Send + Sync {
    /// Metadata lookup by spreadsheet id. Carries the change tag.
    async fn metadata(&self, spreadsheet_id: &str) -> SyncResult<SpreadsheetMetadata>;

    /// Literal value grid of one sheet (tab) of the spreadsheet.
    async fn values(&self, spreadsheet_id: &str, sheet_name: &str) -> SyncResult<ValueRange>;
}

/// Provider backed by the server's `/sheets/metadata` and `/sheets/sheetdata`.
///
/// Every call needs a fresh session token. A `401` clears the session.
pub struct HttpSheetProvider {
    api: ApiClient,
    session: Arc<Session>,
}

impl HttpSheetProvider {
    #[must_use]
    pub fn new(api: ApiClient, session: Arc<Session>) -> Self {
        Self { api, session }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        spreadsheet_id: &str,
        sheet_name: Option<&str>,
    ) -> SyncResult<T> {
        let token = self.session.require_token()?;
        let body = SpreadsheetRequest {
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet_name: sheet_name.map(ToString::to_string),
        };
        self.api
            .post(path, &body, Some(&token))
            .await
            .map_err(|e| self.session.observe_error(e))
    }
}

#[async_trait]
impl SheetProvider for HttpSheetProvider {
    async fn metadata(&self, spreadsheet_id: &str) -> SyncResult<SpreadsheetMetadata> {
        self.call("sheets/metadata", spreadsheet_id, None).await
    }

    async fn values(&self, spreadsheet_id: &str, sheet_name: &str) -> SyncResult<ValueRange> {
        self.call("sheets/sheetdata", spreadsheet_id, Some(sheet_name))
            .await
    }
}
