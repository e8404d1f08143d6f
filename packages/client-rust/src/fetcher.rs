//! Sheet fetcher: provider calls plus grid normalization.
//!
//! Every fetch hits the provider twice, metadata first (for the change tag)
//! then values. Nothing is cached here.

use std::sync::Arc;

use sheetsync_core::grid::{content_tag, normalize};
use sheetsync_core::{FetchedSheet, SyncError, SyncResult};
use tracing::debug;

use crate::provider::SheetProvider;

/// Fetches and normalizes one spreadsheet.
#[derive(Clone)]
pub struct SheetFetcher {
    provider: Arc<dyn SheetProvider>,
    sheet_name: String,
}

impl SheetFetcher {
    /// Fetcher reading values from the `sheet_name` tab.
    #[must_use]
    pub fn new(provider: Arc<dyn SheetProvider>, sheet_name: impl Into<String>) -> Self {
        Self {
            provider,
            sheet_name: sheet_name.into(),
        }
    }

    /// Fetches `spreadsheet_id` and returns lower-cased headers, header-keyed
    /// rows and the change tag.
    ///
    /// When the provider's metadata carries no tag, a content digest of the
    /// grid stands in for it.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Validation`] for a blank spreadsheet id
    /// - [`SyncError::Provider`] / [`SyncError::Auth`] from the provider calls
    /// - [`SyncError::Format`] for a grid without header and data rows
    pub async fn fetch(&self, spreadsheet_id: &str) -> SyncResult<FetchedSheet> {
        let spreadsheet_id = spreadsheet_id.trim();
        if spreadsheet_id.is_empty() {
            return Err(SyncError::Validation(
                "spreadsheet id must not be blank".to_string(),
            ));
        }

        let metadata = self.provider.metadata(spreadsheet_id).await?;
        let range = self.provider.values(spreadsheet_id, &self.sheet_name).await?;

        let etag = metadata
            .etag
            .filter(|tag| !tag.is_empty())
            .unwrap_or_else(|| content_tag(&range.values));
        let sheet = normalize(&range.values, etag)?;

        debug!(
            spreadsheet_id,
            rows = sheet.rows.len(),
            etag = %sheet.etag,
            "fetched sheet"
        );
        Ok(sheet)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory provider shared by the store and engine tests.

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use sheetsync_core::messages::{SpreadsheetMetadata, ValueRange};
    use sheetsync_core::{SyncError, SyncResult};

    use crate::provider::SheetProvider;

    /// One scripted provider answer.
    #[derive(Debug, Clone)]
    pub enum Reply {
        Sheet { etag: Option<String>, values: Vec<Vec<String>> },
        Fail(SyncError),
        /// Answers with the inner reply after sleeping on the tokio clock.
        Delayed(Duration, Box<Reply>),
    }

    impl Reply {
        pub fn sheet(etag: &str, rows: &[&[&str]]) -> Self {
            Self::Sheet {
                etag: Some(etag.to_string()),
                values: rows
                    .iter()
                    .map(|r| r.iter().map(ToString::to_string).collect())
                    .collect(),
            }
        }
    }

    /// Replays queued replies; the last one repeats once the queue drains.
    #[derive(Default)]
    pub struct ScriptedProvider {
        replies: Mutex<VecDeque<Reply>>,
        last: Mutex<Option<Reply>>,
        /// Grid chosen by the latest metadata call, returned by `values`.
        pending: Mutex<Option<Vec<Vec<String>>>>,
        fetches: AtomicUsize,
    }

    impl ScriptedProvider {
        pub fn new(replies: Vec<Reply>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                ..Self::default()
            }
        }

        pub fn push(&self, reply: Reply) {
            self.replies.lock().push_back(reply);
        }

        pub fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }

        fn next(&self) -> Reply {
            let next = self.replies.lock().pop_front();
            let mut last = self.last.lock();
            if let Some(reply) = next {
                *last = Some(reply);
            }
            last.clone()
                .unwrap_or_else(|| Reply::Fail(SyncError::Provider("no reply scripted".into())))
        }
    }

    #[async_trait]
    impl SheetProvider for ScriptedProvider {
        async fn metadata(&self, _spreadsheet_id: &str) -> SyncResult<SpreadsheetMetadata> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let mut reply = self.next();
            loop {
                match reply {
                    Reply::Delayed(delay, inner) => {
                        tokio::time::sleep(delay).await;
                        reply = *inner;
                    }
                    Reply::Sheet { etag, values } => {
                        *self.pending.lock() = Some(values);
                        return Ok(SpreadsheetMetadata {
                            etag,
                            ..SpreadsheetMetadata::default()
                        });
                    }
                    Reply::Fail(e) => return Err(e),
                }
            }
        }

        async fn values(&self, _spreadsheet_id: &str, _sheet_name: &str) -> SyncResult<ValueRange> {
            let values = self
                .pending
                .lock()
                .take()
                .ok_or_else(|| SyncError::Provider("values without metadata".into()))?;
            Ok(ValueRange {
                values,
                ..ValueRange::default()
            })
        }
    }
}
