//! Normalization of a raw spreadsheet value grid into header-keyed rows.
//!
//! The first grid row is the header row; each header is lower-cased. The
//! remaining rows are zipped positionally against the headers: missing
//! trailing cells become empty strings and surplus cells are dropped.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::error::{SyncError, SyncResult};

/// A fetched sheet after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSheet {
    /// Lower-cased header names, in sheet order.
    pub headers: Vec<String>,
    /// Data rows keyed by lower-cased header.
    pub rows: Vec<BTreeMap<String, String>>,
    /// Change tag reported by the provider for this fetch.
    pub etag: String,
}

/// Normalizes `values` into a [`FetchedSheet`] tagged with `etag`.
///
/// # Errors
///
/// Returns [`SyncError::Format`] if the grid has no header row plus at least
/// one data row, or if the header row is empty.
pub fn normalize(values: &[Vec<String>], etag: String) -> SyncResult<FetchedSheet> {
    if values.len() < 2 {
        return Err(SyncError::Format(format!(
            "expected a header row and at least one data row, got {} row(s)",
            values.len()
        )));
    }

    let headers: Vec<String> = values[0].iter().map(|h| h.to_lowercase()).collect();
    if headers.is_empty() {
        return Err(SyncError::Format("header row is empty".to_string()));
    }

    let rows = values[1..]
        .iter()
        .map(|cells| {
            headers
                .iter()
                .enumerate()
                .map(|(i, header)| (header.clone(), cells.get(i).cloned().unwrap_or_default()))
                .collect()
        })
        .collect();

    Ok(FetchedSheet {
        headers,
        rows,
        etag,
    })
}

/// SHA-256 hex digest of a value grid, used when the provider omits its tag.
#[must_use]
pub fn content_tag(values: &[Vec<String>]) -> String {
    let mut hasher = Sha256::new();
    for row in values {
        for cell in row {
            hasher.update(cell.as_bytes());
            hasher.update([0x1f]);
        }
        hasher.update([0x1e]);
    }
    hex::encode(hasher.finalize())
}
