use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A synced row: lower-cased column name to cell text.
///
/// Uses `BTreeMap` for deterministic serialization order.
pub type Row = BTreeMap<String, String>;

/// Opaque, process-unique table identifier. Immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(pub String);

impl TableId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TableId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TableId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Display type of a column. Cell values are always stored as text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    Text,
    Date,
}

/// A declared table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Populated from the spreadsheet on every sync when `true`;
    /// dashboard-only (never touched by sync) when `false`.
    pub is_sheet_sourced: bool,
}

impl Column {
    /// Creates a column with a freshly generated id.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType, is_sheet_sourced: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            column_type,
            is_sheet_sourced,
        }
    }

    /// Lower-cased name used as the join key against the sheet header row.
    #[must_use]
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }
}

/// Column definition supplied by the caller; the store assigns the id and
/// the sheet-sourced flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewColumn {
    pub name: String,
    pub column_type: ColumnType,
}

impl NewColumn {
    #[must_use]
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Text,
        }
    }

    #[must_use]
    pub fn date(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Date,
        }
    }
}

/// A dashboard table bound (optionally) to a Google Sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub id: TableId,
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_sheet_id: Option<String>,
    /// Milliseconds since Unix epoch of the last applied sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl Table {
    /// Lower-cased names of the columns populated from the sheet.
    #[must_use]
    pub fn sheet_sourced_names(&self) -> BTreeSet<String> {
        self.columns
            .iter()
            .filter(|c| c.is_sheet_sourced)
            .map(Column::key)
            .collect()
    }

    /// Whether the table has been connected to a spreadsheet.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.google_sheet_id.is_some()
    }
}

/// Fields rewritten by a sync. Applied atomically by the table store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncUpdate {
    pub rows: Vec<Row>,
    pub etag: String,
    pub last_synced_ms: u64,
    /// Set only by a first-time connect.
    pub google_sheet_id: Option<String>,
}
