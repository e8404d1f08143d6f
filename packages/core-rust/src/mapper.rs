//! Column projection of fetched rows onto a table's sheet-sourced columns.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::Row;

/// Keeps, for every fetched row, only the keys whose lower-cased form is in
/// `sheet_sourced`.
///
/// Output has the same length and order as `fetched`. Never fails: a column
/// missing from the sheet simply yields rows with fewer keys.
#[must_use]
pub fn project(fetched: &[BTreeMap<String, String>], sheet_sourced: &BTreeSet<String>) -> Vec<Row> {
    fetched
        .iter()
        .map(|row| {
            row.iter()
                .filter_map(|(key, value)| {
                    let key = key.to_lowercase();
                    sheet_sourced
                        .contains(&key)
                        .then(|| (key, value.clone()))
                })
                .collect()
        })
        .collect()
}
