//! Key-set comparison between two tables.

use std::collections::BTreeSet;

use serde::Serialize;
use waybill_core::Table;

use crate::error::ReconError;
use crate::reconcile::normalize_key;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyComparison {
    pub left_total: usize,
    pub right_total: usize,
    pub common: Vec<String>,
    pub left_only: Vec<String>,
    pub right_only: Vec<String>,
}

impl KeyComparison {
    pub fn is_identical(&self) -> bool {
        self.left_only.is_empty() && self.right_only.is_empty()
    }
}

fn key_set(table: &Table, side: &str, key_column: &str) -> Result<BTreeSet<String>, ReconError> {
    let values = table
        .column_values(key_column)
        .ok_or_else(|| ReconError::ColumnNotFound {
            table: side.to_string(),
            column: key_column.to_string(),
        })?;
    Ok(values
        .into_iter()
        .map(normalize_key)
        .filter(|k| !k.is_empty())
        .collect())
}

/// Distinct trimmed keys of both tables, split into common and one-sided sets.
/// Empty keys are ignored; every list is sorted.
pub fn compare_keys(left: &Table, right: &Table, key_column: &str) -> Result<KeyComparison, ReconError> {
    let a = key_set(left, "left", key_column)?;
    let b = key_set(right, "right", key_column)?;

    Ok(KeyComparison {
        left_total: a.len(),
        right_total: b.len(),
        common: a.intersection(&b).cloned().collect(),
        left_only: a.difference(&b).cloned().collect(),
        right_only: b.difference(&a).cloned().collect(),
    })
}
