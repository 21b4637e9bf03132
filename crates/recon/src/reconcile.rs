//! Tracking-number reconciliation between a system export and a carrier export.
//!
//! A system row is *matched* when its normalized key appears among the carrier
//! keys. A carrier row is *unmatched* when its normalized key is absent from
//! the system keys. Both lists keep source order.

use std::collections::HashSet;

use serde::Serialize;
use waybill_core::{Table, Value};

use crate::config::{ReconcileOptions, SEQUENCE_COLUMN};
use crate::error::{ReconError, ReconWarning};

/// Trimmed display form of a key cell.
pub fn normalize_key(value: &Value) -> String {
    value.display().trim().to_string()
}

/// System-side normalization: `"0"` and blank keys become `sentinel`.
pub fn normalize_system_key(value: &Value, sentinel: &str) -> String {
    let key = normalize_key(value);
    if key.is_empty() || key == "0" {
        sentinel.to_string()
    } else {
        key
    }
}

/// Distinct-key counts for the human report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KeySummary {
    pub system_keys: usize,
    pub carrier_keys: usize,
    pub common: usize,
    pub system_only: usize,
    pub carrier_only: usize,
}

/// Row-level match annotation, before projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Marking {
    /// System data rows whose key the carrier has (yellow)
    pub system_rows: Vec<usize>,
    /// Carrier data rows whose key the system lacks (red)
    pub carrier_rows: Vec<usize>,
    /// Matched system rows, all columns, key normalized
    pub matched_all: Table,
    /// Unmatched carrier rows, all columns, key normalized
    pub unmatched: Table,
    pub summary: KeySummary,
}

impl Marking {
    /// Project matched rows and prepend `序号` (1-based).
    ///
    /// `Ok(None)` when nothing matched; the projection is not checked then.
    pub fn matched_records(&self, projection: &[String]) -> Result<Option<Table>, ReconError> {
        if self.matched_all.is_empty() {
            return Ok(None);
        }
        let mut table = self.matched_all.select(projection)?;
        let sequence = (1..=table.len()).map(|n| Value::Number(n as f64)).collect();
        table.insert_column(0, SEQUENCE_COLUMN, sequence)?;
        Ok(Some(table))
    }
}

/// Full reconciliation outcome.
///
/// The marking is always present once both key columns exist, so callers can
/// write the marked copies even when the projection of matched rows fails.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub marking: Marking,
    /// Projected matched records; `Ok(None)` when no system row matched
    pub matched: Result<Option<Table>, ReconError>,
    pub warnings: Vec<ReconWarning>,
}

impl Reconciliation {
    /// Matched records, if any matched and the projection succeeded.
    pub fn matched_table(&self) -> Option<&Table> {
        self.matched.as_ref().ok().and_then(Option::as_ref)
    }

    pub fn unmatched(&self) -> &Table {
        &self.marking.unmatched
    }

    pub fn summary(&self) -> KeySummary {
        self.marking.summary
    }
}

fn key_index(table: &Table, side: &str, key_column: &str) -> Result<usize, ReconError> {
    table
        .column_index(key_column)
        .ok_or_else(|| ReconError::ColumnNotFound {
            table: side.to_string(),
            column: key_column.to_string(),
        })
}

/// Rows of `table` at `indices`, with the key column replaced by `keys[i]`.
fn rows_with_keys(table: &Table, key_col: usize, indices: &[usize], keys: &[String]) -> Result<Table, ReconError> {
    let rows = indices
        .iter()
        .map(|&i| {
            let mut row = table.rows()[i].clone();
            row[key_col] = Value::from(keys[i].as_str());
            row
        })
        .collect();
    Ok(Table::from_rows(table.columns().to_vec(), rows)?)
}

/// Compute match marks and the matched/unmatched row sets.
pub fn mark(
    system: &Table,
    carrier: &Table,
    key_column: &str,
    sentinel: &str,
) -> Result<Marking, ReconError> {
    let sys_col = key_index(system, "system", key_column)?;
    let car_col = key_index(carrier, "carrier", key_column)?;

    let system_keys: Vec<String> = system
        .rows()
        .iter()
        .map(|r| normalize_system_key(&r[sys_col], sentinel))
        .collect();
    let carrier_keys: Vec<String> = carrier
        .rows()
        .iter()
        .map(|r| normalize_key(&r[car_col]))
        .collect();

    let system_set: HashSet<&str> = system_keys.iter().map(String::as_str).collect();
    let carrier_set: HashSet<&str> = carrier_keys.iter().map(String::as_str).collect();

    let system_rows: Vec<usize> = system_keys
        .iter()
        .enumerate()
        .filter(|(_, k)| carrier_set.contains(k.as_str()))
        .map(|(i, _)| i)
        .collect();
    let carrier_rows: Vec<usize> = carrier_keys
        .iter()
        .enumerate()
        .filter(|(_, k)| !system_set.contains(k.as_str()))
        .map(|(i, _)| i)
        .collect();

    for &i in &system_rows {
        log::debug!("matched: {}", system_keys[i]);
    }
    for &i in &carrier_rows {
        log::debug!("unmatched: {}", carrier_keys[i]);
    }

    let common = system_set.intersection(&carrier_set).count();
    let summary = KeySummary {
        system_keys: system_set.len(),
        carrier_keys: carrier_set.len(),
        common,
        system_only: system_set.len() - common,
        carrier_only: carrier_set.len() - common,
    };

    Ok(Marking {
        matched_all: rows_with_keys(system, sys_col, &system_rows, &system_keys)?,
        unmatched: rows_with_keys(carrier, car_col, &carrier_rows, &carrier_keys)?,
        system_rows,
        carrier_rows,
        summary,
    })
}

/// Mark both tables and project the matched records.
///
/// Fails only when the key column is missing on either side; projection
/// errors are carried in [`Reconciliation::matched`].
pub fn reconcile(
    system: &Table,
    carrier: &Table,
    options: &ReconcileOptions,
) -> Result<Reconciliation, ReconError> {
    let marking = mark(system, carrier, &options.key_column, &options.invalid_key_sentinel)?;
    let matched = marking.matched_records(&options.projection_columns);

    let mut warnings = Vec::new();
    if matches!(matched, Ok(None)) {
        let warning = ReconWarning::EmptyResult(format!(
            "{} system row(s) vs {} carrier row(s) on '{}'",
            system.len(),
            carrier.len(),
            options.key_column
        ));
        log::warn!("{warning}");
        warnings.push(warning);
    }

    Ok(Reconciliation {
        marking,
        matched,
        warnings,
    })
}
