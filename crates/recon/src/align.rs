//! Alignment: reshape a carrier export and fill its order fields from the
//! matched records, keyed by tracking number.

use std::collections::{HashMap, HashSet};

use waybill_core::{Table, Value};

use crate::config::{AlignConfig, CARRIER_SCHEMA};
use crate::error::{ReconError, Side};
use crate::reconcile::normalize_key;

/// Build the aligned carrier table.
///
/// Both inputs are schema-checked before anything is transformed. Output rows
/// follow the carrier rows one for one.
pub fn align(matched: &Table, carrier: &Table, config: &AlignConfig) -> Result<Table, ReconError> {
    let missing = matched.missing_columns(&config.required_columns);
    if !missing.is_empty() {
        return Err(ReconError::SchemaValidation { side: Side::A, missing });
    }
    let missing = carrier.missing_columns(&CARRIER_SCHEMA);
    if !missing.is_empty() {
        return Err(ReconError::SchemaValidation { side: Side::B, missing });
    }

    let reshaped = reshape_carrier(carrier, config)?;
    let joined = left_join(&reshaped, matched, config)?;
    apply_field_map(reshaped, &joined, config)
}

/// Rename, drop, add placeholders, reorder.
fn reshape_carrier(carrier: &Table, config: &AlignConfig) -> Result<Table, ReconError> {
    let mut table = carrier.clone();

    table.rename_columns(&config.rename)?;

    for column in &config.drop {
        if !table.drop_column(column) {
            return Err(ReconError::ColumnNotFound {
                table: "carrier".into(),
                column: column.clone(),
            });
        }
    }

    for column in &config.new_columns {
        if table.has_column(column) {
            table.set_column(column, vec![Value::Empty; table.len()])?;
        } else {
            table.push_column(column, Value::Empty)?;
        }
    }

    let present: HashSet<&str> = table.columns().iter().map(String::as_str).collect();
    let wanted: HashSet<&str> = config.column_order.iter().map(String::as_str).collect();
    let unknown: Vec<String> = config
        .column_order
        .iter()
        .filter(|c| !present.contains(c.as_str()))
        .cloned()
        .collect();
    let leftover: Vec<String> = table
        .columns()
        .iter()
        .filter(|c| !wanted.contains(c.as_str()))
        .cloned()
        .collect();
    if !unknown.is_empty() || !leftover.is_empty() {
        return Err(ReconError::ColumnOrderMismatch { unknown, leftover });
    }

    Ok(table.select(&config.column_order)?)
}

/// For each carrier row, the first matched row with the same key
/// (restricted to `merge_columns`), or `None`.
fn left_join(
    carrier: &Table,
    matched: &Table,
    config: &AlignConfig,
) -> Result<JoinedRows, ReconError> {
    let side_a = matched.select(&config.merge_columns).map_err(|e| match ReconError::from(e) {
        ReconError::MissingColumns { missing, .. } => ReconError::SchemaValidation { side: Side::A, missing },
        other => other,
    })?;
    let key = &config.key_column;
    let a_key = side_a.column_index(key).ok_or_else(|| ReconError::ColumnNotFound {
        table: "matched".into(),
        column: key.clone(),
    })?;
    let b_key = carrier.column_index(key).ok_or_else(|| ReconError::ColumnNotFound {
        table: "carrier".into(),
        column: key.clone(),
    })?;

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut duplicates = 0usize;
    for (i, row) in side_a.rows().iter().enumerate() {
        let k = normalize_key(&row[a_key]);
        if k.is_empty() {
            continue;
        }
        if index.contains_key(&k) {
            duplicates += 1;
        } else {
            index.insert(k, i);
        }
    }
    if duplicates > 0 {
        log::warn!("{duplicates} duplicate key(s) in matched records; first occurrence used");
    }

    let hits = carrier
        .rows()
        .iter()
        .map(|row| index.get(&normalize_key(&row[b_key])).copied())
        .collect::<Vec<_>>();
    let joined = hits.iter().filter(|h| h.is_some()).count();
    log::info!("joined {joined} of {} carrier row(s)", carrier.len());

    Ok(JoinedRows { side_a, hits })
}

struct JoinedRows {
    side_a: Table,
    hits: Vec<Option<usize>>,
}

impl JoinedRows {
    fn column(&self, name: &str) -> Option<Vec<Value>> {
        let col = self.side_a.column_index(name)?;
        Some(
            self.hits
                .iter()
                .map(|hit| match hit {
                    Some(i) => self.side_a.rows()[*i][col].clone(),
                    None => Value::Empty,
                })
                .collect(),
        )
    }
}

fn apply_field_map(
    mut table: Table,
    joined: &JoinedRows,
    config: &AlignConfig,
) -> Result<Table, ReconError> {
    for (target, source) in &config.field_map {
        if !table.has_column(target) {
            return Err(ReconError::ConfigValidation(format!(
                "field_map target '{target}' is not a carrier column"
            )));
        }
        let values = joined.column(source).ok_or_else(|| {
            ReconError::ConfigValidation(format!("field_map source '{source}' is not in merge_columns"))
        })?;
        table.set_column(target, values)?;
    }
    Ok(table)
}
