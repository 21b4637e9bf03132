use std::fmt;

use waybill_core::TableError;

/// Which input of an alignment failed its schema check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The matched-records table
    A,
    /// The carrier export
    B,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconError {
    /// A column referenced by a condition, key, or drop list is absent.
    ColumnNotFound { table: String, column: String },
    /// Projection or selection asked for columns the table does not have.
    MissingColumns { missing: Vec<String>, available: Vec<String> },
    /// Alignment precondition: an input lacks required columns.
    SchemaValidation { side: Side, missing: Vec<String> },
    /// Unknown filter operator in strict mode.
    InvalidOperator { column: String, operator: String },
    /// Reorder target does not name exactly the table's columns.
    ColumnOrderMismatch { unknown: Vec<String>, leftover: Vec<String> },
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad field map, empty key column, etc.).
    ConfigValidation(String),
}

/// Python-style list rendering used in operator-facing messages: `['a', 'b']`.
pub fn list_repr(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| format!("'{s}'")).collect();
    format!("[{}]", quoted.join(", "))
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ColumnNotFound { table, column } => {
                write!(f, "{table}: column '{column}' not found")
            }
            Self::MissingColumns { missing, available } => write!(
                f,
                "missing columns {} (available: {})",
                list_repr(missing),
                list_repr(available)
            ),
            Self::SchemaValidation { side, missing } => {
                write!(f, "{side}文件缺少必要列：{}", list_repr(missing))
            }
            Self::InvalidOperator { column, operator } => {
                write!(f, "column '{column}': invalid operator '{operator}'")
            }
            Self::ColumnOrderMismatch { unknown, leftover } => write!(
                f,
                "column order mismatch: unknown {}, not placed {}",
                list_repr(unknown),
                list_repr(leftover)
            ),
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}

impl From<TableError> for ReconError {
    fn from(err: TableError) -> Self {
        match err {
            TableError::MissingColumns { missing, available } => {
                Self::MissingColumns { missing, available }
            }
            other => Self::ConfigValidation(other.to_string()),
        }
    }
}

/// Non-fatal conditions surfaced alongside a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconWarning {
    /// No system row matched the carrier keys.
    EmptyResult(String),
    /// A requested pipeline step is not declared.
    UnknownStep(String),
}

impl fmt::Display for ReconWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyResult(what) => write!(f, "no records matched: {what}"),
            Self::UnknownStep(step) => write!(f, "unknown step: {step}"),
        }
    }
}
