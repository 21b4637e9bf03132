use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum TableError {
    /// Two columns share a name.
    DuplicateColumn(String),
    /// A row does not have one value per column.
    RowWidth { row: usize, expected: usize, found: usize },
    /// A replacement column has the wrong number of values.
    ColumnLength { column: String, expected: usize, found: usize },
    /// Requested columns are not in the table.
    MissingColumns { missing: Vec<String>, available: Vec<String> },
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateColumn(name) => write!(f, "duplicate column '{name}'"),
            Self::RowWidth { row, expected, found } => {
                write!(f, "row {row}: expected {expected} value(s), found {found}")
            }
            Self::ColumnLength { column, expected, found } => {
                write!(f, "column '{column}': expected {expected} value(s), found {found}")
            }
            Self::MissingColumns { missing, available } => write!(
                f,
                "missing column(s) [{}]; available: [{}]",
                missing.join(", "),
                available.join(", ")
            ),
        }
    }
}

impl std::error::Error for TableError {}

/// An ordered header plus rows. Every row has one value per column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Result<Self, TableError> {
        let mut seen = HashSet::new();
        for c in &columns {
            if !seen.insert(c.as_str()) {
                return Err(TableError::DuplicateColumn(c.clone()));
            }
        }
        Ok(Self { columns, rows: Vec::new() })
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self, TableError> {
        let mut table = Self::new(columns)?;
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Build a table from string literals. Empty strings become [`Value::Empty`].
    pub fn from_text_rows(columns: &[&str], rows: &[&[&str]]) -> Result<Self, TableError> {
        Self::from_rows(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|s| Value::from(*s)).collect())
                .collect(),
        )
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::RowWidth {
                row: self.rows.len(),
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[Value]> {
        self.rows.get(index).map(|r| r.as_slice())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Names from `wanted` that are not columns of this table, in request order.
    pub fn missing_columns<S: AsRef<str>>(&self, wanted: &[S]) -> Vec<String> {
        wanted
            .iter()
            .map(|w| w.as_ref())
            .filter(|w| !self.has_column(w))
            .map(str::to_string)
            .collect()
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let col = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// All values of one column in row order.
    pub fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let col = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[col]).collect())
    }

    /// Project to exactly `names`, in the given order.
    ///
    /// Every absent name is reported at once.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Table, TableError> {
        let missing = self.missing_columns(names);
        if !missing.is_empty() {
            return Err(TableError::MissingColumns {
                missing,
                available: self.columns.clone(),
            });
        }
        let indices: Vec<usize> = names
            .iter()
            .filter_map(|n| self.column_index(n.as_ref()))
            .collect();
        let columns: Vec<String> = names.iter().map(|n| n.as_ref().to_string()).collect();
        let rows = self
            .rows
            .iter()
            .map(|r| indices.iter().map(|&i| r[i].clone()).collect())
            .collect();
        Table::from_rows(columns, rows)
    }

    /// Rows whose mask entry is true, in order. Missing mask entries count as false.
    pub fn filter_rows(&self, mask: &[bool]) -> Table {
        let rows = self
            .rows
            .iter()
            .zip(mask.iter())
            .filter(|(_, keep)| **keep)
            .map(|(r, _)| r.clone())
            .collect();
        Table { columns: self.columns.clone(), rows }
    }

    /// Rename columns in one pass, so swaps and chains see the original
    /// header. Names not in the header are ignored. Returns how many columns
    /// were renamed.
    pub fn rename_columns<'a, I>(&mut self, renames: I) -> Result<usize, TableError>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let renames: HashMap<&str, &str> = renames
            .into_iter()
            .map(|(from, to)| (from.as_str(), to.as_str()))
            .collect();

        let mut renamed = 0;
        let header: Vec<String> = self
            .columns
            .iter()
            .map(|c| match renames.get(c.as_str()) {
                Some(to) => {
                    renamed += 1;
                    (*to).to_string()
                }
                None => c.clone(),
            })
            .collect();

        let mut seen = HashSet::new();
        for c in &header {
            if !seen.insert(c.as_str()) {
                return Err(TableError::DuplicateColumn(c.clone()));
            }
        }
        self.columns = header;
        Ok(renamed)
    }

    /// Remove a column. Returns false when it is absent.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(col) = self.column_index(name) else {
            return false;
        };
        self.columns.remove(col);
        for row in &mut self.rows {
            row.remove(col);
        }
        true
    }

    /// Append a column filled with `fill`.
    pub fn push_column(&mut self, name: &str, fill: Value) -> Result<(), TableError> {
        if self.has_column(name) {
            return Err(TableError::DuplicateColumn(name.to_string()));
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(fill.clone());
        }
        Ok(())
    }

    /// Insert a column at `index` with one value per row.
    pub fn insert_column(
        &mut self,
        index: usize,
        name: &str,
        values: Vec<Value>,
    ) -> Result<(), TableError> {
        if self.has_column(name) {
            return Err(TableError::DuplicateColumn(name.to_string()));
        }
        if values.len() != self.rows.len() {
            return Err(TableError::ColumnLength {
                column: name.to_string(),
                expected: self.rows.len(),
                found: values.len(),
            });
        }
        let index = index.min(self.columns.len());
        self.columns.insert(index, name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.insert(index, value);
        }
        Ok(())
    }

    /// Overwrite an existing column with one value per row.
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) -> Result<(), TableError> {
        let Some(col) = self.column_index(name) else {
            return Err(TableError::MissingColumns {
                missing: vec![name.to_string()],
                available: self.columns.clone(),
            });
        };
        if values.len() != self.rows.len() {
            return Err(TableError::ColumnLength {
                column: name.to_string(),
                expected: self.rows.len(),
                found: values.len(),
            });
        }
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[col] = value;
        }
        Ok(())
    }
}
