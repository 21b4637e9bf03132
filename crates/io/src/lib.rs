// Table file I/O: Excel via calamine/rust_xlsxwriter, CSV via csv

pub mod csv;
pub mod error;
pub mod xlsx;

use std::path::Path;

use waybill_core::Table;

pub use error::TableIoError;
pub use xlsx::{ExportResult, FillColor, RowMarks};

/// Options for loading a table.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Sheet to read. `None` reads the first sheet.
    pub sheet: Option<String>,
    /// Columns whose numeric cells are converted to text (tracking numbers).
    pub text_columns: Vec<String>,
}

impl ReadOptions {
    pub fn with_text_column(mut self, column: impl Into<String>) -> Self {
        self.text_columns.push(column.into());
        self
    }

    pub fn with_sheet(mut self, sheet: Option<String>) -> Self {
        self.sheet = sheet;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Excel,
    Csv,
    Tsv,
}

fn file_kind(path: &Path) -> Result<FileKind, TableIoError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Ok(FileKind::Excel),
        "csv" => Ok(FileKind::Csv),
        "tsv" => Ok(FileKind::Tsv),
        _ => Err(TableIoError::Format {
            path: path.to_path_buf(),
            message: format!("unsupported file type '.{ext}'"),
        }),
    }
}

/// Load the first sheet (or the named sheet) of a spreadsheet or CSV file.
pub fn read_table(path: &Path, options: &ReadOptions) -> Result<Table, TableIoError> {
    match file_kind(path)? {
        FileKind::Excel => xlsx::import(path, options),
        FileKind::Csv => csv::import(path, None, options),
        FileKind::Tsv => csv::import(path, Some(b'\t'), options),
    }
}

/// Write a table. Marks are honoured for `.xlsx` output and ignored for CSV.
pub fn write_table(
    path: &Path,
    table: &Table,
    marks: Option<&RowMarks>,
) -> Result<ExportResult, TableIoError> {
    match file_kind(path)? {
        FileKind::Excel => {
            let is_xlsx = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("xlsx"));
            if !is_xlsx {
                return Err(TableIoError::Format {
                    path: path.to_path_buf(),
                    message: "only .xlsx is supported for spreadsheet output".into(),
                });
            }
            xlsx::export(table, path, marks)
        }
        kind => {
            if marks.is_some_and(|m| !m.rows.is_empty()) {
                log::warn!("{}: row marks are not stored in delimited files", path.display());
            }
            let delimiter = if kind == FileKind::Tsv { b'\t' } else { b',' };
            csv::export(table, path, delimiter)
        }
    }
}
