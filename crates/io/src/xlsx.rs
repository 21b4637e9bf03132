// Excel import (xlsx, xlsm, xls, xlsb, ods) and export (xlsx only)
//
// Import: first row is the header, remaining rows are data. Numeric cells in
//         text columns are converted to text so long identifiers keep every digit.
// Export: one sheet, bold header, optional solid fill on the first cell of marked rows.

use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate, NaiveTime};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook as XlsxWorkbook, XlsxError};
use waybill_core::{Table, Value};

use crate::{ReadOptions, TableIoError};

/// Sheet name used for every exported workbook
pub const OUTPUT_SHEET_NAME: &str = "Sheet1";

/// Fill colour for marked rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillColor {
    /// FFFF00, used for system rows found in the carrier export
    Yellow,
    /// FF0000, used for carrier rows missing from the system export
    Red,
    Rgb(u32),
}

impl FillColor {
    pub fn rgb(&self) -> u32 {
        match self {
            FillColor::Yellow => 0xFFFF00,
            FillColor::Red => 0xFF0000,
            FillColor::Rgb(rgb) => *rgb & 0xFF_FF_FF,
        }
    }
}

/// Data rows (0-based, header excluded) to flag with a fill colour
#[derive(Debug, Clone, PartialEq)]
pub struct RowMarks {
    pub rows: Vec<usize>,
    pub color: FillColor,
}

impl RowMarks {
    pub fn new(rows: Vec<usize>, color: FillColor) -> Self {
        Self { rows, color }
    }
}

/// Result of an Excel export
#[derive(Debug, Default, Clone)]
pub struct ExportResult {
    pub rows_exported: usize,
    pub cells_exported: usize,
    pub rows_marked: usize,
    pub export_duration_ms: u128,
}

/// Import the first (or named) sheet as a table
pub fn import(path: &Path, options: &ReadOptions) -> Result<Table, TableIoError> {
    let start_time = Instant::now();

    // Classify missing/unreadable files before calamine wraps the error
    std::fs::File::open(path).map_err(|e| TableIoError::from_io(path, &e))?;

    let mut workbook = open_workbook_auto(path).map_err(|e| TableIoError::Format {
        path: path.to_path_buf(),
        message: format!("failed to open Excel file: {e}"),
    })?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    let sheet_name = match &options.sheet {
        Some(name) => {
            if !sheet_names.iter().any(|s| s == name) {
                return Err(TableIoError::SheetNotFound {
                    path: path.to_path_buf(),
                    sheet: name.clone(),
                    available: sheet_names,
                });
            }
            name.clone()
        }
        None => sheet_names.first().cloned().ok_or_else(|| TableIoError::Format {
            path: path.to_path_buf(),
            message: "Excel file contains no sheets".into(),
        })?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| TableIoError::Format {
            path: path.to_path_buf(),
            message: format!("failed to read sheet '{sheet_name}': {e}"),
        })?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        log::debug!("{}: sheet '{}' is empty", path.display(), sheet_name);
        return Ok(Table::default());
    };

    let columns = header_names(header_row.iter().map(|c| cell_to_value(c).display()));
    let text_cols: HashSet<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, name)| options.text_columns.iter().any(|t| t == *name))
        .map(|(i, _)| i)
        .collect();

    let width = columns.len();
    let mut table = Table::new(columns).map_err(|e| TableIoError::Format {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    for row in rows {
        let mut values: Vec<Value> = row.iter().take(width).map(cell_to_value).collect();
        values.resize(width, Value::Empty);

        // Blank rows inside the used range carry no data
        if values.iter().all(Value::is_empty) {
            continue;
        }

        for &col in &text_cols {
            values[col] = values[col].to_text();
        }

        table.push_row(values).map_err(|e| TableIoError::Format {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    }

    log::debug!(
        "read {} row(s) x {} column(s) from {} [{}] in {}ms",
        table.len(),
        table.width(),
        path.display(),
        sheet_name,
        start_time.elapsed().as_millis()
    );

    Ok(table)
}

/// Header cells to unique column names.
///
/// Blank headers become `Unnamed: <n>`; repeated names get `.1`, `.2`, ...
pub(crate) fn header_names<I>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut names: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for (i, name) in raw.into_iter().enumerate() {
        let base = if name.trim().is_empty() {
            format!("Unnamed: {i}")
        } else {
            name
        };
        let mut candidate = base.clone();
        let mut n = 1;
        while seen.contains(&candidate) {
            candidate = format!("{base}.{n}");
            n += 1;
        }
        seen.insert(candidate.clone());
        names.push(candidate);
    }

    names
}

fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Empty,
        Data::String(s) => Value::from(s.as_str()),
        Data::Float(n) => Value::Number(*n),
        Data::Int(n) => Value::Number(*n as f64),
        Data::Bool(b) => Value::text(if *b { "TRUE" } else { "FALSE" }),
        Data::Error(e) => Value::text(format!("#{e:?}")),
        Data::DateTime(dt) => Value::Text(excel_serial_to_string(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::from(s.as_str()),
    }
}

/// Render an Excel 1900-system serial date. Midnight renders as a bare date.
fn excel_serial_to_string(serial: f64) -> String {
    let Some(epoch) = NaiveDate::from_ymd_opt(1899, 12, 30).and_then(|d| d.and_hms_opt(0, 0, 0))
    else {
        return serial.to_string();
    };
    let millis = (serial * 86_400_000.0).round() as i64;
    // Serials outside the calendar range keep their numeric form
    let Some(dt) = Duration::try_milliseconds(millis).and_then(|d| epoch.checked_add_signed(d)) else {
        return serial.to_string();
    };
    if dt.time() == NaiveTime::MIN {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// Export a table to a single-sheet xlsx file
pub fn export(
    table: &Table,
    path: &Path,
    marks: Option<&RowMarks>,
) -> Result<ExportResult, TableIoError> {
    let start_time = Instant::now();
    let mut result = ExportResult::default();

    let format_err = |e: XlsxError| TableIoError::Format {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let mut workbook = XlsxWorkbook::new();
    let worksheet = workbook
        .add_worksheet()
        .set_name(OUTPUT_SHEET_NAME)
        .map_err(format_err)?;

    let header_format = Format::new()
        .set_bold()
        .set_border(FormatBorder::Thin)
        .set_align(FormatAlign::Center);

    for (col, name) in table.columns().iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, name, &header_format)
            .map_err(format_err)?;
    }

    let marked: HashSet<usize> = marks.map(|m| m.rows.iter().copied().collect()).unwrap_or_default();
    let mark_format = marks.map(|m| Format::new().set_background_color(Color::RGB(m.color.rgb())));
    let plain = Format::new();

    for (row_idx, row) in table.rows().iter().enumerate() {
        // Header occupies sheet row 0
        let row32 = (row_idx + 1) as u32;
        let is_marked = marked.contains(&row_idx);

        for (col, value) in row.iter().enumerate() {
            let col16 = col as u16;
            let format = match (&mark_format, is_marked && col == 0) {
                (Some(f), true) => f,
                _ => &plain,
            };
            match value {
                Value::Empty => {
                    if is_marked && col == 0 {
                        worksheet.write_blank(row32, col16, format).map_err(format_err)?;
                        result.cells_exported += 1;
                    }
                }
                Value::Text(s) => {
                    worksheet
                        .write_string_with_format(row32, col16, s, format)
                        .map_err(format_err)?;
                    result.cells_exported += 1;
                }
                Value::Number(n) => {
                    worksheet
                        .write_number_with_format(row32, col16, *n, format)
                        .map_err(format_err)?;
                    result.cells_exported += 1;
                }
            }
        }

        if is_marked && table.width() > 0 {
            result.rows_marked += 1;
        }
        result.rows_exported += 1;
    }

    workbook.save(path).map_err(|e| match e {
        XlsxError::IoError(io) => TableIoError::from_io(path, &io),
        other => format_err(other),
    })?;

    result.export_duration_ms = start_time.elapsed().as_millis();
    log::debug!(
        "wrote {} row(s) to {} ({} marked)",
        result.rows_exported,
        path.display(),
        result.rows_marked
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_rows(
            vec!["快递单号".into(), "金额".into(), "备注".into()],
            vec![
                vec![Value::text("1105123456789"), Value::Number(12.5), Value::Empty],
                vec![Value::text("0"), Value::Number(3.0), Value::text("测试")],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_header_names_dedup_and_unnamed() {
        let names = header_names(vec!["a".to_string(), "".into(), "a".into(), "a".into()]);
        assert_eq!(names, vec!["a", "Unnamed: 1", "a.1", "a.2"]);
    }

    #[test]
    fn test_excel_serial_dates() {
        assert_eq!(excel_serial_to_string(45474.0), "2024-07-01");
        assert_eq!(excel_serial_to_string(45474.5), "2024-07-01 12:00:00");
    }

    #[test]
    fn test_excel_serial_out_of_range() {
        assert_eq!(excel_serial_to_string(1.0e9), "1000000000");
        assert_eq!(excel_serial_to_string(-1.0e12), "-1000000000000");
        assert_eq!(excel_serial_to_string(f64::MAX), f64::MAX.to_string());
    }

    #[test]
    fn test_import_out_of_range_date_cell() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dates.xlsx");

        let mut workbook = XlsxWorkbook::new();
        let sheet = workbook.add_worksheet();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        sheet.write_string(0, 0, "收寄时间").unwrap();
        sheet.write_number_with_format(1, 0, 45474.0, &date_format).unwrap();
        sheet.write_number_with_format(2, 0, 1.0e9, &date_format).unwrap();
        workbook.save(&path).unwrap();

        let table = import(&path, &ReadOptions::default()).unwrap();
        assert_eq!(table.get(0, "收寄时间"), Some(&Value::text("2024-07-01")));
        assert_eq!(table.get(1, "收寄时间"), Some(&Value::text("1000000000")));
    }

    /// Attribute value inside the first tag starting with `open`.
    fn tag_attr(xml: &str, open: &str, attr: &str) -> Option<String> {
        let start = xml.find(open)?;
        let tag = &xml[start..start + xml[start..].find('>')?];
        let key = format!(" {attr}=\"");
        let from = tag.find(&key)? + key.len();
        Some(tag[from..from + tag[from..].find('"')?].to_string())
    }

    /// `fillId` of the cell style at `index` in `cellXfs`.
    fn xf_fill_id(styles: &str, index: usize) -> String {
        let start = styles.find("<cellXfs").unwrap();
        let end = start + styles[start..].find("</cellXfs>").unwrap();
        let xf = styles[start..end].match_indices("<xf ").nth(index).unwrap().0;
        tag_attr(&styles[start + xf..end], "<xf ", "fillId").unwrap_or_else(|| "0".into())
    }

    fn read_part(path: &Path, name: &str) -> String {
        use std::io::Read;
        let mut archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
        let mut xml = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut xml).unwrap();
        xml
    }

    #[test]
    fn test_mark_fills_first_cell_of_data_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marked.xlsx");
        export(&sample(), &path, Some(&RowMarks::new(vec![0], FillColor::Yellow))).unwrap();

        let sheet = read_part(&path, "xl/worksheets/sheet1.xml");
        let styles = read_part(&path, "xl/styles.xml");
        let fill_of = |cell: &str| {
            let style = tag_attr(&sheet, &format!("<c r=\"{cell}\""), "s").unwrap_or_else(|| "0".into());
            xf_fill_id(&styles, style.parse().unwrap())
        };

        // Data row 0 is sheet row 2; the header row stays unfilled
        assert_ne!(fill_of("A2"), "0");
        assert_eq!(fill_of("A1"), "0");
        assert_eq!(fill_of("B2"), "0");
        assert_eq!(fill_of("A3"), "0");
        assert!(styles.contains("FFFFFF00"));
    }

    #[test]
    fn test_fill_color_rgb() {
        assert_eq!(FillColor::Yellow.rgb(), 0xFFFF00);
        assert_eq!(FillColor::Red.rgb(), 0xFF0000);
        assert_eq!(FillColor::Rgb(0x12_00FF00).rgb(), 0x00FF00);
    }

    #[test]
    fn test_export_then_import() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        let marks = RowMarks::new(vec![1], FillColor::Yellow);

        let result = export(&sample(), &path, Some(&marks)).unwrap();
        assert_eq!(result.rows_exported, 2);
        assert_eq!(result.rows_marked, 1);
        assert!(path.exists());

        let table = import(&path, &ReadOptions::default().with_text_column("快递单号")).unwrap();
        assert_eq!(table.columns(), sample().columns());
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "快递单号"), Some(&Value::text("1105123456789")));
        assert_eq!(table.get(0, "金额"), Some(&Value::Number(12.5)));
        assert_eq!(table.get(0, "备注"), Some(&Value::Empty));
        assert_eq!(table.get(1, "备注"), Some(&Value::text("测试")));
    }

    #[test]
    fn test_text_column_converts_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("numeric.xlsx");
        let table = Table::from_rows(
            vec!["快递单号".into()],
            vec![vec![Value::Number(9876543210123.0)], vec![Value::Number(0.0)]],
        )
        .unwrap();
        export(&table, &path, None).unwrap();

        let as_text = import(&path, &ReadOptions::default().with_text_column("快递单号")).unwrap();
        assert_eq!(as_text.get(0, "快递单号"), Some(&Value::text("9876543210123")));
        assert_eq!(as_text.get(1, "快递单号"), Some(&Value::text("0")));

        let as_number = import(&path, &ReadOptions::default()).unwrap();
        assert_eq!(as_number.get(0, "快递单号"), Some(&Value::Number(9876543210123.0)));
    }

    #[test]
    fn test_import_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = import(&dir.path().join("nope.xlsx"), &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, TableIoError::NotFound { .. }));
    }

    #[test]
    fn test_import_unknown_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.xlsx");
        export(&sample(), &path, None).unwrap();
        let options = ReadOptions::default().with_sheet(Some("明细".into()));
        match import(&path, &options).unwrap_err() {
            TableIoError::SheetNotFound { sheet, available, .. } => {
                assert_eq!(sheet, "明细");
                assert_eq!(available, vec![OUTPUT_SHEET_NAME.to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_export_empty_table_writes_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.xlsx");
        let table = Table::new(vec!["a".into(), "b".into()]).unwrap();
        let result = export(&table, &path, None).unwrap();
        assert_eq!(result.rows_exported, 0);

        let back = import(&path, &ReadOptions::default()).unwrap();
        assert_eq!(back.columns(), &["a".to_string(), "b".to_string()]);
        assert!(back.is_empty());
    }
}
