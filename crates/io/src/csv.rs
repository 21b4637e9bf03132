// CSV/TSV import/export
//
// Every field is read as text; numeric comparisons parse text on demand, so
// tracking numbers never lose leading zeros or digits.

use std::io::Read;
use std::path::Path;
use std::time::Instant;

use waybill_core::{Table, Value};

use crate::xlsx::{header_names, ExportResult};
use crate::{ReadOptions, TableIoError};

/// Import a delimited file. `None` sniffs the delimiter from the first lines.
pub fn import(
    path: &Path,
    delimiter: Option<u8>,
    options: &ReadOptions,
) -> Result<Table, TableIoError> {
    let content = read_file_as_utf8(path)?;
    let delimiter = delimiter.unwrap_or_else(|| sniff_delimiter(&content));
    if options.sheet.is_some() {
        log::debug!("{}: sheet option ignored for delimited file", path.display());
    }
    import_from_string(&content, delimiter).map_err(|message| TableIoError::Format {
        path: path.to_path_buf(),
        message,
    })
}

/// Comma or tab, the two separators carrier and order-center exports use.
///
/// A candidate must split the header into more than one field. Among those,
/// the one most following lines agree with wins, then the wider split; ties
/// go to comma.
fn sniff_delimiter(content: &str) -> u8 {
    const CANDIDATES: [u8; 2] = [b'\t', b','];

    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let Some(header) = lines.next() else {
        return b',';
    };
    let sample: Vec<&str> = lines.take(9).collect();

    CANDIDATES
        .into_iter()
        .filter_map(|delim| {
            let width = field_count(header, delim);
            let agreeing = sample.iter().filter(|l| field_count(l, delim) == width).count();
            (width > 1).then_some((delim, agreeing, width))
        })
        .max_by_key(|&(_, agreeing, width)| (agreeing, width))
        .map_or(b',', |(delim, _, _)| delim)
}

fn field_count(line: &str, delimiter: u8) -> usize {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes())
        .records()
        .next()
        .and_then(Result::ok)
        .map_or(1, |r| r.len())
}

/// Read file and convert to UTF-8 if needed.
///
/// Strips a UTF-8 BOM. Non-UTF-8 input is decoded as GB18030, the usual
/// encoding of CSV files saved by Chinese-locale Excel.
pub fn read_file_as_utf8(path: &Path) -> Result<String, TableIoError> {
    let mut file = std::fs::File::open(path).map_err(|e| TableIoError::from_io(path, &e))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| TableIoError::from_io(path, &e))?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(s)),
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, had_errors) = encoding_rs::GB18030.decode(&bytes);
            if had_errors {
                log::warn!("{}: undecodable bytes replaced", path.display());
            }
            Ok(decoded.into_owned())
        }
    }
}

fn import_from_string(content: &str, delimiter: u8) -> Result<Table, String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => record.map_err(|e| e.to_string())?,
        None => return Ok(Table::default()),
    };

    let columns = header_names(header.iter().map(|s| s.trim().to_string()));
    let width = columns.len();
    let mut table = Table::new(columns).map_err(|e| e.to_string())?;

    for result in records {
        let record = result.map_err(|e| e.to_string())?;
        let mut values: Vec<Value> = record.iter().take(width).map(Value::from).collect();
        if values.iter().all(Value::is_empty) {
            continue;
        }
        values.resize(width, Value::Empty);
        table.push_row(values).map_err(|e| e.to_string())?;
    }

    Ok(table)
}

pub fn export(table: &Table, path: &Path, delimiter: u8) -> Result<ExportResult, TableIoError> {
    let start_time = Instant::now();
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    writer
        .write_record(table.columns())
        .map_err(|e| csv_error(path, e))?;

    let mut result = ExportResult::default();
    for row in table.rows() {
        let record: Vec<String> = row.iter().map(Value::display).collect();
        result.cells_exported += record.iter().filter(|s| !s.is_empty()).count();
        writer.write_record(&record).map_err(|e| csv_error(path, e))?;
        result.rows_exported += 1;
    }

    writer
        .flush()
        .map_err(|e| TableIoError::from_io(path, &e))?;
    result.export_duration_ms = start_time.elapsed().as_millis();
    Ok(result)
}

fn csv_error(path: &Path, err: csv::Error) -> TableIoError {
    match err.kind() {
        csv::ErrorKind::Io(io) => TableIoError::from_io(path, io),
        _ => TableIoError::Format {
            path: path.to_path_buf(),
            message: err.to_string(),
        },
    }
}
