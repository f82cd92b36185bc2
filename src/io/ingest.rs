//! CSV ingest into a `TimeSeriesFrame`.
//!
//! Column types are inferred from the non-empty cells of each column, most
//! specific first:
//!
//! - every cell parses as a date → `Date`
//! - every cell parses as an integer → `Int`
//! - every cell parses as a finite float → `Float`
//! - otherwise → `Text`
//!
//! Empty cells are null. A column with no non-empty cells is a null `Float`
//! column. Header names are trimmed and BOM-stripped but keep their case, so
//! keyword columns survive a CSV round trip unchanged.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::frame::{Column, TimeSeriesFrame};

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: the frame plus what was skipped on the way in.
#[derive(Debug, Clone)]
pub struct IngestedFrame {
    pub frame: TimeSeriesFrame,
    pub rows_read: usize,
    pub row_errors: Vec<RowError>,
}

pub fn load_frame_csv(path: &Path) -> Result<IngestedFrame, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    let ingested = read_frame_csv(file)?;
    info!(
        path = %path.display(),
        rows = ingested.frame.len(),
        columns = ingested.frame.width(),
        skipped = ingested.row_errors.len(),
        "loaded CSV"
    );
    Ok(ingested)
}

pub fn read_frame_csv<R: Read>(input: R) -> Result<IngestedFrame, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let names = header_names(&headers)?;

    let mut raw: Vec<Vec<Option<String>>> = vec![Vec::new(); names.len()];
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // records() starts after the header line; CSV lines are 1-based.
        let line = idx + 2;
        rows_read += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(line, error = %e, "skipping unreadable CSV row");
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };
        if record.len() > names.len() {
            row_errors.push(RowError {
                line,
                message: format!("Expected {} fields, found {}.", names.len(), record.len()),
            });
            continue;
        }
        for (i, col) in raw.iter_mut().enumerate() {
            let cell = record.get(i).filter(|s| !s.is_empty()).map(str::to_string);
            col.push(cell);
        }
    }

    let mut frame = TimeSeriesFrame::new();
    for (name, cells) in names.into_iter().zip(raw) {
        let column = infer_column(&cells);
        debug!(column = %name, kind = column.kind(), "inferred column type");
        frame.insert(name, column)?;
    }

    Ok(IngestedFrame {
        frame,
        rows_read,
        row_errors,
    })
}

fn header_names(headers: &StringRecord) -> Result<Vec<String>, AppError> {
    let mut names: Vec<String> = Vec::with_capacity(headers.len());
    for (idx, raw) in headers.iter().enumerate() {
        let name = normalize_header_name(raw);
        if name.is_empty() {
            return Err(AppError::new(2, format!("CSV header {} is empty.", idx + 1)));
        }
        if names.contains(&name) {
            return Err(AppError::new(2, format!("Duplicate CSV column: `{name}`")));
        }
        names.push(name);
    }
    if names.is_empty() {
        return Err(AppError::new(2, "CSV has no columns."));
    }
    Ok(names)
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM.
    name.trim().trim_start_matches('\u{feff}').trim().to_string()
}

fn infer_column(cells: &[Option<String>]) -> Column {
    let present = || cells.iter().flatten();
    if present().next().is_none() {
        return Column::Float(vec![None; cells.len()]);
    }
    if present().all(|s| parse_date(s).is_some()) {
        return Column::Date(cells.iter().map(|c| c.as_deref().and_then(parse_date)).collect());
    }
    if present().all(|s| s.parse::<i64>().is_ok()) {
        return Column::Int(cells.iter().map(|c| c.as_deref().and_then(|s| s.parse().ok())).collect());
    }
    if present().all(|s| parse_f64(s).is_some()) {
        return Column::Float(cells.iter().map(|c| c.as_deref().and_then(parse_f64)).collect());
    }
    Column::Text(cells.to_vec())
}

pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    // ISO first; a timestamp suffix (`2024-01-01T00:00:00`, `2024-01-01 00:00:00`) is tolerated.
    const FMTS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];
    let head = s.get(..10).filter(|_| s.len() > 10 && matches!(s.as_bytes()[10], b'T' | b' '));
    let s = head.unwrap_or(s);
    FMTS.iter().find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

fn parse_f64(s: &str) -> Option<f64> {
    let v = s.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}
