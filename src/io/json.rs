//! Export frames to JSON.
//!
//! Two layouts:
//! - `records`: an array of row objects, keys in column order
//! - `structured`: `{ "metadata": {...}, "columns": [...], "data": [...] }`
//!
//! Dates are ISO strings, nulls and non-finite floats are `null`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use tracing::info;

use crate::domain::{JsonLayout, RelatedData, RequestMeta};
use crate::error::AppError;
use crate::frame::{Column, TimeSeriesFrame};
use crate::io::export::{ExportOptions, with_export_metadata};

/// Row-object view of a frame that serializes without copying cells.
pub struct Records<'a>(pub &'a TimeSeriesFrame);

struct Row<'a> {
    frame: &'a TimeSeriesFrame,
    row: usize,
}

struct CellRef<'a> {
    column: &'a Column,
    row: usize,
}

impl Serialize for Records<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for row in 0..self.0.len() {
            seq.serialize_element(&Row { frame: self.0, row })?;
        }
        seq.end()
    }
}

impl Serialize for Row<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.frame.width()))?;
        for (name, column) in self.frame.columns() {
            map.serialize_entry(name, &CellRef { column, row: self.row })?;
        }
        map.end()
    }
}

impl Serialize for CellRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.column {
            Column::Date(v) => match v[self.row] {
                Some(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
                None => serializer.serialize_none(),
            },
            Column::Int(v) => v[self.row].serialize(serializer),
            Column::Float(v) => v[self.row].filter(|x| x.is_finite()).serialize(serializer),
            Column::Text(v) => v[self.row].serialize(serializer),
        }
    }
}

#[derive(Serialize)]
struct Structured<'a> {
    metadata: StructuredMeta<'a>,
    columns: Vec<&'a str>,
    data: Records<'a>,
}

#[derive(Serialize)]
struct StructuredMeta<'a> {
    export_timestamp: String,
    total_records: usize,
    date_range: Option<DateSpan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request: Option<&'a RequestMeta>,
}

#[derive(Serialize)]
struct DateSpan {
    start: String,
    end: String,
}

fn date_span(frame: &TimeSeriesFrame) -> Option<DateSpan> {
    let dates = frame.dates()?;
    let start = dates.iter().flatten().min()?;
    let end = dates.iter().flatten().max()?;
    Some(DateSpan {
        start: start.format("%Y-%m-%d").to_string(),
        end: end.format("%Y-%m-%d").to_string(),
    })
}

/// Serialize `frame` in `layout` to any writer (pretty-printed).
pub fn write_frame_json<W: Write>(
    frame: &TimeSeriesFrame,
    layout: JsonLayout,
    meta: Option<&RequestMeta>,
    now: NaiveDateTime,
    out: W,
) -> Result<(), AppError> {
    let result = match layout {
        JsonLayout::Records => serde_json::to_writer_pretty(out, &Records(frame)),
        JsonLayout::Structured => serde_json::to_writer_pretty(
            out,
            &Structured {
                metadata: StructuredMeta {
                    export_timestamp: now.format("%Y-%m-%dT%H:%M:%S").to_string(),
                    total_records: frame.len(),
                    date_range: date_span(frame),
                    request: meta,
                },
                columns: frame.column_names().collect(),
                data: Records(frame),
            },
        ),
    };
    result.map_err(|e| AppError::new(2, format!("Failed to write JSON: {e}")))
}

/// Export `frame` as JSON under the output directory; returns the written path.
///
/// The `records` layout gets the same export metadata columns as CSV; the
/// `structured` layout carries them in its `metadata` block instead.
pub fn export_json(
    frame: &TimeSeriesFrame,
    filename: &str,
    layout: JsonLayout,
    meta: Option<&RequestMeta>,
    options: &ExportOptions,
    now: NaiveDateTime,
) -> Result<PathBuf, AppError> {
    if frame.width() == 0 {
        return Err(AppError::new(2, "Cannot export a frame with no columns."));
    }
    let data = match layout {
        JsonLayout::Records if options.include_metadata => with_export_metadata(frame, now),
        _ => frame.clone(),
    };
    let meta = meta.filter(|_| options.include_metadata);

    options.create_dir()?;
    let path = options.prepare_path(filename, "json", now);
    let file = File::create(&path)
        .map_err(|e| AppError::new(2, format!("Failed to create export JSON '{}': {e}", path.display())))?;
    let mut out = BufWriter::new(file);
    write_frame_json(&data, layout, meta, now, &mut out)?;
    out.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush JSON: {e}")))?;
    info!(file = %path.display(), records = data.len(), ?layout, "exported JSON");
    Ok(path)
}

/// Export related queries and topics as `{ "queries": {kw: {top, rising}}, "topics": ... }`.
pub fn export_related_json(
    related: &RelatedData,
    filename: &str,
    options: &ExportOptions,
    now: NaiveDateTime,
) -> Result<PathBuf, AppError> {
    options.create_dir()?;
    let path = options.prepare_path(filename, "json", now);
    let file = File::create(&path)
        .map_err(|e| AppError::new(2, format!("Failed to create export JSON '{}': {e}", path.display())))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, related)
        .map_err(|e| AppError::new(2, format!("Failed to write JSON: {e}")))?;
    out.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush JSON: {e}")))?;
    info!(
        file = %path.display(),
        queries = related.queries.len(),
        topics = related.topics.len(),
        "exported related data"
    );
    Ok(path)
}
