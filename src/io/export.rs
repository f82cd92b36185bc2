//! Export frames to CSV.
//!
//! Dates are written as `YYYY-MM-DD`, nulls as empty fields. Floats always
//! carry a decimal point so a re-ingested file keeps its column types.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::analysis::{PROCESSOR_VERSION, summarize, summary_frame};
use crate::config::ExportConfig;
use crate::error::AppError;
use crate::frame::{Cell, Column, TimeSeriesFrame};

pub const EXPORT_TIMESTAMP: &str = "export_timestamp";
pub const EXPORTER_VERSION: &str = "exporter_version";

/// Where and how exports are written.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    pub output_dir: PathBuf,
    pub include_metadata: bool,
    pub timestamp_files: bool,
}

impl ExportOptions {
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            include_metadata: config.include_metadata,
            timestamp_files: true,
        }
    }

    /// `{output_dir}/{stem}[_YYYYmmdd_HHMMSS].{ext}`; any extension on `filename` is replaced.
    pub fn prepare_path(&self, filename: &str, extension: &str, now: NaiveDateTime) -> PathBuf {
        let stem = Path::new(filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string());
        let name = if self.timestamp_files {
            format!("{stem}_{}.{extension}", now.format("%Y%m%d_%H%M%S"))
        } else {
            format!("{stem}.{extension}")
        };
        self.output_dir.join(name)
    }

    pub(crate) fn create_dir(&self) -> Result<(), AppError> {
        fs::create_dir_all(&self.output_dir).map_err(|e| {
            AppError::new(
                2,
                format!("Failed to create output directory '{}': {e}", self.output_dir.display()),
            )
        })
    }
}

/// Append `export_timestamp` and `exporter_version` columns.
pub fn with_export_metadata(frame: &TimeSeriesFrame, now: NaiveDateTime) -> TimeSeriesFrame {
    frame
        .with_constant(EXPORT_TIMESTAMP, Cell::Text(now.format("%Y-%m-%dT%H:%M:%S").to_string()))
        .with_constant(EXPORTER_VERSION, Cell::Text(PROCESSOR_VERSION.to_string()))
}

/// Write `frame` (header + rows) to any writer.
pub fn write_frame_csv<W: Write>(frame: &TimeSeriesFrame, out: W) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(out);
    let write_err = |e: csv::Error| AppError::new(2, format!("Failed to write CSV: {e}"));

    writer
        .write_record(frame.column_names())
        .map_err(write_err)?;
    let columns: Vec<&Column> = frame.columns().map(|(_, c)| c).collect();
    for row in 0..frame.len() {
        writer
            .write_record(columns.iter().map(|c| format_cell(c, row)))
            .map_err(write_err)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush CSV: {e}")))
}

/// Export `frame` under the output directory; returns the written path.
pub fn export_csv(
    frame: &TimeSeriesFrame,
    filename: &str,
    options: &ExportOptions,
    now: NaiveDateTime,
) -> Result<PathBuf, AppError> {
    if frame.width() == 0 {
        return Err(AppError::new(2, "Cannot export a frame with no columns."));
    }
    if frame.is_empty() {
        warn!(filename, "exporting empty frame");
    }
    let data = if options.include_metadata {
        with_export_metadata(frame, now)
    } else {
        frame.clone()
    };

    options.create_dir()?;
    let path = options.prepare_path(filename, "csv", now);
    let file = File::create(&path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))?;
    write_frame_csv(&data, file)?;
    info!(file = %path.display(), records = data.len(), columns = data.width(), "exported CSV");
    Ok(path)
}

/// Export per-column statistics as `{filename}_summary`. `None` when the
/// frame has no numeric value columns.
pub fn export_summary_csv(
    frame: &TimeSeriesFrame,
    filename: &str,
    options: &ExportOptions,
    now: NaiveDateTime,
) -> Result<Option<PathBuf>, AppError> {
    let stats = summarize(frame, &[] as &[&str]);
    if stats.is_empty() {
        warn!(filename, "no numeric columns found for summary");
        return Ok(None);
    }
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());
    let path = export_csv(&summary_frame(&stats), &format!("{stem}_summary"), options, now)?;
    Ok(Some(path))
}

fn format_cell(column: &Column, row: usize) -> String {
    match column {
        Column::Date(v) => v[row].map(|d| d.format("%Y-%m-%d").to_string()),
        Column::Int(v) => v[row].map(|i| i.to_string()),
        Column::Float(v) => v[row].map(format_float),
        Column::Text(v) => v[row].clone(),
    }
    .unwrap_or_default()
}

pub(crate) fn format_float(x: f64) -> String {
    if !x.is_finite() {
        return String::new();
    }
    let s = x.to_string();
    if s.contains('.') { s } else { format!("{s}.0") }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::testing::*;
    use crate::io::read_frame_csv;

    fn now() -> NaiveDateTime {
        date("2024-05-06").and_hms_opt(7, 8, 9).unwrap()
    }

    fn sample() -> TimeSeriesFrame {
        TimeSeriesFrame::from_columns([
            ("date", dates(&["2024-01-01", "2024-01-02"])),
            ("outback_daily", Column::Float(vec![Some(40.0), None])),
            ("outback_anomaly", ints(&[0, 1])),
            ("geo", Column::Text(vec![Some("US".into()), Some("a,b".into())])),
        ])
        .unwrap()
    }

    fn options(dir: &Path, include_metadata: bool, timestamp_files: bool) -> ExportOptions {
        ExportOptions {
            output_dir: dir.to_path_buf(),
            include_metadata,
            timestamp_files,
        }
    }

    #[test]
    fn csv_text_layout() {
        let mut buf = Vec::new();
        write_frame_csv(&sample(), &mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "date,outback_daily,outback_anomaly,geo\n\
             2024-01-01,40.0,0,US\n\
             2024-01-02,,1,\"a,b\"\n"
        );
    }

    #[test]
    fn timestamped_names_replace_extension() {
        let opts = options(Path::new("out"), true, true);
        assert_eq!(
            opts.prepare_path("trends.json", "csv", now()),
            PathBuf::from("out/trends_20240506_070809.csv")
        );
        let plain = options(Path::new("out"), true, false);
        assert_eq!(plain.prepare_path("trends", "csv", now()), PathBuf::from("out/trends.csv"));
    }

    #[test]
    fn export_round_trips_through_ingest() {
        let dir = tempfile::tempdir().unwrap();
        let path = export_csv(&sample(), "trends", &options(dir.path(), true, false), now()).unwrap();
        assert_eq!(path, dir.path().join("trends.csv"));

        let back = read_frame_csv(File::open(&path).unwrap()).unwrap().frame;
        assert_eq!(float_col(&back, "outback_daily"), vec![Some(40.0), None]);
        assert_eq!(int_col(&back, "outback_anomaly"), vec![Some(0), Some(1)]);
        assert_eq!(
            back.column(EXPORT_TIMESTAMP).unwrap(),
            &Column::Date(vec![Some(date("2024-05-06")); 2])
        );
        assert_eq!(
            back.column(EXPORTER_VERSION).unwrap(),
            &Column::Text(vec![Some(PROCESSOR_VERSION.to_string()); 2])
        );
    }

    #[test]
    fn summary_export_names_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path(), false, false);
        let path = export_summary_csv(&sample(), "trends.csv", &opts, now()).unwrap().unwrap();
        assert_eq!(path, dir.path().join("trends_summary.csv"));
        let back = read_frame_csv(File::open(&path).unwrap()).unwrap().frame;
        assert_eq!(back.len(), 2);

        let text_only = TimeSeriesFrame::from_columns([("geo", Column::Text(vec![Some("US".into())]))]).unwrap();
        assert_eq!(export_summary_csv(&text_only, "t", &opts, now()).unwrap(), None);
    }

    #[test]
    fn format_float_keeps_a_decimal_point() {
        assert_eq!(format_float(40.0), "40.0");
        assert_eq!(format_float(0.25), "0.25");
        assert_eq!(format_float(f64::NAN), "");
    }
}
