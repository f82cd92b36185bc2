//! Row and column selection, and export metadata.
//!
//! Keyword selection keeps every non-value column (dates, calendar parts,
//! categorical text, `total_anomalies`) and only those value columns that
//! belong to a selected keyword: named exactly `{kw}` or starting with `{kw}_`.

use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use tracing::info;

use super::summary::value_column_names;
use super::{TOTAL_ANOMALIES, Transformed, Warning, warn};
use crate::frame::{Cell, Column, DATE, TimeSeriesFrame};

/// Version stamped into `processor_version`.
pub const PROCESSOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameFilter {
    /// Inclusive lower bound on `date`.
    pub start: Option<NaiveDate>,
    /// Inclusive upper bound on `date`.
    pub end: Option<NaiveDate>,
    /// Keep only these keywords' value columns; empty keeps all.
    pub keywords: Vec<String>,
    /// Text column → accepted values.
    pub categories: IndexMap<String, Vec<String>>,
}

impl FrameFilter {
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none() && self.keywords.is_empty() && self.categories.is_empty()
    }
}

/// Apply a [`FrameFilter`]; rows with a null `date` fail any date bound.
pub fn filter_frame(frame: &TimeSeriesFrame, filter: &FrameFilter) -> Transformed {
    let mut warnings = Vec::new();
    let mut keep = vec![true; frame.len()];

    if filter.start.is_some() || filter.end.is_some() {
        match frame.dates() {
            Some(dates) => {
                for (k, d) in keep.iter_mut().zip(dates) {
                    let inside = d.is_some_and(|d| {
                        filter.start.is_none_or(|s| d >= s) && filter.end.is_none_or(|e| d <= e)
                    });
                    *k &= inside;
                }
            }
            None => warn(
                &mut warnings,
                "filter",
                Warning::SkippedColumn {
                    column: DATE.to_string(),
                },
            ),
        }
    }

    for (name, accepted) in &filter.categories {
        match frame.column(name) {
            Some(Column::Text(values)) => {
                for (k, v) in keep.iter_mut().zip(values) {
                    *k &= v.as_ref().is_some_and(|v| accepted.contains(v));
                }
            }
            _ => warn(&mut warnings, "filter", Warning::SkippedColumn { column: name.clone() }),
        }
    }

    let mut out = frame.filter_rows(&keep);

    if !filter.keywords.is_empty() {
        let drop: Vec<String> = value_column_names(&out)
            .into_iter()
            .filter(|name| name != TOTAL_ANOMALIES)
            .filter(|name| !belongs_to_any(name, &filter.keywords))
            .collect();
        for name in &drop {
            out.drop_column(name);
        }
    }

    info!(rows_in = frame.len(), rows_out = out.len(), columns = out.width(), "frame filtered");
    Transformed { frame: out, warnings }
}

fn belongs_to_any(column: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|kw| {
        column == kw
            || column
                .strip_prefix(kw.as_str())
                .is_some_and(|rest| rest.starts_with('_'))
    })
}

/// Append `processed_date`, `processor_version` and caller-provided constant text columns.
pub fn with_metadata(frame: &TimeSeriesFrame, processed: NaiveDateTime, extra: &[(String, String)]) -> TimeSeriesFrame {
    let mut out = frame
        .with_constant("processed_date", Cell::Text(processed.format("%Y-%m-%dT%H:%M:%S").to_string()))
        .with_constant("processor_version", Cell::Text(PROCESSOR_VERSION.to_string()));
    for (name, value) in extra {
        out = out.with_constant(name, Cell::Text(value.clone()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::testing::*;

    fn frame() -> TimeSeriesFrame {
        let mut f = series("2023-01-01", "outback_daily", &[1.0, 2.0, 3.0, 4.0]);
        f.put("outback_daily_ma_7", floats(&[1.0, 1.5, 2.0, 2.5]));
        f.put("outbackers_daily", floats(&[9.0, 9.0, 9.0, 9.0]));
        f.put("chilis_daily", floats(&[5.0, 6.0, 7.0, 8.0]));
        f.put(
            "geo",
            Column::Text(vec![Some("US".into()), Some("US".into()), Some("CA".into()), None]),
        );
        f
    }

    #[test]
    fn date_range_is_inclusive() {
        let filter = FrameFilter {
            start: Some(date("2023-01-02")),
            end: Some(date("2023-01-03")),
            ..Default::default()
        };
        let out = filter_frame(&frame(), &filter).frame;
        assert_eq!(out.dates().unwrap(), &[Some(date("2023-01-02")), Some(date("2023-01-03"))]);
    }

    #[test]
    fn keyword_selection_matches_name_or_underscore_prefix() {
        let filter = FrameFilter {
            keywords: vec!["outback".into(), "outback_daily".into()],
            ..Default::default()
        };
        let out = filter_frame(&frame(), &filter).frame;
        let names: Vec<&str> = out.column_names().collect();
        assert_eq!(names, vec![DATE, "outback_daily", "outback_daily_ma_7", "geo"]);
    }

    #[test]
    fn category_membership() {
        let mut categories = IndexMap::new();
        categories.insert("geo".to_string(), vec!["US".to_string()]);
        let filter = FrameFilter {
            categories,
            ..Default::default()
        };
        let out = filter_frame(&frame(), &filter).frame;
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn missing_category_column_is_warned() {
        let mut categories = IndexMap::new();
        categories.insert("timeframe".to_string(), vec!["all".to_string()]);
        let out = filter_frame(
            &frame(),
            &FrameFilter {
                categories,
                ..Default::default()
            },
        );
        assert_eq!(out.frame.len(), 4);
        assert_eq!(
            out.warnings,
            vec![Warning::SkippedColumn {
                column: "timeframe".into()
            }]
        );
    }

    #[test]
    fn metadata_columns_are_constant() {
        let processed = date("2024-03-01").and_hms_opt(12, 30, 0).unwrap();
        let out = with_metadata(
            &series("2023-01-01", "kw", &[1.0, 2.0]),
            processed,
            &[("geo".to_string(), "US".to_string())],
        );
        assert_eq!(
            out.column("processed_date"),
            Some(&Column::Text(vec![Some("2024-03-01T12:30:00".into()); 2]))
        );
        assert_eq!(
            out.column("processor_version"),
            Some(&Column::Text(vec![Some(PROCESSOR_VERSION.into()); 2]))
        );
        assert!(out.has_column("geo"));
    }
}
