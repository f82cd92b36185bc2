//! The reconciliation and derived-analytics core.
//!
//! Every transform here is a pure function over `&TimeSeriesFrame`: it builds
//! and returns a new frame and never touches the caller's copy. Tolerated data
//! sparsity is reported through [`Warning`]s returned next to the frame (and
//! mirrored as `tracing` events); contract violations are `AnalysisError`s.
//!
//! - `rebase`: daily × monthly baseline reconciliation
//! - `trends`: rolling indicators
//! - `anomaly`: outlier flags
//! - `aggregate`: group-by reductions
//! - `normalize`: comparison-ready rescaling
//! - `summary` / `filter`: descriptive statistics and row/column selection

use std::fmt;

use crate::frame::TimeSeriesFrame;

pub mod aggregate;
pub mod anomaly;
pub mod filter;
pub mod normalize;
pub mod rebase;
pub mod summary;
pub mod trends;

pub use aggregate::*;
pub use anomaly::*;
pub use filter::*;
pub use normalize::*;
pub use rebase::*;
pub use summary::*;
pub use trends::*;

/// A tolerated irregularity encountered by a transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// An input frame had no rows; the output is empty.
    EmptyInput { frame: &'static str },
    /// A keyword lacked its daily column, its monthly column, or both.
    MissingKeywordColumns { keyword: String, daily: bool, monthly: bool },
    /// The monthly frame held more than one row for a period; the first was used.
    DuplicatePeriod { year: i64, month: i64 },
    /// A requested value column was not present (or not numeric).
    SkippedColumn { column: String },
    /// A requested group-by key was not present.
    SkippedGroupKey { column: String },
    /// A value column had no reducer configured.
    NoReducer { column: String },
    /// Nothing left to aggregate after dropping absent columns.
    NoAggregationColumns,
    /// The normalization method name was not recognized.
    UnknownNormalizeMethod { method: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::EmptyInput { frame } => write!(f, "{frame} input is empty"),
            Warning::MissingKeywordColumns { keyword, daily, monthly } => {
                let missing = match (daily, monthly) {
                    (false, false) => "daily and monthly columns",
                    (false, true) => "daily column",
                    _ => "monthly column",
                };
                write!(f, "missing {missing} for keyword `{keyword}`")
            }
            Warning::DuplicatePeriod { year, month } => {
                write!(f, "duplicate monthly baseline for {year}-{month:02}; first row used")
            }
            Warning::SkippedColumn { column } => write!(f, "column `{column}` not found; skipped"),
            Warning::SkippedGroupKey { column } => write!(f, "group key `{column}` not found; ignored"),
            Warning::NoReducer { column } => write!(f, "no reducer configured for `{column}`; skipped"),
            Warning::NoAggregationColumns => write!(f, "no valid columns for aggregation"),
            Warning::UnknownNormalizeMethod { method } => {
                write!(f, "unknown normalization method `{method}`; columns left as-is")
            }
        }
    }
}

/// A transformed frame plus the warnings raised while producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub frame: TimeSeriesFrame,
    pub warnings: Vec<Warning>,
}

impl Transformed {
    pub fn clean(frame: TimeSeriesFrame) -> Self {
        Self {
            frame,
            warnings: Vec::new(),
        }
    }

    /// Discard warnings.
    pub fn into_frame(self) -> TimeSeriesFrame {
        self.frame
    }
}

/// Log a warning through `tracing` and record it.
pub(crate) fn warn(warnings: &mut Vec<Warning>, stage: &'static str, warning: Warning) {
    tracing::warn!(stage, "{warning}");
    warnings.push(warning);
}

/// Columns from `requested` that exist in `frame` as numeric columns, in request order.
///
/// Duplicates are dropped; absent names are reported through `on_missing`.
pub(crate) fn numeric_columns<S: AsRef<str>>(
    frame: &TimeSeriesFrame,
    requested: &[S],
    mut on_missing: impl FnMut(&str),
) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(requested.len());
    for name in requested {
        let name = name.as_ref();
        if out.iter().any(|n| n == name) {
            continue;
        }
        match frame.column(name) {
            Some(col) if col.is_numeric() => out.push(name.to_string()),
            _ => on_missing(name),
        }
    }
    out
}
