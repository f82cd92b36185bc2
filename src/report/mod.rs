//! Reporting utilities: flagged anomalies and per-keyword highlights.

use chrono::NaiveDate;

use crate::analysis::ANOMALY_SUFFIX;
use crate::frame::TimeSeriesFrame;
use crate::math::{mean, present};

pub mod format;

pub use format::*;

/// One flagged observation.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyEvent {
    pub date: Option<NaiveDate>,
    pub column: String,
    pub value: f64,
}

/// Headline numbers for one value column.
#[derive(Debug, Clone, PartialEq)]
pub struct Highlight {
    pub column: String,
    pub observations: usize,
    pub mean: Option<f64>,
    pub latest: Option<f64>,
    pub peak: Option<(Option<NaiveDate>, f64)>,
    pub anomalies: usize,
}

/// Every row where `{col}_anomaly == 1`, largest values first.
pub fn flagged_anomalies(frame: &TimeSeriesFrame, value_columns: &[String], top_n: usize) -> Vec<AnomalyEvent> {
    let dates = frame.dates();
    let mut events = Vec::new();
    for col in value_columns {
        let (Some(values), Some(flags)) = (frame.numeric(col), frame.numeric(&format!("{col}{ANOMALY_SUFFIX}"))) else {
            continue;
        };
        for (row, (v, flag)) in values.iter().zip(&flags).enumerate() {
            match v {
                Some(v) if *flag == Some(1.0) => events.push(AnomalyEvent {
                    date: dates.and_then(|d| d[row]),
                    column: col.clone(),
                    value: *v,
                }),
                _ => {}
            }
        }
    }
    events.sort_by(|a, b| b.value.total_cmp(&a.value).then(a.date.cmp(&b.date)));
    events.truncate(top_n);
    events
}

pub fn highlights(frame: &TimeSeriesFrame, value_columns: &[String]) -> Vec<Highlight> {
    let dates = frame.dates();
    value_columns
        .iter()
        .filter_map(|col| {
            let values = frame.numeric(col)?;
            let sample = present(&values);
            let peak = values
                .iter()
                .enumerate()
                .filter_map(|(i, v)| v.map(|v| (i, v)))
                .fold(None::<(usize, f64)>, |best, (i, v)| match best {
                    Some((_, b)) if b >= v => best,
                    _ => Some((i, v)),
                })
                .map(|(i, v)| (dates.and_then(|d| d[i]), v));
            let anomalies = frame
                .numeric(&format!("{col}{ANOMALY_SUFFIX}"))
                .map(|flags| flags.iter().filter(|f| **f == Some(1.0)).count())
                .unwrap_or(0);
            Some(Highlight {
                column: col.clone(),
                observations: sample.len(),
                mean: mean(&sample),
                latest: values.iter().rev().find_map(|v| *v),
                peak,
                anomalies,
            })
        })
        .collect()
}
