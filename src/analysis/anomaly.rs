//! Whole-column outlier flags.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Transformed, Warning, numeric_columns, warn};
use crate::error::AnalysisError;
use crate::frame::{Column, TimeSeriesFrame};
use crate::math::{Quartiles, is_constant, mean, present, sample_std};

/// Name of the row-wise anomaly count column.
pub const TOTAL_ANOMALIES: &str = "total_anomalies";
/// Suffix of per-column anomaly flags.
pub const ANOMALY_SUFFIX: &str = "_anomaly";

pub const DEFAULT_ANOMALY_THRESHOLD: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyMethod {
    /// Outside `[Q1 − t·IQR, Q3 + t·IQR]`.
    #[default]
    Iqr,
    /// `|v − mean| / std > t`.
    Zscore,
}

impl AnomalyMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            AnomalyMethod::Iqr => "iqr",
            AnomalyMethod::Zscore => "zscore",
        }
    }
}

impl fmt::Display for AnomalyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnomalyMethod {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "iqr" => Ok(AnomalyMethod::Iqr),
            "zscore" => Ok(AnomalyMethod::Zscore),
            _ => Err(AnalysisError::UnsupportedMethod(s.to_string())),
        }
    }
}

/// Flag outliers by method name; unknown names are an error.
pub fn detect_anomalies<S: AsRef<str>>(
    frame: &TimeSeriesFrame,
    value_columns: &[S],
    method: &str,
    threshold: f64,
) -> Result<Transformed, AnalysisError> {
    let method = method.parse::<AnomalyMethod>()?;
    Ok(detect_anomalies_with(frame, value_columns, method, threshold))
}

/// Add `{col}_anomaly` (0/1) for every present column and recompute `total_anomalies`.
///
/// Statistics are computed over each column's non-null values; null cells are
/// never flagged.
pub fn detect_anomalies_with<S: AsRef<str>>(
    frame: &TimeSeriesFrame,
    value_columns: &[S],
    method: AnomalyMethod,
    threshold: f64,
) -> Transformed {
    let mut warnings = Vec::new();
    let columns = numeric_columns(frame, value_columns, |name| {
        warn(
            &mut warnings,
            "anomaly",
            Warning::SkippedColumn {
                column: name.to_string(),
            },
        )
    });

    info!(%method, threshold, columns = columns.len(), "detecting anomalies");
    let mut out = frame.clone();

    for name in &columns {
        let Some(values) = out.numeric(name) else {
            continue;
        };
        let flags = flag(&values, method, threshold);
        debug!(
            column = %name,
            flagged = flags.iter().flatten().filter(|&&f| f == 1).count(),
            "anomaly flags computed"
        );
        out.put(format!("{name}{ANOMALY_SUFFIX}"), Column::Int(flags));
    }

    let total = total_anomalies(&out);
    if let Some(total) = total {
        out.put(TOTAL_ANOMALIES, Column::Int(total));
    }

    Transformed { frame: out, warnings }
}

fn flag(values: &[Option<f64>], method: AnomalyMethod, threshold: f64) -> Vec<Option<i64>> {
    let sample = present(values);
    if is_constant(&sample) {
        return vec![Some(0); values.len()];
    }
    let is_outlier: Box<dyn Fn(f64) -> bool> = match method {
        AnomalyMethod::Iqr => match Quartiles::of(&sample) {
            Some(q) => {
                let lo = q.q1 - threshold * q.iqr();
                let hi = q.q3 + threshold * q.iqr();
                Box::new(move |v| v < lo || v > hi)
            }
            None => Box::new(|_| false),
        },
        AnomalyMethod::Zscore => match (mean(&sample), sample_std(&sample)) {
            (Some(m), Some(s)) if s > 0.0 && s.is_finite() => Box::new(move |v| ((v - m) / s).abs() > threshold),
            _ => Box::new(|_| false),
        },
    };
    values
        .iter()
        .map(|v| Some(matches!(v, Some(x) if x.is_finite() && is_outlier(*x)) as i64))
        .collect()
}

/// Row-wise sum of every `*_anomaly` column; `None` when there are none.
fn total_anomalies(frame: &TimeSeriesFrame) -> Option<Vec<Option<i64>>> {
    let mut total: Option<Vec<Option<i64>>> = None;
    for (name, column) in frame.columns() {
        if !name.ends_with(ANOMALY_SUFFIX) {
            continue;
        }
        let Column::Int(flags) = column else { continue };
        let acc = total.get_or_insert_with(|| vec![Some(0); frame.len()]);
        for (slot, f) in acc.iter_mut().zip(flags) {
            *slot = Some(slot.unwrap_or(0) + f.unwrap_or(0));
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::testing::*;

    #[test]
    fn iqr_flags_only_the_outlier() {
        let frame = series("2023-01-01", "v", &[1.0, 2.0, 3.0, 4.0, 5.0, 100.0]);
        let out = detect_anomalies(&frame, &["v"], "iqr", 1.5).unwrap().frame;
        assert_eq!(
            int_col(&out, "v_anomaly"),
            vec![Some(0), Some(0), Some(0), Some(0), Some(0), Some(1)]
        );
        assert_eq!(int_col(&out, TOTAL_ANOMALIES), int_col(&out, "v_anomaly"));
    }

    #[test]
    fn zscore_on_constant_column_flags_nothing() {
        let frame = series("2023-01-01", "v", &[5.0, 5.0, 5.0, 5.0]);
        let out = detect_anomalies(&frame, &["v"], "zscore", 2.0).unwrap().frame;
        assert_eq!(int_col(&out, "v_anomaly"), vec![Some(0); 4]);
    }

    #[test]
    fn constant_column_with_inexact_values_flags_nothing() {
        for value in [0.1, 40.3] {
            let frame = series("2023-01-01", "v", &[value; 3]);
            for method in [AnomalyMethod::Zscore, AnomalyMethod::Iqr] {
                let out = detect_anomalies_with(&frame, &["v"], method, 0.5).frame;
                assert_eq!(int_col(&out, "v_anomaly"), vec![Some(0); 3], "{value} {method}");
                assert_eq!(int_col(&out, TOTAL_ANOMALIES), vec![Some(0); 3]);
            }
        }
    }

    #[test]
    fn zscore_flags_far_values() {
        let mut values = vec![10.0; 20];
        values.push(100.0);
        let frame = series("2023-01-01", "v", &values);
        let out = detect_anomalies_with(&frame, &["v"], AnomalyMethod::Zscore, 3.0).frame;
        let flags = int_col(&out, "v_anomaly");
        assert_eq!(flags.iter().flatten().sum::<i64>(), 1);
        assert_eq!(flags[20], Some(1));
    }

    #[test]
    fn unknown_method_is_an_error() {
        let frame = series("2023-01-01", "v", &[1.0]);
        let err = detect_anomalies(&frame, &["v"], "isolation_forest", 1.5).unwrap_err();
        assert_eq!(err, AnalysisError::UnsupportedMethod("isolation_forest".to_string()));
    }

    #[test]
    fn nulls_are_never_flagged() {
        let frame = TimeSeriesFrame::from_columns([(
            "v",
            Column::Float(vec![Some(1.0), Some(2.0), None, Some(3.0), Some(4.0), Some(1000.0)]),
        )])
        .unwrap();
        let out = detect_anomalies_with(&frame, &["v"], AnomalyMethod::Iqr, 1.5).frame;
        let flags = int_col(&out, "v_anomaly");
        assert_eq!(flags[2], Some(0));
        assert_eq!(flags[5], Some(1));
    }

    #[test]
    fn total_is_recomputed_across_calls() {
        let mut frame = series("2023-01-01", "a", &[1.0, 2.0, 3.0, 4.0, 5.0, 100.0]);
        frame.put("b", floats(&[-100.0, 2.0, 3.0, 4.0, 5.0, 100.0]));

        let first = detect_anomalies_with(&frame, &["a"], AnomalyMethod::Iqr, 1.5).frame;
        assert_eq!(int_col(&first, TOTAL_ANOMALIES)[5], Some(1));

        let second = detect_anomalies_with(&first, &["b"], AnomalyMethod::Iqr, 1.5).frame;
        let total = int_col(&second, TOTAL_ANOMALIES);
        assert_eq!(total[0], Some(1));
        assert_eq!(total[5], Some(2));
    }

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("IQR".parse::<AnomalyMethod>(), Ok(AnomalyMethod::Iqr));
        assert_eq!(AnomalyMethod::Zscore.to_string(), "zscore");
    }
}
