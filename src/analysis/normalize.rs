//! Rescaling for cross-keyword comparison.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Transformed, Warning, numeric_columns, warn};
use crate::frame::{Column, TimeSeriesFrame};
use crate::math::{Quartiles, is_constant, mean, present, sample_std};

pub const NORMALIZED_SUFFIX: &str = "_normalized";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizeMethod {
    /// `(v − min) / (max − min)`
    #[default]
    Minmax,
    /// `(v − mean) / std`
    Zscore,
    /// `(v − median) / IQR`
    Robust,
}

impl NormalizeMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            NormalizeMethod::Minmax => "minmax",
            NormalizeMethod::Zscore => "zscore",
            NormalizeMethod::Robust => "robust",
        }
    }
}

impl fmt::Display for NormalizeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NormalizeMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minmax" => Ok(NormalizeMethod::Minmax),
            "zscore" => Ok(NormalizeMethod::Zscore),
            "robust" => Ok(NormalizeMethod::Robust),
            other => Err(other.to_string()),
        }
    }
}

/// Normalize by method name. Unknown names add nothing and produce a warning.
pub fn normalize<S: AsRef<str>>(frame: &TimeSeriesFrame, columns: &[S], method: &str) -> Transformed {
    match method.parse::<NormalizeMethod>() {
        Ok(method) => normalize_with(frame, columns, method),
        Err(_) => {
            let mut warnings = Vec::new();
            warn(
                &mut warnings,
                "normalize",
                Warning::UnknownNormalizeMethod {
                    method: method.to_string(),
                },
            );
            Transformed {
                frame: frame.clone(),
                warnings,
            }
        }
    }
}

/// Add `{col}_normalized` for each present column; originals are kept.
pub fn normalize_with<S: AsRef<str>>(frame: &TimeSeriesFrame, columns: &[S], method: NormalizeMethod) -> Transformed {
    let mut warnings = Vec::new();
    let columns = numeric_columns(frame, columns, |name| {
        warn(
            &mut warnings,
            "normalize",
            Warning::SkippedColumn {
                column: name.to_string(),
            },
        )
    });
    info!(%method, columns = columns.len(), "normalizing");

    let mut out = frame.clone();
    for name in &columns {
        let Some(values) = frame.numeric(name) else {
            continue;
        };
        let scaled = rescale(&values, method);
        debug!(column = %name, "normalized");
        out.put(format!("{name}{NORMALIZED_SUFFIX}"), Column::Float(scaled));
    }
    Transformed { frame: out, warnings }
}

fn rescale(values: &[Option<f64>], method: NormalizeMethod) -> Vec<Option<f64>> {
    let sample = present(values);
    let zeros = || -> Vec<Option<f64>> { values.iter().map(|v| v.map(|_| 0.0)).collect() };
    if is_constant(&sample) {
        return zeros();
    }
    let (center, spread) = match method {
        NormalizeMethod::Minmax => {
            let lo = sample.iter().copied().reduce(f64::min);
            let hi = sample.iter().copied().reduce(f64::max);
            (lo, lo.zip(hi).map(|(lo, hi)| hi - lo))
        }
        NormalizeMethod::Zscore => (mean(&sample), sample_std(&sample)),
        NormalizeMethod::Robust => {
            let q = Quartiles::of(&sample);
            (q.map(|q| q.median), q.map(|q| q.iqr()))
        }
    };

    match (center, spread) {
        (Some(c), Some(s)) if s > 0.0 && s.is_finite() => values
            .iter()
            .map(|v| v.filter(|x| x.is_finite()).map(|x| (x - c) / s))
            .collect(),
        _ => zeros(),
    }
}
