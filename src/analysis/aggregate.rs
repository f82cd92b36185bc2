//! Group-by reductions.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use tracing::{debug, info};

use super::{Transformed, Warning, numeric_columns, warn};
use crate::error::AnalysisError;
use crate::frame::{Cell, Column, TimeSeriesFrame};
use crate::math::{mean, median, present, sample_std, sample_variance};

/// A reduction over the non-null values of one group.
#[derive(Debug, Clone)]
pub enum Reducer {
    Mean,
    Sum,
    Min,
    Max,
    /// Sample standard deviation (n − 1).
    Std,
    /// Sample variance (n − 1).
    Var,
    Median,
    Count,
    First,
    Last,
    /// Any deterministic reduction; `name` is used in output column names.
    Custom {
        name: String,
        func: fn(&[f64]) -> Option<f64>,
    },
}

impl Reducer {
    /// Applied when no reducer map is given.
    pub const DEFAULTS: [Reducer; 5] = [Reducer::Mean, Reducer::Sum, Reducer::Min, Reducer::Max, Reducer::Std];

    pub fn name(&self) -> &str {
        match self {
            Reducer::Mean => "mean",
            Reducer::Sum => "sum",
            Reducer::Min => "min",
            Reducer::Max => "max",
            Reducer::Std => "std",
            Reducer::Var => "var",
            Reducer::Median => "median",
            Reducer::Count => "count",
            Reducer::First => "first",
            Reducer::Last => "last",
            Reducer::Custom { name, .. } => name,
        }
    }

    fn reduce(&self, values: &[f64]) -> Option<f64> {
        match self {
            Reducer::Mean => mean(values),
            Reducer::Sum => Some(values.iter().sum()),
            Reducer::Min => values.iter().copied().reduce(f64::min),
            Reducer::Max => values.iter().copied().reduce(f64::max),
            Reducer::Std => sample_std(values),
            Reducer::Var => sample_variance(values),
            Reducer::Median => median(values),
            Reducer::Count => Some(values.len() as f64),
            Reducer::First => values.first().copied(),
            Reducer::Last => values.last().copied(),
            Reducer::Custom { func, .. } => func(values).filter(|v| v.is_finite()),
        }
    }

    fn column(&self, groups: &[Vec<f64>]) -> Column {
        match self {
            Reducer::Count => Column::Int(groups.iter().map(|g| Some(g.len() as i64)).collect()),
            _ => Column::Float(groups.iter().map(|g| self.reduce(g)).collect()),
        }
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Reducer {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Reducer::Mean,
            "sum" => Reducer::Sum,
            "min" => Reducer::Min,
            "max" => Reducer::Max,
            "std" => Reducer::Std,
            "var" => Reducer::Var,
            "median" => Reducer::Median,
            "count" => Reducer::Count,
            "first" => Reducer::First,
            "last" => Reducer::Last,
            _ => return Err(AnalysisError::UnsupportedMethod(s.to_string())),
        })
    }
}

/// Reducers configured for one value column.
#[derive(Debug, Clone)]
pub enum ReducerSpec {
    /// Output keeps the column name: `{col}`.
    One(Reducer),
    /// One output per reducer: `{col}_{reducer}`.
    Many(Vec<Reducer>),
}

impl ReducerSpec {
    fn outputs(&self, column: &str) -> Vec<(String, &Reducer)> {
        match self {
            ReducerSpec::One(r) => vec![(column.to_string(), r)],
            ReducerSpec::Many(rs) => rs.iter().map(|r| (format!("{column}_{}", r.name()), r)).collect(),
        }
    }
}

/// Per-column reducer configuration, in output order.
pub type Reducers = IndexMap<String, ReducerSpec>;

/// Reduce value columns per distinct combination of `group_by` values.
///
/// Rows with a null in any present key column are dropped. Output rows are
/// ordered by key ascending; key columns come first, then the reductions.
pub fn aggregate<S: AsRef<str>, T: AsRef<str>>(
    frame: &TimeSeriesFrame,
    group_by: &[S],
    value_columns: &[T],
    reducers: Option<&Reducers>,
) -> Transformed {
    let mut warnings = Vec::new();

    let mut keys: Vec<String> = Vec::new();
    for key in group_by {
        let key = key.as_ref();
        if keys.iter().any(|k| k == key) {
            continue;
        }
        if frame.has_column(key) {
            keys.push(key.to_string());
        } else {
            warn(
                &mut warnings,
                "aggregate",
                Warning::SkippedGroupKey {
                    column: key.to_string(),
                },
            );
        }
    }

    let present_values = numeric_columns(frame, value_columns, |name| {
        warn(
            &mut warnings,
            "aggregate",
            Warning::SkippedColumn {
                column: name.to_string(),
            },
        )
    });

    let defaults = ReducerSpec::Many(Reducer::DEFAULTS.to_vec());
    let mut plan: Vec<(&str, &ReducerSpec)> = Vec::new();
    for name in present_values.iter().filter(|v| !keys.contains(*v)) {
        match reducers {
            None => plan.push((name.as_str(), &defaults)),
            Some(map) => match map.get(name) {
                Some(spec) => plan.push((name.as_str(), spec)),
                None => warn(&mut warnings, "aggregate", Warning::NoReducer { column: name.clone() }),
            },
        }
    }

    if keys.is_empty() || plan.is_empty() {
        warn(&mut warnings, "aggregate", Warning::NoAggregationColumns);
        return Transformed {
            frame: frame.clone(),
            warnings,
        };
    }

    info!(keys = ?keys, columns = plan.len(), rows = frame.len(), "aggregating");

    let key_columns: Vec<&Column> = keys.iter().filter_map(|k| frame.column(k)).collect();
    let mut groups: BTreeMap<Vec<Cell>, Vec<usize>> = BTreeMap::new();
    let mut dropped = 0usize;
    for row in 0..frame.len() {
        let key: Option<Vec<Cell>> = key_columns.iter().map(|c| c.cell(row)).collect();
        match key {
            Some(key) => groups.entry(key).or_default().push(row),
            None => dropped += 1,
        }
    }
    debug!(groups = groups.len(), dropped, "rows grouped");

    let mut out = TimeSeriesFrame::new();
    for (i, (name, template)) in keys.iter().zip(&key_columns).enumerate() {
        let cells: Vec<Option<Cell>> = groups.keys().map(|k| Some(k[i].clone())).collect();
        out.put(name.clone(), Column::from_cells(template, &cells));
    }

    for (name, spec) in plan {
        let Some(values) = frame.numeric(name) else {
            continue;
        };
        let per_group: Vec<Vec<f64>> = groups
            .values()
            .map(|rows| {
                let cells: Vec<Option<f64>> = rows.iter().map(|&r| values[r]).collect();
                present(&cells)
            })
            .collect();
        for (output, reducer) in spec.outputs(name) {
            out.put(output, reducer.column(&per_group));
        }
    }

    Transformed { frame: out, warnings }
}
