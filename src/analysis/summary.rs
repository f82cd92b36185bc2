//! Descriptive statistics per value column.

use serde::Serialize;
use tracing::debug;

use crate::frame::{Column, PeriodPart, TimeSeriesFrame};
use crate::math::{
    Quartiles, kurtosis, mean, median_abs_deviation, present, sample_std, sample_variance, skewness,
};

/// Statistics of one column's non-null values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub column: String,
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    #[serde(rename = "25%")]
    pub q25: Option<f64>,
    #[serde(rename = "50%")]
    pub median: Option<f64>,
    #[serde(rename = "75%")]
    pub q75: Option<f64>,
    pub max: Option<f64>,
    pub variance: Option<f64>,
    pub skewness: Option<f64>,
    pub kurtosis: Option<f64>,
    pub median_abs_deviation: Option<f64>,
}

impl ColumnSummary {
    pub fn of(column: &str, values: &[Option<f64>]) -> Self {
        let sample = present(values);
        let q = Quartiles::of(&sample);
        Self {
            column: column.to_string(),
            count: sample.len(),
            mean: mean(&sample),
            std: sample_std(&sample),
            min: sample.iter().copied().reduce(f64::min),
            q25: q.map(|q| q.q1),
            median: q.map(|q| q.median),
            q75: q.map(|q| q.q3),
            max: sample.iter().copied().reduce(f64::max),
            variance: sample_variance(&sample),
            skewness: skewness(&sample),
            kurtosis: kurtosis(&sample),
            median_abs_deviation: median_abs_deviation(&sample),
        }
    }

    /// Statistic names in output order.
    pub const FIELDS: [&'static str; 12] = [
        "mean",
        "std",
        "min",
        "25%",
        "50%",
        "75%",
        "max",
        "variance",
        "skewness",
        "kurtosis",
        "median_abs_deviation",
        "count",
    ];

    fn values(&self) -> [Option<f64>; 12] {
        [
            self.mean,
            self.std,
            self.min,
            self.q25,
            self.median,
            self.q75,
            self.max,
            self.variance,
            self.skewness,
            self.kurtosis,
            self.median_abs_deviation,
            Some(self.count as f64),
        ]
    }
}

/// Summaries for `columns`, or for every value column when `columns` is empty.
///
/// Value columns are numeric and not period parts. Absent names are skipped.
pub fn summarize<S: AsRef<str>>(frame: &TimeSeriesFrame, columns: &[S]) -> Vec<ColumnSummary> {
    let names: Vec<String> = if columns.is_empty() {
        value_column_names(frame)
    } else {
        columns.iter().map(|c| c.as_ref().to_string()).collect()
    };
    names
        .iter()
        .filter_map(|name| {
            let values = frame.numeric(name)?;
            debug!(column = %name, "summarizing");
            Some(ColumnSummary::of(name, &values))
        })
        .collect()
}

/// One row per summarized column; a `column` text column plus one float column per statistic.
pub fn summary_frame(summaries: &[ColumnSummary]) -> TimeSeriesFrame {
    let mut out = TimeSeriesFrame::new();
    out.put(
        "column",
        Column::Text(summaries.iter().map(|s| Some(s.column.clone())).collect()),
    );
    for (i, field) in ColumnSummary::FIELDS.iter().enumerate() {
        let column = if *field == "count" {
            Column::Int(summaries.iter().map(|s| Some(s.count as i64)).collect())
        } else {
            Column::Float(summaries.iter().map(|s| s.values()[i]).collect())
        };
        out.put(*field, column);
    }
    out
}

/// Numeric columns that are not calendar parts.
pub fn value_column_names(frame: &TimeSeriesFrame) -> Vec<String> {
    frame
        .columns()
        .filter(|(name, col)| col.is_numeric() && !PeriodPart::is_period_column(name))
        .map(|(name, _)| name.to_string())
        .collect()
}
