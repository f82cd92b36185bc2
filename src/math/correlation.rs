//! Pearson correlation across keyword columns.

use nalgebra::DMatrix;
use serde::Serialize;

use super::stats::mean;

/// Symmetric correlation matrix with row/column labels.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    pub labels: Vec<String>,
    pub values: DMatrix<f64>,
}

#[derive(Debug, Clone, Serialize)]
struct CorrelationRow<'a> {
    column: &'a str,
    values: Vec<f64>,
}

impl CorrelationMatrix {
    /// Pairwise-complete Pearson correlations.
    ///
    /// Each pair only uses rows where both sides are non-null. Pairs with
    /// fewer than two shared rows or a constant side are reported as `0.0`.
    pub fn pearson(labels: Vec<String>, columns: &[Vec<Option<f64>>]) -> Self {
        let k = columns.len();
        let mut values = DMatrix::<f64>::zeros(k, k);
        for i in 0..k {
            for j in i..k {
                let r = pearson_pairwise(&columns[i], &columns[j]).unwrap_or(0.0);
                values[(i, j)] = r;
                values[(j, i)] = r;
            }
        }
        Self { labels, values }
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.labels.iter().position(|l| l == a)?;
        let j = self.labels.iter().position(|l| l == b)?;
        Some(self.values[(i, j)])
    }

    pub fn to_json(&self) -> serde_json::Value {
        let rows: Vec<CorrelationRow<'_>> = self
            .labels
            .iter()
            .enumerate()
            .map(|(i, label)| CorrelationRow {
                column: label,
                values: self.values.row(i).iter().copied().collect(),
            })
            .collect();
        serde_json::to_value(rows).unwrap_or(serde_json::Value::Null)
    }
}

fn pearson_pairwise(a: &[Option<f64>], b: &[Option<f64>]) -> Option<f64> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = a
        .iter()
        .zip(b)
        .filter_map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some((*x, *y)),
            _ => None,
        })
        .unzip();
    if xs.len() < 2 {
        return None;
    }
    let mx = mean(&xs)?;
    let my = mean(&ys)?;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (x, y) in xs.iter().zip(&ys) {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
        syy += (y - my).powi(2);
    }
    let denom = (sxx * syy).sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    Some((sxy / denom).clamp(-1.0, 1.0))
}
