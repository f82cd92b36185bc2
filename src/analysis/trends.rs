//! Rolling trend indicators.
//!
//! For each present value column `c` and window `w`, the output gains:
//!
//! | column                 | definition                                          |
//! |------------------------|-----------------------------------------------------|
//! | `c_ma_w`               | trailing mean, min 1 observation, 2dp               |
//! | `c_std_w`              | trailing sample std, min 2 observations, 2dp        |
//! | `c_pct_change`         | `(v[t] − v[t−1]) / v[t−1]`, 4dp                     |
//! | `c_growth_wd`          | `(v[t] / v[t−w] − 1) × 100`, 2dp                     |
//! | `c_volatility`         | `std / mean × 100` over the window, 2dp             |
//! | `c_trend_direction`    | sign of the change in the rounded moving average    |
//!
//! The moving average uses min-periods 1, so the first `w − 1` rows are an
//! average of fewer observations than the nominal window.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Transformed, Warning, numeric_columns, warn};
use crate::error::AnalysisError;
use crate::frame::{Column, TimeSeriesFrame};
use crate::math::{finite_or, mean, round_dp, sample_std};

/// Rolling window length in rows; always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct Window(usize);

impl Window {
    pub const DEFAULT: Window = Window(7);

    pub fn new(rows: usize) -> Result<Self, AnalysisError> {
        if rows == 0 {
            return Err(AnalysisError::InvalidWindow(rows));
        }
        Ok(Self(rows))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<usize> for Window {
    type Error = AnalysisError;

    fn try_from(rows: usize) -> Result<Self, Self::Error> {
        Window::new(rows)
    }
}

impl From<Window> for usize {
    fn from(w: Window) -> usize {
        w.0
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Add rolling indicators for every present column in `value_columns`.
///
/// Absent or non-numeric columns are skipped (with a warning). The output is
/// sorted by `date` and recomputing on the output yields identical values.
pub fn calculate_trends<S: AsRef<str>>(frame: &TimeSeriesFrame, value_columns: &[S], window: Window) -> Transformed {
    let mut warnings = Vec::new();
    let columns = numeric_columns(frame, value_columns, |name| {
        warn(
            &mut warnings,
            "trends",
            Warning::SkippedColumn {
                column: name.to_string(),
            },
        )
    });

    let mut out = frame.sort_by_date();
    let w = window.get();
    info!(columns = columns.len(), window = w, rows = out.len(), "calculating trends");

    for name in &columns {
        let Some(values) = out.numeric(name) else {
            continue;
        };
        let ind = Indicators::compute(&values, w);
        debug!(column = %name, "trend indicators computed");

        out.put(format!("{name}_ma_{w}"), Column::Float(ind.ma));
        out.put(format!("{name}_std_{w}"), Column::Float(ind.std));
        out.put(format!("{name}_pct_change"), Column::Float(ind.pct_change));
        out.put(format!("{name}_growth_{w}d"), Column::Float(ind.growth));
        out.put(format!("{name}_volatility"), Column::Float(ind.volatility));
        out.put(format!("{name}_trend_direction"), Column::Int(ind.direction));
    }

    Transformed { frame: out, warnings }
}

struct Indicators {
    ma: Vec<Option<f64>>,
    std: Vec<Option<f64>>,
    pct_change: Vec<Option<f64>>,
    growth: Vec<Option<f64>>,
    volatility: Vec<Option<f64>>,
    direction: Vec<Option<i64>>,
}

impl Indicators {
    fn compute(values: &[Option<f64>], w: usize) -> Self {
        let n = values.len();
        let mut ma = Vec::with_capacity(n);
        let mut std = Vec::with_capacity(n);
        let mut volatility = Vec::with_capacity(n);

        for t in 0..n {
            let start = (t + 1).saturating_sub(w);
            let window: Vec<f64> = values[start..=t].iter().flatten().copied().collect();
            let m = mean(&window);
            let s = sample_std(&window);
            ma.push(m.map(|m| round_dp(m, 2)));
            std.push(s.map(|s| round_dp(s, 2)));
            let vol = match (s, m) {
                (Some(s), Some(m)) if m != 0.0 => finite_or(s / m * 100.0, 0.0),
                _ => 0.0,
            };
            volatility.push(Some(round_dp(vol, 2)));
        }

        let pct_change = (0..n)
            .map(|t| {
                let ratio = match (t.checked_sub(1).and_then(|p| values[p]), values[t]) {
                    (Some(prev), Some(cur)) if prev != 0.0 => finite_or((cur - prev) / prev, 0.0),
                    _ => 0.0,
                };
                Some(round_dp(ratio, 4))
            })
            .collect();

        let growth = (0..n)
            .map(|t| {
                let g = match (t.checked_sub(w).and_then(|p| values[p]), values[t]) {
                    (Some(base), Some(cur)) if base != 0.0 => finite_or((cur / base - 1.0) * 100.0, 0.0),
                    _ => 0.0,
                };
                Some(round_dp(g, 2))
            })
            .collect();

        let direction = (0..n)
            .map(|t| {
                let d = match (t.checked_sub(1).and_then(|p| ma[p]), ma[t]) {
                    (Some(prev), Some(cur)) if cur > prev => 1,
                    (Some(prev), Some(cur)) if cur < prev => -1,
                    _ => 0,
                };
                Some(d)
            })
            .collect();

        Self {
            ma,
            std,
            pct_change,
            growth,
            volatility,
            direction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::DATE;
    use crate::frame::testing::*;

    fn w(n: usize) -> Window {
        Window::new(n).unwrap()
    }

    #[test]
    fn window_rejects_zero() {
        assert_eq!(Window::new(0), Err(AnalysisError::InvalidWindow(0)));
        assert_eq!(Window::default().get(), 7);
    }

    #[test]
    fn moving_average_is_never_null_for_non_null_input() {
        let frame = series("2023-01-01", "kw_daily", &[10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0]);
        let out = calculate_trends(&frame, &["kw_daily"], w(7)).frame;
        let ma = float_col(&out, "kw_daily_ma_7");
        assert!(ma.iter().all(Option::is_some));
        // Min-periods 1: the first row is just itself.
        assert_eq!(ma[0], Some(10.0));
        assert_eq!(ma[1], Some(15.0));
        assert_eq!(ma[6], Some(40.0));
        assert_eq!(ma[7], Some(50.0));
    }

    #[test]
    fn pct_change_first_row_is_zero() {
        let frame = series("2023-01-01", "kw", &[50.0, 75.0, 0.0, 10.0]);
        let out = calculate_trends(&frame, &["kw"], w(2)).frame;
        let pct = float_col(&out, "kw_pct_change");
        assert_eq!(pct[0], Some(0.0));
        assert_eq!(pct[1], Some(0.5));
        assert_eq!(pct[2], Some(-1.0));
        // Zero denominator maps to the 0 sentinel.
        assert_eq!(pct[3], Some(0.0));
    }

    #[test]
    fn growth_short_series_is_all_zero() {
        let frame = series("2023-01-01", "kw", &[1.0, 2.0, 3.0]);
        let out = calculate_trends(&frame, &["kw"], w(7)).frame;
        assert_eq!(float_col(&out, "kw_growth_7d"), vec![Some(0.0); 3]);
    }

    #[test]
    fn growth_compares_against_window_back() {
        let frame = series("2023-01-01", "kw", &[10.0, 20.0, 15.0]);
        let out = calculate_trends(&frame, &["kw"], w(2)).frame;
        assert_eq!(float_col(&out, "kw_growth_2d"), vec![Some(0.0), Some(0.0), Some(50.0)]);
    }

    #[test]
    fn std_needs_two_observations() {
        let frame = series("2023-01-01", "kw", &[2.0, 4.0, 4.0]);
        let out = calculate_trends(&frame, &["kw"], w(3)).frame;
        let std = float_col(&out, "kw_std_3");
        assert_eq!(std[0], None);
        assert_eq!(std[1], Some(1.41));
        assert_eq!(std[2], Some(1.15));
        let vol = float_col(&out, "kw_volatility");
        assert_eq!(vol[0], Some(0.0));
        // sqrt(2) / 3 * 100
        assert_eq!(vol[1], Some(47.14));
    }

    #[test]
    fn trend_direction_follows_rounded_ma() {
        let frame = series("2023-01-01", "kw", &[10.0, 20.0, 20.0, 0.0]);
        let out = calculate_trends(&frame, &["kw"], w(2)).frame;
        // MA: 10, 15, 20, 10
        assert_eq!(int_col(&out, "kw_trend_direction"), vec![Some(0), Some(1), Some(1), Some(-1)]);
    }

    #[test]
    fn sorts_by_date_and_leaves_input_untouched() {
        let frame = TimeSeriesFrame::from_columns([
            (DATE, dates(&["2023-01-02", "2023-01-01"])),
            ("kw", floats(&[20.0, 10.0])),
        ])
        .unwrap();
        let out = calculate_trends(&frame, &["kw"], w(2)).frame;
        assert_eq!(float_col(&out, "kw"), vec![Some(10.0), Some(20.0)]);
        assert_eq!(float_col(&out, "kw_pct_change"), vec![Some(0.0), Some(1.0)]);
        assert_eq!(frame.width(), 2);
    }

    #[test]
    fn recomputing_is_idempotent() {
        let frame = series("2023-01-01", "kw", &[3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0, 5.0]);
        let once = calculate_trends(&frame, &["kw"], w(3)).frame;
        let twice = calculate_trends(&once, &["kw"], w(3)).frame;
        assert_eq!(once, twice);
    }

    #[test]
    fn absent_columns_are_skipped_not_raised() {
        let frame = series("2023-01-01", "kw", &[1.0, 2.0]);
        let out = calculate_trends(&frame, &["kw", "missing"], w(2));
        assert!(out.frame.has_column("kw_ma_2"));
        assert!(!out.frame.has_column("missing_ma_2"));
        assert_eq!(
            out.warnings,
            vec![Warning::SkippedColumn {
                column: "missing".to_string()
            }]
        );
    }

    #[test]
    fn nulls_are_skipped_inside_windows() {
        let frame = TimeSeriesFrame::from_columns([
            (DATE, dates(&["2023-01-01", "2023-01-02", "2023-01-03"])),
            ("kw", Column::Float(vec![Some(10.0), None, Some(30.0)])),
        ])
        .unwrap();
        let out = calculate_trends(&frame, &["kw"], w(3)).frame;
        assert_eq!(float_col(&out, "kw_ma_3"), vec![Some(10.0), Some(10.0), Some(20.0)]);
        assert_eq!(float_col(&out, "kw_pct_change"), vec![Some(0.0), Some(0.0), Some(0.0)]);
    }
}
