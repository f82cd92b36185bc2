//! Left join of a daily frame onto a monthly frame on `(year, month)`.
//!
//! Join semantics:
//! - every left (daily) row is kept, in its original order
//! - right rows are matched by the integer pair `(year, month)`, never by date
//! - unmatched or null-keyed left rows get null cells for every right column
//! - right columns whose names collide with a left column get `suffix` appended
//! - duplicate right periods: the first row wins, duplicates are reported

use std::collections::HashMap;

use super::{MONTH, TimeSeriesFrame, YEAR};
use crate::error::AnalysisError;

/// Output of [`left_join_period`].
#[derive(Debug, Clone)]
pub struct PeriodJoin {
    pub frame: TimeSeriesFrame,
    /// Periods that appeared more than once in the right frame.
    pub duplicate_periods: Vec<(i64, i64)>,
    /// Number of left rows that found a right match.
    pub matched_rows: usize,
}

/// Join `right` onto `left` by `(year, month)`.
///
/// `left_name` / `right_name` label the frames in `MissingColumn` errors.
pub fn left_join_period(
    left: &TimeSeriesFrame,
    right: &TimeSeriesFrame,
    left_name: &'static str,
    right_name: &'static str,
    suffix: &str,
) -> Result<PeriodJoin, AnalysisError> {
    let left_keys = period_keys(left, left_name)?;
    let right_keys = period_keys(right, right_name)?;

    let mut index: HashMap<(i64, i64), usize> = HashMap::with_capacity(right.len());
    let mut duplicate_periods = Vec::new();
    for (row, key) in right_keys.iter().enumerate() {
        let Some(key) = key else { continue };
        if index.contains_key(key) {
            if !duplicate_periods.contains(key) {
                duplicate_periods.push(*key);
            }
            continue;
        }
        index.insert(*key, row);
    }

    let picks: Vec<Option<usize>> = left_keys
        .iter()
        .map(|key| key.and_then(|k| index.get(&k).copied()))
        .collect();
    let matched_rows = picks.iter().filter(|p| p.is_some()).count();

    let mut frame = left.clone();
    for (name, column) in right.columns() {
        if name == YEAR || name == MONTH {
            continue;
        }
        let out_name = if left.has_column(name) {
            format!("{name}{suffix}")
        } else {
            name.to_string()
        };
        frame.put(out_name, column.take(&picks));
    }

    Ok(PeriodJoin {
        frame,
        duplicate_periods,
        matched_rows,
    })
}

fn period_keys(frame: &TimeSeriesFrame, frame_name: &'static str) -> Result<Vec<Option<(i64, i64)>>, AnalysisError> {
    let years = required_integers(frame, YEAR, frame_name)?;
    let months = required_integers(frame, MONTH, frame_name)?;
    Ok(years
        .into_iter()
        .zip(months)
        .map(|(y, m)| Some((y?, m?)))
        .collect())
}

fn required_integers(
    frame: &TimeSeriesFrame,
    column: &str,
    frame_name: &'static str,
) -> Result<Vec<Option<i64>>, AnalysisError> {
    frame.integers(column).unwrap_or_else(|| {
        Err(AnalysisError::MissingColumn {
            frame: frame_name,
            column: column.to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::testing::*;
    use crate::frame::DATE;

    fn daily() -> TimeSeriesFrame {
        TimeSeriesFrame::from_columns([
            (DATE, dates(&["2023-01-15", "2023-02-03", "2023-03-09"])),
            ("kw", floats(&[50.0, 20.0, 10.0])),
            (YEAR, ints(&[2023, 2023, 2023])),
            (MONTH, ints(&[1, 2, 3])),
        ])
        .unwrap()
    }

    #[test]
    fn keeps_every_left_row_and_null_fills() {
        let monthly = TimeSeriesFrame::from_columns([
            ("kw_monthly", floats(&[80.0, 40.0])),
            (YEAR, ints(&[2023, 2023])),
            (MONTH, ints(&[1, 3])),
        ])
        .unwrap();

        let joined = left_join_period(&daily(), &monthly, "daily", "monthly", "_monthly").unwrap();
        assert_eq!(joined.frame.len(), 3);
        assert_eq!(joined.matched_rows, 2);
        assert_eq!(float_col(&joined.frame, "kw_monthly"), vec![Some(80.0), None, Some(40.0)]);
    }

    #[test]
    fn colliding_names_get_suffix() {
        let monthly = TimeSeriesFrame::from_columns([
            ("kw", floats(&[80.0])),
            (YEAR, ints(&[2023])),
            (MONTH, ints(&[1])),
        ])
        .unwrap();

        let joined = left_join_period(&daily(), &monthly, "daily", "monthly", "_monthly").unwrap();
        assert_eq!(float_col(&joined.frame, "kw"), vec![Some(50.0), Some(20.0), Some(10.0)]);
        assert_eq!(float_col(&joined.frame, "kw_monthly"), vec![Some(80.0), None, None]);
    }

    #[test]
    fn duplicate_periods_first_match_wins() {
        let monthly = TimeSeriesFrame::from_columns([
            ("kw_monthly", floats(&[80.0, 99.0])),
            (YEAR, ints(&[2023, 2023])),
            (MONTH, ints(&[1, 1])),
        ])
        .unwrap();

        let joined = left_join_period(&daily(), &monthly, "daily", "monthly", "_monthly").unwrap();
        assert_eq!(joined.duplicate_periods, vec![(2023, 1)]);
        assert_eq!(float_col(&joined.frame, "kw_monthly")[0], Some(80.0));
    }

    #[test]
    fn missing_key_is_an_error() {
        let monthly = TimeSeriesFrame::from_columns([("kw_monthly", floats(&[80.0])), (YEAR, ints(&[2023]))]).unwrap();
        let err = left_join_period(&daily(), &monthly, "daily", "monthly", "_monthly").unwrap_err();
        assert_eq!(
            err,
            AnalysisError::MissingColumn {
                frame: "monthly",
                column: MONTH.to_string()
            }
        );
    }
}
