//! Daily/monthly reconciliation.
//!
//! The provider scales every daily request window independently (0–100 within
//! the window), while the monthly series shares one scale across all history.
//! Multiplying each daily value by its month's baseline and dividing by 100
//! puts the daily series on the monthly (absolute) scale:
//!
//! ```text
//! {kw}_daily = round(kw * kw_monthly / 100, 2)
//! ```
//!
//! Output contract:
//! - one `{kw}_daily` column per keyword that has both sources
//! - the raw `{kw}` column is removed so the uncorrected values cannot be reused
//! - `year` / `month` join keys are removed; the frame is sorted by `date`

use tracing::{debug, info};

use super::{Transformed, Warning, warn};
use crate::error::AnalysisError;
use crate::frame::{Column, DATE, MONTH, TimeSeriesFrame, YEAR, left_join_period};
use crate::math::round_dp;

/// Suffix of monthly baseline columns.
pub const MONTHLY_SUFFIX: &str = "_monthly";
/// Suffix of corrected daily columns.
pub const DAILY_SUFFIX: &str = "_daily";

/// Rescale `daily` onto the absolute scale of `monthly` for each keyword.
///
/// Empty inputs yield an empty frame (with a warning). Missing `year` /
/// `month` columns on non-empty inputs are a hard error.
pub fn rebase<S: AsRef<str>>(
    daily: &TimeSeriesFrame,
    monthly: &TimeSeriesFrame,
    keywords: &[S],
) -> Result<Transformed, AnalysisError> {
    let mut warnings = Vec::new();

    info!(
        daily_rows = daily.len(),
        monthly_rows = monthly.len(),
        keywords = keywords.len(),
        "rebasing daily series on monthly baseline"
    );

    if daily.is_empty() || monthly.is_empty() {
        let frame = if daily.is_empty() { "daily" } else { "monthly" };
        warn(&mut warnings, "rebase", Warning::EmptyInput { frame });
        return Ok(Transformed {
            frame: TimeSeriesFrame::new(),
            warnings,
        });
    }

    // The monthly `date` is a month-start placeholder; the output keeps the daily dates.
    let mut baseline = monthly.clone();
    baseline.drop_column(DATE);

    let joined = left_join_period(daily, &baseline, "daily", "monthly", MONTHLY_SUFFIX)?;
    for &(year, month) in &joined.duplicate_periods {
        warn(&mut warnings, "rebase", Warning::DuplicatePeriod { year, month });
    }
    debug!(matched = joined.matched_rows, rows = daily.len(), "joined on (year, month)");

    let mut frame = joined.frame;
    let mut seen: Vec<&str> = Vec::new();
    for keyword in keywords {
        let keyword = keyword.as_ref();
        if seen.contains(&keyword) {
            continue;
        }
        seen.push(keyword);

        let monthly_col = format!("{keyword}{MONTHLY_SUFFIX}");
        let raw = daily.numeric(keyword);
        let base = frame.numeric(&monthly_col);

        let (Some(raw), Some(base)) = (raw, base) else {
            warn(
                &mut warnings,
                "rebase",
                Warning::MissingKeywordColumns {
                    keyword: keyword.to_string(),
                    daily: daily.has_column(keyword),
                    monthly: frame.has_column(&monthly_col),
                },
            );
            continue;
        };

        let corrected: Vec<Option<f64>> = raw
            .iter()
            .zip(&base)
            .map(|(d, m)| match (d, m) {
                (Some(d), Some(m)) => Some(round_dp(d * m / 100.0, 2)).filter(|v| v.is_finite()),
                _ => None,
            })
            .collect();

        frame.drop_column(keyword);
        frame.put(format!("{keyword}{DAILY_SUFFIX}"), Column::Float(corrected));
    }

    frame.drop_column(YEAR);
    frame.drop_column(MONTH);
    let frame = frame.sort_by_date();

    info!(rows = frame.len(), columns = frame.width(), "rebase complete");
    Ok(Transformed { frame, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::testing::*;

    fn daily(rows: &[(&str, f64)]) -> TimeSeriesFrame {
        let dates_: Vec<&str> = rows.iter().map(|r| r.0).collect();
        let values: Vec<f64> = rows.iter().map(|r| r.1).collect();
        TimeSeriesFrame::from_columns([(DATE, dates(&dates_)), ("outback", floats(&values))])
            .unwrap()
            .with_period_parts(&[crate::frame::PeriodPart::Year, crate::frame::PeriodPart::Month])
    }

    fn monthly(rows: &[(i64, i64, f64)]) -> TimeSeriesFrame {
        TimeSeriesFrame::from_columns([
            (
                DATE,
                Column::Date(
                    rows.iter()
                        .map(|r| chrono::NaiveDate::from_ymd_opt(r.0 as i32, r.1 as u32, 1))
                        .collect(),
                ),
            ),
            ("outback_monthly", floats(&rows.iter().map(|r| r.2).collect::<Vec<_>>())),
            (YEAR, ints(&rows.iter().map(|r| r.0).collect::<Vec<_>>())),
            (MONTH, ints(&rows.iter().map(|r| r.1).collect::<Vec<_>>())),
        ])
        .unwrap()
    }

    #[test]
    fn rescales_single_day_example() {
        let out = rebase(&daily(&[("2023-01-15", 50.0)]), &monthly(&[(2023, 1, 80.0)]), &["outback"]).unwrap();

        assert!(out.warnings.is_empty());
        assert_eq!(float_col(&out.frame, "outback_daily"), vec![Some(40.0)]);
        assert_eq!(float_col(&out.frame, "outback_monthly"), vec![Some(80.0)]);
        assert!(!out.frame.has_column("outback"));
        assert!(!out.frame.has_column(YEAR));
        assert!(!out.frame.has_column(MONTH));
        // The daily date survives, not the month-start placeholder.
        assert_eq!(out.frame.dates().unwrap(), &[Some(date("2023-01-15"))]);
    }

    #[test]
    fn no_overlap_yields_nulls_not_error() {
        let out = rebase(
            &daily(&[("2023-01-15", 50.0), ("2023-01-16", 60.0)]),
            &monthly(&[(2022, 6, 80.0)]),
            &["outback"],
        )
        .unwrap();
        assert_eq!(out.frame.len(), 2);
        assert_eq!(float_col(&out.frame, "outback_daily"), vec![None, None]);
    }

    #[test]
    fn output_sorted_by_date() {
        let out = rebase(
            &daily(&[("2023-02-02", 10.0), ("2023-01-31", 100.0)]),
            &monthly(&[(2023, 1, 50.0), (2023, 2, 20.0)]),
            &["outback"],
        )
        .unwrap();
        assert_eq!(float_col(&out.frame, "outback_daily"), vec![Some(50.0), Some(2.0)]);
    }

    #[test]
    fn missing_year_month_is_hard_error() {
        let mut d = daily(&[("2023-01-15", 50.0)]);
        d.drop_column(YEAR);
        let err = rebase(&d, &monthly(&[(2023, 1, 80.0)]), &["outback"]).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::MissingColumn {
                frame: "daily",
                column: YEAR.to_string()
            }
        );

        let mut m = monthly(&[(2023, 1, 80.0)]);
        m.drop_column(MONTH);
        assert!(matches!(
            rebase(&daily(&[("2023-01-15", 50.0)]), &m, &["outback"]),
            Err(AnalysisError::MissingColumn { frame: "monthly", .. })
        ));
    }

    #[test]
    fn empty_input_is_empty_output() {
        let out = rebase(&TimeSeriesFrame::new(), &monthly(&[(2023, 1, 80.0)]), &["outback"]).unwrap();
        assert!(out.frame.is_empty());
        assert_eq!(out.warnings, vec![Warning::EmptyInput { frame: "daily" }]);
    }

    #[test]
    fn missing_keyword_is_warned_and_left_untouched() {
        let out = rebase(
            &daily(&[("2023-01-15", 50.0)]),
            &monthly(&[(2023, 1, 80.0)]),
            &["outback", "chilis"],
        )
        .unwrap();
        assert_eq!(float_col(&out.frame, "outback_daily"), vec![Some(40.0)]);
        assert!(!out.frame.has_column("chilis_daily"));
        assert_eq!(
            out.warnings,
            vec![Warning::MissingKeywordColumns {
                keyword: "chilis".to_string(),
                daily: false,
                monthly: false
            }]
        );
    }

    #[test]
    fn raw_monthly_column_is_suffixed_by_join() {
        // Monthly frame still carries the keyword under its literal name.
        let mut m = monthly(&[(2023, 1, 80.0)]);
        m.rename("outback_monthly", "outback");
        let out = rebase(&daily(&[("2023-01-15", 50.0)]), &m, &["outback"]).unwrap();
        assert_eq!(float_col(&out.frame, "outback_daily"), vec![Some(40.0)]);
    }

    #[test]
    fn duplicate_monthly_period_first_wins() {
        let out = rebase(
            &daily(&[("2023-01-15", 50.0)]),
            &monthly(&[(2023, 1, 80.0), (2023, 1, 10.0)]),
            &["outback"],
        )
        .unwrap();
        assert_eq!(float_col(&out.frame, "outback_daily"), vec![Some(40.0)]);
        assert_eq!(out.warnings, vec![Warning::DuplicatePeriod { year: 2023, month: 1 }]);
    }

    #[test]
    fn exactly_one_daily_column_per_matched_keyword() {
        let d = daily(&[("2023-01-15", 50.0)]);
        let mut d2 = d.clone();
        d2.put("chilis", floats(&[10.0]));
        let mut m = monthly(&[(2023, 1, 80.0)]);
        m.put("chilis_monthly", floats(&[30.0]));

        let out = rebase(&d2, &m, &["outback", "chilis", "outback"]).unwrap();
        let daily_cols: Vec<&str> = out.frame.column_names().filter(|c| c.ends_with(DAILY_SUFFIX)).collect();
        assert_eq!(daily_cols, vec!["outback_daily", "chilis_daily"]);
        assert!(!out.frame.has_column("outback"));
        assert!(!out.frame.has_column("chilis"));
        assert_eq!(float_col(&out.frame, "chilis_daily"), vec![Some(3.0)]);
        // The caller's frame is untouched.
        assert!(d2.has_column("chilis"));
    }
}
