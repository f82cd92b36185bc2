//! Period-part columns derived from `date`.

use chrono::{Datelike, NaiveDate};

use super::{Column, DATE, TimeSeriesFrame, year_of};

pub const YEAR: &str = "year";
pub const MONTH: &str = "month";
pub const DAY_OF_WEEK: &str = "day_of_week";
pub const QUARTER: &str = "quarter";
pub const DAY_OF_YEAR: &str = "day_of_year";

/// Calendar part that can be materialized as an integer column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodPart {
    Year,
    Month,
    /// Monday = 0 .. Sunday = 6.
    DayOfWeek,
    Quarter,
    DayOfYear,
}

impl PeriodPart {
    pub const ALL: [PeriodPart; 5] = [
        PeriodPart::Year,
        PeriodPart::Month,
        PeriodPart::DayOfWeek,
        PeriodPart::Quarter,
        PeriodPart::DayOfYear,
    ];

    pub fn column_name(self) -> &'static str {
        match self {
            PeriodPart::Year => YEAR,
            PeriodPart::Month => MONTH,
            PeriodPart::DayOfWeek => DAY_OF_WEEK,
            PeriodPart::Quarter => QUARTER,
            PeriodPart::DayOfYear => DAY_OF_YEAR,
        }
    }

    pub fn of(self, d: NaiveDate) -> i64 {
        match self {
            PeriodPart::Year => year_of(d),
            PeriodPart::Month => d.month() as i64,
            PeriodPart::DayOfWeek => d.weekday().num_days_from_monday() as i64,
            PeriodPart::Quarter => ((d.month() - 1) / 3 + 1) as i64,
            PeriodPart::DayOfYear => d.ordinal() as i64,
        }
    }

    /// True for the names of all period-part columns.
    pub fn is_period_column(name: &str) -> bool {
        PeriodPart::ALL.iter().any(|p| p.column_name() == name)
    }
}

impl TimeSeriesFrame {
    /// Add (or overwrite) the requested period-part columns from `date`.
    ///
    /// Frames without a `date` column are returned unchanged.
    pub fn with_period_parts(&self, parts: &[PeriodPart]) -> TimeSeriesFrame {
        let Some(dates) = self.dates() else {
            return self.clone();
        };
        let derived: Vec<(PeriodPart, Column)> = parts
            .iter()
            .map(|&part| {
                let values = dates.iter().map(|d| d.map(|d| part.of(d))).collect();
                (part, Column::Int(values))
            })
            .collect();

        let mut out = self.clone();
        for (part, column) in derived {
            out.put(part.column_name(), column);
        }
        out
    }
}

/// First day of the month containing `d`.
pub fn month_start(d: NaiveDate) -> NaiveDate {
    d.with_day(1).unwrap_or(d)
}

/// Last day of the month containing `d`.
pub fn month_end(d: NaiveDate) -> NaiveDate {
    let (y, m) = if d.month() == 12 {
        (d.year() + 1, 1)
    } else {
        (d.year(), d.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|next| next.pred_opt())
        .unwrap_or(d)
}
