//! Provider abstraction and the retrying collector.
//!
//! A `TrendSource` answers one interest-over-time query. The `Collector`
//! wraps a source with validation, a retry policy, and the daily / monthly
//! collection recipes the rebaser expects:
//!
//! - daily: one request per calendar month, so each window is scaled 0–100 on its own
//! - monthly: one `all` request, scaled once across the whole history

use std::thread;
use std::time::Duration;

use chrono::{Datelike, Local, NaiveDate};
use tracing::{debug, error, info, warn};

use crate::analysis::MONTHLY_SUFFIX;
use crate::data::validate::{parse_range, validate_geo, validate_keywords, validate_timeframe};
use crate::domain::{RelatedByKeyword, RelatedData, RelatedKind, RelatedLists};
use crate::error::AppError;
use crate::frame::{Cell, DATE, PeriodPart, TimeSeriesFrame, month_end, month_start};

/// A provider of keyword interest series.
///
/// Implementations return a frame with a `date` column and one `Float`
/// column per keyword. An empty frame means "no data".
pub trait TrendSource: Send + Sync {
    /// Short label used in logs and result metadata.
    fn name(&self) -> &str;

    fn interest_over_time(&self, keywords: &[String], timeframe: &str, geo: &str) -> Result<TimeSeriesFrame, AppError>;

    /// Top and rising related queries or topics for a single keyword.
    fn related(&self, keyword: &str, kind: RelatedKind, timeframe: &str, geo: &str) -> Result<RelatedLists, AppError> {
        let _ = (keyword, timeframe, geo);
        Err(AppError::new(
            4,
            format!("Source '{}' does not provide related {kind}.", self.name()),
        ))
    }
}

impl<T: TrendSource + ?Sized> TrendSource for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn interest_over_time(&self, keywords: &[String], timeframe: &str, geo: &str) -> Result<TimeSeriesFrame, AppError> {
        (**self).interest_over_time(keywords, timeframe, geo)
    }

    fn related(&self, keyword: &str, kind: RelatedKind, timeframe: &str, geo: &str) -> Result<RelatedLists, AppError> {
        (**self).related(keyword, kind, timeframe, geo)
    }
}

/// Bounded retry with exponential back-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
        }
    }

    /// Wait before attempt `n` (0-based): none for the first, `base × 2^n` after.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            Duration::ZERO
        } else {
            self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1))
    }
}

pub struct Collector<S> {
    source: S,
    retry: RetryPolicy,
    default_geo: String,
    today: NaiveDate,
}

impl<S: TrendSource> Collector<S> {
    pub fn new(source: S, retry: RetryPolicy, default_geo: impl Into<String>) -> Self {
        Self {
            source,
            retry,
            default_geo: default_geo.into(),
            today: Local::now().date_naive(),
        }
    }

    /// Pin "today" (future-window skipping and timeframe validation).
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Validated, retried single query. Adds `geo` and `timeframe` columns.
    ///
    /// Empty responses are retried; if every attempt is empty the result is an
    /// empty frame. An error on the last attempt is returned (exit code 4).
    pub fn collect_interest_over_time<K: AsRef<str>>(
        &self,
        keywords: &[K],
        timeframe: &str,
        geo: Option<&str>,
    ) -> Result<TimeSeriesFrame, AppError> {
        let keywords = validate_keywords(keywords)?;
        let timeframe = validate_timeframe(timeframe, self.today)?;
        let geo = validate_geo(geo.unwrap_or(&self.default_geo))?;

        info!(source = self.source.name(), ?keywords, %timeframe, %geo, "collecting interest over time");
        let frame = self.with_retry(&keywords, &timeframe, &geo)?;
        if frame.is_empty() {
            return Ok(frame);
        }
        info!(records = frame.len(), "collected");
        Ok(frame
            .with_constant("geo", Cell::Text(geo))
            .with_constant("timeframe", Cell::Text(timeframe)))
    }

    fn with_retry(&self, keywords: &[String], timeframe: &str, geo: &str) -> Result<TimeSeriesFrame, AppError> {
        let attempts = self.retry.attempts.max(1);
        for attempt in 0..attempts {
            let wait = self.retry.delay_before(attempt);
            if !wait.is_zero() {
                debug!(attempt, ?wait, "backing off");
                thread::sleep(wait);
            }
            match self
                .source
                .interest_over_time(keywords, timeframe, geo)
                .and_then(|frame| require_dates(frame, self.source.name()))
            {
                Ok(frame) if !frame.is_empty() => return Ok(frame),
                Ok(_) => warn!(attempt = attempt + 1, "empty data returned"),
                Err(err) if attempt + 1 == attempts => {
                    error!(?keywords, error = %err, "all retry attempts failed");
                    return Err(AppError::new(
                        4,
                        format!("Failed to collect data after {attempts} attempts: {}", err.message()),
                    ));
                }
                Err(err) => warn!(attempt = attempt + 1, error = %err, "attempt failed"),
            }
        }
        Ok(TimeSeriesFrame::new())
    }

    fn retrying<T>(&self, what: &str, mut call: impl FnMut() -> Result<T, AppError>) -> Result<T, AppError> {
        let attempts = self.retry.attempts.max(1);
        let mut last = None;
        for attempt in 0..attempts {
            let wait = self.retry.delay_before(attempt);
            if !wait.is_zero() {
                debug!(attempt, ?wait, what, "backing off");
                thread::sleep(wait);
            }
            match call() {
                Ok(v) => return Ok(v),
                Err(err) => {
                    warn!(attempt = attempt + 1, what, error = %err, "attempt failed");
                    last = Some(err);
                }
            }
        }
        let reason = last.map(|e| e.message().to_string()).unwrap_or_default();
        Err(AppError::new(
            4,
            format!("Failed to collect {what} after {attempts} attempts: {reason}"),
        ))
    }

    /// Related queries or topics per keyword (one provider request each).
    ///
    /// Invalid input is an error. A keyword whose request keeps failing is
    /// logged and left out of the result.
    pub fn collect_related<K: AsRef<str>>(
        &self,
        keywords: &[K],
        kind: RelatedKind,
        timeframe: &str,
        geo: Option<&str>,
    ) -> Result<RelatedByKeyword, AppError> {
        let keywords = validate_keywords(keywords)?;
        let timeframe = validate_timeframe(timeframe, self.today)?;
        let geo = validate_geo(geo.unwrap_or(&self.default_geo))?;
        info!(?keywords, %kind, %timeframe, %geo, "collecting related {kind}");

        let mut out = RelatedByKeyword::new();
        for kw in &keywords {
            let what = format!("related {kind} for '{kw}'");
            match self.retrying(&what, || self.source.related(kw, kind, &timeframe, &geo)) {
                Ok(lists) => {
                    out.insert(kw.clone(), lists);
                }
                Err(err) => error!(keyword = %kw, %kind, error = %err, "related lookup skipped"),
            }
        }
        info!(keywords = out.len(), %kind, "collected related data");
        Ok(out)
    }

    pub fn collect_related_queries<K: AsRef<str>>(
        &self,
        keywords: &[K],
        timeframe: &str,
        geo: Option<&str>,
    ) -> Result<RelatedByKeyword, AppError> {
        self.collect_related(keywords, RelatedKind::Queries, timeframe, geo)
    }

    pub fn collect_related_topics<K: AsRef<str>>(
        &self,
        keywords: &[K],
        timeframe: &str,
        geo: Option<&str>,
    ) -> Result<RelatedByKeyword, AppError> {
        self.collect_related(keywords, RelatedKind::Topics, timeframe, geo)
    }

    /// Queries and topics together.
    pub fn collect_related_data<K: AsRef<str>>(
        &self,
        keywords: &[K],
        timeframe: &str,
        geo: Option<&str>,
    ) -> Result<RelatedData, AppError> {
        Ok(RelatedData {
            queries: self.collect_related_queries(keywords, timeframe, geo)?,
            topics: self.collect_related_topics(keywords, timeframe, geo)?,
        })
    }

    /// Collect one window per timeframe and concatenate.
    ///
    /// A window running past today is cut at today. Windows starting on or
    /// after today, malformed windows, and failed windows are logged and
    /// skipped. The result carries `year`, `month`, `day_of_week`.
    pub fn collect_daily<K: AsRef<str>>(
        &self,
        keywords: &[K],
        time_ranges: &[String],
        geo: Option<&str>,
    ) -> Result<TimeSeriesFrame, AppError> {
        let keywords = validate_keywords(keywords)?;
        info!(?keywords, windows = time_ranges.len(), "collecting daily data");

        let mut parts = Vec::new();
        for (i, range) in time_ranges.iter().enumerate() {
            debug!(window = i + 1, total = time_ranges.len(), %range, "processing time range");
            let Some((start, end)) = parse_range(range) else {
                warn!(%range, "invalid timerange format; skipped");
                continue;
            };
            if start >= self.today {
                info!(%range, "skipping future date range");
                continue;
            }
            let window = if end > self.today {
                let clamped = format!("{} {}", start.format("%Y-%m-%d"), self.today.format("%Y-%m-%d"));
                debug!(%range, %clamped, "window ends after today; clamped");
                clamped
            } else {
                range.clone()
            };
            match self.collect_interest_over_time(&keywords, &window, geo) {
                Ok(frame) if !frame.is_empty() => parts.push(frame),
                Ok(_) => {}
                Err(err) => error!(%range, error = %err, "failed to collect window; skipped"),
            }
        }

        if parts.is_empty() {
            return Ok(TimeSeriesFrame::new());
        }
        let combined = TimeSeriesFrame::concat(&parts).with_period_parts(&[
            PeriodPart::Month,
            PeriodPart::Year,
            PeriodPart::DayOfWeek,
        ]);
        info!(records = combined.len(), "combined daily data");
        Ok(combined)
    }

    /// Collect the `all` series, keep rows on or after `since`, and rename
    /// keyword columns to `{kw}_monthly`.
    pub fn collect_monthly<K: AsRef<str>>(
        &self,
        keywords: &[K],
        geo: Option<&str>,
        since: NaiveDate,
    ) -> Result<TimeSeriesFrame, AppError> {
        let keywords = validate_keywords(keywords)?;
        info!(?keywords, %since, "collecting monthly data");

        let frame = self.collect_interest_over_time(&keywords, "all", geo)?;
        if frame.is_empty() {
            return Ok(frame);
        }
        let keep: Vec<bool> = match frame.dates() {
            Some(dates) => dates.iter().map(|d| d.is_some_and(|d| d >= since)).collect(),
            None => vec![true; frame.len()],
        };
        let mut out = frame.filter_rows(&keep);
        out.drop_column("timeframe");
        for kw in &keywords {
            out.rename(kw, format!("{kw}{MONTHLY_SUFFIX}"));
        }
        let out = out.with_period_parts(&[PeriodPart::Month, PeriodPart::Year]);
        info!(records = out.len(), "collected monthly data");
        Ok(out)
    }
}

/// Month windows `first-day last-day` from `since`'s month through `until`'s month.
///
/// Windows start on the first of each month; the first window starts on `since`
/// itself only when `since` is a month start.
pub fn monthly_periods(since: NaiveDate, until: NaiveDate) -> Vec<String> {
    let mut out = Vec::new();
    let mut first = month_start(since);
    if first < since {
        first = match next_month(first) {
            Some(d) => d,
            None => return out,
        };
    }
    while first <= until {
        let last = month_end(first);
        out.push(format!("{} {}", first.format("%Y-%m-%d"), last.format("%Y-%m-%d")));
        first = match next_month(first) {
            Some(d) => d,
            None => break,
        };
    }
    out
}

fn next_month(d: NaiveDate) -> Option<NaiveDate> {
    let (y, m) = if d.month() == 12 {
        (d.year() + 1, 1)
    } else {
        (d.year(), d.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
}

/// Non-empty responses must carry a `date` column.
fn require_dates(frame: TimeSeriesFrame, source: &str) -> Result<TimeSeriesFrame, AppError> {
    if frame.is_empty() || frame.has_column(DATE) {
        Ok(frame)
    } else {
        Err(AppError::new(4, format!("{source} response has no `{DATE}` column")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::frame::testing::*;
    use crate::domain::RelatedItem;
    use crate::frame::{Column, MONTH, YEAR};

    /// Replays queued responses and records every query.
    struct Scripted {
        responses: Mutex<Vec<Result<TimeSeriesFrame, AppError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(mut responses: Vec<Result<TimeSeriesFrame, AppError>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl TrendSource for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn interest_over_time(&self, _: &[String], timeframe: &str, _: &str) -> Result<TimeSeriesFrame, AppError> {
            self.calls.lock().unwrap().push(timeframe.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(AppError::new(4, "script exhausted")))
        }
    }

    /// Serves related lists for `outback` only, failing once first.
    struct RelatedOnly {
        failures_left: Mutex<u32>,
        calls: Mutex<Vec<(String, RelatedKind)>>,
    }

    impl TrendSource for RelatedOnly {
        fn name(&self) -> &str {
            "related-only"
        }

        fn interest_over_time(&self, _: &[String], _: &str, _: &str) -> Result<TimeSeriesFrame, AppError> {
            Ok(TimeSeriesFrame::new())
        }

        fn related(&self, keyword: &str, kind: RelatedKind, _: &str, _: &str) -> Result<RelatedLists, AppError> {
            self.calls.lock().unwrap().push((keyword.to_string(), kind));
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(AppError::new(4, "HTTP 503"));
            }
            if keyword != "outback" {
                return Err(AppError::new(4, "no related data"));
            }
            Ok(RelatedLists {
                top: vec![RelatedItem {
                    title: format!("{keyword} {kind}"),
                    category: None,
                    value: 100,
                    label: "100".to_string(),
                }],
                rising: Vec::new(),
            })
        }
    }

    fn collector(responses: Vec<Result<TimeSeriesFrame, AppError>>) -> Collector<Scripted> {
        Collector::new(Scripted::new(responses), RetryPolicy::new(3, Duration::ZERO), "US")
            .with_today(date("2024-03-15"))
    }

    fn fail() -> Result<TimeSeriesFrame, AppError> {
        Err(AppError::new(4, "HTTP 429"))
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let p = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(p.delay_before(0), Duration::ZERO);
        assert_eq!(p.delay_before(1), Duration::from_millis(200));
        assert_eq!(p.delay_before(3), Duration::from_millis(800));
    }

    #[test]
    fn retries_until_success() {
        let c = collector(vec![fail(), fail(), Ok(series("2024-01-01", "kw", &[1.0, 2.0]))]);
        let frame = c.collect_interest_over_time(&["kw"], "2024-01-01 2024-01-31", None).unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(c.source().calls().len(), 3);
        assert_eq!(frame.column("geo"), Some(&Column::Text(vec![Some("US".into()); 2])));
    }

    #[test]
    fn exhausted_attempts_is_upstream_error() {
        let c = collector(vec![fail(), fail(), fail()]);
        let err = c.collect_interest_over_time(&["kw"], "today 3-m", None).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(err.message().contains("3 attempts"));
    }

    #[test]
    fn invalid_request_never_reaches_source() {
        let c = collector(vec![]);
        let err = c.collect_interest_over_time(&["kw"], "yesterday", None).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(c.source().calls().is_empty());
    }

    #[test]
    fn daily_skips_future_and_failed_windows() {
        let windows = monthly_periods(date("2024-01-01"), date("2024-05-01"));
        assert_eq!(windows.len(), 5);
        let c = collector(vec![
            Ok(series("2024-01-01", "kw", &[10.0, 20.0])),
            fail(),
            fail(),
            fail(),
            Ok(series("2024-03-01", "kw", &[30.0])),
        ]);
        // March is cut at "today"; April and May start after it.
        let frame = c.collect_daily(&["kw"], &windows, None).unwrap();
        assert_eq!(frame.len(), 3);
        assert_eq!(int_col(&frame, MONTH), vec![Some(1), Some(1), Some(3)]);
        assert_eq!(int_col(&frame, YEAR), vec![Some(2024); 3]);
        assert!(frame.has_column("day_of_week"));
        // February failed on every attempt.
        let calls = c.source().calls();
        assert_eq!(calls.len(), 5);
        assert_eq!(calls[4], "2024-03-01 2024-03-15");
    }

    #[test]
    fn monthly_filters_renames_and_adds_periods() {
        let raw = TimeSeriesFrame::from_columns([
            (DATE, dates(&["2020-12-01", "2021-01-01", "2021-02-01"])),
            ("kw", floats(&[50.0, 60.0, 70.0])),
        ])
        .unwrap();
        let c = collector(vec![Ok(raw)]);
        let frame = c.collect_monthly(&["kw"], Some("gb"), date("2021-01-01")).unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(float_col(&frame, "kw_monthly"), vec![Some(60.0), Some(70.0)]);
        assert!(!frame.has_column("kw"));
        assert!(!frame.has_column("timeframe"));
        assert_eq!(int_col(&frame, MONTH), vec![Some(1), Some(2)]);
        assert_eq!(frame.column("geo"), Some(&Column::Text(vec![Some("GB".into()); 2])));
        assert_eq!(c.source().calls(), vec!["all".to_string()]);
    }

    #[test]
    fn related_retries_then_skips_failing_keywords() {
        let source = RelatedOnly {
            failures_left: Mutex::new(1),
            calls: Mutex::new(Vec::new()),
        };
        let c = Collector::new(source, RetryPolicy::new(2, Duration::ZERO), "US").with_today(date("2024-03-15"));

        let related = c.collect_related_data(&["outback", "chilis"], "today 3-m", None).unwrap();
        assert_eq!(related.queries.keys().collect::<Vec<_>>(), vec!["outback"]);
        assert_eq!(related.queries["outback"].top[0].title, "outback queries");
        assert_eq!(related.topics["outback"].top[0].title, "outback topics");
        assert!(!related.topics.contains_key("chilis"));
        // outback queries: one failure + one success; chilis: two failures per kind.
        assert_eq!(c.source().calls.lock().unwrap().len(), 2 + 2 + 1 + 2);
    }

    #[test]
    fn related_defaults_to_unsupported_and_validates_first() {
        let c = collector(vec![]);
        let related = c.collect_related_queries(&["kw"], "today 3-m", None).unwrap();
        assert!(related.is_empty());
        let err = c.collect_related_topics(&["kw"], "tomorrow", None).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn monthly_period_windows() {
        assert_eq!(
            monthly_periods(date("2023-11-01"), date("2024-02-10")),
            vec![
                "2023-11-01 2023-11-30",
                "2023-12-01 2023-12-31",
                "2024-01-01 2024-01-31",
                "2024-02-01 2024-02-29",
            ]
        );
        assert_eq!(monthly_periods(date("2023-11-15"), date("2023-12-01")), vec!["2023-12-01 2023-12-31"]);
        assert!(monthly_periods(date("2024-03-01"), date("2024-02-01")).is_empty());
    }
}
