//! Shared analysis pipeline used by every front-end command.
//!
//! The core workflow lives here so the CLI only deals with presentation:
//! collect daily + monthly -> rebase -> trends -> anomalies -> (aggregate)

use chrono::NaiveDateTime;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::analysis::{
    DAILY_SUFFIX, FrameFilter, NormalizeMethod, Transformed, Warning, aggregate, calculate_trends,
    detect_anomalies_with, filter_frame, normalize_with, rebase,
};
use crate::data::{Collector, TrendSource, ValidationError, monthly_periods, validate_batch_size};
use crate::domain::{AnalysisRequest, CompareOptions, DateRange, RelatedData, RequestMeta};
use crate::error::{AnalysisError, AppError};
use crate::frame::{PeriodPart, TimeSeriesFrame, month_start};
use crate::math::CorrelationMatrix;

/// Everything one analysis request produces.
#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    /// Rebased daily rows with trend and anomaly columns.
    pub frame: TimeSeriesFrame,
    /// Present when the request asked for aggregation.
    pub aggregated: Option<TimeSeriesFrame>,
    /// `{kw}_daily` columns the indicators were computed over.
    pub value_columns: Vec<String>,
    pub warnings: Vec<Warning>,
    pub meta: Option<RequestMeta>,
    /// Related queries and topics, when the request asked for them.
    pub related: Option<RelatedData>,
}

/// Run the core transforms over already-collected frames.
///
/// Only rebase preconditions are hard errors; everything else lands in
/// `warnings`.
pub fn run_analysis(
    request: &AnalysisRequest,
    daily: &TimeSeriesFrame,
    monthly: &TimeSeriesFrame,
) -> Result<AnalysisOutput, AnalysisError> {
    let mut warnings = Vec::new();
    let mut absorb = |t: Transformed| {
        warnings.extend(t.warnings);
        t.frame
    };

    let rebased = absorb(rebase(daily, monthly, &request.keywords)?);
    let value_columns: Vec<String> = request
        .keywords
        .iter()
        .map(|kw| format!("{kw}{DAILY_SUFFIX}"))
        .filter(|c| rebased.has_column(c))
        .collect();
    info!(rows = rebased.len(), ?value_columns, "rebased daily series");

    let trended = absorb(calculate_trends(&rebased, &value_columns, request.window));
    let flagged = absorb(detect_anomalies_with(
        &trended,
        &value_columns,
        request.anomaly_method,
        request.anomaly_threshold,
    ));

    let aggregated = request.aggregation.as_ref().map(|spec| {
        let grouped = with_group_parts(&flagged, &spec.group_by);
        absorb(aggregate(&grouped, &spec.group_by, &value_columns, spec.reducers.as_ref()))
    });

    Ok(AnalysisOutput {
        frame: flagged,
        aggregated,
        value_columns,
        warnings,
        meta: None,
        related: None,
    })
}

/// Derive period-part group keys (e.g. `month`) that rebasing dropped.
fn with_group_parts(frame: &TimeSeriesFrame, group_by: &[String]) -> TimeSeriesFrame {
    let parts: Vec<PeriodPart> = PeriodPart::ALL
        .into_iter()
        .filter(|p| group_by.iter().any(|g| g == p.column_name()) && !frame.has_column(p.column_name()))
        .collect();
    if parts.is_empty() {
        frame.clone()
    } else {
        frame.with_period_parts(&parts)
    }
}

/// Collect one month window per calendar month touched by the request range
/// (trimmed back to the range) plus the monthly baseline, then run the analysis.
pub fn collect_and_analyze<S: TrendSource>(
    collector: &Collector<S>,
    request: &AnalysisRequest,
    now: NaiveDateTime,
) -> Result<AnalysisOutput, AppError> {
    let range = request.range;
    let geo = Some(request.geo.as_str());
    let windows = monthly_periods(month_start(range.start), range.end);

    let collected = collector.collect_daily(&request.keywords, &windows, geo)?;
    let in_range = FrameFilter {
        start: Some(range.start),
        end: Some(range.end),
        ..FrameFilter::default()
    };
    let daily = filter_frame(&collected, &in_range).frame;
    if daily.is_empty() {
        return Err(AppError::new(
            4,
            format!("No daily data collected for {:?} over {range}.", request.keywords),
        ));
    }
    let mut monthly = collector.collect_monthly(&request.keywords, geo, month_start(range.start))?;
    // The daily rows already carry `geo`.
    monthly.drop_column("geo");
    if monthly.is_empty() {
        return Err(AppError::new(
            4,
            format!("No monthly data collected for {:?}.", request.keywords),
        ));
    }

    let mut output = run_analysis(request, &daily, &monthly)?;
    output.meta = Some(request.meta(now, collector.source().name()));
    if request.include_related {
        output.related = collect_related(collector, request);
    }
    info!(
        keywords = ?request.keywords,
        rows = output.frame.len(),
        warnings = output.warnings.len(),
        "analysis complete"
    );
    Ok(output)
}

/// Related lists over the request range (clamped to today). A failure here
/// is logged and leaves the analysis intact.
fn collect_related<S: TrendSource>(collector: &Collector<S>, request: &AnalysisRequest) -> Option<RelatedData> {
    let range = DateRange::new(request.range.start, request.range.end.min(collector.today()));
    match collector.collect_related_data(&request.keywords, &range.timeframe(), Some(request.geo.as_str())) {
        Ok(related) => Some(related),
        Err(err) => {
            warn!(keywords = ?request.keywords, error = %err, "related data not collected");
            None
        }
    }
}

/// Run independent requests in parallel; one result per request, in order.
pub fn run_batch<S: TrendSource>(
    collector: &Collector<S>,
    requests: &[AnalysisRequest],
    now: NaiveDateTime,
) -> Vec<Result<AnalysisOutput, AppError>> {
    info!(requests = requests.len(), "starting batch analysis");
    requests
        .par_iter()
        .map(|request| {
            collect_and_analyze(collector, request, now).inspect_err(|err| {
                warn!(keywords = ?request.keywords, error = %err, "request failed; batch continues");
            })
        })
        .collect()
}

/// Split a keyword list into provider-sized groups.
pub fn keyword_batches(keywords: &[String], batch_size: usize, max: usize) -> Result<Vec<Vec<String>>, ValidationError> {
    let size = validate_batch_size(batch_size, max)?;
    Ok(keywords.chunks(size).map(<[String]>::to_vec).collect())
}

/// Side-by-side keyword comparison.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub frame: TimeSeriesFrame,
    /// Present for two or more keyword columns.
    pub correlation: Option<CorrelationMatrix>,
    pub warnings: Vec<Warning>,
}

/// Optionally normalize keyword columns and correlate them.
///
/// Correlations use the raw keyword columns; rescaling does not change them.
pub fn compare_frame(frame: &TimeSeriesFrame, keywords: &[String], options: CompareOptions) -> Comparison {
    let (frame, warnings) = match options.normalize {
        Some(method) => {
            let t = normalize_with(frame, keywords, method);
            (t.frame, t.warnings)
        }
        None => (frame.clone(), Vec::new()),
    };

    let present: Vec<&String> = keywords
        .iter()
        .filter(|k| frame.column(k).is_some_and(|c| c.is_numeric()))
        .collect();
    let correlation = (present.len() > 1).then(|| {
        let columns: Vec<Vec<Option<f64>>> = present.iter().filter_map(|k| frame.numeric(k)).collect();
        CorrelationMatrix::pearson(present.iter().map(|k| k.to_string()).collect(), &columns)
    });

    Comparison {
        frame,
        correlation,
        warnings,
    }
}

/// Collect one joint query for `keywords` and compare them.
pub fn compare_keywords<S: TrendSource>(
    collector: &Collector<S>,
    keywords: &[String],
    timeframe: &str,
    geo: Option<&str>,
    options: CompareOptions,
) -> Result<Comparison, AppError> {
    info!(?keywords, %timeframe, normalize = ?options.normalize.map(NormalizeMethod::as_str), "comparing keywords");
    let frame = collector.collect_interest_over_time(keywords, timeframe, geo)?;
    if frame.is_empty() {
        return Err(AppError::new(4, format!("No data returned for {keywords:?} ({timeframe}).")));
    }
    Ok(compare_frame(&frame, keywords, options))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::analysis::{ReducerSpec, Reducer, Reducers, TOTAL_ANOMALIES};
    use crate::data::{RetryPolicy, SampleSource};
    use crate::domain::{AggregationSpec, DateRange};
    use crate::frame::testing::*;
    use crate::frame::{Column, MONTH};

    fn now() -> NaiveDateTime {
        date("2024-06-15").and_hms_opt(12, 0, 0).unwrap()
    }

    fn collector() -> Collector<SampleSource> {
        let today = date("2024-06-15");
        Collector::new(
            SampleSource::new(42).with_today(today),
            RetryPolicy::new(1, Duration::ZERO),
            "US",
        )
        .with_today(today)
    }

    fn request(keywords: &[&str]) -> AnalysisRequest {
        AnalysisRequest::new(
            keywords.iter().map(|s| s.to_string()).collect(),
            "US",
            DateRange::new(date("2024-01-01"), date("2024-03-31")),
        )
    }

    fn january() -> (TimeSeriesFrame, TimeSeriesFrame) {
        let daily = TimeSeriesFrame::from_columns([
            ("date", dates(&["2023-01-15", "2023-01-16", "2023-01-17"])),
            ("outback", floats(&[50.0, 100.0, 25.0])),
            ("year", ints(&[2023, 2023, 2023])),
            ("month", ints(&[1, 1, 1])),
        ])
        .unwrap();
        let monthly = TimeSeriesFrame::from_columns([
            ("date", dates(&["2023-01-01"])),
            ("outback_monthly", floats(&[80.0])),
            ("year", ints(&[2023])),
            ("month", ints(&[1])),
        ])
        .unwrap();
        (daily, monthly)
    }

    #[test]
    fn run_analysis_chains_every_stage() {
        let (daily, monthly) = january();
        let out = run_analysis(&request(&["outback"]), &daily, &monthly).unwrap();

        assert_eq!(out.value_columns, vec!["outback_daily"]);
        assert_eq!(float_col(&out.frame, "outback_daily"), vec![Some(40.0), Some(80.0), Some(20.0)]);
        assert!(out.frame.has_column("outback_daily_ma_7"));
        assert!(out.frame.has_column("outback_daily_anomaly"));
        assert!(out.frame.has_column(TOTAL_ANOMALIES));
        assert!(!out.frame.has_column("outback"));
        assert!(out.aggregated.is_none());
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn aggregation_derives_missing_period_keys() {
        let (daily, monthly) = january();
        let mut req = request(&["outback"]);
        let mut reducers = Reducers::new();
        reducers.insert("outback_daily".into(), ReducerSpec::One(Reducer::Mean));
        req.aggregation = Some(AggregationSpec {
            group_by: vec![MONTH.to_string()],
            reducers: Some(reducers),
        });

        let out = run_analysis(&req, &daily, &monthly).unwrap();
        let agg = out.aggregated.unwrap();
        assert_eq!(agg.len(), 1);
        assert_eq!(int_col(&agg, MONTH), vec![Some(1)]);
        assert_eq!(float_col(&agg, "outback_daily"), vec![Some(46.666666666666664)]);
        assert!(!out.frame.has_column(MONTH));
    }

    #[test]
    fn rebase_precondition_is_a_hard_error() {
        let (mut daily, monthly) = january();
        daily.drop_column("month");
        let err = run_analysis(&request(&["outback"]), &daily, &monthly).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingColumn { .. }));
    }

    #[test]
    fn collect_and_analyze_with_sample_source() {
        let out = collect_and_analyze(&collector(), &request(&["outback", "chilis"]), now()).unwrap();
        assert_eq!(out.frame.len(), 91);
        assert_eq!(out.value_columns, vec!["outback_daily", "chilis_daily"]);
        let meta = out.meta.unwrap();
        assert_eq!(meta.source, "sample");
        assert_eq!(meta.timeframe, "2024-01-01 2024-03-31");
        assert!(out.frame.has_column("geo"));
        assert!(!out.frame.has_column("geo_monthly"));
    }

    #[test]
    fn related_data_only_when_requested() {
        let plain = collect_and_analyze(&collector(), &request(&["outback"]), now()).unwrap();
        assert!(plain.related.is_none());

        let mut req = request(&["outback", "chilis"]);
        req.include_related = true;
        let out = collect_and_analyze(&collector(), &req, now()).unwrap();
        let related = out.related.unwrap();
        assert_eq!(related.queries.keys().collect::<Vec<_>>(), vec!["outback", "chilis"]);
        assert_eq!(related.topics.len(), 2);
        assert!(!related.is_empty());
    }

    #[test]
    fn partial_months_are_collected_then_trimmed_to_the_range() {
        let mut req = request(&["outback"]);
        req.range = DateRange::new(date("2024-01-15"), date("2024-02-10"));
        let out = collect_and_analyze(&collector(), &req, now()).unwrap();
        assert_eq!(out.frame.len(), 27);
        let dates = out.frame.dates().unwrap();
        assert_eq!(dates[0], Some(date("2024-01-15")));
        assert_eq!(dates[26], Some(date("2024-02-10")));
    }

    #[test]
    fn batch_continues_past_a_failed_request() {
        let requests = vec![request(&["outback"]), request(&["  "]), request(&["chilis"])];
        let results = run_batch(&collector(), &requests, now());
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert_eq!(results[1].as_ref().unwrap_err().exit_code(), 2);
        assert!(results[2].is_ok());
    }

    #[test]
    fn keyword_batches_respect_size() {
        let kws: Vec<String> = ["a", "b", "c", "d", "e", "f", "g"].iter().map(|s| s.to_string()).collect();
        let batches = keyword_batches(&kws, 3, 5).unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2], vec!["g".to_string()]);
        assert!(keyword_batches(&kws, 6, 5).is_err());
    }

    #[test]
    fn compare_normalizes_and_correlates() {
        let frame = TimeSeriesFrame::from_columns([
            ("date", dates(&["2024-01-01", "2024-01-02", "2024-01-03"])),
            ("a", floats(&[1.0, 2.0, 3.0])),
            ("b", floats(&[30.0, 20.0, 10.0])),
            ("geo", Column::Text(vec![Some("US".into()); 3])),
        ])
        .unwrap();
        let kws = vec!["a".to_string(), "b".to_string(), "missing".to_string()];
        let cmp = compare_frame(
            &frame,
            &kws,
            CompareOptions {
                normalize: Some(NormalizeMethod::Minmax),
            },
        );
        assert_eq!(float_col(&cmp.frame, "a_normalized"), vec![Some(0.0), Some(0.5), Some(1.0)]);
        let corr = cmp.correlation.unwrap();
        assert_eq!(corr.labels, vec!["a", "b"]);
        assert!((corr.get("a", "b").unwrap() + 1.0).abs() < 1e-12);
        assert_eq!(cmp.warnings.len(), 1);

        let single = compare_frame(&frame, &kws[..1], CompareOptions { normalize: None });
        assert!(single.correlation.is_none());
        assert!(!single.frame.has_column("a_normalized"));
    }
}
