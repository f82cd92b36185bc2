//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and loads configuration
//! - initializes logging
//! - builds the data source and collector
//! - runs the pipeline and prints reports/plots
//! - writes exports

use std::path::Path;

use chrono::{Duration, Local, NaiveDateTime};
use clap::Parser;
use indexmap::IndexMap;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::analysis::{
    DAILY_SUFFIX, FrameFilter, ReducerSpec, filter_frame, summarize, value_column_names, with_metadata,
};
use crate::cli::{
    AnalyzeArgs, Cli, Command, CompareArgs, ExportArgs, InitConfigArgs, RebaseArgs, SourceArgs, SummaryArgs,
};
use crate::config::Config;
use crate::data::{Collector, RetryPolicy, SampleSource, SerpApiSource, TrendSource, validate_geo};
use crate::domain::{AggregationSpec, AnalysisRequest, CompareOptions, DateRange, ExportFormat, RequestMeta};
use crate::error::AppError;
use crate::frame::TimeSeriesFrame;
use crate::io::{ExportOptions, export_csv, export_json, export_related_json, export_summary_csv, load_frame_csv};
use crate::report::{
    flagged_anomalies, format_anomalies, format_comparison, format_preview, format_related, format_run_summary,
    format_summary_stats, format_warnings,
};

pub mod pipeline;

/// Entry point for the `trends` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.output_dir {
        config.export.output_dir = dir.clone();
    }
    init_tracing(&config, cli.verbose);

    match cli.command {
        Command::Analyze(args) => handle_analyze(args, &config),
        Command::Rebase(args) => handle_rebase(args, &config),
        Command::Compare(args) => handle_compare(args, &config),
        Command::Summary(args) => handle_summary(args, &config),
        Command::InitConfig(args) => handle_init_config(args),
    }
}

/// `RUST_LOG` wins; otherwise the configured level, or `debug` with `--verbose`.
fn init_tracing(config: &Config, verbose: bool) {
    let level = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn handle_analyze(args: AnalyzeArgs, config: &Config) -> Result<(), AppError> {
    let today = Local::now().date_naive();
    let until = args.until.unwrap_or(today);
    let since = args.since.unwrap_or(until - Duration::days(90));
    if since > until {
        return Err(AppError::new(2, format!("--since {since} is after --until {until}.")));
    }
    let geo = validate_geo(args.source.geo.as_deref().unwrap_or(&config.analyzer.default_geo))?;

    let batch_size = args.batch_size.unwrap_or(config.analyzer.max_batch_size);
    let groups = pipeline::keyword_batches(&args.keywords, batch_size, config.analyzer.max_batch_size)?;
    let requests: Vec<AnalysisRequest> = groups
        .into_iter()
        .map(|keywords| build_request(&args, config, keywords, &geo, DateRange::new(since, until)))
        .collect::<Result<_, _>>()?;

    with_source(&args.source, config, |collector| {
        let started = now();
        let results = pipeline::run_batch(collector, &requests, started);
        let mut failures = 0usize;

        for (request, result) in requests.iter().zip(results) {
            let output = match result {
                Ok(output) => output,
                Err(err) => {
                    failures += 1;
                    error!(keywords = ?request.keywords, error = %err, "analysis failed");
                    eprintln!("{:?}: {err}", request.keywords);
                    continue;
                }
            };

            println!("{}", format_run_summary(&output));
            println!("{}", format_anomalies(&flagged_anomalies(&output.frame, &output.value_columns, args.top)));
            let preview_cols: Vec<&str> = std::iter::once("date")
                .chain(output.value_columns.iter().map(String::as_str))
                .chain(std::iter::once("total_anomalies"))
                .collect();
            println!("{}", format_preview(&output.frame, &preview_cols, args.preview));

            if let Some(agg) = &output.aggregated {
                println!("Aggregated:\n{}", format_preview(agg, &[], args.preview));
            }
            if let Some(related) = &output.related {
                println!("{}", format_related(related, args.top));
            }

            if args.plot {
                for col in &output.value_columns {
                    let ma = format!("{col}_ma_{}", request.window.get());
                    println!(
                        "{}",
                        crate::plot::render_series_plot(&output.frame, col, Some(&ma), args.width, args.height)
                    );
                }
            }

            let stem = args
                .export
                .name
                .clone()
                .unwrap_or_else(|| format!("trends_{}", request.keywords.join("_").replace(' ', "-")));
            let rows = if config.export.include_metadata {
                with_metadata(&output.frame, started, &request_columns(request))
            } else {
                output.frame.clone()
            };
            export_frame(&rows, &stem, &args.export, config, output.meta.as_ref(), started)?;
            if let Some(agg) = &output.aggregated {
                export_frame(agg, &format!("{stem}_aggregated"), &args.export, config, output.meta.as_ref(), started)?;
            }
            if let Some(related) = output.related.as_ref().filter(|_| !args.export.no_export) {
                let options = ExportOptions::from_config(&config.export);
                let path = export_related_json(related, &format!("{stem}_related"), &options, started)?;
                println!("Wrote {}", path.display());
            }
        }

        if failures == requests.len() {
            return Err(AppError::new(4, "Every analysis request failed."));
        }
        info!(requests = requests.len(), failures, "analyze finished");
        Ok(())
    })
}

fn build_request(
    args: &AnalyzeArgs,
    config: &Config,
    keywords: Vec<String>,
    geo: &str,
    range: DateRange,
) -> Result<AnalysisRequest, AppError> {
    let mut request = AnalysisRequest::new(keywords, geo, range);
    request.window = crate::analysis::Window::new(args.window.unwrap_or(config.analyzer.window))?;
    request.anomaly_method = args.anomaly_method.unwrap_or(config.analyzer.anomaly_method);
    request.anomaly_threshold = args.threshold.unwrap_or(config.analyzer.anomaly_threshold);
    request.include_related = args.include_related;

    if !args.group_by.is_empty() {
        let reducers = (!args.reducers.is_empty()).then(|| {
            request
                .keywords
                .iter()
                .map(|kw| (format!("{kw}{DAILY_SUFFIX}"), ReducerSpec::Many(args.reducers.clone())))
                .collect::<IndexMap<_, _>>()
        });
        request.aggregation = Some(AggregationSpec {
            group_by: args.group_by.clone(),
            reducers,
        });
    }
    Ok(request)
}

/// Request fields stamped onto exported rows.
fn request_columns(request: &AnalysisRequest) -> Vec<(String, String)> {
    vec![
        ("keywords".to_string(), request.keywords.join(",")),
        ("date_range".to_string(), request.range.to_string()),
    ]
}

fn handle_rebase(args: RebaseArgs, config: &Config) -> Result<(), AppError> {
    let daily = load_frame_csv(&args.daily)?;
    let monthly = load_frame_csv(&args.monthly)?;
    for (path, ingested) in [(&args.daily, &daily), (&args.monthly, &monthly)] {
        for e in &ingested.row_errors {
            eprintln!("{}:{}: {}", path.display(), e.line, e.message);
        }
    }

    let rebased = crate::analysis::rebase(&daily.frame, &monthly.frame, &args.keywords)?;
    if !rebased.warnings.is_empty() {
        println!("{}", format_warnings(&rebased.warnings));
    }
    println!("{}", format_preview(&rebased.frame, &[], args.preview));

    let stem = args.export.name.clone().unwrap_or_else(|| "rebased".to_string());
    export_frame(&rebased.frame, &stem, &args.export, config, None, now())
}

fn handle_compare(args: CompareArgs, config: &Config) -> Result<(), AppError> {
    let timeframe = args
        .timeframe
        .clone()
        .unwrap_or_else(|| config.analyzer.default_timeframe.clone());
    let options = CompareOptions {
        normalize: args.normalize,
    };
    with_source(&args.source, config, |collector| {
        let keywords = crate::data::validate_keywords(&args.keywords)?;
        let cmp = pipeline::compare_keywords(collector, &keywords, &timeframe, args.source.geo.as_deref(), options)?;
        println!("{}", format_comparison(&cmp, &keywords));

        let stem = args
            .export
            .name
            .clone()
            .unwrap_or_else(|| format!("comparison_{}", keywords.join("_").replace(' ', "-")));
        export_frame(&cmp.frame, &stem, &args.export, config, None, now())?;
        if let Some(matrix) = &cmp.correlation {
            if !args.export.no_export {
                let options = ExportOptions::from_config(&config.export);
                options.create_dir()?;
                let path = options.prepare_path(&format!("{stem}_correlation"), "json", now());
                let text = serde_json::to_string_pretty(&matrix.to_json())
                    .map_err(|e| AppError::new(2, format!("Failed to encode correlation matrix: {e}")))?;
                std::fs::write(&path, text)
                    .map_err(|e| AppError::new(2, format!("Failed to write '{}': {e}", path.display())))?;
                info!(file = %path.display(), "exported correlation matrix");
            }
        }
        Ok(())
    })
}

fn handle_summary(args: SummaryArgs, config: &Config) -> Result<(), AppError> {
    let ingested = load_frame_csv(&args.input)?;
    let filter = FrameFilter {
        start: args.since,
        end: args.until,
        keywords: args.keywords.clone(),
        ..FrameFilter::default()
    };
    let frame = if filter.is_empty() {
        ingested.frame
    } else {
        let filtered = filter_frame(&ingested.frame, &filter);
        if !filtered.warnings.is_empty() {
            println!("{}", format_warnings(&filtered.warnings));
        }
        filtered.frame
    };
    let columns = if args.columns.is_empty() {
        value_column_names(&frame)
    } else {
        args.columns.clone()
    };
    let stats = summarize(&frame, &columns);
    if stats.is_empty() {
        return Err(AppError::new(3, "No numeric value columns to summarize."));
    }
    println!("{}", format_summary_stats(&stats));

    if args.export {
        let options = ExportOptions::from_config(&config.export);
        let stem = args.name.clone().unwrap_or_else(|| file_stem(&args.input));
        let subset = frame.select(&columns.iter().map(String::as_str).collect::<Vec<_>>());
        if let Some(path) = export_summary_csv(&subset, &stem, &options, now())? {
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

fn handle_init_config(args: InitConfigArgs) -> Result<(), AppError> {
    Config::template(args.template).save(&args.output, args.force)?;
    println!("Configuration template saved to {}", args.output.display());
    println!("Edit the file and pass it with --config.");
    Ok(())
}

/// Build the configured source and hand a collector to `f`.
fn with_source<T>(
    source: &SourceArgs,
    config: &Config,
    f: impl FnOnce(&Collector<Box<dyn TrendSource>>) -> Result<T, AppError>,
) -> Result<T, AppError> {
    let provider: Box<dyn TrendSource> = if source.sample {
        Box::new(SampleSource::new(source.seed))
    } else {
        Box::new(SerpApiSource::from_env(config.analyzer.timeout())?)
    };
    let retry = RetryPolicy::new(config.analyzer.retry_attempts, config.analyzer.base_delay());
    let collector = Collector::new(provider, retry, config.analyzer.default_geo.clone());
    f(&collector)
}

fn export_frame(
    frame: &TimeSeriesFrame,
    stem: &str,
    args: &ExportArgs,
    config: &Config,
    meta: Option<&RequestMeta>,
    now: NaiveDateTime,
) -> Result<(), AppError> {
    if args.no_export {
        return Ok(());
    }
    let options = ExportOptions::from_config(&config.export);
    let format = args.format.unwrap_or(config.export.format);
    let path = match format {
        ExportFormat::Csv => export_csv(frame, stem, &options, now)?,
        ExportFormat::Json => {
            let layout = args.json_layout.unwrap_or(config.export.json_layout);
            export_json(frame, stem, layout, meta, &options, now)?
        }
    };
    println!("Wrote {}", path.display());
    if args.summary {
        if let Some(path) = export_summary_csv(frame, stem, &options, now)? {
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "summary".to_string())
}
