//! Formatted terminal output.
//!
//! All formatting lives here so analysis code stays free of presentation and
//! output changes stay localized.

use crate::analysis::{ColumnSummary, Warning};
use crate::app::pipeline::{AnalysisOutput, Comparison};
use crate::domain::{RelatedByKeyword, RelatedData, RelatedItem, RelatedKind};
use crate::frame::{Column, TimeSeriesFrame};
use crate::math::CorrelationMatrix;
use crate::report::{AnomalyEvent, Highlight, highlights};

/// Run header, per-keyword highlights, and warnings.
pub fn format_run_summary(output: &AnalysisOutput) -> String {
    let mut out = String::new();

    out.push_str("=== trends - Keyword Interest Analysis ===\n");
    if let Some(meta) = &output.meta {
        out.push_str(&format!("Keywords: {}\n", meta.keywords.join(", ")));
        let geo = if meta.geo.is_empty() { "worldwide" } else { meta.geo.as_str() };
        out.push_str(&format!("Geo: {geo}\n"));
        out.push_str(&format!("Range: {}\n", meta.range));
        out.push_str(&format!("Source: {}\n", meta.source));
    }
    out.push_str(&format!(
        "Rows: {} | columns: {}\n",
        output.frame.len(),
        output.frame.width()
    ));

    out.push_str("\nRebased series:\n");
    out.push_str(&format_highlights(&highlights(&output.frame, &output.value_columns)));

    if !output.warnings.is_empty() {
        out.push('\n');
        out.push_str(&format_warnings(&output.warnings));
    }
    out
}

pub fn format_highlights(rows: &[Highlight]) -> String {
    let mut out = String::new();
    push_row(
        &mut out,
        format!(
            "{:<24} {:>6} {:>10} {:>10} {:>10} {:<12} {:>9}",
            "column", "n", "mean", "latest", "peak", "peak_date", "anomalies"
        ),
    );
    push_row(&mut out, rule(&[24, 6, 10, 10, 10, 12, 9]));
    for h in rows {
        let (peak_date, peak) = match h.peak {
            Some((d, v)) => (d.map(|d| d.to_string()).unwrap_or_default(), fmt_num(Some(v))),
            None => (String::new(), fmt_num(None)),
        };
        push_row(
            &mut out,
            format!(
                "{:<24} {:>6} {:>10} {:>10} {:>10} {:<12} {:>9}",
                truncate(&h.column, 24),
                h.observations,
                fmt_num(h.mean),
                fmt_num(h.latest),
                peak,
                peak_date,
                h.anomalies
            ),
        );
    }
    out
}

pub fn format_warnings(warnings: &[Warning]) -> String {
    let mut out = format!("Warnings ({}):\n", warnings.len());
    for w in warnings {
        out.push_str(&format!("- {w}\n"));
    }
    out
}

pub fn format_anomalies(events: &[AnomalyEvent]) -> String {
    if events.is_empty() {
        return "No anomalies flagged.\n".to_string();
    }
    let mut out = String::from("Flagged anomalies:\n");
    push_row(&mut out, format!("{:<12} {:<24} {:>10}", "date", "column", "value"));
    push_row(&mut out, rule(&[12, 24, 10]));
    for e in events {
        push_row(
            &mut out,
            format!(
                "{:<12} {:<24} {:>10}",
                e.date.map(|d| d.to_string()).unwrap_or_default(),
                truncate(&e.column, 24),
                fmt_num(Some(e.value))
            ),
        );
    }
    out
}

/// First `rows` rows of the named columns (all columns when `columns` is empty).
pub fn format_preview(frame: &TimeSeriesFrame, columns: &[&str], rows: usize) -> String {
    let selected: Vec<(&str, &Column)> = if columns.is_empty() {
        frame.columns().collect()
    } else {
        columns.iter().filter_map(|c| frame.column(c).map(|col| (*c, col))).collect()
    };
    let widths: Vec<usize> = selected.iter().map(|(name, _)| name.chars().count().clamp(10, 24)).collect();

    let mut out = String::new();
    let header: Vec<String> = selected
        .iter()
        .zip(&widths)
        .map(|((name, _), w)| format!("{:<w$}", truncate(name, *w)))
        .collect();
    push_row(&mut out, header.join(" "));
    push_row(&mut out, rule(&widths));
    for row in 0..rows.min(frame.len()) {
        let cells: Vec<String> = selected
            .iter()
            .zip(&widths)
            .map(|((_, col), w)| format!("{:<w$}", truncate(&fmt_cell(col, row), *w)))
            .collect();
        push_row(&mut out, cells.join(" "));
    }
    if frame.len() > rows {
        out.push_str(&format!("... {} more rows\n", frame.len() - rows));
    }
    out
}

pub fn format_correlation(matrix: &CorrelationMatrix) -> String {
    let mut out = String::from("Correlation (pairwise Pearson):\n");
    let mut header = format!("{:<16}", "");
    for label in &matrix.labels {
        header.push_str(&format!(" {:>10}", truncate(label, 10)));
    }
    push_row(&mut out, header);
    for (i, label) in matrix.labels.iter().enumerate() {
        let mut line = format!("{:<16}", truncate(label, 16));
        for j in 0..matrix.labels.len() {
            line.push_str(&format!(" {:>10.3}", matrix.values[(i, j)]));
        }
        push_row(&mut out, line);
    }
    out
}

pub fn format_comparison(cmp: &Comparison, keywords: &[String]) -> String {
    let mut out = String::from("=== trends - Keyword Comparison ===\n");
    out.push_str(&format!("Keywords: {}\n", keywords.join(", ")));
    out.push_str(&format!("Rows: {}\n\n", cmp.frame.len()));
    out.push_str(&format_highlights(&highlights(&cmp.frame, keywords)));
    if let Some(matrix) = &cmp.correlation {
        out.push('\n');
        out.push_str(&format_correlation(matrix));
    }
    if !cmp.warnings.is_empty() {
        out.push('\n');
        out.push_str(&format_warnings(&cmp.warnings));
    }
    out
}

/// One row per column, statistics across.
pub fn format_summary_stats(stats: &[ColumnSummary]) -> String {
    let mut out = String::new();
    let mut header = format!("{:<24} {:>6}", "column", "count");
    for field in ColumnSummary::FIELDS.iter().skip(1) {
        header.push_str(&format!(" {:>9}", truncate(field, 9)));
    }
    push_row(&mut out, header);
    for s in stats {
        let values = [
            s.mean,
            s.std,
            s.min,
            s.q25,
            s.median,
            s.q75,
            s.max,
            s.variance,
            s.skewness,
            s.kurtosis,
            s.median_abs_deviation,
        ];
        let mut line = format!("{:<24} {:>6}", truncate(&s.column, 24), s.count);
        for v in values {
            line.push_str(&format!(" {:>9}", fmt_num(v)));
        }
        push_row(&mut out, line);
    }
    out
}

/// Top and rising lists per keyword, at most `limit` entries each.
pub fn format_related(related: &RelatedData, limit: usize) -> String {
    let mut out = String::new();
    for (kind, by_keyword) in [(RelatedKind::Queries, &related.queries), (RelatedKind::Topics, &related.topics)] {
        out.push_str(&format!("Related {kind}:\n"));
        if by_keyword.is_empty() {
            out.push_str("  (none)\n");
            continue;
        }
        push_related_keywords(&mut out, by_keyword, limit);
    }
    out
}

fn push_related_keywords(out: &mut String, by_keyword: &RelatedByKeyword, limit: usize) {
    for (keyword, lists) in by_keyword {
        out.push_str(&format!("  {keyword}\n"));
        for (label, items) in [("top", &lists.top), ("rising", &lists.rising)] {
            if items.is_empty() {
                continue;
            }
            push_row(out, format!("    {label}:"));
            for item in items.iter().take(limit) {
                push_row(out, format!("      {:<36} {:>9}", related_title(item), item.label));
            }
        }
    }
}

fn related_title(item: &RelatedItem) -> String {
    match &item.category {
        Some(category) => truncate(&format!("{} ({category})", item.title), 36),
        None => truncate(&item.title, 36),
    }
}

fn push_row(out: &mut String, line: String) {
    out.push_str(line.trim_end());
    out.push('\n');
}

fn rule(widths: &[usize]) -> String {
    widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join(" ")
}

fn fmt_num(v: Option<f64>) -> String {
    match v {
        Some(v) if v.is_finite() => format!("{v:.2}"),
        _ => "-".to_string(),
    }
}

fn fmt_cell(col: &Column, row: usize) -> String {
    match col {
        Column::Date(v) => v[row].map(|d| d.to_string()),
        Column::Int(v) => v[row].map(|i| i.to_string()),
        Column::Float(v) => v[row].map(|f| format!("{f:.2}")),
        Column::Text(v) => v[row].clone(),
    }
    .unwrap_or_else(|| "-".to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::summarize;
    use crate::frame::testing::*;

    #[test]
    fn truncate_marks_cut() {
        assert_eq!(truncate("outback_daily", 24), "outback_daily");
        assert_eq!(truncate("outback_daily", 8), "outback.");
    }

    #[test]
    fn preview_limits_rows() {
        let frame = series("2024-01-01", "a", &[1.0, 2.5, 3.0]);
        let text = format_preview(&frame, &[], 2);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "date       a");
        assert_eq!(lines[2], "2024-01-01 1.00");
        assert_eq!(lines[3], "2024-01-02 2.50");
        assert_eq!(lines[4], "... 1 more rows");
    }

    #[test]
    fn warnings_are_listed() {
        let text = format_warnings(&[Warning::NoAggregationColumns]);
        assert_eq!(text, "Warnings (1):\n- no valid columns for aggregation\n");
    }

    #[test]
    fn summary_table_has_one_line_per_column() {
        let frame = series("2024-01-01", "a", &[1.0, 2.0, 3.0]);
        let text = format_summary_stats(&summarize(&frame, &["a"]));
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().nth(1).unwrap().starts_with("a "));
    }

    #[test]
    fn related_lists_respect_limit() {
        use crate::domain::RelatedLists;

        let item = |title: &str, label: &str| RelatedItem {
            title: title.to_string(),
            category: None,
            value: 0,
            label: label.to_string(),
        };
        let mut related = RelatedData::default();
        related.queries.insert(
            "outback".to_string(),
            RelatedLists {
                top: vec![item("outback menu", "100"), item("outback hours", "80")],
                rising: vec![item("outback near me", "Breakout")],
            },
        );
        let text = format_related(&related, 1);
        assert!(text.contains("outback menu"));
        assert!(!text.contains("outback hours"));
        assert!(text.contains("Breakout"));
        assert!(text.ends_with("Related topics:\n  (none)\n"));
    }

    #[test]
    fn correlation_table_layout() {
        let m = CorrelationMatrix::pearson(
            vec!["a".into(), "b".into()],
            &[vec![Some(1.0), Some(2.0), Some(3.0)], vec![Some(2.0), Some(4.0), Some(6.0)]],
        );
        let text = format_correlation(&m);
        assert!(text.lines().nth(2).unwrap().ends_with("1.000      1.000"));
    }
}
