//! Shared domain types.
//!
//! Requests are built by the CLI (plus config defaults) and handed to the
//! pipeline; `RequestMeta` travels with the results and is attached to exports
//! on demand rather than stored as frame columns.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use clap::ValueEnum;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::analysis::{AnomalyMethod, DEFAULT_ANOMALY_THRESHOLD, NormalizeMethod, Reducers, Window};

/// Output file format for exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

/// JSON export layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum JsonLayout {
    /// Array of row objects.
    #[default]
    Records,
    /// `{ metadata, columns, data }`.
    Structured,
}

/// Inclusive calendar range of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Provider timeframe string: `YYYY-MM-DD YYYY-MM-DD`.
    pub fn timeframe(&self) -> String {
        format!("{} {}", self.start.format("%Y-%m-%d"), self.end.format("%Y-%m-%d"))
    }

    pub fn contains(&self, d: NaiveDate) -> bool {
        d >= self.start && d <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.start, self.end)
    }
}

/// Optional group-by step at the end of an analysis.
#[derive(Debug, Clone)]
pub struct AggregationSpec {
    pub group_by: Vec<String>,
    /// `None` applies the default reducer set to every value column.
    pub reducers: Option<Reducers>,
}

/// One unit of work for the pipeline.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub keywords: Vec<String>,
    pub geo: String,
    pub range: DateRange,
    pub window: Window,
    pub anomaly_method: AnomalyMethod,
    pub anomaly_threshold: f64,
    pub aggregation: Option<AggregationSpec>,
    /// Also collect related queries and topics over the request range.
    pub include_related: bool,
}

impl AnalysisRequest {
    pub fn new(keywords: Vec<String>, geo: impl Into<String>, range: DateRange) -> Self {
        Self {
            keywords,
            geo: geo.into(),
            range,
            window: Window::DEFAULT,
            anomaly_method: AnomalyMethod::Iqr,
            anomaly_threshold: DEFAULT_ANOMALY_THRESHOLD,
            aggregation: None,
            include_related: false,
        }
    }

    pub fn meta(&self, requested_at: NaiveDateTime, source: &str) -> RequestMeta {
        RequestMeta {
            keywords: self.keywords.clone(),
            geo: self.geo.clone(),
            range: self.range,
            timeframe: self.range.timeframe(),
            requested_at,
            source: source.to_string(),
        }
    }
}

/// Provenance of a result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMeta {
    pub keywords: Vec<String>,
    pub geo: String,
    pub range: DateRange,
    pub timeframe: String,
    pub requested_at: NaiveDateTime,
    pub source: String,
}

impl RequestMeta {
    /// Flat `(name, value)` pairs for metadata columns.
    pub fn pairs(&self) -> Vec<(String, String)> {
        vec![
            ("keywords".to_string(), self.keywords.join(",")),
            ("geo".to_string(), self.geo.clone()),
            ("timeframe".to_string(), self.timeframe.clone()),
            ("source".to_string(), self.source.clone()),
        ]
    }
}

/// Which related-search list to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelatedKind {
    Queries,
    Topics,
}

impl RelatedKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RelatedKind::Queries => "queries",
            RelatedKind::Topics => "topics",
        }
    }
}

impl fmt::Display for RelatedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One related query or topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedItem {
    /// Query text, or the topic title.
    pub title: String,
    /// Topic type (e.g. "Restaurant company"); `None` for queries.
    pub category: Option<String>,
    /// Relative score 0–100 in `top`, growth percentage in `rising`.
    pub value: i64,
    /// Provider label, e.g. `+250%` or `Breakout`.
    pub label: String,
}

/// Top and rising lists for one keyword.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelatedLists {
    pub top: Vec<RelatedItem>,
    pub rising: Vec<RelatedItem>,
}

impl RelatedLists {
    pub fn is_empty(&self) -> bool {
        self.top.is_empty() && self.rising.is_empty()
    }
}

/// Related lists keyed by keyword, in request order.
pub type RelatedByKeyword = IndexMap<String, RelatedLists>;

/// Related queries and topics collected next to an analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelatedData {
    pub queries: RelatedByKeyword,
    pub topics: RelatedByKeyword,
}

impl RelatedData {
    pub fn is_empty(&self) -> bool {
        self.queries.values().all(RelatedLists::is_empty) && self.topics.values().all(RelatedLists::is_empty)
    }
}

/// Options for `compare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareOptions {
    /// Rescale keyword columns before correlating.
    pub normalize: Option<NormalizeMethod>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_range_timeframe_string() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        );
        assert_eq!(range.timeframe(), "2024-01-01 2024-01-31");
        assert!(range.contains(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()));
    }

    #[test]
    fn meta_pairs_join_keywords() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        );
        let req = AnalysisRequest::new(vec!["outback".into(), "chilis".into()], "US", range);
        let at = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let meta = req.meta(at, "sample");
        assert_eq!(meta.pairs()[0], ("keywords".to_string(), "outback,chilis".to_string()));
        assert_eq!(meta.timeframe, "2024-01-01 2024-03-31");
    }
}
