//! SerpApi Google Trends integration (TIMESERIES and RELATED_* data types).

use std::time::Duration;

use chrono::{DateTime, NaiveDate};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::data::source::TrendSource;
use crate::domain::{RelatedItem, RelatedKind, RelatedLists};
use crate::error::AppError;
use crate::frame::{Column, DATE, TimeSeriesFrame};

const BASE_URL: &str = "https://serpapi.com/search.json";
const ENGINE: &str = "google_trends";
const DATA_TYPE: &str = "TIMESERIES";

pub struct SerpApiSource {
    client: Client,
    api_key: String,
}

impl SerpApiSource {
    pub fn from_env(timeout: Duration) -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        let api_key = std::env::var("SERPAPI_API_KEY")
            .map_err(|_| AppError::new(2, "Missing SERPAPI_API_KEY in environment (.env)."))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::new(2, format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, api_key })
    }
}

impl SerpApiSource {
    /// One search request; `error` in the body is an upstream failure.
    fn search<T: DeserializeOwned>(&self, data_type: &str, q: &str, timeframe: &str, geo: &str) -> Result<T, AppError> {
        let mut params: Vec<(&str, &str)> = vec![
            ("engine", ENGINE),
            ("data_type", data_type),
            ("q", q),
            ("date", timeframe),
            ("api_key", self.api_key.as_str()),
        ];
        if !geo.is_empty() {
            params.push(("geo", geo));
        }

        let resp = self
            .client
            .get(BASE_URL)
            .query(&params)
            .send()
            .map_err(|e| AppError::new(4, format!("SerpApi request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::new(
                4,
                format!("SerpApi request failed with status {}.", resp.status()),
            ));
        }

        let body: serde_json::Value = resp
            .json()
            .map_err(|e| AppError::new(4, format!("Failed to parse SerpApi response: {e}")))?;
        if let Some(err) = body.get("error").and_then(|e| e.as_str()) {
            return Err(AppError::new(4, format!("SerpApi error: {err}")));
        }
        serde_json::from_value(body).map_err(|e| AppError::new(4, format!("Failed to parse SerpApi response: {e}")))
    }
}

impl TrendSource for SerpApiSource {
    fn name(&self) -> &str {
        "serpapi"
    }

    fn interest_over_time(&self, keywords: &[String], timeframe: &str, geo: &str) -> Result<TimeSeriesFrame, AppError> {
        let body: SearchResponse = self.search(DATA_TYPE, &keywords.join(","), timeframe, geo)?;
        let timeline = body.interest_over_time.map(|i| i.timeline_data).unwrap_or_default();
        debug!(points = timeline.len(), "SerpApi timeline received");
        timeline_to_frame(&timeline, keywords)
    }

    fn related(&self, keyword: &str, kind: RelatedKind, timeframe: &str, geo: &str) -> Result<RelatedLists, AppError> {
        let lists = match kind {
            RelatedKind::Queries => {
                let body: RelatedQueriesResponse = self.search("RELATED_QUERIES", keyword, timeframe, geo)?;
                body.related_queries.map(RawLists::into_lists).unwrap_or_default()
            }
            RelatedKind::Topics => {
                let body: RelatedTopicsResponse = self.search("RELATED_TOPICS", keyword, timeframe, geo)?;
                body.related_topics.map(RawLists::into_lists).unwrap_or_default()
            }
        };
        debug!(keyword, %kind, top = lists.top.len(), rising = lists.rising.len(), "SerpApi related lists received");
        Ok(lists)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    interest_over_time: Option<InterestOverTime>,
}

#[derive(Debug, Deserialize)]
struct InterestOverTime {
    #[serde(default)]
    timeline_data: Vec<TimelinePoint>,
}

#[derive(Debug, Deserialize)]
struct TimelinePoint {
    timestamp: String,
    #[serde(default)]
    values: Vec<TimelineValue>,
}

#[derive(Debug, Deserialize)]
struct TimelineValue {
    query: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    extracted_value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RelatedQueriesResponse {
    #[serde(default)]
    related_queries: Option<RawLists<RawQuery>>,
}

#[derive(Debug, Deserialize)]
struct RelatedTopicsResponse {
    #[serde(default)]
    related_topics: Option<RawLists<RawTopic>>,
}

#[derive(Debug, Deserialize)]
struct RawLists<T> {
    #[serde(default = "Vec::new")]
    top: Vec<T>,
    #[serde(default = "Vec::new")]
    rising: Vec<T>,
}

impl<T: Into<RelatedItem>> RawLists<T> {
    fn into_lists(self) -> RelatedLists {
        RelatedLists {
            top: self.top.into_iter().map(Into::into).collect(),
            rising: self.rising.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawQuery {
    query: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    extracted_value: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawTopic {
    topic: TopicRef,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    extracted_value: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TopicRef {
    title: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl From<RawQuery> for RelatedItem {
    fn from(raw: RawQuery) -> Self {
        let label = raw.value.unwrap_or_default();
        RelatedItem {
            value: raw.extracted_value.unwrap_or_else(|| label_value(&label)),
            title: raw.query,
            category: None,
            label,
        }
    }
}

impl From<RawTopic> for RelatedItem {
    fn from(raw: RawTopic) -> Self {
        let label = raw.value.unwrap_or_default();
        RelatedItem {
            value: raw.extracted_value.unwrap_or_else(|| label_value(&label)),
            title: raw.topic.title,
            category: raw.topic.kind,
            label,
        }
    }
}

/// `+1,550%` → 1550. Unparseable labels such as `Breakout` are 0.
fn label_value(label: &str) -> i64 {
    let digits: String = label.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

/// One row per timeline point; keywords missing from a point are null.
fn timeline_to_frame(timeline: &[TimelinePoint], keywords: &[String]) -> Result<TimeSeriesFrame, AppError> {
    let mut dates = Vec::with_capacity(timeline.len());
    let mut columns: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(timeline.len()); keywords.len()];

    for point in timeline {
        dates.push(Some(parse_timestamp(&point.timestamp)?));
        for (kw, col) in keywords.iter().zip(columns.iter_mut()) {
            let v = point
                .values
                .iter()
                .find(|v| v.query.eq_ignore_ascii_case(kw))
                .and_then(|v| v.extracted_value.or_else(|| v.value.as_deref().and_then(parse_value)));
            col.push(v);
        }
    }

    let mut frame = TimeSeriesFrame::new();
    if timeline.is_empty() {
        return Ok(frame);
    }
    frame.insert(DATE, Column::Date(dates))?;
    for (kw, col) in keywords.iter().zip(columns) {
        frame.insert(kw.clone(), Column::Float(col))?;
    }
    Ok(frame)
}

fn parse_timestamp(raw: &str) -> Result<NaiveDate, AppError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.date_naive())
        .ok_or_else(|| AppError::new(4, format!("Invalid SerpApi timestamp '{raw}'.")))
}

/// Provider values are integers 0–100; `<1` is reported as 0.
fn parse_value(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed == "<1" {
        return Some(0.0);
    }
    let v = trimmed.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}
