//! Request parameter validation.
//!
//! Everything the provider would reject is caught here first, so a bad
//! keyword list or timeframe fails fast with exit code 2 instead of burning
//! retry attempts.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::ExportFormat;
use crate::error::AppError;

pub const MAX_KEYWORDS: usize = 5;
pub const MAX_KEYWORD_LEN: usize = 100;

/// Timeframes the provider accepts verbatim.
pub const PREDEFINED_TIMEFRAMES: [&str; 9] = [
    "now 1-H",
    "now 4-H",
    "now 1-d",
    "now 7-d",
    "today 1-m",
    "today 3-m",
    "today 12-m",
    "today 5-y",
    "all",
];

/// Earliest date with provider data.
pub fn earliest_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2004, 1, 1).unwrap_or(NaiveDate::MIN)
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("at least one keyword must be provided")]
    NoKeywords,
    #[error("maximum {MAX_KEYWORDS} keywords allowed per request, got {0}")]
    TooManyKeywords(usize),
    #[error("empty keyword not allowed")]
    EmptyKeyword,
    #[error("keyword too long (max {MAX_KEYWORD_LEN} chars): {0}...")]
    KeywordTooLong(String),
    #[error("invalid geo format: {0}. Expected format: 'US', 'US-CA', or 'US-CA-807'")]
    Geo(String),
    #[error("timeframe cannot be empty")]
    EmptyTimeframe,
    #[error("invalid timeframe format: {0}")]
    Timeframe(String),
    #[error("start date must be before end date: {0}")]
    ReversedRange(String),
    #[error("end date cannot be in the future: {0}")]
    FutureEnd(String),
    #[error("start date cannot be before 2004-01-01: {0}")]
    TooEarly(String),
    #[error("batch size must be between 1 and {max}, got {got}")]
    BatchSize { got: usize, max: usize },
    #[error("output path cannot be empty")]
    EmptyOutputPath,
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::new(2, format!("Invalid input: {err}"))
    }
}

/// Trim keywords and enforce count and length limits.
pub fn validate_keywords<S: AsRef<str>>(keywords: &[S]) -> Result<Vec<String>, ValidationError> {
    if keywords.is_empty() {
        return Err(ValidationError::NoKeywords);
    }
    if keywords.len() > MAX_KEYWORDS {
        return Err(ValidationError::TooManyKeywords(keywords.len()));
    }
    keywords
        .iter()
        .map(|k| {
            let k = k.as_ref().trim();
            if k.is_empty() {
                return Err(ValidationError::EmptyKeyword);
            }
            if k.chars().count() > MAX_KEYWORD_LEN {
                return Err(ValidationError::KeywordTooLong(k.chars().take(20).collect()));
            }
            Ok(k.to_string())
        })
        .collect()
}

/// Upper-case and check `""`, `CC`, `CC-SS` or `CC-SS-NNN`.
pub fn validate_geo(geo: &str) -> Result<String, ValidationError> {
    let geo = geo.trim().to_ascii_uppercase();
    if geo.is_empty() {
        return Ok(geo);
    }
    let parts: Vec<&str> = geo.split('-').collect();
    let alpha2 = |s: &str| s.len() == 2 && s.bytes().all(|b| b.is_ascii_uppercase());
    let ok = match parts.as_slice() {
        [country] => alpha2(*country),
        [country, region] => alpha2(*country) && alpha2(*region),
        [country, region, metro] => {
            alpha2(*country) && alpha2(*region) && metro.len() == 3 && metro.bytes().all(|b| b.is_ascii_digit())
        }
        _ => false,
    };
    if ok { Ok(geo) } else { Err(ValidationError::Geo(geo)) }
}

/// Accept a predefined timeframe or `YYYY-MM-DD YYYY-MM-DD` with
/// `2004-01-01 <= start < end <= today`.
pub fn validate_timeframe(timeframe: &str, today: NaiveDate) -> Result<String, ValidationError> {
    let tf = timeframe.trim();
    if tf.is_empty() {
        return Err(ValidationError::EmptyTimeframe);
    }
    if PREDEFINED_TIMEFRAMES.contains(&tf) {
        return Ok(tf.to_string());
    }
    let (start, end) = parse_range(tf).ok_or_else(|| ValidationError::Timeframe(tf.to_string()))?;
    if start >= end {
        return Err(ValidationError::ReversedRange(tf.to_string()));
    }
    if end > today {
        return Err(ValidationError::FutureEnd(tf.to_string()));
    }
    if start < earliest_date() {
        return Err(ValidationError::TooEarly(tf.to_string()));
    }
    Ok(tf.to_string())
}

/// Parse `YYYY-MM-DD YYYY-MM-DD` (strict widths).
pub fn parse_range(tf: &str) -> Option<(NaiveDate, NaiveDate)> {
    let (a, b) = tf.split_once(' ')?;
    let strict = |s: &str| {
        let b = s.as_bytes();
        s.len() == 10
            && b[4] == b'-'
            && b[7] == b'-'
            && b.iter().enumerate().all(|(i, c)| i == 4 || i == 7 || c.is_ascii_digit())
    };
    if !strict(a) || !strict(b) {
        return None;
    }
    let start = NaiveDate::parse_from_str(a, "%Y-%m-%d").ok()?;
    let end = NaiveDate::parse_from_str(b, "%Y-%m-%d").ok()?;
    Some((start, end))
}

pub fn validate_batch_size(batch_size: usize, max: usize) -> Result<usize, ValidationError> {
    if batch_size == 0 || batch_size > max {
        return Err(ValidationError::BatchSize { got: batch_size, max });
    }
    Ok(batch_size)
}

/// Append the format's extension when missing.
pub fn validate_output_path(path: &str, format: ExportFormat) -> Result<PathBuf, ValidationError> {
    let path = path.trim();
    if path.is_empty() {
        return Err(ValidationError::EmptyOutputPath);
    }
    let ext = format!(".{}", format.extension());
    if path.ends_with(&ext) {
        Ok(PathBuf::from(path))
    } else {
        Ok(PathBuf::from(format!("{path}{ext}")))
    }
}
