//! Deterministic synthetic interest series for offline runs.
//!
//! Each keyword gets a latent daily popularity curve (level, drift, yearly
//! seasonality, weekly cycle, Gaussian noise) derived from a hash of the
//! keyword and the seed. Queries then rescale that curve the way the provider
//! does: every response is scaled jointly across its keywords so the peak is
//! 100. Daily windows therefore lose their absolute level, and the `all`
//! series keeps it, which is exactly what rebasing reconciles.

use std::collections::hash_map::DefaultHasher;
use std::f64::consts::TAU;
use std::hash::{Hash, Hasher};

use chrono::{Datelike, Duration, Local, Months, NaiveDate};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::data::source::TrendSource;
use crate::data::validate::{earliest_date, parse_range};
use crate::domain::{RelatedItem, RelatedKind, RelatedLists};
use crate::error::AppError;
use crate::frame::{Column, DATE, TimeSeriesFrame, month_end, month_start};

/// Floor for latent interest so scaled values never go negative.
const MIN_LEVEL: f64 = 0.5;

const QUERY_PATTERNS: &[&str] = &[
    "{} near me",
    "{} menu",
    "{} hours",
    "best {}",
    "{} coupons",
    "{} reviews",
    "{} delivery",
    "{} prices",
];

const TOPIC_PATTERNS: &[(&str, &str)] = &[
    ("{}", "Company"),
    ("{} (brand)", "Brand"),
    ("Restaurant", "Topic"),
    ("Menu", "Topic"),
    ("Gift card", "Topic"),
    ("Coupon", "Topic"),
];

#[derive(Debug, Clone)]
pub struct SampleSource {
    seed: u64,
    today: NaiveDate,
}

impl SampleSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            today: Local::now().date_naive(),
        }
    }

    /// Pin "today" for relative timeframes.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    fn profile(&self, keyword: &str) -> Profile {
        let mut rng = StdRng::seed_from_u64(sample_seed(self.seed, keyword, None));
        Profile {
            level: rng.gen_range(20.0..80.0),
            drift_per_year: rng.gen_range(-4.0..6.0),
            seasonal_amp: rng.gen_range(0.05..0.35),
            seasonal_phase: rng.gen_range(0.0..TAU),
            weekly_amp: rng.gen_range(0.0..0.15),
            noise_sd: rng.gen_range(0.04..0.12),
        }
    }

    /// Unscaled interest for one keyword on one day.
    fn latent(&self, keyword: &str, profile: &Profile, noise: &Normal<f64>, d: NaiveDate) -> f64 {
        let years = (d - earliest_date()).num_days() as f64 / 365.25;
        let season = 1.0 + profile.seasonal_amp * (TAU * d.ordinal0() as f64 / 365.25 + profile.seasonal_phase).sin();
        let week = 1.0 + profile.weekly_amp * (TAU * d.weekday().num_days_from_monday() as f64 / 7.0).cos();

        let mut rng = StdRng::seed_from_u64(sample_seed(self.seed, keyword, Some(d)));
        let shock = 1.0 + profile.noise_sd * noise.sample(&mut rng);

        ((profile.level + profile.drift_per_year * years) * season * week * shock).max(MIN_LEVEL)
    }

    fn daily(&self, keywords: &[String], start: NaiveDate, end: NaiveDate) -> Result<TimeSeriesFrame, AppError> {
        let noise = noise()?;
        let dates: Vec<NaiveDate> = start.iter_days().take_while(|d| *d <= end).collect();
        let series: Vec<Vec<f64>> = keywords
            .iter()
            .map(|kw| {
                let profile = self.profile(kw);
                dates.iter().map(|d| self.latent(kw, &profile, &noise, *d)).collect()
            })
            .collect();
        scaled_frame(&dates, keywords, series)
    }

    fn monthly(&self, keywords: &[String], start: NaiveDate, end: NaiveDate) -> Result<TimeSeriesFrame, AppError> {
        let noise = noise()?;
        let mut months = Vec::new();
        let mut m = month_start(start);
        while m <= end {
            months.push(m);
            m = match m.checked_add_months(Months::new(1)) {
                Some(next) => next,
                None => break,
            };
        }
        // Month value: mean of the first, middle and last latent days.
        let series: Vec<Vec<f64>> = keywords
            .iter()
            .map(|kw| {
                let profile = self.profile(kw);
                months
                    .iter()
                    .map(|first| {
                        let days = [*first, *first + Duration::days(14), month_end(*first)];
                        days.iter().map(|d| self.latent(kw, &profile, &noise, *d)).sum::<f64>() / 3.0
                    })
                    .collect()
            })
            .collect();
        scaled_frame(&months, keywords, series)
    }
}

impl TrendSource for SampleSource {
    fn name(&self) -> &str {
        "sample"
    }

    fn interest_over_time(&self, keywords: &[String], timeframe: &str, _geo: &str) -> Result<TimeSeriesFrame, AppError> {
        match resolve(timeframe, self.today) {
            Some(Span::Daily(start, end)) => self.daily(keywords, start, end.min(self.today)),
            Some(Span::Monthly(start, end)) => self.monthly(keywords, start, end),
            None => Err(AppError::new(4, format!("Sample source cannot serve timeframe '{timeframe}'."))),
        }
    }

    fn related(&self, keyword: &str, kind: RelatedKind, timeframe: &str, _geo: &str) -> Result<RelatedLists, AppError> {
        if resolve(timeframe, self.today).is_none() {
            return Err(AppError::new(4, format!("Sample source cannot serve timeframe '{timeframe}'.")));
        }
        Ok(self.related_lists(keyword, kind, timeframe))
    }
}

impl SampleSource {
    /// Fixed candidate list per kind; scores depend on seed, keyword and timeframe.
    fn related_lists(&self, keyword: &str, kind: RelatedKind, timeframe: &str) -> RelatedLists {
        let candidates: Vec<(String, Option<String>)> = match kind {
            RelatedKind::Queries => QUERY_PATTERNS
                .iter()
                .map(|p| (p.replace("{}", keyword), None))
                .collect(),
            RelatedKind::Topics => TOPIC_PATTERNS
                .iter()
                .map(|(p, category)| (p.replace("{}", keyword), Some(category.to_string())))
                .collect(),
        };
        let mut rng = StdRng::seed_from_u64(sample_seed(self.seed, &format!("{keyword}|{kind}|{timeframe}"), None));

        let mut scores: Vec<i64> = candidates.iter().map(|_| rng.gen_range(5..100)).collect();
        if let Some(first) = scores.first_mut() {
            *first = 100;
        }
        scores.sort_unstable_by(|a, b| b.cmp(a));
        let top = candidates
            .iter()
            .zip(&scores)
            .map(|((title, category), score)| RelatedItem {
                title: title.clone(),
                category: category.clone(),
                value: *score,
                label: score.to_string(),
            })
            .collect();

        let mut rising = Vec::new();
        for (title, category) in &candidates {
            if !rng.gen_bool(0.5) {
                continue;
            }
            let growth: i64 = rng.gen_range(1..60) * 50;
            rising.push(RelatedItem {
                title: title.clone(),
                category: category.clone(),
                value: growth,
                label: format!("+{growth}%"),
            });
        }
        rising.sort_by(|a, b| b.value.cmp(&a.value));
        RelatedLists { top, rising }
    }
}

#[derive(Debug, Clone, Copy)]
struct Profile {
    level: f64,
    drift_per_year: f64,
    seasonal_amp: f64,
    seasonal_phase: f64,
    weekly_amp: f64,
    noise_sd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Span {
    Daily(NaiveDate, NaiveDate),
    Monthly(NaiveDate, NaiveDate),
}

/// Map a provider timeframe onto the dates it covers.
fn resolve(timeframe: &str, today: NaiveDate) -> Option<Span> {
    let back = |days: i64| Span::Daily(today - Duration::days(days), today);
    match timeframe.trim() {
        "now 1-H" | "now 4-H" | "now 1-d" => Some(back(1)),
        "now 7-d" => Some(back(7)),
        "today 1-m" => Some(back(30)),
        "today 3-m" => Some(back(90)),
        "today 12-m" => Some(back(365)),
        "today 5-y" => Some(Span::Monthly(today.checked_sub_months(Months::new(60))?, today)),
        "all" => Some(Span::Monthly(earliest_date(), today)),
        other => parse_range(other).map(|(start, end)| Span::Daily(start, end)),
    }
}

fn noise() -> Result<Normal<f64>, AppError> {
    Normal::new(0.0, 1.0).map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))
}

/// Scale all keywords jointly so the window peak is 100, rounded to integers.
fn scaled_frame(dates: &[NaiveDate], keywords: &[String], series: Vec<Vec<f64>>) -> Result<TimeSeriesFrame, AppError> {
    let mut frame = TimeSeriesFrame::new();
    if dates.is_empty() {
        return Ok(frame);
    }
    let peak = series.iter().flatten().copied().fold(0.0_f64, f64::max);
    frame.insert(DATE, Column::Date(dates.iter().copied().map(Some).collect()))?;
    for (kw, values) in keywords.iter().zip(series) {
        let scaled = values
            .into_iter()
            .map(|v| Some(if peak > 0.0 { (v / peak * 100.0).round() } else { 0.0 }))
            .collect();
        frame.insert(kw.clone(), Column::Float(scaled))?;
    }
    Ok(frame)
}

fn sample_seed(seed: u64, keyword: &str, day: Option<NaiveDate>) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    keyword.to_lowercase().hash(&mut hasher);
    day.hash(&mut hasher);
    hasher.finish()
}
