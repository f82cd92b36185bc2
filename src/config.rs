//! Runtime configuration.
//!
//! Resolution order (later wins):
//! 1. built-in defaults
//! 2. an optional TOML file (`--config`)
//! 3. environment variables, with `.env` loaded through `dotenvy`
//!
//! ```toml
//! [analyzer]
//! default_geo = "US"
//! default_timeframe = "today 3-m"
//! retry_attempts = 5
//!
//! [logging]
//! level = "info"
//!
//! [export]
//! format = "csv"
//! output_dir = "./results"
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analysis::{AnomalyMethod, DEFAULT_ANOMALY_THRESHOLD};
use crate::domain::{ExportFormat, JsonLayout};
use crate::error::AppError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Starting points for `init-config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ConfigTemplate {
    /// Built-in defaults.
    #[default]
    Basic,
    /// More retries and metadata on every export.
    Advanced,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub analyzer: AnalyzerConfig,
    pub logging: LoggingConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub default_geo: String,
    pub default_timeframe: String,
    pub retry_attempts: u32,
    /// Seconds.
    pub request_timeout: u64,
    /// Base back-off in seconds; attempt `n` waits `request_delay × 2^n`.
    pub request_delay: f64,
    pub window: usize,
    pub anomaly_method: AnomalyMethod,
    pub anomaly_threshold: f64,
    pub max_batch_size: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            default_geo: "US".to_string(),
            default_timeframe: "today 3-m".to_string(),
            retry_attempts: 5,
            request_timeout: 30,
            request_delay: 1.0,
            window: 7,
            anomaly_method: AnomalyMethod::Iqr,
            anomaly_threshold: DEFAULT_ANOMALY_THRESHOLD,
            max_batch_size: 5,
        }
    }
}

impl AnalyzerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_secs_f64(self.request_delay.max(0.0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub format: ExportFormat,
    pub json_layout: JsonLayout,
    pub include_metadata: bool,
    pub output_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: ExportFormat::Csv,
            json_layout: JsonLayout::Records,
            include_metadata: true,
            output_dir: PathBuf::from("./results"),
        }
    }
}

impl Config {
    /// Defaults, then `path` (if any), then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        load_dotenv();
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(env_opt);
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::new(2, format!("Failed to read config {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
            .map_err(|e| AppError::new(2, format!("Invalid config {}: {e}", path.display())))
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn template(template: ConfigTemplate) -> Self {
        let mut config = Self::default();
        if template == ConfigTemplate::Advanced {
            config.analyzer.retry_attempts = 10;
            config.export.include_metadata = true;
        }
        config
    }

    pub fn to_toml_string(&self) -> Result<String, AppError> {
        toml::to_string_pretty(self).map_err(|e| AppError::new(2, format!("Failed to encode config: {e}")))
    }

    /// Write the config as TOML. An existing file is kept unless `overwrite`.
    pub fn save(&self, path: &Path, overwrite: bool) -> Result<(), AppError> {
        if path.exists() && !overwrite {
            return Err(AppError::new(
                2,
                format!("{} already exists; pass --force to overwrite it.", path.display()),
            ));
        }
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| AppError::new(2, format!("Failed to create {}: {e}", dir.display())))?;
        }
        std::fs::write(path, self.to_toml_string()?)
            .map_err(|e| AppError::new(2, format!("Failed to write config {}: {e}", path.display())))?;
        info!(file = %path.display(), "config written");
        Ok(())
    }

    /// Override fields from environment-style lookups.
    ///
    /// Malformed values are logged and ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let a = &mut self.analyzer;
        if let Some(v) = lookup("DEFAULT_GEO") {
            a.default_geo = v;
        }
        if let Some(v) = lookup("DEFAULT_TIMEFRAME") {
            a.default_timeframe = v;
        }
        parse_into(&lookup, "RETRY_ATTEMPTS", &mut a.retry_attempts);
        parse_into(&lookup, "REQUEST_TIMEOUT", &mut a.request_timeout);
        parse_into(&lookup, "REQUEST_DELAY", &mut a.request_delay);

        if let Some(v) = lookup("LOG_LEVEL") {
            self.logging.level = v.to_ascii_lowercase();
        }

        let e = &mut self.export;
        if let Some(v) = lookup("DEFAULT_EXPORT_FORMAT") {
            match v.to_ascii_lowercase().as_str() {
                "csv" => e.format = ExportFormat::Csv,
                "json" => e.format = ExportFormat::Json,
                _ => warn!(key = "DEFAULT_EXPORT_FORMAT", value = %v, "ignoring unsupported export format"),
            }
        }
        if let Some(v) = lookup("INCLUDE_METADATA") {
            match v.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => e.include_metadata = true,
                "false" | "0" | "no" => e.include_metadata = false,
                _ => warn!(key = "INCLUDE_METADATA", value = %v, "ignoring malformed boolean"),
            }
        }
        if let Some(v) = lookup("OUTPUT_DIR") {
            e.output_dir = PathBuf::from(v);
        }
    }
}

fn parse_into<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(v) => *slot = v,
            Err(_) => warn!(key, value = %raw, "ignoring malformed config value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let c = Config::default();
        assert_eq!(c.analyzer.default_geo, "US");
        assert_eq!(c.analyzer.default_timeframe, "today 3-m");
        assert_eq!(c.analyzer.retry_attempts, 5);
        assert_eq!(c.analyzer.timeout(), Duration::from_secs(30));
        assert_eq!(c.analyzer.base_delay(), Duration::from_secs(1));
        assert_eq!(c.logging.level, "info");
        assert_eq!(c.export.format, ExportFormat::Csv);
        assert!(c.export.include_metadata);
        assert_eq!(c.export.output_dir, PathBuf::from("./results"));
    }

    #[test]
    fn toml_overrides_defaults_partially() {
        let c = Config::from_toml_str(
            r#"
            [analyzer]
            default_geo = "GB"
            anomaly_method = "zscore"

            [export]
            format = "json"
            json_layout = "structured"
            "#,
        )
        .unwrap();
        assert_eq!(c.analyzer.default_geo, "GB");
        assert_eq!(c.analyzer.anomaly_method, AnomalyMethod::Zscore);
        assert_eq!(c.analyzer.retry_attempts, 5);
        assert_eq!(c.export.format, ExportFormat::Json);
        assert_eq!(c.export.json_layout, JsonLayout::Structured);
        assert_eq!(c.logging.level, "info");
    }

    #[test]
    fn env_wins_over_file_and_ignores_garbage() {
        let mut c = Config::from_toml_str("[analyzer]\nretry_attempts = 2\n").unwrap();
        c.apply_env(lookup(&[
            ("RETRY_ATTEMPTS", "9"),
            ("REQUEST_DELAY", "not-a-number"),
            ("INCLUDE_METADATA", "false"),
            ("LOG_LEVEL", "DEBUG"),
            ("OUTPUT_DIR", "/tmp/out"),
        ]));
        assert_eq!(c.analyzer.retry_attempts, 9);
        assert_eq!(c.analyzer.request_delay, 1.0);
        assert!(!c.export.include_metadata);
        assert_eq!(c.logging.level, "debug");
        assert_eq!(c.export.output_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn saved_template_loads_back_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("trends.toml");

        let advanced = Config::template(ConfigTemplate::Advanced);
        assert_eq!(advanced.analyzer.retry_attempts, 10);
        advanced.save(&path, false).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), advanced);

        let err = Config::template(ConfigTemplate::Basic).save(&path, false).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        Config::template(ConfigTemplate::Basic).save(&path, true).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), Config::default());
    }

    #[test]
    fn missing_file_is_usage_error() {
        let err = Config::from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
