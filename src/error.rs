use thiserror::Error;

/// Contract violations raised by the analysis core.
///
/// Only precondition breaches live here. Sparse data and arithmetic
/// degeneracy are never errors; they surface as warnings, nulls or zeros.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("missing required column `{column}` in {frame} frame")]
    MissingColumn { frame: &'static str, column: String },

    #[error("column `{column}` must hold {expected} values")]
    ColumnType { column: String, expected: &'static str },

    #[error("unsupported anomaly detection method: `{0}` (expected `iqr` or `zscore`)")]
    UnsupportedMethod(String),

    #[error("window size must be at least 1, got {0}")]
    InvalidWindow(usize),

    #[error("column `{column}` has {actual} rows, frame has {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
}

/// Application-level error carrying the process exit code.
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        AppError::new(3, format!("Analysis failed: {err}"))
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_errors_map_to_exit_code_three() {
        let err: AppError = AnalysisError::UnsupportedMethod("isolation".to_string()).into();
        assert_eq!(err.exit_code(), 3);
        assert!(err.message().contains("isolation"));
    }
}
