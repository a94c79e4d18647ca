use thiserror::Error;

#[derive(Debug, Error)]
pub enum FireError {
    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Backtest needs {years} years of history but only {available} are available")]
    InsufficientHistory { years: usize, available: usize },

    #[error("Historical return series is empty")]
    EmptyHistory,

    #[error("Tax pack not found: {path}")]
    TaxPackNotFound { path: String },

    #[error("Tax pack {path} could not be parsed: {reason}")]
    TaxPackParse { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Table rendering library unavailable: {0}")]
    RendererUnavailable(String),
}

impl FireError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        FireError::InvalidInput {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

pub type FireResult<T> = Result<T, FireError>;
