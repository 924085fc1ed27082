/// Error types for the rampa crate.
use thiserror::Error;

/// Errors that can occur while parsing run options.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Invalid stage '{0}': expected DURATION:TARGET (e.g. 30s:10)")]
    InvalidStage(String),

    #[error("Invalid threshold '{expression}': {reason}")]
    InvalidThreshold { expression: String, reason: String },

    #[error("Invalid TOML: {0}")]
    InvalidToml(#[from] toml::de::Error),

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the metrics registry.
#[derive(Error, Debug)]
pub enum MetricError {
    #[error("Metric '{name}' is a {existing}, cannot record it as a {requested}")]
    KindMismatch {
        name: String,
        existing: &'static str,
        requested: &'static str,
    },

    #[error("Metric name cannot be empty")]
    EmptyName,
}

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Metric error: {0}")]
    Metric(#[from] MetricError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Setup failed: {0}")]
    Setup(String),

    #[error("Teardown failed: {0}")]
    Teardown(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
