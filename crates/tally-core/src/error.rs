//! Error types for Tally

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration (e.g. no API key). Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout or connection failure talking to the completion service
    #[error("Transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Rate limited by completion service (HTTP {status}): {body}")]
    RateLimited { status: u16, body: String },

    #[error("Completion service error (HTTP {status}): {body}")]
    Server { status: u16, body: String },

    /// Unexpected HTTP status or request construction failure
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Reply envelope did not match the documented shape
    #[error("Failed to decode completion response: {0}")]
    Decode(String),

    #[error("No JSON found in model reply: {0}")]
    NoJsonFound(String),

    #[error("Failed to parse model reply: {0}")]
    Parse(String),

    #[error("Request limit reached ({0} calls)")]
    BudgetExceeded(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl Error {
    /// Whether a failed call should be attempted again after backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::RateLimited { .. } | Self::Server { .. } => true,
            _ => false,
        }
    }

    /// Whether the model reply could not be recovered as JSON
    pub fn is_parse_failure(&self) -> bool {
        matches!(self, Self::NoJsonFound(_) | Self::Parse(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
