use std::time::Duration;

use thiserror::Error;

/// Main error type for the agent runtime
#[derive(Error, Debug)]
pub enum HelmsmanError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    // Collaborator errors (classified at the adapter boundary)
    #[error("Transient collaborator failure: {0}")]
    Transient(String),

    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Prediction confidence too low: {0}")]
    LowConfidence(String),

    // Circuit breaker short-circuit
    #[error("Circuit open for {collaborator}, retry in {retry_in:?}")]
    CircuitOpen {
        collaborator: String,
        retry_in: Duration,
    },

    // Resource supervision
    #[error("Resource exhaustion: {0}")]
    ResourceExhaustion(String),

    // Market data errors
    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Operation cancelled")]
    Cancelled,

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl HelmsmanError {
    /// Whether this error should count as a circuit breaker failure.
    ///
    /// Rejections and low-confidence predictions are valid collaborator
    /// answers, not faults; cancellation is our own doing.
    pub fn is_transient(&self) -> bool {
        matches!(self, HelmsmanError::Transient(_))
    }
}

impl From<reqwest::Error> for HelmsmanError {
    fn from(err: reqwest::Error) -> Self {
        // Transport-level failures (connect, timeout, body) are retryable.
        // Adapters map status-code rejections explicitly before this kicks in.
        HelmsmanError::Transient(err.to_string())
    }
}

/// Result type alias for HelmsmanError
pub type Result<T> = std::result::Result<T, HelmsmanError>;
