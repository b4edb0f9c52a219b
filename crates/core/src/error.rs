//! Error types for the Living Engine.

use crate::types::Timestamp;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Living Engine.
#[derive(Error, Debug)]
pub enum Error {
    /// The strategy failed or returned malformed intents for a bar.
    #[error("Strategy failure at {timestamp}: {message}")]
    StrategyFailure {
        /// Timestamp of the bar being processed.
        timestamp: Timestamp,
        /// What went wrong.
        message: String,
    },

    /// The bar stream yielded a duplicate or out-of-order timestamp.
    #[error("Invalid bar ordering for {symbol}: {current} does not follow {previous}")]
    InvalidBarOrdering {
        /// Symbol of the offending bar.
        symbol: String,
        /// Timestamp of the previously accepted bar.
        previous: Timestamp,
        /// Timestamp of the offending bar.
        current: Timestamp,
    },

    /// Configuration values that cannot be honoured together.
    #[error("Configuration conflict: {0}")]
    ConfigurationConflict(String),

    /// Configuration error (unreadable or unparseable).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data error (invalid or missing data).
    #[error("Data error: {0}")]
    Data(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read/write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a strategy failure for the bar at `timestamp`.
    pub fn strategy(timestamp: Timestamp, msg: impl Into<String>) -> Self {
        Error::StrategyFailure {
            timestamp,
            message: msg.into(),
        }
    }

    /// Create a configuration conflict error.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::ConfigurationConflict(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a data error.
    pub fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    /// Whether this error aborts a running backtest.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::StrategyFailure { .. }
                | Error::InvalidBarOrdering { .. }
                | Error::ConfigurationConflict(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_strategy_failure_names_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let err = Error::strategy(ts, "indicator blew up");
        let msg = err.to_string();
        assert!(msg.contains("2024-03-01 09:30:00"));
        assert!(msg.contains("indicator blew up"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_data_errors_are_not_fatal() {
        assert!(!Error::data("missing column").is_fatal());
        assert!(!Error::config("bad yaml").is_fatal());
        assert!(Error::conflict("shorting disabled").is_fatal());
    }
}
