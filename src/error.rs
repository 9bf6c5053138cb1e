use thiserror::Error;

/// Main error type for the supervisory core
#[derive(Error, Debug)]
pub enum VigilError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Startup errors
    #[error("initialization failed at {step}: {reason}")]
    Initialization { step: String, reason: String },

    // Collaborator errors
    #[error("Exchange error: {0}")]
    Exchange(String),

    #[error("Market data error: {0}")]
    MarketData(String),

    #[error("Risk engine error: {0}")]
    Risk(String),

    #[error("Pair manager error: {0}")]
    PairManager(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl VigilError {
    /// True for the deliberate-cancellation signal, which supervisors must
    /// propagate rather than record as a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, VigilError::Cancelled)
    }
}

/// Result type alias for VigilError
pub type Result<T> = std::result::Result<T, VigilError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialization_error_message() {
        let err = VigilError::Initialization {
            step: "connect exchange".to_string(),
            reason: "refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "initialization failed at connect exchange: refused"
        );
    }

    #[test]
    fn test_invalid_config_joins_messages() {
        let err = VigilError::InvalidConfig(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "Invalid configuration: a; b");
    }

    #[test]
    fn test_cancelled_is_distinguishable() {
        assert!(VigilError::Cancelled.is_cancelled());
        assert!(!VigilError::Internal("x".into()).is_cancelled());
    }
}
