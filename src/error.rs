//! Error Handling Infrastructure
//!
//! All errors raised below the dispatcher are structured `SqlwardError` values.
//! At the adapter boundary every error is converted into a failed
//! [`CommandResult`](crate::output::CommandResult); nothing above the adapters
//! returns `Err`.
//!
//! # Error Categories
//! - `ConfigError`: unknown profile, malformed configuration
//! - `PolicyBlocked`: statement matched a blacklisted phrase
//! - `ConfirmationRequired`: deferred-decision signal, not a terminal failure
//! - `ConnectionFailed`: connection establishment errors
//! - `QueryFailed`: query execution errors
//! - `InvalidInput`: malformed input or missing required parameters
//! - `EngineError`: engine-specific database errors

use thiserror::Error;

/// Main error type for sqlward operations
#[derive(Error, Debug)]
pub enum SqlwardError {
    /// Configuration error (unknown profile, malformed profile, bad file)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Statement blocked by the blacklist policy
    #[error("Statement blocked: {0}")]
    PolicyBlocked(String),

    /// Statement needs explicit consent before execution
    ///
    /// This is a deferred-decision signal rather than a terminal failure: the
    /// caller may resubmit the same statement with consent recorded.
    #[error("Confirmation required: {0}")]
    ConfirmationRequired(String),

    /// Database connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Engine-specific database error
    #[error("Engine error ({engine}): {detail}")]
    EngineError { engine: String, detail: String },
}

impl SqlwardError {
    /// Convert error to a stable error code string
    ///
    /// Error codes are stable and suitable for programmatic handling.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::PolicyBlocked(_) => "POLICY_BLOCKED",
            Self::ConfirmationRequired(_) => "CONFIRMATION_REQUIRED",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::QueryFailed(_) => "QUERY_FAILED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::EngineError { .. } => "ENGINE_ERROR",
        }
    }

    /// Get the human-readable message (no credentials, no file paths)
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create a policy-blocked error
    pub fn policy_blocked(message: impl Into<String>) -> Self {
        Self::PolicyBlocked(message.into())
    }

    /// Create a confirmation-required signal
    pub fn confirmation_required(message: impl Into<String>) -> Self {
        Self::ConfirmationRequired(message.into())
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create a query failed error
    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::QueryFailed(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create an engine-specific error
    pub fn engine_error(engine: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::EngineError { engine: engine.into(), detail: detail.into() }
    }
}

/// Result type alias for sqlward operations
pub type Result<T> = std::result::Result<T, SqlwardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(SqlwardError::config_error("test").error_code(), "CONFIG_ERROR");
        assert_eq!(SqlwardError::policy_blocked("test").error_code(), "POLICY_BLOCKED");
        assert_eq!(
            SqlwardError::confirmation_required("test").error_code(),
            "CONFIRMATION_REQUIRED"
        );
        assert_eq!(SqlwardError::connection_failed("test").error_code(), "CONNECTION_FAILED");
        assert_eq!(SqlwardError::query_failed("test").error_code(), "QUERY_FAILED");
        assert_eq!(SqlwardError::invalid_input("test").error_code(), "INVALID_INPUT");
        assert_eq!(SqlwardError::engine_error("mysql", "test").error_code(), "ENGINE_ERROR");
    }

    #[test]
    fn test_error_messages() {
        let err = SqlwardError::policy_blocked("matches blacklisted phrase 'DROP DATABASE'");
        assert!(err.message().contains("DROP DATABASE"));

        let err = SqlwardError::engine_error("postgres", "connection timeout");
        assert!(err.message().contains("postgres"));
        assert!(err.message().contains("connection timeout"));
    }

    #[test]
    fn test_error_constructors() {
        assert!(matches!(SqlwardError::config_error("t"), SqlwardError::ConfigError(_)));
        assert!(matches!(SqlwardError::policy_blocked("t"), SqlwardError::PolicyBlocked(_)));
        assert!(matches!(
            SqlwardError::confirmation_required("t"),
            SqlwardError::ConfirmationRequired(_)
        ));
        assert!(matches!(SqlwardError::connection_failed("t"), SqlwardError::ConnectionFailed(_)));
        assert!(matches!(SqlwardError::query_failed("t"), SqlwardError::QueryFailed(_)));
        assert!(matches!(SqlwardError::invalid_input("t"), SqlwardError::InvalidInput(_)));
        assert!(matches!(SqlwardError::engine_error("e", "t"), SqlwardError::EngineError { .. }));
    }
}
