//! Error Handling Infrastructure
//!
//! This module defines the error types used throughout fncm-prereq.
//! All errors are structured and map to specific error codes for JSON output.
//!
//! # Error Categories
//! - `ConfigError`: Property documents or run settings are unreadable or malformed
//! - `MissingTool`: A required executable (`java`, `keytool`, `kubectl`) is absent
//! - `CertificateError`: Certificate or key material cannot be parsed or converted
//! - `CommandFailed`: An external helper exited unsuccessfully
//! - `ConnectionFailed`: Socket, TLS or directory connection errors
//! - `AuthenticationFailed`: Bind credentials were rejected
//! - `InvalidInput`: Malformed input or missing required parameters
//! - `PreflightFailed`: Deficiencies found before any validator ran
//!
//! Per-entity validation failures (one unreachable database, one unbound PVC) are not errors:
//! validators record them in the result set and keep going. Only environment failures that make
//! the whole run meaningless travel as `PrereqError`.

use thiserror::Error;

/// Main error type for fncm-prereq operations
#[derive(Error, Debug)]
pub enum PrereqError {
    /// Property document or settings problem
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Required external executable not found
    #[error("Missing tool: {0}")]
    MissingTool(String),

    /// Certificate or key material problem
    #[error("Certificate error: {0}")]
    CertificateError(String),

    /// External command exited with a failure status
    #[error("Command failed ({program}): {detail}")]
    CommandFailed { program: String, detail: String },

    /// Network or directory connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Credentials rejected by the remote side
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Deficiencies detected before validation started
    #[error("Preflight failed: {0}")]
    PreflightFailed(String),
}

impl PrereqError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::MissingTool(_) => "MISSING_TOOL",
            Self::CertificateError(_) => "CERTIFICATE_ERROR",
            Self::CommandFailed { .. } => "COMMAND_FAILED",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::AuthenticationFailed(_) => "AUTHENTICATION_FAILED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::PreflightFailed(_) => "PREFLIGHT_FAILED",
        }
    }

    /// Get human-readable error message
    ///
    /// Messages never embed credentials; command lines are rendered with secrets masked.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create a missing tool error
    pub fn missing_tool(tool: impl Into<String>) -> Self {
        Self::MissingTool(tool.into())
    }

    /// Create a certificate error
    pub fn certificate_error(message: impl Into<String>) -> Self {
        Self::CertificateError(message.into())
    }

    /// Create a command failure error
    pub fn command_failed(program: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::CommandFailed { program: program.into(), detail: detail.into() }
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create an authentication failed error
    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::AuthenticationFailed(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a preflight failure error
    pub fn preflight_failed(message: impl Into<String>) -> Self {
        Self::PreflightFailed(message.into())
    }

    /// Whether this error belongs to the fatal/environment category
    ///
    /// Fatal errors stop the run before (or instead of) per-entity validation.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::MissingTool(_) | Self::ConfigError(_) | Self::PreflightFailed(_))
    }
}

/// Result type alias for fncm-prereq operations
pub type Result<T> = std::result::Result<T, PrereqError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(PrereqError::config_error("test").error_code(), "CONFIG_ERROR");
        assert_eq!(PrereqError::missing_tool("keytool").error_code(), "MISSING_TOOL");
        assert_eq!(PrereqError::certificate_error("test").error_code(), "CERTIFICATE_ERROR");
        assert_eq!(PrereqError::command_failed("java", "exit 1").error_code(), "COMMAND_FAILED");
        assert_eq!(PrereqError::connection_failed("test").error_code(), "CONNECTION_FAILED");
        assert_eq!(
            PrereqError::authentication_failed("test").error_code(),
            "AUTHENTICATION_FAILED"
        );
        assert_eq!(PrereqError::invalid_input("test").error_code(), "INVALID_INPUT");
        assert_eq!(PrereqError::preflight_failed("test").error_code(), "PREFLIGHT_FAILED");
    }

    #[test]
    fn test_error_messages() {
        let err = PrereqError::missing_tool("kubectl");
        assert!(err.message().contains("kubectl"));

        let err = PrereqError::command_failed("keytool", "keystore password was incorrect");
        assert!(err.message().contains("keytool"));
        assert!(err.message().contains("keystore password was incorrect"));
    }

    #[test]
    fn test_error_constructors() {
        let err = PrereqError::config_error("test");
        assert!(matches!(err, PrereqError::ConfigError(_)));

        let err = PrereqError::certificate_error("test");
        assert!(matches!(err, PrereqError::CertificateError(_)));

        let err = PrereqError::command_failed("java", "test");
        assert!(matches!(err, PrereqError::CommandFailed { .. }));

        let err = PrereqError::authentication_failed("test");
        assert!(matches!(err, PrereqError::AuthenticationFailed(_)));
    }

    #[test]
    fn test_fatal_categories() {
        assert!(PrereqError::missing_tool("java").is_fatal());
        assert!(PrereqError::config_error("bad toml").is_fatal());
        assert!(!PrereqError::connection_failed("refused").is_fatal());
        assert!(!PrereqError::authentication_failed("rc=49").is_fatal());
    }
}
