//! Error types module
//!
//! All failures raised by the ingest engine and the event pipeline are unified
//! under [`AppError`]. Each variant self-describes how it should be reported
//! through [`ErrorMetadata`], so callers can decide between "fix your action
//! configuration" messages and generic failures without string matching.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx` feature.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error reporting - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP-style status code
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "PERSISTENCE_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried by an upstream scheduler)
    fn is_recoverable(&self) -> bool;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("{0}")]
    HeaderBuild(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// An error that already carries an HTTP-style status.
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        #[source]
        source: Option<Box<AppError>>,
    },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, log_level).
fn app_error_static_metadata(err: &AppError) -> (u16, &'static str, bool, LogLevel) {
    match err {
        AppError::Database(_) => (500, "DATABASE_ERROR", true, LogLevel::Error),
        AppError::NotFound(_) => (404, "NOT_FOUND", false, LogLevel::Debug),
        AppError::Persistence(_) => (500, "PERSISTENCE_ERROR", true, LogLevel::Error),
        AppError::Configuration(_) => (500, "CONFIGURATION_ERROR", false, LogLevel::Warn),
        AppError::InvalidInput(_) => (400, "INVALID_INPUT", false, LogLevel::Debug),
        AppError::AccessDenied(_) => (403, "ACCESS_DENIED", false, LogLevel::Debug),
        AppError::HeaderBuild(_) => (500, "HEADER_BUILD_ERROR", false, LogLevel::Error),
        AppError::Dispatch(_) => (502, "DISPATCH_ERROR", true, LogLevel::Error),
        AppError::Http { status, .. } => (*status, "HTTP_ERROR", *status >= 500, LogLevel::Error),
        AppError::Internal(_) => (500, "INTERNAL_ERROR", true, LogLevel::Error),
        AppError::InternalWithSource { .. } => (500, "INTERNAL_ERROR", true, LogLevel::Error),
    }
}

impl AppError {
    /// Wrap this error as an HTTP-style failure.
    ///
    /// Errors that already carry a status are returned unchanged; anything else
    /// becomes a status 500 failure keeping the original error as its source.
    pub fn into_http(self) -> AppError {
        match self {
            AppError::Http { .. } => self,
            other => AppError::Http {
                status: 500,
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }

    /// The innermost `AppError` in an `Http` wrapping chain.
    pub fn root_cause(&self) -> &AppError {
        match self {
            AppError::Http {
                source: Some(inner),
                ..
            } => inner.root_cause(),
            other => other,
        }
    }

    /// Whether the failure comes from operator-supplied configuration rather
    /// than from storage or transport.
    pub fn is_configuration(&self) -> bool {
        matches!(self.root_cause(), AppError::Configuration(_))
    }

    /// Get the error type name for detailed reporting
    pub fn error_type(&self) -> &str {
        match self {
            AppError::Database(_) => "Database",
            AppError::NotFound(_) => "NotFound",
            AppError::Persistence(_) => "Persistence",
            AppError::Configuration(_) => "Configuration",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::AccessDenied(_) => "AccessDenied",
            AppError::HeaderBuild(_) => "HeaderBuild",
            AppError::Dispatch(_) => "Dispatch",
            AppError::Http { .. } => "Http",
            AppError::Internal(_) => "Internal",
            AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).3
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::Persistence(ref msg) => msg.clone(),
            AppError::Configuration(ref msg) => msg.clone(),
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::AccessDenied(ref msg) => msg.clone(),
            AppError::HeaderBuild(ref msg) => msg.clone(),
            AppError::Dispatch(ref msg) => msg.clone(),
            AppError::Http { ref message, .. } => message.clone(),
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::InternalWithSource { .. } => "Internal server error".to_string(),
        }
    }
}
