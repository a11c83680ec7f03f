//! Error types for output mapping
//!
//! Every failure the writer can report is one of the variants below. Validation,
//! reconciliation and transport problems are translated into
//! [`Error::InvalidOutput`] at the writer boundary, keeping the original status
//! code where one exists.

use thiserror::Error;

/// The main error type for output mapping
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Output Mapping Errors
    // ============================================================================
    /// User-facing failure tied to the output being written
    #[error("{message}")]
    InvalidOutput {
        message: String,
        code: Option<u16>,
    },

    /// Precondition failure unrelated to any single source file
    #[error("{message}")]
    OutputOperation { message: String },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // HTTP Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Max retries ({max_retries}) exceeded")]
    MaxRetriesExceeded { max_retries: u32 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ============================================================================
    // Storage Errors
    // ============================================================================
    #[error("Job {job_id} failed: {message}")]
    Job { job_id: String, message: String },

    #[error("Blob storage error: {0}")]
    BlobStore(#[from] object_store::Error),

    // ============================================================================
    // Data File Errors
    // ============================================================================
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invalid output error without a status code
    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput {
            message: message.into(),
            code: None,
        }
    }

    /// Create an invalid output error carrying a status code
    pub fn invalid_output_with_code(message: impl Into<String>, code: u16) -> Self {
        Self::InvalidOutput {
            message: message.into(),
            code: Some(code),
        }
    }

    /// Create an output operation error
    pub fn output_operation(message: impl Into<String>) -> Self {
        Self::OutputOperation {
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a job failure error
    pub fn job(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Job {
            job_id: job_id.into(),
            message: message.into(),
        }
    }

    /// HTTP-like status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::HttpStatus { status, .. } => Some(*status),
            Error::InvalidOutput { code, .. } => *code,
            Error::RateLimited { .. } => Some(429),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the backend reported the object as missing
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) | Error::RateLimited { .. } | Error::Timeout { .. } => true,
            Error::HttpStatus { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    /// Translate into the user-facing error kind, prefixing the message
    ///
    /// The status code of the original error is preserved.
    pub fn into_invalid_output(self, prefix: &str) -> Self {
        let code = self.status();
        let message = match &self {
            Error::HttpStatus { body, .. } => body.clone(),
            other => other.to_string(),
        };
        Self::InvalidOutput {
            message: format!("{prefix}{message}"),
            code,
        }
    }
}

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Result type alias for output mapping
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::invalid_output("Table source 'a.csv' not found.");
        assert_eq!(err.to_string(), "Table source 'a.csv' not found.");

        let err = Error::output_operation("Component Id must be set");
        assert_eq!(err.to_string(), "Component Id must be set");

        let err = Error::http_status(404, "Not found");
        assert_eq!(err.to_string(), "HTTP 404: Not found");
    }

    #[test]
    fn test_status_and_not_found() {
        assert!(Error::http_status(404, "").is_not_found());
        assert!(Error::invalid_output_with_code("missing", 404).is_not_found());
        assert!(!Error::invalid_output("missing").is_not_found());
        assert_eq!(Error::http_status(400, "").status(), Some(400));
        assert_eq!(Error::config("x").status(), None);
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::RateLimited {
            retry_after_seconds: 60
        }
        .is_retryable());
        assert!(Error::Timeout { timeout_ms: 1000 }.is_retryable());
        assert!(Error::http_status(503, "").is_retryable());

        assert!(!Error::http_status(404, "").is_retryable());
        assert!(!Error::invalid_output("x").is_retryable());
    }

    #[test]
    fn test_into_invalid_output_keeps_code() {
        let err = Error::http_status(403, "Access denied").into_invalid_output("Cannot upload: ");
        assert_eq!(err.to_string(), "Cannot upload: Access denied");
        assert_eq!(err.status(), Some(403));
        assert!(matches!(err, Error::InvalidOutput { .. }));
    }

    #[test]
    fn test_result_context() {
        let result: Result<()> = Err(Error::config("inner"));
        let with_context = result.context("outer");
        assert!(with_context
            .unwrap_err()
            .to_string()
            .contains("outer: Configuration error: inner"));
    }
}
