//! Error types module
//!
//! This module provides the core error types used throughout RoomScan. Every error that
//! can reach a client is expressed as an `AppError` variant; crate-local errors (storage,
//! converter, queue) are mapped into it at the HTTP boundary.

use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like a full queue
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
/// This trait allows errors to self-describe their HTTP response characteristics
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "QUEUE_FULL")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Missing file: {0}")]
    MissingFile(String),

    #[error("Invalid file type: {0}")]
    InvalidFileType(String),

    #[error("Empty file")]
    EmptyFile,

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error("Metadata too large: {size} bytes exceeds max {max} bytes")]
    MetadataTooLarge { size: usize, max: usize },

    #[error("Invalid metadata: {}", fields.join(", "))]
    InvalidMetadata { fields: Vec<String> },

    #[error("Invalid job id: {0}")]
    InvalidId(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Queue full: retry after {retry_after_secs}s")]
    QueueFull { retry_after_secs: u64 },

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Too many requests: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
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
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::MissingFile(_) => (
            400,
            "MISSING_FILE",
            false,
            Some("Attach the scan as the multipart field 'file'"),
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidFileType(_) => (
            400,
            "INVALID_FILE_TYPE",
            false,
            Some("Upload an OBJ, PLY, USD(A/C/Z), GLB, GLTF, FBX or STL scan"),
            false,
            LogLevel::Debug,
        ),
        AppError::EmptyFile => (
            400,
            "EMPTY_FILE",
            false,
            Some("Upload a non-empty scan file"),
            false,
            LogLevel::Debug,
        ),
        AppError::PayloadTooLarge(_) => (
            413,
            "PAYLOAD_TOO_LARGE",
            false,
            Some("Reduce file size below the configured limit"),
            false,
            LogLevel::Debug,
        ),
        AppError::MetadataTooLarge { .. } => (
            400,
            "METADATA_TOO_LARGE",
            false,
            Some("Shorten the metadata fields"),
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidMetadata { .. } => (
            400,
            "INVALID_METADATA",
            false,
            Some("Provide 'author' and only title, filename, platform or format as strings"),
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidId(_) => (
            400,
            "INVALID_ID",
            false,
            Some("Use the id returned by the upload endpoint"),
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidInput(_) => (
            400,
            "INVALID_INPUT",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the scan ID exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::Unauthorized(_) => (
            401,
            "UNAUTHORIZED",
            false,
            Some("Send 'Authorization: Bearer <token>'"),
            false,
            LogLevel::Debug,
        ),
        AppError::QueueFull { .. } => (
            429,
            "QUEUE_FULL",
            true,
            Some("Wait for the Retry-After interval and upload again"),
            false,
            LogLevel::Warn,
        ),
        AppError::ServiceUnavailable(_) => (
            503,
            "SERVICE_UNAVAILABLE",
            true,
            Some("Retry after a short delay"),
            false,
            LogLevel::Warn,
        ),
        AppError::RateLimited { .. } => (
            429,
            "RATE_LIMITED",
            true,
            Some("Wait for the Retry-After interval and retry"),
            false,
            LogLevel::Debug,
        ),
        AppError::Storage(_) => (
            500,
            "STORAGE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get the error type name for logging and error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::MissingFile(_) => "MissingFile",
            AppError::InvalidFileType(_) => "InvalidFileType",
            AppError::EmptyFile => "EmptyFile",
            AppError::PayloadTooLarge(_) => "PayloadTooLarge",
            AppError::MetadataTooLarge { .. } => "MetadataTooLarge",
            AppError::InvalidMetadata { .. } => "InvalidMetadata",
            AppError::InvalidId(_) => "InvalidId",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::NotFound(_) => "NotFound",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::QueueFull { .. } => "QueueFull",
            AppError::ServiceUnavailable(_) => "ServiceUnavailable",
            AppError::RateLimited { .. } => "RateLimited",
            AppError::Storage(_) => "Storage",
            AppError::Internal(_) | AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error message including the source chain
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

    /// Seconds a client should wait before retrying, for capacity errors.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            AppError::QueueFull { retry_after_secs }
            | AppError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Offending metadata keys, for schema errors.
    pub fn invalid_fields(&self) -> Option<&[String]> {
        match self {
            AppError::InvalidMetadata { fields } => Some(fields),
            _ => None,
        }
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

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::MissingFile(ref msg) => msg.clone(),
            AppError::InvalidFileType(_) => "invalid file type".to_string(),
            AppError::EmptyFile => "uploaded file is empty".to_string(),
            AppError::PayloadTooLarge(ref msg) => msg.clone(),
            AppError::MetadataTooLarge { size, max } => {
                format!("metadata is {} bytes, limit is {} bytes", size, max)
            }
            AppError::InvalidMetadata { .. } => "invalid metadata".to_string(),
            AppError::InvalidId(_) => "invalid scan id".to_string(),
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::Unauthorized(ref msg) => msg.clone(),
            AppError::QueueFull { .. } => "conversion queue is full".to_string(),
            AppError::ServiceUnavailable(ref msg) => msg.clone(),
            AppError::RateLimited { .. } => "too many requests".to_string(),
            AppError::Storage(_) => "Failed to access storage".to_string(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
        }
    }
}
