//! Error types for APK Finder.
//!
//! One error enum covers the whole core. Each variant maps to an HTTP status
//! category through [`ApkFinderError::status_code`], and the retry/fallback
//! machinery classifies variants with [`ApkFinderError::is_contention`] and
//! [`ApkFinderError::is_retryable`].

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the APK Finder core.
#[derive(Debug, Error)]
pub enum ApkFinderError {
    // Remote share errors
    #[error("Unknown share: {0}")]
    UnknownShare(String),

    #[error("Share {share} is unavailable: {message}")]
    ShareUnavailable { share: String, message: String },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Resource busy: {path}: {message}")]
    Contention { path: String, message: String },

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed entry {path}: {message}")]
    MalformedEntry { path: String, message: String },

    // Download errors
    #[error("Requested range not satisfiable for size {size}")]
    InvalidRange { size: u64 },

    #[error("All download strategies failed for {path}: {message}")]
    StreamUnavailable { path: String, message: String },

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Request errors
    #[error("Invalid or missing bearer token")]
    Unauthorized,

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for APK Finder operations.
pub type Result<T> = std::result::Result<T, ApkFinderError>;

impl From<std::io::Error> for ApkFinderError {
    fn from(err: std::io::Error) -> Self {
        ApkFinderError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for ApkFinderError {
    fn from(err: serde_json::Error) -> Self {
        ApkFinderError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for ApkFinderError {
    fn from(err: rusqlite::Error) -> Self {
        ApkFinderError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl ApkFinderError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ApkFinderError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// HTTP status code for this error category.
    ///
    /// - 400: validation
    /// - 401: authentication
    /// - 404: unknown share, missing file, unavailable share
    /// - 416: unsatisfiable range
    /// - 500: everything else
    pub fn status_code(&self) -> u16 {
        match self {
            ApkFinderError::Validation { .. } => 400,
            ApkFinderError::Unauthorized => 401,
            ApkFinderError::UnknownShare(_)
            | ApkFinderError::ShareUnavailable { .. }
            | ApkFinderError::FileNotFound(_) => 404,
            ApkFinderError::InvalidRange { .. } => 416,
            _ => 500,
        }
    }

    /// True for transient "busy / locked" conditions on the remote share.
    pub fn is_contention(&self) -> bool {
        matches!(self, ApkFinderError::Contention { .. })
    }

    /// True when another attempt (or another strategy) may succeed.
    ///
    /// Missing files, unknown shares and bad requests are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApkFinderError::Contention { .. }
                | ApkFinderError::Timeout(_)
                | ApkFinderError::MalformedEntry { .. }
                | ApkFinderError::Io { .. }
                | ApkFinderError::StreamUnavailable { .. }
        )
    }

    /// True when the catalog store itself failed.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, ApkFinderError::Database { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ApkFinderError::UnknownShare("server_9".into());
        assert_eq!(err.to_string(), "Unknown share: server_9");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ApkFinderError::Unauthorized.status_code(), 401);
        assert_eq!(
            ApkFinderError::FileNotFound("/a.apk".into()).status_code(),
            404
        );
        assert_eq!(
            ApkFinderError::InvalidRange { size: 100 }.status_code(),
            416
        );
        assert_eq!(ApkFinderError::Other("boom".into()).status_code(), 500);
    }

    #[test]
    fn test_retryable_errors() {
        let busy = ApkFinderError::Contention {
            path: "/a.apk".into(),
            message: "locked".into(),
        };
        assert!(busy.is_contention());
        assert!(busy.is_retryable());
        assert!(ApkFinderError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(!ApkFinderError::FileNotFound("/a.apk".into()).is_retryable());
        assert!(!ApkFinderError::UnknownShare("x".into()).is_retryable());
    }
}
