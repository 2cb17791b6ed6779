//! Error types for artifact operations.
//!
//! Errors are categorized so callers can retry transient failures and give
//! appropriate feedback for the rest.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for artifact operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of artifact errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network-related errors (transient, retryable).
    Network,
    /// Platform not supported or not recognized.
    Platform,
    /// No artifact for the requested combination.
    NotFound,
    /// Downloaded content failed verification.
    Integrity,
    /// Malformed catalog entry.
    Catalog,
    /// Permission denied on the local filesystem.
    Permission,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Platform => "Unsupported platform",
            Self::NotFound => "No matching artifact",
            Self::Integrity => "Content hash mismatch",
            Self::Catalog => "Invalid catalog entry",
            Self::Permission => "Permission denied",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check connectivity to the artifact source and try again",
            Self::Platform => "Pass --distribution/--architecture explicitly if detection is wrong",
            Self::NotFound => "Pick a version listed by `nodeup artifacts list`",
            Self::Integrity => "The source may have been replaced; verify the catalog hash",
            Self::Catalog => "Fix the catalog entry's source or hash",
            Self::Permission => "Check cache directory permissions or run as root",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during artifact operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The running host is not a supported platform.
    #[error("unsupported platform: {os}/{arch}")]
    UnsupportedPlatform {
        /// Operating system.
        os: String,
        /// CPU architecture.
        arch: String,
    },

    /// A distribution name or os-release file could not be recognized.
    #[error("unknown distribution: {0}")]
    UnknownDistribution(String),

    /// An architecture name could not be recognized.
    #[error("unknown architecture: {0}")]
    UnknownArchitecture(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {message}")]
    HttpError {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// Failed to download an artifact.
    #[error("download failed for {url}: {message}")]
    DownloadFailed {
        /// Source URL.
        url: String,
        /// Error message.
        message: String,
    },

    /// Downloaded bytes do not match the expected content hash.
    #[error("hash mismatch for {url}: expected {expected}, got {actual}")]
    HashMismatch {
        /// Source URL.
        url: String,
        /// Hash from the catalog.
        expected: String,
        /// Hash of the downloaded content.
        actual: String,
    },

    /// A content hash is not valid hex SHA-1 or SHA-256.
    #[error("invalid content hash {0:?}")]
    InvalidHash(String),

    /// A catalog entry is malformed.
    #[error("invalid catalog entry {name} {version}: {reason}")]
    InvalidEntry {
        /// Logical artifact name.
        name: String,
        /// Requested version tag.
        version: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Selection returned nothing and the caller requires a match.
    #[error("no artifact for {distribution}/{architecture} version {version}")]
    NoMatchingArtifact {
        /// Distribution requested.
        distribution: String,
        /// Architecture requested.
        architecture: String,
        /// Version requested.
        version: String,
    },

    /// IO error during file operations.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an HTTP error.
    pub fn http(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::HttpError {
            message: message.into(),
            status,
        }
    }

    /// Get the error category for retry logic.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::UnsupportedPlatform { .. }
            | Error::UnknownDistribution(_)
            | Error::UnknownArchitecture(_) => ErrorCategory::Platform,
            Error::HttpError { status, .. } => match status {
                Some(code) if (400..500).contains(code) && *code != 429 => ErrorCategory::NotFound,
                _ => ErrorCategory::Network,
            },
            Error::DownloadFailed { .. } => ErrorCategory::Network,
            Error::HashMismatch { .. } => ErrorCategory::Integrity,
            Error::InvalidHash(_) | Error::InvalidEntry { .. } => ErrorCategory::Catalog,
            Error::NoMatchingArtifact { .. } => ErrorCategory::NotFound,
            Error::Io { source, .. } => {
                if source.kind() == io::ErrorKind::PermissionDenied {
                    ErrorCategory::Permission
                } else {
                    ErrorCategory::Other
                }
            }
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::HttpError {
                message: format!("HTTP {}", code),
                status: Some(code),
            },
            other => Self::HttpError {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Network.is_retryable());
        assert!(!ErrorCategory::Platform.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
        assert!(!ErrorCategory::Integrity.is_retryable());
        assert!(!ErrorCategory::Catalog.is_retryable());
        assert!(!ErrorCategory::Other.is_retryable());
    }

    #[test]
    fn test_http_status_categories() {
        assert!(Error::http("bad gateway", Some(502)).is_retryable());
        assert!(Error::http("reset", None).is_retryable());
        assert!(Error::http("too many", Some(429)).is_retryable());
        assert_eq!(
            Error::http("gone", Some(404)).category(),
            ErrorCategory::NotFound
        );
    }

    #[test]
    fn test_hash_mismatch_is_not_retried() {
        let err = Error::HashMismatch {
            url: "https://example.com/a.deb".into(),
            expected: "aa".into(),
            actual: "bb".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Integrity);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("expected aa"));
    }

    #[test]
    fn test_error_io_permission_denied_category() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "permission denied");
        let err = Error::io("/var/cache/nodeup", io_err);
        assert_eq!(err.category(), ErrorCategory::Permission);
    }

    #[test]
    fn test_no_matching_artifact_display() {
        let err = Error::NoMatchingArtifact {
            distribution: "flatcar".into(),
            architecture: "arm64".into(),
            version: "1.2.4".into(),
        };
        assert_eq!(err.to_string(), "no artifact for flatcar/arm64 version 1.2.4");
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }
}
