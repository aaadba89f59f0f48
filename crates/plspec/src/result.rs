//! Result and error types for plspec.

use crate::object::ObjectId;
use thiserror::Error;

/// Result type for plspec operations
pub type PlspecResult<T> = Result<T, CoverageError>;

/// Errors that can occur in the coverage engine
#[derive(Debug, Error)]
pub enum CoverageError {
    /// Catalog metadata could not be read
    #[error("Catalog access failed: {message}")]
    CatalogAccess {
        /// Error message
        message: String,
    },

    /// Instrumented source could not be deployed for an object
    #[error("Instrumentation of {object} failed: {message}")]
    Instrumentation {
        /// Object that failed
        object: ObjectId,
        /// Error message
        message: String,
    },

    /// Original source could not be redeployed for an object
    #[error("Restoration of {object} failed: {message}")]
    Restoration {
        /// Object that failed
        object: ObjectId,
        /// Error message
        message: String,
    },

    /// Counter data could not be read for an object
    #[error("Counters for {object} unavailable: {message}")]
    Aggregation {
        /// Object that failed
        object: ObjectId,
        /// Error message
        message: String,
    },

    /// The database rejected a definition (compile error)
    #[error("Deploying {object} failed: {message}")]
    Deploy {
        /// Object that was being deployed
        object: ObjectId,
        /// Compiler message
        message: String,
    },

    /// Object has no source in the catalog
    #[error("Object not found: {object}")]
    ObjectNotFound {
        /// Object that was looked up
        object: ObjectId,
    },

    /// Counter store could not be installed or cleared
    #[error("Execution tracker error: {message}")]
    Tracker {
        /// Error message
        message: String,
    },

    /// Name pattern failed to compile
    #[error("Invalid name pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The rejected pattern
        pattern: String,
        /// Error message
        message: String,
    },

    /// Ctrl-C arrived before the tests started; instrumentation was rolled back
    #[error("Interrupted during instrumentation; {unrestored} objects left instrumented")]
    Interrupted {
        /// Objects whose original could not be put back
        unrestored: usize,
    },

    /// Restore manifest unreadable or inconsistent
    #[error("Restore manifest error: {message}")]
    Manifest {
        /// Error message
        message: String,
    },

    /// SQLite error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoverageError {
    /// Create a catalog access error
    #[must_use]
    pub fn catalog(message: impl Into<String>) -> Self {
        Self::CatalogAccess {
            message: message.into(),
        }
    }

    /// Create a tracker error
    #[must_use]
    pub fn tracker(message: impl Into<String>) -> Self {
        Self::Tracker {
            message: message.into(),
        }
    }

    /// Create a manifest error
    #[must_use]
    pub fn manifest(message: impl Into<String>) -> Self {
        Self::Manifest {
            message: message.into(),
        }
    }

    /// Whether this error aborts a whole run rather than a single object
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::CatalogAccess { .. } | Self::Tracker { .. } | Self::InvalidPattern { .. }
        )
    }

    /// The object this error is about, if it concerns a single object
    #[must_use]
    pub const fn object(&self) -> Option<&ObjectId> {
        match self {
            Self::Instrumentation { object, .. }
            | Self::Restoration { object, .. }
            | Self::Aggregation { object, .. }
            | Self::Deploy { object, .. }
            | Self::ObjectNotFound { object } => Some(object),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::object::ObjectType;

    fn sample_object() -> ObjectId {
        ObjectId::new("HR", "PAYROLL", ObjectType::PackageBody)
    }

    #[test]
    fn test_catalog_error_is_fatal() {
        let err = CoverageError::catalog("ORA-00942: table or view does not exist");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("Catalog access"));
        assert!(err.object().is_none());
    }

    #[test]
    fn test_per_object_errors_are_not_fatal() {
        let err = CoverageError::Restoration {
            object: sample_object(),
            message: "insufficient privileges".to_string(),
        };
        assert!(!err.is_fatal());
        assert_eq!(err.object(), Some(&sample_object()));
        assert!(err.to_string().contains("HR.PAYROLL"));
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: CoverageError = io_err.into();
        assert!(err.to_string().contains("I/O"));
    }
}
