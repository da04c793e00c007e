//! Error types for Pointstore
//!
//! Every component defines its own error enum; all of them classify into
//! one [`ErrorKind`] so the saga boundary can decide what happens next.

use thiserror::Error;

/// Error classification shared by all components
///
/// - `Validation`: bad user input, never retried
/// - `Dependency`: state store or storage unavailable, retried by the orchestrator
/// - `DataQuality`: a single malformed record, recovered locally
/// - `Execution`: external tool failed or produced nothing usable, terminal for the order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Dependency,
    DataQuality,
    Execution,
}

impl ErrorKind {
    /// Error code reported to the orchestrator when a step fails
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Dependency => "DependencyError",
            ErrorKind::DataQuality => "DataQualityError",
            ErrorKind::Execution => "ExecutionError",
        }
    }

    /// Whether the orchestrator may usefully retry the failed step
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Dependency)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse failure of a shared domain value
#[derive(Error, Debug)]
pub enum PointstoreError {
    #[error("Invalid bounding box: {0}")]
    InvalidBBox(String),

    #[error("Unknown dataset label: {0}")]
    UnknownDataset(String),

    #[error("Invalid storage location: {0}")]
    InvalidLocation(String),
}

impl PointstoreError {
    /// All of these come from user input
    pub fn kind(&self) -> ErrorKind {
        match self {
            PointstoreError::InvalidBBox(_)
            | PointstoreError::UnknownDataset(_)
            | PointstoreError::InvalidLocation(_) => ErrorKind::Validation,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_classification() {
        assert_eq!(
            PointstoreError::InvalidBBox("x".to_string()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            PointstoreError::UnknownDataset("sonar".to_string()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            PointstoreError::InvalidLocation("http://x".to_string()).kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn test_only_dependency_errors_are_retryable() {
        assert!(ErrorKind::Dependency.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::Execution.is_retryable());
        assert!(!ErrorKind::DataQuality.is_retryable());
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::DataQuality).unwrap();
        assert_eq!(json, "\"data_quality\"");
        assert_eq!(ErrorKind::Execution.to_string(), "ExecutionError");
    }
}
