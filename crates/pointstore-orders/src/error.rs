//! Saga step error types

use pointstore_common::types::BBoxError;
use pointstore_common::ErrorKind;
use serde_json::{json, Value};
use thiserror::Error;

use crate::grid::GridError;
use crate::query::QueryError;
use crate::state::OrderStoreError;

/// Result type alias for saga steps
pub type SagaResult<T> = std::result::Result<T, SagaError>;

/// Errors a saga step reports to the orchestrator
#[derive(Error, Debug)]
pub enum SagaError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid bounding box: {0}")]
    InvalidBBox(#[from] BBoxError),

    #[error(transparent)]
    Store(#[from] OrderStoreError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("Datasets for order {0} are not staged correctly")]
    DatasetsNotStaged(String),

    #[error("Order {0} has no deliverable output")]
    NoDeliverable(String),

    #[error("{context}: {cause:#}")]
    Dependency {
        context: String,
        cause: anyhow::Error,
    },

    #[error("Invalid step payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl SagaError {
    pub fn dependency(context: impl Into<String>, cause: anyhow::Error) -> Self {
        SagaError::Dependency {
            context: context.into(),
            cause,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SagaError::Validation(_) | SagaError::InvalidBBox(_) | SagaError::Payload(_) => {
                ErrorKind::Validation
            },
            SagaError::Store(e) => e.kind(),
            SagaError::Query(e) => e.kind(),
            SagaError::Grid(e) => e.kind(),
            SagaError::DatasetsNotStaged(_) | SagaError::NoDeliverable(_) => ErrorKind::Execution,
            SagaError::Dependency { .. } => ErrorKind::Dependency,
        }
    }

    /// Failure body handed to the orchestrator: `{"error": <code>, "cause": <message>}`
    pub fn to_failure(&self) -> Value {
        json!({
            "error": self.kind().as_str(),
            "cause": self.to_string(),
            "retryable": self.kind().is_retryable(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_delegates_to_source() {
        let store = SagaError::from(OrderStoreError::Backend("timeout".into()));
        assert_eq!(store.kind(), ErrorKind::Dependency);

        let grid = SagaError::from(GridError::NoDataFiles);
        assert_eq!(grid.kind(), ErrorKind::Validation);

        let bbox = SagaError::from(BBoxError::WrongCoordinateCount(3));
        assert_eq!(bbox.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_failure_payload() {
        let err = SagaError::DatasetsNotStaged("abc".into());
        let failure = err.to_failure();
        assert_eq!(failure["error"], "ExecutionError");
        assert_eq!(failure["retryable"], false);
        assert_eq!(
            failure["cause"],
            "Datasets for order abc are not staged correctly"
        );
    }
}
