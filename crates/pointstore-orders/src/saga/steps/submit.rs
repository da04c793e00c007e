//! Order submission
//!
//! Validates an extract request, assigns it an order id and starts the saga.
//! Nothing is persisted here; `insert_order` is the saga's first step.

use pointstore_common::types::{BBox, RawBBox};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{SagaError, SagaResult};
use crate::grid::GridParams;
use crate::query::DatasetFilters;
use crate::saga::Orchestrator;

/// Extract request as submitted by a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOrderCommand {
    /// Empty or absent means "do not notify"
    #[serde(default)]
    pub email: Option<String>,

    /// Four numbers or the legacy comma-separated string
    pub bbox: RawBBox,

    /// One entry per source dataset
    pub datasets: Vec<DatasetFilters>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridParams>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOrderResponse {
    pub order_id: String,
    pub execution_id: String,
    pub message: String,
}

impl SubmitOrderCommand {
    /// Validate the request and return its normalized bounding box
    pub fn validate(&self) -> SagaResult<BBox> {
        let bbox = BBox::validate(&self.bbox)?;

        if self.datasets.is_empty() {
            return Err(SagaError::Validation(
                "at least one dataset is required".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        for dataset in &self.datasets {
            if !seen.insert(dataset.label) {
                return Err(SagaError::Validation(format!(
                    "dataset '{}' is listed more than once",
                    dataset.label
                )));
            }
        }

        if let Some(email) = self.email.as_deref().map(str::trim) {
            if !email.is_empty() && !is_plausible_email(email) {
                return Err(SagaError::Validation(format!(
                    "'{}' is not an email address",
                    email
                )));
            }
        }

        Ok(bbox)
    }

    /// Saga input: the request with its order id and normalized bbox
    pub fn saga_input(&self, order_id: &str, bbox: &BBox) -> SagaResult<Value> {
        let mut input = serde_json::to_value(self)?;
        if let Value::Object(fields) = &mut input {
            fields.insert("order_id".to_string(), Value::from(order_id));
            fields.insert("bbox".to_string(), serde_json::to_value(bbox)?);
        }
        Ok(input)
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        },
        None => false,
    }
}

/// Validate the request and start a saga for it
#[instrument(skip_all)]
pub async fn submit_order(
    orchestrator: &dyn Orchestrator,
    command: SubmitOrderCommand,
) -> SagaResult<SubmitOrderResponse> {
    let bbox = command.validate()?;

    let order_id = Uuid::new_v4().to_string();
    let input = command.saga_input(&order_id, &bbox)?;

    let execution_id = orchestrator
        .start_saga(&order_id, &input)
        .await
        .map_err(|e| SagaError::dependency("Failed to start order saga", e))?;

    tracing::info!(order_id = %order_id, datasets = command.datasets.len(), "Order submitted");

    Ok(SubmitOrderResponse {
        message: format!("extract request {} created.", order_id),
        order_id,
        execution_id,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn command(value: Value) -> SubmitOrderCommand {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_validate_accepts_legacy_bbox_string() {
        let cmd = command(json!({
            "email": "someone@example.com",
            "bbox": " 5, 60, 6, 61 ",
            "datasets": [{"label": "csb"}]
        }));
        let bbox = cmd.validate().unwrap();
        assert_eq!(bbox.to_array(), [5.0, 60.0, 6.0, 61.0]);
    }

    #[test]
    fn test_validate_rejects_bad_requests() {
        let bad_bbox = command(json!({"bbox": [6, 60, 5, 61], "datasets": [{"label": "csb"}]}));
        assert!(matches!(bad_bbox.validate(), Err(SagaError::InvalidBBox(_))));

        let no_datasets = command(json!({"bbox": [5, 60, 6, 61], "datasets": []}));
        assert!(matches!(no_datasets.validate(), Err(SagaError::Validation(_))));

        let duplicate = command(json!({
            "bbox": [5, 60, 6, 61],
            "datasets": [{"label": "csb"}, {"type": "csb"}]
        }));
        assert!(matches!(duplicate.validate(), Err(SagaError::Validation(_))));

        let bad_email = command(json!({
            "email": "not-an-address",
            "bbox": [5, 60, 6, 61],
            "datasets": [{"label": "csb"}]
        }));
        assert!(matches!(bad_email.validate(), Err(SagaError::Validation(_))));
    }

    #[test]
    fn test_empty_email_is_allowed() {
        let cmd = command(json!({
            "email": "",
            "bbox": [5, 60, 6, 61],
            "datasets": [{"label": "multibeam"}]
        }));
        assert!(cmd.validate().is_ok());
    }

    #[test]
    fn test_invalid_grid_is_rejected() {
        let result = serde_json::from_value::<SubmitOrderCommand>(json!({
            "bbox": [5, 60, 6, 61],
            "datasets": [{"label": "csb"}],
            "grid": {"resolution": 0}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_saga_input() {
        let cmd = command(json!({
            "bbox": "5,60,6,61",
            "datasets": [{"label": "csb", "providers": ["PGS"]}],
            "grid": {"resolution": 100}
        }));
        let bbox = cmd.validate().unwrap();
        let input = cmd.saga_input("abc", &bbox).unwrap();

        assert_eq!(input["order_id"], "abc");
        assert_eq!(input["bbox"], json!([5.0, 60.0, 6.0, 61.0]));
        assert_eq!(input["datasets"][0]["providers"], json!(["PGS"]));
        assert_eq!(input["grid"]["format"], 3);
    }
}
