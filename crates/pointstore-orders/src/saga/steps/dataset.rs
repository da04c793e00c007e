//! Per-dataset bookkeeping steps

use pointstore_common::types::{DatasetLabel, S3Location};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::require_order_id;
use crate::error::SagaResult;
use crate::state::{Dataset, DatasetStatus, OrderStatus, OrderStore};

/// Record that processing of one dataset has begun
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartDatasetCommand {
    pub order_id: String,
    #[serde(alias = "type")]
    pub label: DatasetLabel,
}

/// Create the dataset record and move a fresh order to `processing`
#[instrument(skip_all, fields(order_id = %command.order_id, dataset = %command.label))]
pub async fn start_dataset(
    store: &dyn OrderStore,
    command: StartDatasetCommand,
) -> SagaResult<Dataset> {
    require_order_id(&command.order_id)?;

    let dataset = store.create_dataset(&command.order_id, command.label).await?;

    let order = store.get_order(&command.order_id).await?;
    if order.status == OrderStatus::Initialized {
        store
            .update_order_status(&command.order_id, OrderStatus::Processing, None)
            .await?;
    }

    info!(status = %dataset.status, "Dataset started");
    Ok(dataset)
}

/// Outcome of one dataset's query or catalog lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDatasetCommand {
    pub order_id: String,
    #[serde(alias = "type")]
    pub label: DatasetLabel,
    pub status: DatasetStatus,
    #[serde(default)]
    pub output_location: Option<S3Location>,
}

#[instrument(skip_all, fields(order_id = %command.order_id, dataset = %command.label))]
pub async fn update_dataset(
    store: &dyn OrderStore,
    command: UpdateDatasetCommand,
) -> SagaResult<Dataset> {
    require_order_id(&command.order_id)?;
    let dataset = store
        .update_dataset_status(
            &command.order_id,
            command.label,
            command.status,
            command.output_location.as_ref(),
        )
        .await?;
    info!(status = %dataset.status, "Dataset updated");
    Ok(dataset)
}

/// Error handler for a failed dataset branch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetFailedCommand {
    pub order_id: String,
    #[serde(alias = "type")]
    pub label: DatasetLabel,
    #[serde(default)]
    pub cause: Option<String>,
}

#[instrument(skip_all, fields(order_id = %command.order_id, dataset = %command.label))]
pub async fn dataset_failed(
    store: &dyn OrderStore,
    command: DatasetFailedCommand,
) -> SagaResult<Dataset> {
    require_order_id(&command.order_id)?;
    let dataset = store
        .update_dataset_status(
            &command.order_id,
            command.label,
            DatasetStatus::Error,
            None,
        )
        .await?;
    warn!(
        cause = command.cause.as_deref().unwrap_or("unknown"),
        "Dataset failed"
    );
    Ok(dataset)
}
