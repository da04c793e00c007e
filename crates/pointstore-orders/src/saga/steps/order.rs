//! Order record steps

use chrono::Utc;
use pointstore_common::types::{BBox, DatasetLabel, RawBBox, S3Location};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use super::require_order_id;
use crate::error::{SagaError, SagaResult};
use crate::grid::GridParams;
use crate::saga::format_ready_message;
use crate::state::{Order, OrderStatus, OrderStore, OrderStoreError};

/// Persist a newly started order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertOrderCommand {
    pub order_id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub bbox: RawBBox,
    #[serde(default)]
    pub grid: Option<GridParams>,
}

impl InsertOrderCommand {
    pub fn validate(&self) -> SagaResult<BBox> {
        require_order_id(&self.order_id)?;
        Ok(BBox::validate(&self.bbox)?)
    }
}

#[instrument(skip_all, fields(order_id = %command.order_id))]
pub async fn insert_order(store: &dyn OrderStore, command: InsertOrderCommand) -> SagaResult<Order> {
    let bbox = command.validate()?;
    let order = Order::new(command.order_id, command.email, bbox, command.grid);
    let stored = store.create_order(&order).await?;
    info!(status = %stored.status, "Order recorded");
    Ok(stored)
}

/// Check that every dataset is staged and advance the order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyDatasetsCommand {
    pub order_id: String,
}

#[instrument(skip_all, fields(order_id = %command.order_id))]
pub async fn verify_datasets(
    store: &dyn OrderStore,
    command: VerifyDatasetsCommand,
) -> SagaResult<Value> {
    require_order_id(&command.order_id)?;

    if !store.all_datasets_complete(&command.order_id).await? {
        warn!("Datasets are not all complete");
        return Err(SagaError::DatasetsNotStaged(command.order_id));
    }

    store
        .update_order_status(&command.order_id, OrderStatus::DataStaged, None)
        .await?;
    info!("Order data staged");

    Ok(json!({
        "order_id": command.order_id,
        "status": "SUCCESS",
    }))
}

/// Finalize the order with its deliverable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteOrderCommand {
    pub order_id: String,
    /// Grid artifact, when one was produced
    #[serde(default)]
    pub output_location: Option<S3Location>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteOrderResponse {
    pub order_id: String,
    pub output_location: S3Location,
    /// Text for the requester
    pub message: String,
}

/// Mark the order complete; without a grid the `csb` extract is delivered
#[instrument(skip_all, fields(order_id = %command.order_id))]
pub async fn complete_order(
    store: &dyn OrderStore,
    command: CompleteOrderCommand,
) -> SagaResult<CompleteOrderResponse> {
    require_order_id(&command.order_id)?;

    let output_location = match command.output_location {
        Some(location) => location,
        None => {
            let extract = match store.get_dataset(&command.order_id, DatasetLabel::Csb).await {
                Ok(dataset) => dataset.output_location,
                Err(OrderStoreError::NotFound { .. }) => None,
                Err(e) => return Err(e.into()),
            };
            extract.ok_or_else(|| SagaError::NoDeliverable(command.order_id.clone()))?
        },
    };

    store
        .update_order_status(
            &command.order_id,
            OrderStatus::Complete,
            Some(&output_location),
        )
        .await?;
    info!(output_location = %output_location, "Order complete");

    Ok(CompleteOrderResponse {
        message: format_ready_message(&output_location, Utc::now()),
        order_id: command.order_id,
        output_location,
    })
}

/// Move the order to `error`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailOrderCommand {
    pub order_id: String,
    #[serde(default)]
    pub cause: Option<String>,
}

#[instrument(skip_all, fields(order_id = %command.order_id))]
pub async fn fail_order(store: &dyn OrderStore, command: FailOrderCommand) -> SagaResult<Order> {
    require_order_id(&command.order_id)?;
    let order = store
        .update_order_status(&command.order_id, OrderStatus::Error, None)
        .await?;
    warn!(cause = command.cause.as_deref().unwrap_or("unknown"), "Order failed");
    Ok(order)
}
