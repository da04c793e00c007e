//! Durable order and dataset state
//!
//! One item per order and one per `(order, dataset label)`, all sharing the
//! order's partition key:
//!
//! | record  | PK               | SK                 |
//! |---------|------------------|--------------------|
//! | order   | `ORDER#<id>`     | `ORDER`            |
//! | dataset | `ORDER#<id>`     | `DATASET#<label>`  |
//!
//! Status writes are conditional: a write is accepted only if the stored
//! status is one of [`OrderStatus::allowed_predecessors`] (or the dataset
//! equivalent), so a retried or late step can never move a record backwards
//! or out of `error`.

use async_trait::async_trait;
use pointstore_common::{
    types::{DatasetLabel, S3Location},
    ErrorKind,
};
use thiserror::Error;

pub mod dynamo;
pub mod memory;
pub mod models;

pub use dynamo::DynamoOrderStore;
pub use memory::InMemoryOrderStore;
pub use models::{Dataset, DatasetStatus, Order, OrderStatus, WriteStamp};

/// Errors raised by an [`OrderStore`]
#[derive(Debug, Error)]
pub enum OrderStoreError {
    #[error("No item {pk}/{sk}")]
    NotFound { pk: String, sk: String },

    #[error("Cannot move {record} from '{from}' to '{to}'")]
    InvalidTransition {
        record: String,
        from: String,
        to: String,
    },

    #[error("No dataset items found for order {0}")]
    NoDatasetsFound(String),

    #[error("Malformed item {pk}/{sk}: {reason}")]
    Corrupt {
        pk: String,
        sk: String,
        reason: String,
    },

    #[error("State store unavailable: {0}")]
    Backend(String),
}

impl OrderStoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderStoreError::NotFound { .. } | OrderStoreError::InvalidTransition { .. } => {
                ErrorKind::Validation
            },
            OrderStoreError::NoDatasetsFound(_) | OrderStoreError::Corrupt { .. } => {
                ErrorKind::Execution
            },
            OrderStoreError::Backend(_) => ErrorKind::Dependency,
        }
    }

    pub(crate) fn order_not_found(order_id: &str) -> Self {
        OrderStoreError::NotFound {
            pk: models::order_pk(order_id),
            sk: models::ORDER_SK.to_string(),
        }
    }

    pub(crate) fn dataset_not_found(order_id: &str, label: DatasetLabel) -> Self {
        OrderStoreError::NotFound {
            pk: models::order_pk(order_id),
            sk: models::dataset_sk(label),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, OrderStoreError>;

/// Order/dataset persistence with conditional status writes
///
/// Every write refreshes `last_update` and `ttl`. An omitted
/// `output_location` keeps whatever is stored.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order; a second insert for the same id is a no-op
    async fn create_order(&self, order: &Order) -> StoreResult<Order>;

    /// Insert a `processing` dataset record for an existing order
    ///
    /// If the dataset already exists it is returned unchanged.
    async fn create_dataset(&self, order_id: &str, label: DatasetLabel) -> StoreResult<Dataset>;

    async fn update_dataset_status(
        &self,
        order_id: &str,
        label: DatasetLabel,
        status: DatasetStatus,
        output_location: Option<&S3Location>,
    ) -> StoreResult<Dataset>;

    async fn update_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        output_location: Option<&S3Location>,
    ) -> StoreResult<Order>;

    async fn get_order(&self, order_id: &str) -> StoreResult<Order>;

    async fn get_dataset(&self, order_id: &str, label: DatasetLabel) -> StoreResult<Dataset>;

    /// All dataset records of an order, ordered by label
    async fn list_datasets(&self, order_id: &str) -> StoreResult<Vec<Dataset>>;

    /// Whether every dataset of the order is `complete`
    ///
    /// Fails with [`OrderStoreError::NoDatasetsFound`] when the order has none.
    async fn all_datasets_complete(&self, order_id: &str) -> StoreResult<bool> {
        let datasets = self.list_datasets(order_id).await?;
        if datasets.is_empty() {
            return Err(OrderStoreError::NoDatasetsFound(order_id.to_string()));
        }
        Ok(datasets
            .iter()
            .all(|dataset| dataset.status == DatasetStatus::Complete))
    }
}
