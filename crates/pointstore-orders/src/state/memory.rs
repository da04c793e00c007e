//! In-process [`OrderStore`] for tests and local runs

use async_trait::async_trait;
use pointstore_common::types::{DatasetLabel, S3Location};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::models::{Dataset, DatasetStatus, Order, OrderStatus, WriteStamp};
use super::{OrderStore, OrderStoreError, StoreResult};

#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<String, Order>>,
    datasets: RwLock<BTreeMap<(String, DatasetLabel), Dataset>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_order(&self, order: &Order) -> StoreResult<Order> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .entry(order.order_id.clone())
            .or_insert_with(|| order.clone());
        Ok(stored.clone())
    }

    async fn create_dataset(&self, order_id: &str, label: DatasetLabel) -> StoreResult<Dataset> {
        if !self.orders.read().await.contains_key(order_id) {
            return Err(OrderStoreError::order_not_found(order_id));
        }

        let mut datasets = self.datasets.write().await;
        let stored = datasets
            .entry((order_id.to_string(), label))
            .or_insert_with(|| Dataset::new(order_id, label));
        Ok(stored.clone())
    }

    async fn update_dataset_status(
        &self,
        order_id: &str,
        label: DatasetLabel,
        status: DatasetStatus,
        output_location: Option<&S3Location>,
    ) -> StoreResult<Dataset> {
        let mut datasets = self.datasets.write().await;
        let dataset = datasets
            .get_mut(&(order_id.to_string(), label))
            .ok_or_else(|| OrderStoreError::dataset_not_found(order_id, label))?;

        if !status.can_follow(dataset.status) {
            return Err(OrderStoreError::InvalidTransition {
                record: format!("dataset {}/{}", order_id, label),
                from: dataset.status.to_string(),
                to: status.to_string(),
            });
        }

        let stamp = WriteStamp::now();
        dataset.status = status;
        dataset.last_update = stamp.last_update;
        dataset.ttl = stamp.ttl;
        if let Some(location) = output_location {
            dataset.output_location = Some(location.clone());
        }
        Ok(dataset.clone())
    }

    async fn update_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        output_location: Option<&S3Location>,
    ) -> StoreResult<Order> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| OrderStoreError::order_not_found(order_id))?;

        if !status.can_follow(order.status) {
            return Err(OrderStoreError::InvalidTransition {
                record: format!("order {}", order_id),
                from: order.status.to_string(),
                to: status.to_string(),
            });
        }

        let stamp = WriteStamp::now();
        order.status = status;
        order.last_update = stamp.last_update;
        order.ttl = stamp.ttl;
        if let Some(location) = output_location {
            order.output_location = Some(location.clone());
        }
        Ok(order.clone())
    }

    async fn get_order(&self, order_id: &str) -> StoreResult<Order> {
        self.orders
            .read()
            .await
            .get(order_id)
            .cloned()
            .ok_or_else(|| OrderStoreError::order_not_found(order_id))
    }

    async fn get_dataset(&self, order_id: &str, label: DatasetLabel) -> StoreResult<Dataset> {
        self.datasets
            .read()
            .await
            .get(&(order_id.to_string(), label))
            .cloned()
            .ok_or_else(|| OrderStoreError::dataset_not_found(order_id, label))
    }

    async fn list_datasets(&self, order_id: &str) -> StoreResult<Vec<Dataset>> {
        Ok(self
            .datasets
            .read()
            .await
            .iter()
            .filter(|((id, _), _)| id == order_id)
            .map(|(_, dataset)| dataset.clone())
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use pointstore_common::types::BBox;

    fn order(order_id: &str) -> Order {
        let bbox = BBox::from_coords(&[5.0, 60.0, 6.0, 61.0]).unwrap();
        Order::new(order_id, Some("someone@example.com".to_string()), bbox, None)
    }

    async fn store_with_order(order_id: &str) -> InMemoryOrderStore {
        let store = InMemoryOrderStore::new();
        store.create_order(&order(order_id)).await.unwrap();
        store
    }

    // ========================================================================
    // Completeness
    // ========================================================================

    #[tokio::test]
    async fn test_all_complete() {
        let store = store_with_order("o1").await;
        let location = S3Location::new("csb-order-output", "o1.csv");
        for label in DatasetLabel::ALL {
            store.create_dataset("o1", label).await.unwrap();
            store
                .update_dataset_status("o1", label, DatasetStatus::Complete, Some(&location))
                .await
                .unwrap();
        }
        assert!(store.all_datasets_complete("o1").await.unwrap());
    }

    #[tokio::test]
    async fn test_one_still_processing() {
        let store = store_with_order("o1").await;
        store.create_dataset("o1", DatasetLabel::Csb).await.unwrap();
        store.create_dataset("o1", DatasetLabel::Multibeam).await.unwrap();
        store
            .update_dataset_status("o1", DatasetLabel::Csb, DatasetStatus::Complete, None)
            .await
            .unwrap();
        assert!(!store.all_datasets_complete("o1").await.unwrap());
    }

    #[tokio::test]
    async fn test_no_datasets() {
        let store = store_with_order("o1").await;
        assert!(matches!(
            store.all_datasets_complete("o1").await,
            Err(OrderStoreError::NoDatasetsFound(id)) if id == "o1"
        ));
    }

    // ========================================================================
    // Conditional writes
    // ========================================================================

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let store = store_with_order("o1").await;
        store
            .update_order_status("o1", OrderStatus::Processing, None)
            .await
            .unwrap();

        let again = store.create_order(&order("o1")).await.unwrap();
        assert_eq!(again.status, OrderStatus::Processing);

        store.create_dataset("o1", DatasetLabel::Csb).await.unwrap();
        store
            .update_dataset_status("o1", DatasetLabel::Csb, DatasetStatus::Complete, None)
            .await
            .unwrap();
        let dataset = store.create_dataset("o1", DatasetLabel::Csb).await.unwrap();
        assert_eq!(dataset.status, DatasetStatus::Complete);
    }

    #[tokio::test]
    async fn test_error_cannot_be_left() {
        let store = store_with_order("o1").await;
        store
            .update_order_status("o1", OrderStatus::Error, None)
            .await
            .unwrap();
        let result = store
            .update_order_status("o1", OrderStatus::Complete, None)
            .await;
        assert!(matches!(result, Err(OrderStoreError::InvalidTransition { .. })));
        assert_eq!(store.get_order("o1").await.unwrap().status, OrderStatus::Error);
    }

    #[tokio::test]
    async fn test_missing_items() {
        let store = InMemoryOrderStore::new();
        assert!(matches!(
            store.update_order_status("nope", OrderStatus::Processing, None).await,
            Err(OrderStoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.create_dataset("nope", DatasetLabel::Csb).await,
            Err(OrderStoreError::NotFound { .. })
        ));
        assert!(matches!(
            store
                .update_dataset_status("nope", DatasetLabel::Csb, DatasetStatus::Complete, None)
                .await,
            Err(OrderStoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_omitted_location_is_kept() {
        let store = store_with_order("o1").await;
        let location = S3Location::new("order-pickup", "o1.zip");
        store
            .update_order_status("o1", OrderStatus::DataStaged, Some(&location))
            .await
            .unwrap();
        let order = store
            .update_order_status("o1", OrderStatus::Complete, None)
            .await
            .unwrap();
        assert_eq!(order.output_location, Some(location));
    }

    #[tokio::test]
    async fn test_datasets_are_scoped_to_order() {
        let store = store_with_order("o1").await;
        store.create_order(&order("o2")).await.unwrap();
        store.create_dataset("o1", DatasetLabel::Csb).await.unwrap();
        store.create_dataset("o2", DatasetLabel::Multibeam).await.unwrap();

        let datasets = store.list_datasets("o1").await.unwrap();
        assert_eq!(datasets.len(), 1);
        assert_eq!(datasets[0].label, DatasetLabel::Csb);
    }
}
