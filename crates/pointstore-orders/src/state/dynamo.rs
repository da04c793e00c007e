//! DynamoDB-backed [`OrderStore`]

use async_trait::async_trait;
use aws_sdk_dynamodb::{
    config::Region,
    error::DisplayErrorContext,
    types::{AttributeValue, ReturnValue},
    Client,
};
use pointstore_common::types::{BBox, DatasetLabel, S3Location};
use std::collections::HashMap;
use tracing::{debug, instrument};

use super::models::{
    dataset_sk, order_pk, Dataset, DatasetStatus, Order, OrderStatus, WriteStamp,
    DATASET_SK_PREFIX, ORDER_SK,
};
use super::{OrderStore, OrderStoreError, StoreResult};
use crate::grid::GridParams;

type Item = HashMap<String, AttributeValue>;

pub struct DynamoOrderStore {
    client: Client,
    table_name: String,
}

impl DynamoOrderStore {
    pub async fn new(table_name: impl Into<String>, region: impl Into<String>) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.into()))
            .load()
            .await;
        Self::from_client(Client::new(&config), table_name)
    }

    pub fn from_client(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    async fn get_item(&self, pk: String, sk: String) -> StoreResult<Option<Item>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(pk))
            .key("SK", AttributeValue::S(sk))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| backend(DisplayErrorContext(&e)))?;
        Ok(output.item)
    }

    /// Insert `item` unless the key exists; returns whether it was written
    async fn put_if_absent(&self, item: Item) -> StoreResult<bool> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(PK)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) => {
                let service = err.into_service_error();
                if service.is_conditional_check_failed_exception() {
                    Ok(false)
                } else {
                    Err(backend(DisplayErrorContext(&service)))
                }
            },
        }
    }

    /// Conditional status update; returns the new item, or `None` if the
    /// condition failed
    async fn update_status(
        &self,
        pk: String,
        sk: String,
        status: &str,
        allowed: &[&str],
        output_location: Option<&S3Location>,
    ) -> StoreResult<Option<Item>> {
        let stamp = WriteStamp::now();
        let mut update = String::from("SET #status = :status, last_update = :now, #ttl = :ttl");

        let mut request = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(pk))
            .key("SK", AttributeValue::S(sk))
            .expression_attribute_names("#status", "status")
            .expression_attribute_names("#ttl", "TTL")
            .expression_attribute_values(":status", AttributeValue::S(status.to_string()))
            .expression_attribute_values(":now", AttributeValue::S(stamp.last_update))
            .expression_attribute_values(":ttl", AttributeValue::N(stamp.ttl.to_string()));

        if let Some(location) = output_location {
            update.push_str(", output_location = :output_location");
            request = request.expression_attribute_values(
                ":output_location",
                AttributeValue::S(location.to_string()),
            );
        }

        let (condition, values) = status_condition(allowed);
        for (name, value) in values {
            request = request.expression_attribute_values(name, AttributeValue::S(value));
        }

        let result = request
            .update_expression(update)
            .condition_expression(condition)
            .return_values(ReturnValue::AllNew)
            .send()
            .await;

        match result {
            Ok(output) => Ok(Some(output.attributes.unwrap_or_default())),
            Err(err) => {
                let service = err.into_service_error();
                if service.is_conditional_check_failed_exception() {
                    Ok(None)
                } else {
                    Err(backend(DisplayErrorContext(&service)))
                }
            },
        }
    }
}

#[async_trait]
impl OrderStore for DynamoOrderStore {
    #[instrument(skip(self, order), fields(order_id = %order.order_id))]
    async fn create_order(&self, order: &Order) -> StoreResult<Order> {
        if self.put_if_absent(order_to_item(order)).await? {
            debug!("Order record created");
            Ok(order.clone())
        } else {
            debug!("Order record already exists");
            self.get_order(&order.order_id).await
        }
    }

    #[instrument(skip(self))]
    async fn create_dataset(&self, order_id: &str, label: DatasetLabel) -> StoreResult<Dataset> {
        // Datasets never exist without their order
        self.get_order(order_id).await?;

        let dataset = Dataset::new(order_id, label);
        if self.put_if_absent(dataset_to_item(&dataset)).await? {
            debug!("Dataset record created");
            Ok(dataset)
        } else {
            debug!("Dataset record already exists");
            self.get_dataset(order_id, label).await
        }
    }

    #[instrument(skip(self, output_location))]
    async fn update_dataset_status(
        &self,
        order_id: &str,
        label: DatasetLabel,
        status: DatasetStatus,
        output_location: Option<&S3Location>,
    ) -> StoreResult<Dataset> {
        let allowed = dataset_predecessors(status);

        match self
            .update_status(
                order_pk(order_id),
                dataset_sk(label),
                status.as_str(),
                &allowed,
                output_location,
            )
            .await?
        {
            Some(item) => dataset_from_item(&item),
            None => {
                let current = self.get_dataset(order_id, label).await?;
                Err(OrderStoreError::InvalidTransition {
                    record: format!("dataset {}/{}", order_id, label),
                    from: current.status.to_string(),
                    to: status.to_string(),
                })
            },
        }
    }

    #[instrument(skip(self, output_location))]
    async fn update_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        output_location: Option<&S3Location>,
    ) -> StoreResult<Order> {
        let allowed = order_predecessors(status);

        match self
            .update_status(
                order_pk(order_id),
                ORDER_SK.to_string(),
                status.as_str(),
                &allowed,
                output_location,
            )
            .await?
        {
            Some(item) => order_from_item(&item),
            None => {
                let current = self.get_order(order_id).await?;
                Err(OrderStoreError::InvalidTransition {
                    record: format!("order {}", order_id),
                    from: current.status.to_string(),
                    to: status.to_string(),
                })
            },
        }
    }

    async fn get_order(&self, order_id: &str) -> StoreResult<Order> {
        match self
            .get_item(order_pk(order_id), ORDER_SK.to_string())
            .await?
        {
            Some(item) => order_from_item(&item),
            None => Err(OrderStoreError::order_not_found(order_id)),
        }
    }

    async fn get_dataset(&self, order_id: &str, label: DatasetLabel) -> StoreResult<Dataset> {
        match self.get_item(order_pk(order_id), dataset_sk(label)).await? {
            Some(item) => dataset_from_item(&item),
            None => Err(OrderStoreError::dataset_not_found(order_id, label)),
        }
    }

    #[instrument(skip(self))]
    async fn list_datasets(&self, order_id: &str) -> StoreResult<Vec<Dataset>> {
        let mut datasets = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let output = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression("PK = :pk AND begins_with(SK, :prefix)")
                .expression_attribute_values(":pk", AttributeValue::S(order_pk(order_id)))
                .expression_attribute_values(
                    ":prefix",
                    AttributeValue::S(DATASET_SK_PREFIX.to_string()),
                )
                .consistent_read(true)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| backend(DisplayErrorContext(&e)))?;

            for item in output.items.unwrap_or_default() {
                datasets.push(dataset_from_item(&item)?);
            }

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        datasets.sort_by_key(|dataset| dataset.label);
        debug!(count = datasets.len(), "Listed datasets");
        Ok(datasets)
    }
}

fn backend(err: impl std::fmt::Display) -> OrderStoreError {
    OrderStoreError::Backend(err.to_string())
}

/// Stored spellings a dataset item may hold for a write of `status`
fn dataset_predecessors(status: DatasetStatus) -> Vec<&'static str> {
    status
        .allowed_predecessors()
        .iter()
        .flat_map(|prev| prev.stored_spellings())
        .copied()
        .collect()
}

fn order_predecessors(status: OrderStatus) -> Vec<&'static str> {
    status
        .allowed_predecessors()
        .iter()
        .flat_map(|prev| prev.stored_spellings())
        .copied()
        .collect()
}

/// `attribute_exists(PK) AND #status IN (:prev0, ...)` plus its value bindings
fn status_condition(allowed: &[&str]) -> (String, Vec<(String, String)>) {
    let values: Vec<(String, String)> = allowed
        .iter()
        .enumerate()
        .map(|(i, status)| (format!(":prev{}", i), status.to_string()))
        .collect();
    let names: Vec<&str> = values.iter().map(|(name, _)| name.as_str()).collect();
    let condition = format!("attribute_exists(PK) AND #status IN ({})", names.join(", "));
    (condition, values)
}

// ============================================================================
// Item encoding
// ============================================================================

fn order_to_item(order: &Order) -> Item {
    let mut item = Item::new();
    item.insert("PK".to_string(), AttributeValue::S(order_pk(&order.order_id)));
    item.insert("SK".to_string(), AttributeValue::S(ORDER_SK.to_string()));
    item.insert("order_id".to_string(), AttributeValue::S(order.order_id.clone()));
    item.insert(
        "email".to_string(),
        match &order.email {
            Some(email) => AttributeValue::S(email.clone()),
            None => AttributeValue::Null(true),
        },
    );
    item.insert("bbox".to_string(), AttributeValue::S(order.bbox.to_string()));
    item.insert("status".to_string(), AttributeValue::S(order.status.as_str().to_string()));
    item.insert("last_update".to_string(), AttributeValue::S(order.last_update.clone()));
    item.insert("TTL".to_string(), AttributeValue::N(order.ttl.to_string()));
    if let Some(location) = &order.output_location {
        item.insert("output_location".to_string(), AttributeValue::S(location.to_string()));
    }
    if let Some(grid) = &order.grid {
        let mut params = HashMap::new();
        params.insert("resolution".to_string(), AttributeValue::N(grid.resolution.to_string()));
        params.insert("format".to_string(), AttributeValue::N(grid.format.to_string()));
        item.insert("grid".to_string(), AttributeValue::M(params));
    }
    item
}

fn dataset_to_item(dataset: &Dataset) -> Item {
    let mut item = Item::new();
    item.insert("PK".to_string(), AttributeValue::S(order_pk(&dataset.order_id)));
    item.insert("SK".to_string(), AttributeValue::S(dataset_sk(dataset.label)));
    item.insert("label".to_string(), AttributeValue::S(dataset.label.to_string()));
    item.insert(
        "status".to_string(),
        AttributeValue::S(dataset.status.as_str().to_string()),
    );
    item.insert("last_update".to_string(), AttributeValue::S(dataset.last_update.clone()));
    item.insert("TTL".to_string(), AttributeValue::N(dataset.ttl.to_string()));
    if let Some(location) = &dataset.output_location {
        item.insert("output_location".to_string(), AttributeValue::S(location.to_string()));
    }
    item
}

/// Decoding context for one item, used to build [`OrderStoreError::Corrupt`]
struct Decoder<'a> {
    item: &'a Item,
    pk: String,
    sk: String,
}

impl<'a> Decoder<'a> {
    fn new(item: &'a Item) -> Self {
        let key = |name: &str| match item.get(name) {
            Some(AttributeValue::S(value)) => value.clone(),
            _ => String::new(),
        };
        Self {
            item,
            pk: key("PK"),
            sk: key("SK"),
        }
    }

    fn corrupt(&self, reason: impl Into<String>) -> OrderStoreError {
        OrderStoreError::Corrupt {
            pk: self.pk.clone(),
            sk: self.sk.clone(),
            reason: reason.into(),
        }
    }

    fn optional_s(&self, name: &str) -> Option<&'a str> {
        match self.item.get(name) {
            Some(AttributeValue::S(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    fn required_s(&self, name: &str) -> StoreResult<&'a str> {
        self.optional_s(name)
            .ok_or_else(|| self.corrupt(format!("missing string attribute '{}'", name)))
    }

    fn required_i64(&self, name: &str) -> StoreResult<i64> {
        match self.item.get(name) {
            Some(AttributeValue::N(value)) => value
                .parse::<f64>()
                .map(|v| v as i64)
                .map_err(|_| self.corrupt(format!("'{}' is not a number", name))),
            _ => Err(self.corrupt(format!("missing numeric attribute '{}'", name))),
        }
    }

    fn location(&self) -> StoreResult<Option<S3Location>> {
        self.optional_s("output_location")
            .map(|raw| {
                S3Location::parse(raw).map_err(|e| self.corrupt(e.to_string()))
            })
            .transpose()
    }

    fn order_id(&self) -> StoreResult<String> {
        self.pk
            .strip_prefix("ORDER#")
            .map(str::to_string)
            .ok_or_else(|| self.corrupt("partition key is not an order key"))
    }

    fn bbox(&self) -> StoreResult<BBox> {
        match self.item.get("bbox") {
            Some(AttributeValue::S(raw)) => {
                BBox::parse_str(raw).map_err(|e| self.corrupt(e.to_string()))
            },
            // Legacy items stored the request array as-is
            Some(AttributeValue::L(values)) => {
                let coords = values
                    .iter()
                    .map(|value| match value {
                        AttributeValue::N(n) => n.parse::<f64>().ok(),
                        _ => None,
                    })
                    .collect::<Option<Vec<f64>>>()
                    .ok_or_else(|| self.corrupt("bbox list contains non-numbers"))?;
                BBox::from_coords(&coords).map_err(|e| self.corrupt(e.to_string()))
            },
            _ => Err(self.corrupt("missing bbox")),
        }
    }

    fn grid(&self) -> StoreResult<Option<GridParams>> {
        let params = match self.item.get("grid") {
            Some(AttributeValue::M(params)) => params,
            _ => return Ok(None),
        };
        let number = |name: &str| match params.get(name) {
            Some(AttributeValue::N(raw)) | Some(AttributeValue::S(raw)) => raw.parse::<f64>().ok(),
            _ => None,
        };

        let resolution = number("resolution")
            .ok_or_else(|| self.corrupt("grid is missing a numeric resolution"))?;
        let format = match number("format") {
            Some(format) => format as u16,
            None => crate::grid::DEFAULT_GRID_FORMAT,
        };
        GridParams::new(resolution, format)
            .map(Some)
            .map_err(|e| self.corrupt(e.to_string()))
    }
}

fn order_from_item(item: &Item) -> StoreResult<Order> {
    let decoder = Decoder::new(item);
    let status = decoder
        .required_s("status")?
        .parse::<OrderStatus>()
        .map_err(|e| decoder.corrupt(e))?;

    Ok(Order {
        order_id: decoder.order_id()?,
        email: decoder.optional_s("email").map(str::to_string),
        bbox: decoder.bbox()?,
        status,
        last_update: decoder.required_s("last_update")?.to_string(),
        output_location: decoder.location()?,
        grid: decoder.grid()?,
        ttl: decoder.required_i64("TTL")?,
    })
}

fn dataset_from_item(item: &Item) -> StoreResult<Dataset> {
    let decoder = Decoder::new(item);
    let label = decoder
        .sk
        .strip_prefix(DATASET_SK_PREFIX)
        .ok_or_else(|| decoder.corrupt("sort key is not a dataset key"))?
        .parse::<DatasetLabel>()
        .map_err(|e| decoder.corrupt(e.to_string()))?;
    let status = decoder
        .required_s("status")?
        .parse::<DatasetStatus>()
        .map_err(|e| decoder.corrupt(e))?;

    Ok(Dataset {
        order_id: decoder.order_id()?,
        label,
        status,
        output_location: decoder.location()?,
        last_update: decoder.required_s("last_update")?.to_string(),
        ttl: decoder.required_i64("TTL")?,
    })
}
