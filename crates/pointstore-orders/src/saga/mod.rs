//! Order fulfillment saga
//!
//! The orchestrator drives an order through these steps, one invocation each:
//!
//! ```text
//! submit -> insert_order -> for each dataset:
//!                             start_dataset
//!                             format_point_query | catalog_query (async, TaskToken)
//!                             update_dataset     | dataset_failed
//!        -> verify_datasets -> [grid worker] -> complete_order -> notify
//!        -> fail_order on any unrecoverable error
//! ```
//!
//! Steps arrive as JSON tagged with `step` ([`StepRequest`]), are validated at
//! the boundary, and run against the collaborators in [`SagaContext`].

use pointstore_common::storage::ObjectStore;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::error::{SagaError, SagaResult};
use crate::query::PointQuery;
use crate::state::OrderStore;

pub mod catalog;
pub mod notifier;
pub mod orchestrator;
pub mod queue;
pub mod steps;

pub use catalog::{CatalogClient, HttpCatalogClient};
pub use notifier::{format_ready_message, Notification, Notifier, QueueNotifier};
pub use orchestrator::{Orchestrator, StepFunctionsOrchestrator};
pub use queue::{QueueMessage, SqsQueue, TaskQueue};

use steps::{
    catalog_query::CatalogQueryCommand,
    dataset::{DatasetFailedCommand, StartDatasetCommand, UpdateDatasetCommand},
    notify::NotifyCommand,
    order::{CompleteOrderCommand, FailOrderCommand, InsertOrderCommand, VerifyDatasetsCommand},
    point_query::FormatPointQueryCommand,
};

/// Collaborators shared by all steps
pub struct SagaContext {
    pub store: Arc<dyn OrderStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub point_query: PointQuery,
    /// Bucket for per-dataset outputs such as catalog manifests
    pub output_bucket: String,
    orchestrator: Option<Arc<dyn Orchestrator>>,
    catalog: Option<Arc<dyn CatalogClient>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl SagaContext {
    pub fn new(
        store: Arc<dyn OrderStore>,
        objects: Arc<dyn ObjectStore>,
        point_query: PointQuery,
        output_bucket: impl Into<String>,
    ) -> Self {
        Self {
            store,
            objects,
            point_query,
            output_bucket: output_bucket.into(),
            orchestrator: None,
            catalog: None,
            notifier: None,
        }
    }

    pub fn with_orchestrator(mut self, orchestrator: Arc<dyn Orchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogClient>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn orchestrator(&self) -> SagaResult<&dyn Orchestrator> {
        self.orchestrator
            .as_deref()
            .ok_or_else(|| not_configured("orchestrator", "STATE_MACHINE_ARN"))
    }

    pub fn catalog(&self) -> SagaResult<&dyn CatalogClient> {
        self.catalog
            .as_deref()
            .ok_or_else(|| not_configured("catalog", "CATALOG_URL"))
    }

    pub fn notifier(&self) -> SagaResult<&dyn Notifier> {
        self.notifier
            .as_deref()
            .ok_or_else(|| not_configured("notifier", "NOTIFICATION_QUEUE_URL"))
    }
}

fn not_configured(what: &str, var: &str) -> SagaError {
    SagaError::dependency(
        format!("No {} available", what),
        anyhow::anyhow!("{} is not set", var),
    )
}

/// One saga step invocation
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepRequest {
    InsertOrder(InsertOrderCommand),
    StartDataset(StartDatasetCommand),
    FormatPointQuery(FormatPointQueryCommand),
    CatalogQuery(CatalogQueryCommand),
    UpdateDataset(UpdateDatasetCommand),
    DatasetFailed(DatasetFailedCommand),
    VerifyDatasets(VerifyDatasetsCommand),
    CompleteOrder(CompleteOrderCommand),
    Notify(NotifyCommand),
    FailOrder(FailOrderCommand),
}

impl StepRequest {
    pub fn name(&self) -> &'static str {
        match self {
            StepRequest::InsertOrder(_) => "insert_order",
            StepRequest::StartDataset(_) => "start_dataset",
            StepRequest::FormatPointQuery(_) => "format_point_query",
            StepRequest::CatalogQuery(_) => "catalog_query",
            StepRequest::UpdateDataset(_) => "update_dataset",
            StepRequest::DatasetFailed(_) => "dataset_failed",
            StepRequest::VerifyDatasets(_) => "verify_datasets",
            StepRequest::CompleteOrder(_) => "complete_order",
            StepRequest::Notify(_) => "notify",
            StepRequest::FailOrder(_) => "fail_order",
        }
    }

    pub fn order_id(&self) -> &str {
        match self {
            StepRequest::InsertOrder(c) => &c.order_id,
            StepRequest::StartDataset(c) => &c.order_id,
            StepRequest::FormatPointQuery(c) => &c.order_id,
            StepRequest::CatalogQuery(c) => &c.order_id,
            StepRequest::UpdateDataset(c) => &c.order_id,
            StepRequest::DatasetFailed(c) => &c.order_id,
            StepRequest::VerifyDatasets(c) => &c.order_id,
            StepRequest::CompleteOrder(c) => &c.order_id,
            StepRequest::Notify(c) => &c.order_id,
            StepRequest::FailOrder(c) => &c.order_id,
        }
    }

    /// Parse a step from its JSON form
    pub fn from_json(payload: &str) -> SagaResult<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// Run one step and return its JSON output for the orchestrator
#[instrument(skip_all, fields(step = request.name(), order_id = %request.order_id()))]
pub async fn run_step(ctx: &SagaContext, request: StepRequest) -> SagaResult<Value> {
    let output = match request {
        StepRequest::InsertOrder(cmd) => {
            serde_json::to_value(steps::order::insert_order(ctx.store.as_ref(), cmd).await?)?
        },
        StepRequest::StartDataset(cmd) => {
            serde_json::to_value(steps::dataset::start_dataset(ctx.store.as_ref(), cmd).await?)?
        },
        StepRequest::FormatPointQuery(cmd) => {
            steps::point_query::format_point_query(&ctx.point_query, cmd)?
        },
        StepRequest::CatalogQuery(cmd) => steps::catalog_query::catalog_query(ctx, cmd).await?,
        StepRequest::UpdateDataset(cmd) => {
            serde_json::to_value(steps::dataset::update_dataset(ctx.store.as_ref(), cmd).await?)?
        },
        StepRequest::DatasetFailed(cmd) => {
            serde_json::to_value(steps::dataset::dataset_failed(ctx.store.as_ref(), cmd).await?)?
        },
        StepRequest::VerifyDatasets(cmd) => {
            steps::order::verify_datasets(ctx.store.as_ref(), cmd).await?
        },
        StepRequest::CompleteOrder(cmd) => {
            serde_json::to_value(steps::order::complete_order(ctx.store.as_ref(), cmd).await?)?
        },
        StepRequest::Notify(cmd) => steps::notify::notify(ctx, cmd).await?,
        StepRequest::FailOrder(cmd) => {
            serde_json::to_value(steps::order::fail_order(ctx.store.as_ref(), cmd).await?)?
        },
    };
    info!("Step finished");
    Ok(output)
}
