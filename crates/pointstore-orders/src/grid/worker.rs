//! Grid queue worker
//!
//! Polls the grid queue for `{order_id, TaskToken}` messages, builds the
//! order's grid and reports back to the orchestrator. Messages are deleted
//! once handled, whatever the outcome; the orchestrator owns retries.

use pointstore_common::storage::ObjectStore;
use pointstore_common::types::S3Location;
use pointstore_common::ErrorKind;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use super::{GridError, GridExecutor, GridWorkspace};
use crate::error::{SagaError, SagaResult};
use crate::saga::{Orchestrator, QueueMessage, TaskQueue};
use crate::state::{DatasetStatus, OrderStatus, OrderStore};

/// Messages taken per poll; grids are built one at a time
const MAX_MESSAGES: i32 = 1;

/// Long-poll wait per receive
const RECEIVE_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct GridRequest {
    order_id: String,
    #[serde(rename = "TaskToken")]
    task_token: String,
}

/// What happened to one queue message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Grid delivered to this location
    Completed(S3Location),
    /// Order moved to `error`
    Failed(ErrorKind),
    /// Message could not be parsed
    Rejected,
}

pub struct GridWorker {
    store: Arc<dyn OrderStore>,
    objects: Arc<dyn ObjectStore>,
    orchestrator: Arc<dyn Orchestrator>,
    queue: Arc<dyn TaskQueue>,
    executor: GridExecutor,
    working_dir: PathBuf,
    pickup_bucket: String,
    poll_interval: Duration,
}

impl GridWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn OrderStore>,
        objects: Arc<dyn ObjectStore>,
        orchestrator: Arc<dyn Orchestrator>,
        queue: Arc<dyn TaskQueue>,
        executor: GridExecutor,
        working_dir: impl Into<PathBuf>,
        pickup_bucket: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            objects,
            orchestrator,
            queue,
            executor,
            working_dir: working_dir.into(),
            pickup_bucket: pickup_bucket.into(),
            poll_interval,
        }
    }

    /// Poll until `shutdown` resolves
    ///
    /// A message being processed when shutdown arrives is finished first.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        info!(
            program = %self.executor.program(),
            working_dir = %self.working_dir.display(),
            "Grid worker started"
        );

        loop {
            let received = tokio::select! {
                _ = &mut shutdown => break,
                received = self.queue.receive(MAX_MESSAGES, RECEIVE_WAIT) => received,
            };

            let idle = match received {
                Ok(messages) if messages.is_empty() => true,
                Ok(messages) => {
                    for message in &messages {
                        self.handle_message(message).await;
                    }
                    false
                },
                Err(e) => {
                    error!(error = %format!("{:#}", e), "Failed to poll grid queue");
                    true
                },
            };

            if idle {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(self.poll_interval) => {},
                }
            }
        }

        info!("Grid worker stopped");
    }

    /// Process one message and delete it
    pub async fn handle_message(&self, message: &QueueMessage) -> MessageOutcome {
        let outcome = match serde_json::from_str::<GridRequest>(&message.body) {
            Ok(request) => self.process(&request).await,
            Err(e) => {
                warn!(error = %e, "Malformed grid request");
                self.reject(&message.body, &e.to_string()).await;
                MessageOutcome::Rejected
            },
        };

        if let Err(e) = self.queue.delete(&message.receipt_handle).await {
            error!(error = %format!("{:#}", e), "Failed to delete grid request");
        }
        outcome
    }

    #[instrument(skip_all, fields(order_id = %request.order_id))]
    async fn process(&self, request: &GridRequest) -> MessageOutcome {
        match self.fulfil(&request.order_id).await {
            Ok(location) => {
                let output = json!({
                    "status": "SUCCESS",
                    "message": "successfully generated grid",
                    "output_location": location,
                });
                if let Err(e) = self
                    .orchestrator
                    .send_task_success(&request.task_token, &output)
                    .await
                {
                    error!(error = %format!("{:#}", e), "Failed to signal grid success");
                }
                info!(output_location = %location, "Grid delivered");
                MessageOutcome::Completed(location)
            },
            Err(err) => {
                error!(error = %err, "Grid generation failed");
                if let Err(e) = self
                    .store
                    .update_order_status(&request.order_id, OrderStatus::Error, None)
                    .await
                {
                    error!(error = %e, "Failed to mark order as failed");
                }
                if let Err(e) = self
                    .orchestrator
                    .send_task_failure(&request.task_token, err.kind().as_str(), &err.to_string())
                    .await
                {
                    error!(error = %format!("{:#}", e), "Failed to signal grid failure");
                }
                MessageOutcome::Failed(err.kind())
            },
        }
    }

    async fn fulfil(&self, order_id: &str) -> SagaResult<S3Location> {
        let order = self.store.get_order(order_id).await?;
        let params = order.grid.ok_or_else(|| {
            SagaError::Validation(format!("order {} has no grid parameters", order_id))
        })?;

        let outputs: BTreeMap<_, _> = self
            .store
            .list_datasets(order_id)
            .await?
            .into_iter()
            .filter(|dataset| dataset.status == DatasetStatus::Complete)
            .filter_map(|dataset| dataset.output_location.map(|l| (dataset.label, l)))
            .collect();
        if outputs.is_empty() {
            return Err(GridError::NoDataFiles.into());
        }

        let workspace = GridWorkspace::create(&self.working_dir, order_id)?;
        let inputs = workspace
            .stage(self.objects.as_ref(), &outputs, order_id)
            .await?;
        let output = self
            .executor
            .execute(workspace, order_id, inputs, order.bbox, params)
            .await?;

        let location = S3Location::new(self.pickup_bucket.clone(), format!("{}.zip", order_id));
        self.objects
            .upload_file(&location, &output.archive, Some("application/zip"))
            .await
            .map_err(GridError::Upload)?;

        self.store
            .update_order_status(order_id, OrderStatus::Complete, Some(&location))
            .await?;
        Ok(location)
    }

    /// Signal failure for a message that did not parse, if it carries a token
    async fn reject(&self, body: &str, reason: &str) {
        let token = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.get("TaskToken").and_then(Value::as_str).map(String::from));
        if let Some(token) = token {
            let cause = format!("malformed grid request: {}", reason);
            if let Err(e) = self
                .orchestrator
                .send_task_failure(&token, ErrorKind::Validation.as_str(), &cause)
                .await
            {
                error!(error = %format!("{:#}", e), "Failed to signal rejected request");
            }
        }
    }
}
