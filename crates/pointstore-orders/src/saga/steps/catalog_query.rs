//! Multibeam catalog lookup
//!
//! Asynchronous step: the orchestrator waits on `TaskToken` until this step
//! signals success (with the manifest location) or failure.

use pointstore_common::types::{BBox, DatasetLabel, RawBBox, S3Location};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, instrument};

use super::require_order_id;
use crate::error::{SagaError, SagaResult};
use crate::query::{catalog_predicate, DatasetFilters, QueryError};
use crate::saga::SagaContext;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogQueryCommand {
    pub order_id: String,
    pub bbox: RawBBox,
    pub dataset: DatasetFilters,
    #[serde(rename = "TaskToken")]
    pub task_token: String,
}

impl CatalogQueryCommand {
    pub fn validate(&self) -> SagaResult<BBox> {
        require_order_id(&self.order_id)?;
        if self.task_token.trim().is_empty() {
            return Err(SagaError::Validation("TaskToken is required".to_string()));
        }
        if self.dataset.label != DatasetLabel::Multibeam {
            return Err(SagaError::Validation(format!(
                "catalog lookups only apply to 'multibeam', not '{}'",
                self.dataset.label
            )));
        }
        BBox::validate(&self.bbox)
            .map_err(|e| QueryError::InvalidFilterValue(e.to_string()).into())
    }

    /// `<order_id>_mbfiles.txt`
    pub fn manifest_key(&self) -> String {
        format!("{}_mbfiles.txt", self.order_id)
    }
}

/// Look up the survey files and report the manifest to the orchestrator
///
/// Failures after validation are signalled on the task token and then
/// returned to the caller.
#[instrument(skip_all, fields(order_id = %command.order_id))]
pub async fn catalog_query(ctx: &SagaContext, command: CatalogQueryCommand) -> SagaResult<Value> {
    let orchestrator = ctx.orchestrator()?;

    match write_manifest(ctx, &command).await {
        Ok(location) => {
            let output = json!({
                "status": "SUCCESS",
                "message": "successfully queried multibeam catalog",
                "output_location": location,
            });
            orchestrator
                .send_task_success(&command.task_token, &output)
                .await
                .map_err(|e| SagaError::dependency("Failed to signal catalog success", e))?;
            info!(output_location = %location, "Catalog manifest written");
            Ok(output)
        },
        Err(err) => {
            error!(error = %err, "Catalog query failed");
            if let Err(signal) = orchestrator
                .send_task_failure(&command.task_token, err.kind().as_str(), &err.to_string())
                .await
            {
                error!(error = %format!("{:#}", signal), "Failed to signal catalog failure");
            }
            Err(err)
        },
    }
}

async fn write_manifest(ctx: &SagaContext, command: &CatalogQueryCommand) -> SagaResult<S3Location> {
    let bbox = command.validate()?;
    let predicate = catalog_predicate(&command.dataset);

    let listing = ctx
        .catalog()?
        .find_files(&bbox, &predicate)
        .await
        .map_err(|e| SagaError::dependency("Catalog lookup failed", e))?;

    let location = S3Location::new(ctx.output_bucket.clone(), command.manifest_key());
    ctx.objects
        .put(&location, listing.into_bytes(), Some("text/plain"))
        .await
        .map_err(|e| SagaError::dependency("Failed to store catalog manifest", e))?;
    Ok(location)
}
