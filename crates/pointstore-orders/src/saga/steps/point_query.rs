//! Point-table query formatting

use pointstore_common::types::{BBox, DatasetLabel, RawBBox};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use super::require_order_id;
use crate::error::{SagaError, SagaResult};
use crate::query::{DatasetFilters, PointQuery, QueryError};

/// Output key holding the rendered statement
pub const QUERY_STRING_KEY: &str = "QUERY_STRING";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatPointQueryCommand {
    pub order_id: String,
    pub bbox: RawBBox,
    pub dataset: DatasetFilters,
}

impl FormatPointQueryCommand {
    pub fn validate(&self) -> SagaResult<BBox> {
        require_order_id(&self.order_id)?;
        if self.dataset.label != DatasetLabel::Csb {
            return Err(SagaError::Validation(format!(
                "point queries only apply to 'csb', not '{}'",
                self.dataset.label
            )));
        }
        BBox::validate(&self.bbox)
            .map_err(|e| QueryError::InvalidFilterValue(e.to_string()).into())
    }
}

/// Echo the request with the rendered statement under `QUERY_STRING`
#[instrument(skip_all, fields(order_id = %command.order_id))]
pub fn format_point_query(query: &PointQuery, command: FormatPointQueryCommand) -> SagaResult<Value> {
    let bbox = command.validate()?;
    let statement = query.render(&bbox, &command.dataset);
    debug!(statement = %statement, "Point query formatted");

    let mut output = serde_json::to_value(&command)?;
    if let Value::Object(fields) = &mut output {
        fields.insert(QUERY_STRING_KEY.to_string(), Value::from(statement));
    }
    Ok(output)
}
