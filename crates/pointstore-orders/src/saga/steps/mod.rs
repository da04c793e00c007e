//! Saga step commands
//!
//! Each step is a command struct with a `validate()` method and a standalone
//! async handler that does the work.

pub mod catalog_query;
pub mod dataset;
pub mod notify;
pub mod order;
pub mod point_query;
pub mod submit;

use crate::error::{SagaError, SagaResult};

/// Reject blank order ids before they reach the store
pub(crate) fn require_order_id(order_id: &str) -> SagaResult<()> {
    if order_id.trim().is_empty() {
        return Err(SagaError::Validation("order_id is required".to_string()));
    }
    Ok(())
}
