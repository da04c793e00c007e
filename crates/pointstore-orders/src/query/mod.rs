//! Query construction
//!
//! Turns dataset filters into predicates for the two query targets: the
//! crowd-sourced point table ([`point`]) and the multibeam map-service
//! catalog ([`catalog`]). Both go through [`sanitize`] first.

use pointstore_common::ErrorKind;
use thiserror::Error;

pub mod catalog;
pub mod filters;
pub mod point;
pub mod sanitize;

pub use catalog::catalog_predicate;
pub use filters::{DatasetFilters, DateRange};
pub use point::{build_predicate, filter_fragments, PointQuery};
pub use sanitize::{is_identifier, sql_quote_and_escape};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The mandatory bounding box is unusable; optional filters never fail
    #[error("Invalid filter value: {0}")]
    InvalidFilterValue(String),

    #[error("'{0}' is not a plain identifier")]
    InvalidIdentifier(String),
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}
