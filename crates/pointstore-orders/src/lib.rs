//! Pointstore Orders Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Fulfillment of bathymetry data-extract orders.
//!
//! # Overview
//!
//! A client submits a bounding box and per-dataset filters. The order then
//! moves through an asynchronous saga driven by an external orchestrator:
//!
//! - **State**: Order and dataset records with conditional status writes
//!   ([`state`])
//! - **Query**: Validated predicates for the point table and the multibeam
//!   catalog ([`query`])
//! - **Grid**: Staging, `mbgrid` execution and packaging ([`grid`])
//! - **Saga**: The step commands and the collaborator seams they run
//!   against ([`saga`])
//!
//! # Order lifecycle
//!
//! ```text
//! initialized -> processing -> data staged -> complete
//!        \            \              \
//!         `------------`--------------`--> error
//! ```
//!
//! An order is ready for its terminal steps only when every one of its
//! datasets is `complete`.
//!
//! # Example
//!
//! ```no_run
//! use pointstore_orders::query::{DatasetFilters, PointQuery};
//! use pointstore_common::types::{BBox, DatasetLabel};
//!
//! fn main() -> anyhow::Result<()> {
//!     let bbox = BBox::parse_str("5,60,6,61")?;
//!     let mut filters = DatasetFilters::new(DatasetLabel::Csb);
//!     filters.providers = Some(vec!["PGS".to_string()]);
//!
//!     let query = PointQuery::new("dcdb", "csb")?;
//!     println!("{}", query.render(&bbox, &filters));
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod grid;
pub mod query;
pub mod saga;
pub mod state;

// Re-export commonly used types
pub use error::{SagaError, SagaResult};
