//! Pointstore Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Batch re-partitioning of crowd-sourced bathymetry point files.
//!
//! Raw point files arrive as `YYYYMMDD_<uuid>_pointData.csv`. Each record is
//! stamped with the file's entry date and its H3 cell, and the file is split
//! into one object per cell under `<prefix>/<cell>/`.
//!
//! # Example
//!
//! ```no_run
//! use pointstore_common::storage::LocalStorage;
//! use pointstore_common::types::S3Location;
//! use pointstore_ingest::config::PartitionConfig;
//! use pointstore_ingest::partition::{H3Indexer, Partitioner};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let partitioner = Partitioner::new(
//!         Arc::new(LocalStorage::new("./data")),
//!         Arc::new(H3Indexer::default()),
//!         PartitionConfig::default(),
//!     );
//!     let source = S3Location::new("incoming", "20190306_27a0f0710fc935ce44b83b6d539d2d44_pointData.csv");
//!     let report = partitioner.process(&source).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod partition;
