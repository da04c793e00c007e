//! Pointstore Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the Pointstore project.
//!
//! # Overview
//!
//! This crate provides common functionality used across all Pointstore workspace members:
//!
//! - **Error Handling**: The error taxonomy shared by every component
//! - **Logging**: Centralized `tracing` subscriber setup
//! - **Types**: Bounding boxes, geographic coordinates and dataset labels
//! - **Storage**: Object storage abstraction with S3 and local-directory backends
//!
//! # Example
//!
//! ```no_run
//! use pointstore_common::types::BBox;
//!
//! fn main() -> anyhow::Result<()> {
//!     let bbox = BBox::parse_str("5,60,6,61")?;
//!     println!("extract area: {}", bbox);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use error::{ErrorKind, PointstoreError};
