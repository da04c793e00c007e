//! Grid generation
//!
//! A grid task merges an order's staged point and survey files into one grid
//! with the external gridding tool, then packages the result for pickup.
//!
//! ```text
//! Staged -> DatalistBuilt -> Executed -> Verified
//!    \            \              \
//!     `------------`--------------`--> Failed
//! ```
//!
//! Each task runs in its own [`GridWorkspace`]; the directory is removed when
//! the workspace (or the [`GridOutput`] that owns it) is dropped, on success
//! and failure alike.

use pointstore_common::ErrorKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod executor;
pub mod package;
pub mod params;
pub mod task;
pub mod worker;
pub mod workspace;

pub use executor::{GridExecutor, GridOutput};
pub use params::{GridParams, DEFAULT_GRID_FORMAT};
pub use task::{GridInputs, GridTask, GridTaskState};
pub use worker::{GridWorker, MessageOutcome};
pub use workspace::GridWorkspace;

/// Marker the gridding tool prints after a successful run
pub const SUCCESS_MARKER: &str = "Total number of bins:";

/// Grid execution failure
#[derive(Debug, Error)]
pub enum GridError {
    #[error("Invalid grid parameters: {0}")]
    InvalidParams(String),

    #[error("At least one data file is required")]
    NoDataFiles,

    #[error("Grid task cannot move from {from:?} to {to:?}")]
    InvalidState {
        from: GridTaskState,
        to: GridTaskState,
    },

    #[error("Failed to stage {what}: {cause:#}")]
    Staging { what: String, cause: anyhow::Error },

    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Grid tool did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Grid tool failed: {reason}")]
    ToolFailed { reason: String, stderr: String },

    #[error("Failed to package grid: {0}")]
    Packaging(#[from] zip::result::ZipError),

    #[error("Failed to upload grid: {0:#}")]
    Upload(anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GridError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GridError::InvalidParams(_) | GridError::NoDataFiles => ErrorKind::Validation,
            GridError::Staging { .. } | GridError::Upload(_) => ErrorKind::Dependency,
            _ => ErrorKind::Execution,
        }
    }
}

/// How strictly a finished tool run is checked
///
/// The gridding tool's exit code and stderr are unreliable, so the default
/// only logs problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuccessCheck {
    /// Log a missing success marker, a non-zero exit or missing output
    #[default]
    Lenient,
    /// Fail the task on any of them
    Strict,
}

impl std::str::FromStr for SuccessCheck {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lenient" => Ok(SuccessCheck::Lenient),
            "strict" => Ok(SuccessCheck::Strict),
            other => Err(format!("unknown success check '{}'", other)),
        }
    }
}
