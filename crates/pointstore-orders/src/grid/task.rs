//! Grid task state and tool invocation

use pointstore_common::types::{BBox, DatasetLabel};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{GridError, GridParams};

/// Format id of XYZ point files in a datalist
const XYZ_FORMAT_ID: u32 = 162;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridTaskState {
    Staged,
    DatalistBuilt,
    Executed,
    Verified,
    Failed,
}

/// Local files for one grid task
#[derive(Debug, Clone, Default)]
pub struct GridInputs {
    /// Tool input per dataset: an XYZ point file for `csb`, a file manifest for `multibeam`
    pub data_files: BTreeMap<DatasetLabel, PathBuf>,
    /// Extra files packaged with the grid
    pub attachments: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct GridTask {
    order_id: String,
    inputs: GridInputs,
    bbox: BBox,
    params: GridParams,
    datalist: Option<PathBuf>,
    state: GridTaskState,
}

impl GridTask {
    pub fn new(
        order_id: impl Into<String>,
        inputs: GridInputs,
        bbox: BBox,
        params: GridParams,
    ) -> Result<Self, GridError> {
        if inputs.data_files.is_empty() {
            return Err(GridError::NoDataFiles);
        }
        Ok(Self {
            order_id: order_id.into(),
            inputs,
            bbox,
            params,
            datalist: None,
            state: GridTaskState::Staged,
        })
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn state(&self) -> GridTaskState {
        self.state
    }

    pub fn inputs(&self) -> &GridInputs {
        &self.inputs
    }

    fn advance(&mut self, to: GridTaskState) -> Result<(), GridError> {
        let from = match to {
            GridTaskState::DatalistBuilt => GridTaskState::Staged,
            GridTaskState::Executed => GridTaskState::DatalistBuilt,
            GridTaskState::Verified => GridTaskState::Executed,
            GridTaskState::Staged | GridTaskState::Failed => {
                return Err(GridError::InvalidState {
                    from: self.state,
                    to,
                })
            },
        };
        if self.state != from {
            return Err(GridError::InvalidState {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    pub fn fail(&mut self) {
        self.state = GridTaskState::Failed;
    }

    pub fn mark_executed(&mut self) -> Result<(), GridError> {
        self.advance(GridTaskState::Executed)
    }

    pub fn mark_verified(&mut self) -> Result<(), GridError> {
        self.advance(GridTaskState::Verified)
    }

    /// Write `<order_id>.datalist` into `dir`
    ///
    /// The point file is listed with its XYZ format id; multibeam manifest
    /// lines are copied unchanged.
    pub async fn build_datalist(&mut self, dir: &Path) -> Result<PathBuf, GridError> {
        if self.state != GridTaskState::Staged {
            return Err(GridError::InvalidState {
                from: self.state,
                to: GridTaskState::DatalistBuilt,
            });
        }

        let mut contents = String::new();
        if let Some(points) = self.inputs.data_files.get(&DatasetLabel::Csb) {
            contents.push_str(&format!("{}  {}\n", points.display(), XYZ_FORMAT_ID));
        }
        if let Some(manifest) = self.inputs.data_files.get(&DatasetLabel::Multibeam) {
            let lines = tokio::fs::read_to_string(manifest).await?;
            contents.push_str(&lines);
            if !lines.is_empty() && !lines.ends_with('\n') {
                contents.push('\n');
            }
        }

        let path = dir.join(format!("{}.datalist", self.order_id));
        tokio::fs::write(&path, contents).await?;
        debug!(datalist = %path.display(), "Datalist written");

        self.datalist = Some(path.clone());
        self.advance(GridTaskState::DatalistBuilt)?;
        Ok(path)
    }

    /// Tool arguments; requires the datalist
    pub fn command_args(&self) -> Result<Vec<String>, GridError> {
        let datalist = self.datalist.as_deref().ok_or(GridError::InvalidState {
            from: self.state,
            to: GridTaskState::Executed,
        })?;
        Ok(mbgrid_args(&self.order_id, datalist, &self.bbox, &self.params))
    }
}

/// Arguments in the order the tool expects them
pub fn mbgrid_args(order_id: &str, datalist: &Path, bbox: &BBox, params: &GridParams) -> Vec<String> {
    vec![
        format!("-E{}/0.0!", params.resolution),
        format!("-I{}", datalist.display()),
        // NaN for cells without data
        "-N".to_string(),
        format!("-O{}", order_id),
        "-P1".to_string(),
        format!(
            "-R{}/{}/{}/{}",
            bbox.min_lon, bbox.max_lon, bbox.min_lat, bbox.max_lat
        ),
        // Bathymetry, positive down
        "-A1".to_string(),
        format!("-G{}", params.format),
        // Gaussian weighted mean
        "-F1".to_string(),
    ]
}
