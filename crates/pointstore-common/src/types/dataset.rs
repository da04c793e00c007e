//! Source dataset labels

use serde::{Deserialize, Serialize};

use crate::error::PointstoreError;

/// A data source that can contribute to an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetLabel {
    /// Crowd-sourced bathymetry points, queried through the SQL engine
    Csb,
    /// Multibeam survey files, looked up in the map-service catalog
    Multibeam,
}

impl DatasetLabel {
    pub const ALL: [DatasetLabel; 2] = [DatasetLabel::Csb, DatasetLabel::Multibeam];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetLabel::Csb => "csb",
            DatasetLabel::Multibeam => "multibeam",
        }
    }
}

impl std::str::FromStr for DatasetLabel {
    type Err = PointstoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csb" => Ok(DatasetLabel::Csb),
            "multibeam" => Ok(DatasetLabel::Multibeam),
            other => Err(PointstoreError::UnknownDataset(other.to_string())),
        }
    }
}

impl std::fmt::Display for DatasetLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
