//! Spatial cell assignment

use h3o::{LatLng, Resolution};

/// H3 resolution used for partitions, roughly 418 km per hexagon side
pub const PARTITION_RESOLUTION: Resolution = Resolution::One;

/// Maps a coordinate onto the identifier of the cell that contains it
pub trait CellIndexer: Send + Sync {
    /// `None` when the coordinate cannot be indexed
    fn cell(&self, lat: f64, lon: f64) -> Option<String>;
}

/// H3 hexagonal cells at a fixed resolution
#[derive(Debug, Clone, Copy)]
pub struct H3Indexer {
    resolution: Resolution,
}

impl H3Indexer {
    pub fn new(resolution: Resolution) -> Self {
        Self { resolution }
    }
}

impl Default for H3Indexer {
    fn default() -> Self {
        Self::new(PARTITION_RESOLUTION)
    }
}

impl CellIndexer for H3Indexer {
    fn cell(&self, lat: f64, lon: f64) -> Option<String> {
        LatLng::new(lat, lon)
            .ok()
            .map(|coord| coord.to_cell(self.resolution).to_string())
    }
}
