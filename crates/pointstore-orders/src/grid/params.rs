use serde::{Deserialize, Serialize};

use super::GridError;

/// GMT netCDF 4-byte float
pub const DEFAULT_GRID_FORMAT: u16 = 3;

/// Output grid settings requested with an order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGridParams")]
pub struct GridParams {
    /// Cell size, must be positive
    pub resolution: f64,
    /// Output format code understood by the gridding tool
    pub format: u16,
}

#[derive(Deserialize)]
struct RawGridParams {
    resolution: f64,
    #[serde(default = "default_format")]
    format: u16,
}

fn default_format() -> u16 {
    DEFAULT_GRID_FORMAT
}

impl TryFrom<RawGridParams> for GridParams {
    type Error = GridError;

    fn try_from(raw: RawGridParams) -> Result<Self, Self::Error> {
        GridParams::new(raw.resolution, raw.format)
    }
}

impl GridParams {
    pub fn new(resolution: f64, format: u16) -> Result<Self, GridError> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(GridError::InvalidParams(format!(
                "resolution must be greater than 0, got {}",
                resolution
            )));
        }
        if !Self::is_valid_format(format) {
            return Err(GridError::InvalidParams(format!(
                "unsupported grid format {}",
                format
            )));
        }
        Ok(Self { resolution, format })
    }

    /// Formats 1-4 and 100-111
    pub fn is_valid_format(format: u16) -> bool {
        matches!(format, 1..=4 | 100..=111)
    }
}
