//! Geographic coordinates and bounding boxes
//!
//! [`BBox`] is the only way a bounding box enters the system: every
//! constructor goes through [`BBox::from_coords`], so a `BBox` value always
//! satisfies the range and orientation rules below.
//!
//! # Rules
//!
//! - exactly four coordinates, ordered `minLon, minLat, maxLon, maxLat`
//! - longitudes within `[-180, 180]`, latitudes within `[-90, 90]`
//! - `minLon < maxLon`: boxes crossing the antimeridian are rejected, not wrapped
//! - `minLat != maxLat`: zero-height boxes are rejected

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::PointstoreError;

/// Reasons a bounding box is rejected
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BBoxError {
    #[error("bbox must contain exactly 4 coordinates, found {0}")]
    WrongCoordinateCount(usize),

    #[error("bbox coordinate '{0}' is not a number")]
    NotNumeric(String),

    #[error("longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("minimum longitude {min} must be less than maximum longitude {max}")]
    InvalidLongitudeOrder { min: f64, max: f64 },

    #[error("bbox has zero height at latitude {0}")]
    ZeroHeight(f64),
}

impl From<BBoxError> for PointstoreError {
    fn from(err: BBoxError) -> Self {
        PointstoreError::InvalidBBox(err.to_string())
    }
}

/// Check a longitude against `[-180, 180]`
#[inline]
pub fn is_valid_longitude(lon: f64) -> bool {
    (-180.0..=180.0).contains(&lon)
}

/// Check a latitude against `[-90, 90]`
#[inline]
pub fn is_valid_latitude(lat: f64) -> bool {
    (-90.0..=90.0).contains(&lat)
}

/// Validated bounding box
///
/// Deserializes from either a JSON array of four numbers or the legacy
/// comma-separated string form (`"5,60,6,61"`), and always serializes as an
/// array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBBox", into = "[f64; 4]")]
pub struct BBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

/// Untrusted bounding box as it arrives in a request payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawBBox {
    Text(String),
    Coords(Vec<f64>),
}

impl BBox {
    /// Validate four ordered coordinates
    pub fn from_coords(coords: &[f64]) -> Result<Self, BBoxError> {
        let [min_lon, min_lat, max_lon, max_lat] = match coords {
            [a, b, c, d] => [*a, *b, *c, *d],
            _ => return Err(BBoxError::WrongCoordinateCount(coords.len())),
        };

        for lon in [min_lon, max_lon] {
            if !is_valid_longitude(lon) {
                return Err(BBoxError::LongitudeOutOfRange(lon));
            }
        }
        for lat in [min_lat, max_lat] {
            if !is_valid_latitude(lat) {
                return Err(BBoxError::LatitudeOutOfRange(lat));
            }
        }

        if min_lon >= max_lon {
            return Err(BBoxError::InvalidLongitudeOrder {
                min: min_lon,
                max: max_lon,
            });
        }
        if min_lat == max_lat {
            return Err(BBoxError::ZeroHeight(min_lat));
        }

        Ok(Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }

    /// Parse the comma-separated form, e.g. `"-98.15, 27.45, -96.02, 28.81"`
    pub fn parse_str(raw: &str) -> Result<Self, BBoxError> {
        let coords = raw
            .split(',')
            .map(|part| {
                let part = part.trim();
                part.parse::<f64>()
                    .map_err(|_| BBoxError::NotNumeric(part.to_string()))
            })
            .collect::<Result<Vec<f64>, _>>()?;
        Self::from_coords(&coords)
    }

    /// Validate a raw request value
    pub fn validate(raw: &RawBBox) -> Result<Self, BBoxError> {
        match raw {
            RawBBox::Text(text) => Self::parse_str(text),
            RawBBox::Coords(coords) => Self::from_coords(coords),
        }
    }

    /// Coordinates in request order: minLon, minLat, maxLon, maxLat
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }
}

impl TryFrom<RawBBox> for BBox {
    type Error = BBoxError;

    fn try_from(raw: RawBBox) -> Result<Self, Self::Error> {
        BBox::validate(&raw)
    }
}

impl From<BBox> for [f64; 4] {
    fn from(bbox: BBox) -> Self {
        bbox.to_array()
    }
}

impl std::str::FromStr for BBox {
    type Err = BBoxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BBox::parse_str(s)
    }
}

impl std::fmt::Display for BBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}
