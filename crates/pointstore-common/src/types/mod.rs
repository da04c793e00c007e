//! Common types used across Pointstore

pub mod dataset;
pub mod geo;
pub mod location;

pub use dataset::DatasetLabel;
pub use geo::{is_valid_latitude, is_valid_longitude, BBox, BBoxError, RawBBox};
pub use location::S3Location;
