//! Dataset filter payloads as submitted with an order

use pointstore_common::types::DatasetLabel;
use serde::{Deserialize, Serialize};

/// Inclusive date range; either bound may be omitted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

impl DateRange {
    pub fn starting(start: impl Into<String>) -> Self {
        Self {
            start: Some(start.into()),
            end: None,
        }
    }

    pub fn between(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: Some(start.into()),
            end: Some(end.into()),
        }
    }
}

/// Filters for one dataset of an order
///
/// All fields besides `label` are optional. Point-table queries use
/// `platforms`, `providers`, the date ranges and `unique_id`; the multibeam
/// catalog additionally understands `surveys`, `exclude_surveys` and
/// `processing_level`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetFilters {
    #[serde(alias = "type")]
    pub label: DatasetLabel,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platforms: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub providers: Option<Vec<String>>,

    /// Survey/collection date, column `time`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_date: Option<DateRange>,

    /// Date the data entered the archive, column `entry_date`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_date: Option<DateRange>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surveys: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_surveys: Option<Vec<String>>,

    /// `raw` or `processed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_level: Option<String>,
}

impl DatasetFilters {
    /// Filters that select everything in the bounding box
    pub fn new(label: DatasetLabel) -> Self {
        Self {
            label,
            platforms: None,
            providers: None,
            collection_date: None,
            archive_date: None,
            unique_id: None,
            surveys: None,
            exclude_surveys: None,
            processing_level: None,
        }
    }
}
