//! Order and dataset records

use chrono::{DateTime, SecondsFormat, Utc};
use pointstore_common::types::{BBox, DatasetLabel, S3Location};
use serde::{Deserialize, Serialize};

use crate::grid::GridParams;

/// Records expire 60 days after their last update
pub const TTL_SECONDS: i64 = 60 * 24 * 60 * 60;

/// Sort key of the order item
pub const ORDER_SK: &str = "ORDER";

/// Sort key prefix shared by all dataset items of an order
pub const DATASET_SK_PREFIX: &str = "DATASET#";

pub fn order_pk(order_id: &str) -> String {
    format!("ORDER#{}", order_id)
}

pub fn dataset_sk(label: DatasetLabel) -> String {
    format!("{}{}", DATASET_SK_PREFIX, label)
}

/// Write timestamp and expiry applied to every record update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteStamp {
    /// ISO-8601 UTC, second precision
    pub last_update: String,
    /// Epoch seconds
    pub ttl: i64,
}

impl WriteStamp {
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(instant: DateTime<Utc>) -> Self {
        Self {
            last_update: instant.to_rfc3339_opts(SecondsFormat::Secs, true),
            ttl: instant.timestamp() + TTL_SECONDS,
        }
    }
}

/// Order lifecycle
///
/// `initialized -> processing -> data staged -> complete`; `error` can be
/// entered from any non-terminal state and never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    #[serde(rename = "initialized")]
    Initialized,
    #[serde(rename = "processing")]
    Processing,
    #[serde(rename = "data staged")]
    DataStaged,
    #[serde(rename = "complete", alias = "NOTIFIED")]
    Complete,
    #[serde(rename = "error", alias = "FAILED", alias = "FAILURE")]
    Error,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Initialized => "initialized",
            OrderStatus::Processing => "processing",
            OrderStatus::DataStaged => "data staged",
            OrderStatus::Complete => "complete",
            OrderStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Complete | OrderStatus::Error)
    }

    /// Statuses a record may hold for a write of `self` to be accepted
    ///
    /// Rewriting the current status is allowed so retried steps stay idempotent.
    pub fn allowed_predecessors(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Initialized => &[Initialized],
            Processing => &[Initialized, Processing],
            DataStaged => &[Initialized, Processing, DataStaged],
            Complete => &[Initialized, Processing, DataStaged, Complete],
            Error => &[Initialized, Processing, DataStaged, Error],
        }
    }

    pub fn can_follow(&self, current: OrderStatus) -> bool {
        self.allowed_predecessors().contains(&current)
    }

    /// Every spelling an item may carry for this status, legacy ones included
    pub fn stored_spellings(&self) -> &'static [&'static str] {
        match self {
            OrderStatus::Initialized => &["initialized"],
            OrderStatus::Processing => &["processing"],
            OrderStatus::DataStaged => &["data staged"],
            OrderStatus::Complete => &["complete", "NOTIFIED"],
            OrderStatus::Error => &["error", "FAILED", "FAILURE"],
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "initialized" => Ok(OrderStatus::Initialized),
            "processing" => Ok(OrderStatus::Processing),
            "data staged" => Ok(OrderStatus::DataStaged),
            "complete" | "notified" => Ok(OrderStatus::Complete),
            "error" | "failed" | "failure" => Ok(OrderStatus::Error),
            other => Err(format!("unknown order status '{}'", other)),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-dataset processing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatasetStatus {
    #[serde(rename = "processing")]
    Processing,
    #[serde(rename = "complete", alias = "SUCCEEDED", alias = "SUCCESS")]
    Complete,
    #[serde(rename = "error", alias = "FAILURE", alias = "FAILED")]
    Error,
}

impl DatasetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetStatus::Processing => "processing",
            DatasetStatus::Complete => "complete",
            DatasetStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DatasetStatus::Processing)
    }

    pub fn allowed_predecessors(&self) -> &'static [DatasetStatus] {
        use DatasetStatus::*;
        match self {
            Processing => &[Processing],
            Complete => &[Processing, Complete],
            Error => &[Processing, Error],
        }
    }

    pub fn can_follow(&self, current: DatasetStatus) -> bool {
        self.allowed_predecessors().contains(&current)
    }

    /// Every spelling an item may carry for this status, legacy ones included
    pub fn stored_spellings(&self) -> &'static [&'static str] {
        match self {
            DatasetStatus::Processing => &["processing"],
            DatasetStatus::Complete => &["complete", "SUCCEEDED", "SUCCESS"],
            DatasetStatus::Error => &["error", "FAILURE", "FAILED"],
        }
    }
}

impl std::str::FromStr for DatasetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "processing" => Ok(DatasetStatus::Processing),
            "complete" | "succeeded" | "success" => Ok(DatasetStatus::Complete),
            "error" | "failure" | "failed" => Ok(DatasetStatus::Error),
            other => Err(format!("unknown dataset status '{}'", other)),
        }
    }
}

impl std::fmt::Display for DatasetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One data-extract request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    /// Empty or absent means "do not notify"
    pub email: Option<String>,
    pub bbox: BBox,
    pub status: OrderStatus,
    pub last_update: String,
    pub output_location: Option<S3Location>,
    pub grid: Option<GridParams>,
    pub ttl: i64,
}

impl Order {
    /// A freshly submitted order in `initialized`
    pub fn new(
        order_id: impl Into<String>,
        email: Option<String>,
        bbox: BBox,
        grid: Option<GridParams>,
    ) -> Self {
        let stamp = WriteStamp::now();
        Self {
            order_id: order_id.into(),
            email,
            bbox,
            status: OrderStatus::Initialized,
            last_update: stamp.last_update,
            output_location: None,
            grid,
            ttl: stamp.ttl,
        }
    }

    /// Address to notify, if any
    pub fn notify_address(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}

/// One source dataset's contribution to an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub order_id: String,
    pub label: DatasetLabel,
    pub status: DatasetStatus,
    pub output_location: Option<S3Location>,
    pub last_update: String,
    pub ttl: i64,
}

impl Dataset {
    pub fn new(order_id: impl Into<String>, label: DatasetLabel) -> Self {
        let stamp = WriteStamp::now();
        Self {
            order_id: order_id.into(),
            label,
            status: DatasetStatus::Processing,
            output_location: None,
            last_update: stamp.last_update,
            ttl: stamp.ttl,
        }
    }
}
