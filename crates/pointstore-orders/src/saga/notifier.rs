//! Requester notification

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use pointstore_common::types::S3Location;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

use super::queue::TaskQueue;

/// Days a delivered artifact stays downloadable
pub const AVAILABILITY_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub order_id: String,
    pub email: String,
    pub message: String,
}

/// Hands notifications to the delivery channel
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Enqueues notifications as JSON for the mail relay
pub struct QueueNotifier {
    queue: Arc<dyn TaskQueue>,
}

impl QueueNotifier {
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl Notifier for QueueNotifier {
    #[instrument(skip(self, notification), fields(order_id = %notification.order_id))]
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let body = serde_json::to_string(notification)?;
        self.queue
            .send(&body)
            .await
            .context("Failed to enqueue notification")?;
        info!("Notification enqueued");
        Ok(())
    }
}

/// Message telling the requester where to download their data
pub fn format_ready_message(location: &S3Location, now: DateTime<Utc>) -> String {
    let expires = now + Duration::days(AVAILABILITY_DAYS);
    format!(
        "Your data request is ready and can be downloaded from {}.\nThe data will be available until {}.",
        location.public_url(),
        expires.format("%B %-d, %Y")
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_ready_message() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let location = S3Location::new("order-pickup", "abc.zip");
        assert_eq!(
            format_ready_message(&location, now),
            "Your data request is ready and can be downloaded from \
             https://order-pickup.s3.amazonaws.com/abc.zip.\n\
             The data will be available until March 8, 2024."
        );
    }
}
