//! Task queue seam

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_sqs::{config::Region, error::DisplayErrorContext, Client};
use std::time::Duration;
use tracing::{debug, instrument};

/// Message received from a [`TaskQueue`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub body: String,
    /// Handle used to delete the message once handled
    pub receipt_handle: String,
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Receive up to `max` messages, waiting at most `wait` for the first
    async fn receive(&self, max: i32, wait: Duration) -> Result<Vec<QueueMessage>>;

    async fn delete(&self, receipt_handle: &str) -> Result<()>;

    async fn send(&self, body: &str) -> Result<()>;
}

/// SQS queue
pub struct SqsQueue {
    client: Client,
    queue_url: String,
}

impl SqsQueue {
    pub async fn new(queue_url: impl Into<String>, region: impl Into<String>) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.into()))
            .load()
            .await;
        Self::from_client(Client::new(&config), queue_url)
    }

    pub fn from_client(client: Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

#[async_trait]
impl TaskQueue for SqsQueue {
    #[instrument(skip(self), fields(queue = %self.queue_url))]
    async fn receive(&self, max: i32, wait: Duration) -> Result<Vec<QueueMessage>> {
        // SQS caps both values
        let max = max.clamp(1, 10);
        let wait = wait.as_secs().min(20) as i32;

        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max)
            .wait_time_seconds(wait)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(&e)))
            .context("Failed to receive messages")?;

        let messages: Vec<QueueMessage> = output
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| match (m.body, m.receipt_handle) {
                (Some(body), Some(receipt_handle)) => Some(QueueMessage {
                    body,
                    receipt_handle,
                }),
                _ => None,
            })
            .collect();
        debug!(count = messages.len(), "Received messages");
        Ok(messages)
    }

    #[instrument(skip(self, receipt_handle), fields(queue = %self.queue_url))]
    async fn delete(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(&e)))
            .context("Failed to delete message")?;
        Ok(())
    }

    #[instrument(skip(self, body), fields(queue = %self.queue_url))]
    async fn send(&self, body: &str) -> Result<()> {
        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(&e)))
            .context("Failed to send message")?;
        Ok(())
    }
}
