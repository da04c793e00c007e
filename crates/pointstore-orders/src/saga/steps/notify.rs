//! Requester notification step

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument};

use super::require_order_id;
use crate::error::{SagaError, SagaResult};
use crate::saga::{Notification, SagaContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyCommand {
    pub order_id: String,
    /// Overrides the address stored with the order
    #[serde(default)]
    pub email: Option<String>,
    pub message: String,
}

impl NotifyCommand {
    pub fn validate(&self) -> SagaResult<()> {
        require_order_id(&self.order_id)?;
        if self.message.trim().is_empty() {
            return Err(SagaError::Validation("message is required".to_string()));
        }
        Ok(())
    }
}

/// Hand the message to the notifier unless the order has no address
#[instrument(skip_all, fields(order_id = %command.order_id))]
pub async fn notify(ctx: &SagaContext, command: NotifyCommand) -> SagaResult<Value> {
    command.validate()?;

    let email = match command.email.as_deref().map(str::trim) {
        Some(email) => email.to_string(),
        None => {
            let order = ctx.store.get_order(&command.order_id).await?;
            order.notify_address().unwrap_or_default().to_string()
        },
    };

    if email.is_empty() {
        info!("No email address, skipping notification");
        return Ok(json!({ "order_id": command.order_id, "notified": false }));
    }

    let notification = Notification {
        order_id: command.order_id.clone(),
        email,
        message: command.message,
    };
    ctx.notifier()?
        .notify(&notification)
        .await
        .map_err(|e| SagaError::dependency("Failed to send notification", e))?;

    Ok(json!({ "order_id": command.order_id, "notified": true }))
}
