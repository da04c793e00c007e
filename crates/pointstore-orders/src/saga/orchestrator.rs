//! Workflow orchestrator seam

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_sfn::{config::Region, error::DisplayErrorContext, Client};
use serde_json::Value;
use tracing::{debug, info, instrument};

/// Starts sagas and receives the outcome of asynchronous steps
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Start a saga for `order_id`; returns the execution id
    async fn start_saga(&self, order_id: &str, input: &Value) -> Result<String>;

    async fn send_task_success(&self, task_token: &str, output: &Value) -> Result<()>;

    async fn send_task_failure(&self, task_token: &str, error: &str, cause: &str) -> Result<()>;
}

/// AWS Step Functions state machine
pub struct StepFunctionsOrchestrator {
    client: Client,
    state_machine_arn: String,
}

impl StepFunctionsOrchestrator {
    pub async fn new(state_machine_arn: impl Into<String>, region: impl Into<String>) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.into()))
            .load()
            .await;
        Self::from_client(Client::new(&config), state_machine_arn)
    }

    pub fn from_client(client: Client, state_machine_arn: impl Into<String>) -> Self {
        Self {
            client,
            state_machine_arn: state_machine_arn.into(),
        }
    }
}

#[async_trait]
impl Orchestrator for StepFunctionsOrchestrator {
    #[instrument(skip(self, input))]
    async fn start_saga(&self, order_id: &str, input: &Value) -> Result<String> {
        let output = self
            .client
            .start_execution()
            .state_machine_arn(&self.state_machine_arn)
            .name(order_id)
            .input(input.to_string())
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(&e)))
            .context("Failed to start state machine execution")?;

        let execution_arn = output.execution_arn().to_string();
        info!(execution_arn = %execution_arn, "Saga started");
        Ok(execution_arn)
    }

    #[instrument(skip(self, task_token, output))]
    async fn send_task_success(&self, task_token: &str, output: &Value) -> Result<()> {
        self.client
            .send_task_success()
            .task_token(task_token)
            .output(output.to_string())
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(&e)))
            .context("Failed to send task success")?;
        debug!("Task success sent");
        Ok(())
    }

    #[instrument(skip(self, task_token))]
    async fn send_task_failure(&self, task_token: &str, error: &str, cause: &str) -> Result<()> {
        self.client
            .send_task_failure()
            .task_token(task_token)
            .error(error)
            .cause(cause)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(&e)))
            .context("Failed to send task failure")?;
        debug!("Task failure sent");
        Ok(())
    }
}
