//! S3 Batch Operations invocation protocol
//!
//! Each task names one point file. Any failure is reported as a permanent
//! failure for that task so the batch job does not retry it.

use pointstore_common::types::S3Location;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::partition::{PartitionError, PartitionReport, Partitioner};

/// Missing keys are never retried
pub const TREAT_MISSING_KEYS_AS: ResultCode = ResultCode::PermanentFailure;

/// Request sent by the batch job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchInvocation {
    pub invocation_schema_version: String,
    pub invocation_id: String,
    pub tasks: Vec<BatchTask>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTask {
    pub task_id: String,
    /// URL-encoded object key
    pub s3_key: String,
    pub s3_bucket_arn: String,
}

impl BatchTask {
    /// Object named by the task
    pub fn location(&self) -> Result<S3Location, PartitionError> {
        let key = urlencoding::decode(&self.s3_key)
            .map_err(|_| PartitionError::InvalidFileName(self.s3_key.clone()))?;
        let bucket = self
            .s3_bucket_arn
            .rsplit(':')
            .next()
            .unwrap_or_default();
        if bucket.is_empty() || key.is_empty() {
            return Err(PartitionError::InvalidFileName(format!(
                "{}/{}",
                self.s3_bucket_arn, self.s3_key
            )));
        }
        Ok(S3Location::new(bucket, key.into_owned()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultCode {
    Succeeded,
    PermanentFailure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub task_id: String,
    pub result_code: ResultCode,
    pub result_string: String,
}

impl TaskResult {
    fn from_outcome(task_id: &str, outcome: &Result<PartitionReport, PartitionError>) -> Self {
        let (result_code, result_string) = match outcome {
            Ok(report) => (ResultCode::Succeeded, report.summary()),
            Err(e) => (ResultCode::PermanentFailure, e.to_string()),
        };
        Self {
            task_id: task_id.to_string(),
            result_code,
            result_string,
        }
    }
}

/// Answer returned to the batch job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub invocation_schema_version: String,
    pub treat_missing_keys_as: ResultCode,
    pub invocation_id: String,
    pub results: Vec<TaskResult>,
}

/// Partition every file named in the invocation
#[instrument(skip_all, fields(invocation_id = %invocation.invocation_id))]
pub async fn handle_invocation(partitioner: &Partitioner, invocation: BatchInvocation) -> BatchResponse {
    let mut results = Vec::with_capacity(invocation.tasks.len());

    for task in &invocation.tasks {
        let outcome = match task.location() {
            Ok(location) => partitioner.process(&location).await,
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(report) => {
                info!(task_id = %task.task_id, file = %report.file_name, "{}", report.summary())
            },
            Err(e @ PartitionError::NoValidRecords { .. }) => {
                warn!(task_id = %task.task_id, key = %task.s3_key, "{}", e)
            },
            Err(e) => error!(
                task_id = %task.task_id,
                key = %task.s3_key,
                kind = %e.kind(),
                error = %e,
                "Partitioning failed"
            ),
        }
        results.push(TaskResult::from_outcome(&task.task_id, &outcome));
    }

    BatchResponse {
        invocation_schema_version: invocation.invocation_schema_version,
        treat_missing_keys_as: TREAT_MISSING_KEYS_AS,
        invocation_id: invocation.invocation_id,
        results,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invocation_parsing_and_key_decoding() {
        let invocation: BatchInvocation = serde_json::from_value(json!({
            "invocationSchemaVersion": "1.0",
            "invocationId": "inv-1",
            "job": {"id": "job-1"},
            "tasks": [{
                "taskId": "task-1",
                "s3Key": "csb/csv/2019/03/20190306_27a0f0710fc935ce44b83b6d539d2d44_pointData%20v2.csv",
                "s3VersionId": null,
                "s3BucketArn": "arn:aws:s3:::noaa-bathymetry-pds"
            }]
        }))
        .unwrap();

        let location = invocation.tasks[0].location().unwrap();
        assert_eq!(location.bucket, "noaa-bathymetry-pds");
        assert_eq!(
            location.key,
            "csb/csv/2019/03/20190306_27a0f0710fc935ce44b83b6d539d2d44_pointData v2.csv"
        );
    }

    #[test]
    fn test_task_without_bucket_is_rejected() {
        let task = BatchTask {
            task_id: "t".to_string(),
            s3_key: "a.csv".to_string(),
            s3_bucket_arn: "arn:aws:s3:::".to_string(),
        };
        assert!(matches!(task.location(), Err(PartitionError::InvalidFileName(_))));
    }

    #[test]
    fn test_response_wire_format() {
        let response = BatchResponse {
            invocation_schema_version: "1.0".to_string(),
            treat_missing_keys_as: TREAT_MISSING_KEYS_AS,
            invocation_id: "inv-1".to_string(),
            results: vec![TaskResult::from_outcome(
                "task-1",
                &Err(PartitionError::NoValidRecords { invalid_count: 2 }),
            )],
        };

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "invocationSchemaVersion": "1.0",
                "treatMissingKeysAs": "PermanentFailure",
                "invocationId": "inv-1",
                "results": [{
                    "taskId": "task-1",
                    "resultCode": "PermanentFailure",
                    "resultString": "no valid records. 2 invalid records"
                }]
            })
        );
    }
}
