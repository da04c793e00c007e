//! Partitioner tests over a local object store
//!
//! Both strategies run against the same input and must write the same
//! objects; the batch protocol is exercised end to end on top of them.

use pointstore_common::storage::{LocalStorage, ObjectStore};
use pointstore_common::types::S3Location;
use pointstore_common::ErrorKind;
use pointstore_ingest::batch::{handle_invocation, BatchInvocation, ResultCode};
use pointstore_ingest::config::PartitionConfig;
use pointstore_ingest::partition::{
    CellIndexer, H3Indexer, PartitionError, Partitioner, Strategy, OUTPUT_HEADER,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

const SOURCE_BUCKET: &str = "noaa-bathymetry-pds";
const FILE_NAME: &str = "20190306_27a0f0710fc935ce44b83b6d539d2d44_pointData.csv";
const INPUT_HEADER: &str = "UNIQUE_ID,FILE_UUID,LON,LAT,DEPTH,TIME,PLATFORM_NAME,PROVIDER";

struct Harness {
    partitioner: Partitioner,
    objects: Arc<LocalStorage>,
    _dirs: (TempDir, TempDir),
}

fn harness(memory_threshold_bytes: u64) -> Harness {
    let objects_dir = TempDir::new().unwrap();
    let staging_dir = TempDir::new().unwrap();
    let objects = Arc::new(LocalStorage::new(objects_dir.path()));

    let config = PartitionConfig {
        memory_threshold_bytes,
        staging_dir: staging_dir.path().to_path_buf(),
        ..PartitionConfig::default()
    };
    let partitioner = Partitioner::new(objects.clone(), Arc::new(H3Indexer::default()), config);

    Harness {
        partitioner,
        objects,
        _dirs: (objects_dir, staging_dir),
    }
}

/// Points around the Gulf of Mexico and the North Sea plus three bad rows
fn point_file() -> String {
    let mut lines = vec![INPUT_HEADER.to_string()];
    for i in 0..40 {
        let offset = i as f64 * 0.001;
        lines.push(format!(
            "id-gulf-{i},f1,{:.4},{:.4},{}.5,2019-03-01T00:00:{:02}Z,Anonymous,PGS",
            -98.15 + offset,
            27.45 + offset,
            10 + i,
            i % 60
        ));
        lines.push(format!(
            "id-north-{i},f1,{:.4},{:.4},{}.0,2019-03-02T00:00:{:02}Z,Ramform Vanguard,PGS",
            5.1 + offset,
            60.1 + offset,
            200 + i,
            i % 60
        ));
    }
    lines.push("id-bad-1,f1,not-a-lon,60.1,1.0,2019-03-02T00:00:00Z,x,y".to_string());
    lines.push("id-bad-2,f1,5.1,95.0,1.0,2019-03-02T00:00:00Z,x,y".to_string());
    lines.push("id-bad-3,f1".to_string());
    lines.join("\n") + "\n"
}

async fn put_source(h: &Harness, file_name: &str, body: String) -> S3Location {
    let source = S3Location::new(SOURCE_BUCKET, format!("csb/csv/2019/03/{file_name}"));
    h.objects
        .put(&source, body.into_bytes(), Some("text/csv"))
        .await
        .unwrap();
    source
}

async fn read(h: &Harness, location: &S3Location) -> String {
    String::from_utf8(h.objects.get(location).await.unwrap()).unwrap()
}

// ============================================================================
// Counts and layout
// ============================================================================

#[tokio::test]
async fn test_partition_counts_and_layout() {
    let h = harness(1_000_000);
    let source = put_source(&h, FILE_NAME, point_file()).await;

    let report = h.partitioner.process(&source).await.unwrap();
    assert_eq!(report.strategy, Strategy::InMemory);
    assert_eq!(report.valid_count, 80);
    assert_eq!(report.invalid_count, 3);
    assert_eq!(report.partition_count, 2);
    assert_eq!(report.file_name, FILE_NAME);
    assert!(report.summary().starts_with("80 records written across 2 partitions."));
    assert!(report.summary().ends_with(" 3 invalid records."));

    let indexer = H3Indexer::default();
    let gulf = indexer.cell(27.45, -98.15).unwrap();
    let north = indexer.cell(60.1, 5.1).unwrap();

    let gulf_object = S3Location::new("csb-data", format!("csv/{gulf}/{FILE_NAME}"));
    let north_object = S3Location::new("csb-data", format!("csv/{north}/{FILE_NAME}"));
    assert!(report.outputs.contains(&gulf_object));
    assert!(report.outputs.contains(&north_object));

    let body = read(&h, &gulf_object).await;
    let mut lines = body.lines();
    assert_eq!(lines.next().unwrap(), OUTPUT_HEADER.join(","));
    assert_eq!(
        lines.next().unwrap(),
        format!("2019-03-06,{gulf},-98.1500,27.4500,10.5,2019-03-01T00:00:00Z,Anonymous,PGS")
    );
    assert_eq!(body.lines().count(), 41);
    assert!(body.lines().skip(1).all(|line| line.starts_with(&format!("2019-03-06,{gulf},"))));
}

#[tokio::test]
async fn test_strategies_write_identical_objects() {
    let memory = harness(1_000_000);
    let staged = harness(1_000_000);
    let source = put_source(&memory, FILE_NAME, point_file()).await;
    put_source(&staged, FILE_NAME, point_file()).await;
    let size = memory.objects.size(&source).await.unwrap();

    let in_memory = memory
        .partitioner
        .process_with(&source, size, Strategy::InMemory)
        .await
        .unwrap();
    let incremental = staged
        .partitioner
        .process_with(&source, size, Strategy::Incremental)
        .await
        .unwrap();

    assert_eq!(incremental.outputs, in_memory.outputs);
    assert_eq!(incremental.valid_count, in_memory.valid_count);
    assert_eq!(incremental.invalid_count, in_memory.invalid_count);

    for location in &in_memory.outputs {
        assert_eq!(
            read(&staged, location).await,
            read(&memory, location).await,
            "{location} differs"
        );
    }
}

#[tokio::test]
async fn test_large_files_use_incremental_strategy() {
    let h = harness(1024);
    let source = put_source(&h, FILE_NAME, point_file()).await;

    let report = h.partitioner.process(&source).await.unwrap();
    assert_eq!(report.strategy, Strategy::Incremental);
    assert_eq!(report.partition_count, 2);

    // scratch files are gone once the file is done
    let staging = &h.partitioner.config().staging_dir;
    assert_eq!(std::fs::read_dir(staging).unwrap().count(), 0);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_file_without_valid_records_fails() {
    let h = harness(1_000_000);
    let body = format!("{INPUT_HEADER}\nid-1,f1,200,10,1,t,p,q\nid-2,f1,x,y,1,t,p,q\n");
    let source = put_source(&h, FILE_NAME, body).await;

    for strategy in [Strategy::InMemory, Strategy::Incremental] {
        let err = h.partitioner.process_with(&source, 0, strategy).await.unwrap_err();
        assert!(matches!(err, PartitionError::NoValidRecords { invalid_count: 2 }));
        assert_eq!(err.kind(), ErrorKind::DataQuality);
    }
}

#[tokio::test]
async fn test_missing_object_is_a_storage_failure() {
    let h = harness(1_000_000);
    let source = S3Location::new(SOURCE_BUCKET, format!("csb/{FILE_NAME}"));

    let err = h.partitioner.process(&source).await.unwrap_err();
    assert!(matches!(err, PartitionError::Storage { .. }));
    assert_eq!(err.kind(), ErrorKind::Dependency);
}

#[tokio::test]
async fn test_undated_file_name_is_rejected() {
    let h = harness(1_000_000);
    let source = put_source(&h, "pointData.csv", point_file()).await;

    let err = h.partitioner.process(&source).await.unwrap_err();
    assert!(matches!(err, PartitionError::InvalidFileName(_)));
}

// ============================================================================
// Batch protocol
// ============================================================================

#[tokio::test]
async fn test_batch_invocation_reports_each_task() {
    let h = harness(1_000_000);
    put_source(&h, FILE_NAME, point_file()).await;

    let invocation: BatchInvocation = serde_json::from_value(json!({
        "invocationSchemaVersion": "1.0",
        "invocationId": "YXNkbGZqYWRmaiBhc2RmdW9hZHNmZGpmaGFzbGtkaGZza2RmaAo",
        "tasks": [
            {
                "taskId": "task-ok",
                "s3Key": format!("csb%2Fcsv%2F2019%2F03%2F{FILE_NAME}"),
                "s3BucketArn": format!("arn:aws:s3:::{SOURCE_BUCKET}")
            },
            {
                "taskId": "task-missing",
                "s3Key": "csb/csv/2019/03/20190307_missing_pointData.csv",
                "s3BucketArn": format!("arn:aws:s3:::{SOURCE_BUCKET}")
            }
        ]
    }))
    .unwrap();

    let response = handle_invocation(&h.partitioner, invocation).await;
    assert_eq!(response.invocation_schema_version, "1.0");
    assert_eq!(response.treat_missing_keys_as, ResultCode::PermanentFailure);
    assert_eq!(response.results.len(), 2);

    assert_eq!(response.results[0].task_id, "task-ok");
    assert_eq!(response.results[0].result_code, ResultCode::Succeeded);
    assert!(response.results[0]
        .result_string
        .starts_with("80 records written across 2 partitions."));

    assert_eq!(response.results[1].task_id, "task-missing");
    assert_eq!(response.results[1].result_code, ResultCode::PermanentFailure);
}
