//! Grid worker tests with a stand-in gridding tool
//!
//! The tool is a shell script that writes `<order>.grd` next to the
//! datalist and prints the success marker, so these run on unix only.

#![cfg(unix)]

use pointstore_common::storage::{LocalStorage, ObjectStore};
use pointstore_common::types::{BBox, DatasetLabel, S3Location};
use pointstore_common::ErrorKind;
use pointstore_orders::grid::{GridExecutor, GridParams, GridWorker, MessageOutcome, SuccessCheck};
use pointstore_orders::saga::QueueMessage;
use pointstore_orders::state::{DatasetStatus, InMemoryOrderStore, Order, OrderStatus, OrderStore};
use serde_json::json;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

mod common;
use common::{MemoryQueue, RecordingOrchestrator, OUTPUT_BUCKET, PICKUP_BUCKET};

const ORDER_ID: &str = "5f0c3a8e-9d2b-4c61-8f7a-2b1d0e6c9a41";

const FAKE_MBGRID: &str = r#"#!/bin/sh
for arg in "$@"; do
  case "$arg" in -O*) out="${arg#-O}" ;; esac
done
echo "grid" > "$out.grd"
echo "Total number of bins: 42"
"#;

struct Harness {
    worker: GridWorker,
    store: Arc<InMemoryOrderStore>,
    objects: Arc<LocalStorage>,
    orchestrator: Arc<RecordingOrchestrator>,
    queue: Arc<MemoryQueue>,
    _dirs: Vec<TempDir>,
}

fn fake_tool(dir: &Path) -> PathBuf {
    let path = dir.join("mbgrid");
    std::fs::write(&path, FAKE_MBGRID).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn harness(queue: MemoryQueue) -> Harness {
    let tools = TempDir::new().unwrap();
    let objects_dir = TempDir::new().unwrap();
    let working_dir = TempDir::new().unwrap();

    let store = Arc::new(InMemoryOrderStore::new());
    let objects = Arc::new(LocalStorage::new(objects_dir.path()));
    let orchestrator = Arc::new(RecordingOrchestrator::default());
    let queue = Arc::new(queue);

    let executor = GridExecutor::new(
        fake_tool(tools.path()).to_string_lossy(),
        Duration::from_secs(30),
        SuccessCheck::Strict,
    );
    let worker = GridWorker::new(
        store.clone(),
        objects.clone(),
        orchestrator.clone(),
        queue.clone(),
        executor,
        working_dir.path(),
        PICKUP_BUCKET,
        Duration::from_millis(10),
    );

    Harness {
        worker,
        store,
        objects,
        orchestrator,
        queue,
        _dirs: vec![tools, objects_dir, working_dir],
    }
}

/// A staged order whose point extract is already in the output bucket
async fn staged_order(h: &Harness, grid: Option<GridParams>) {
    let bbox = BBox::from_coords(&[-98.15, 27.45, -96.02, 28.81]).unwrap();
    h.store
        .create_order(&Order::new(
            ORDER_ID,
            Some("someone@example.com".to_string()),
            bbox,
            grid,
        ))
        .await
        .unwrap();
    h.store
        .create_dataset(ORDER_ID, DatasetLabel::Csb)
        .await
        .unwrap();

    let extract = S3Location::new(OUTPUT_BUCKET, format!("{ORDER_ID}.csv"));
    h.objects
        .put(
            &extract,
            b"lon,lat,depth,time,platform_name,provider\n-98.123456,27.451234,12.34,2023-01-01,Anonymous,PGS\n"
                .to_vec(),
            Some("text/csv"),
        )
        .await
        .unwrap();
    h.store
        .update_dataset_status(
            ORDER_ID,
            DatasetLabel::Csb,
            DatasetStatus::Complete,
            Some(&extract),
        )
        .await
        .unwrap();
    h.store
        .update_order_status(ORDER_ID, OrderStatus::DataStaged, None)
        .await
        .unwrap();
}

fn grid_request(token: &str) -> String {
    json!({"order_id": ORDER_ID, "TaskToken": token}).to_string()
}

fn message(body: &str) -> QueueMessage {
    QueueMessage {
        body: body.to_string(),
        receipt_handle: "receipt-0".to_string(),
    }
}

#[tokio::test]
async fn test_grid_is_built_and_delivered() {
    let h = harness(MemoryQueue::default());
    staged_order(&h, Some(GridParams::new(100.0, 3).unwrap())).await;

    let outcome = h.worker.handle_message(&message(&grid_request("token-1"))).await;

    let pickup = S3Location::new(PICKUP_BUCKET, format!("{ORDER_ID}.zip"));
    assert_eq!(outcome, MessageOutcome::Completed(pickup.clone()));
    assert!(h.objects.size(&pickup).await.unwrap() > 0);

    let successes = h.orchestrator.successes();
    assert_eq!(successes.len(), 1);
    assert_eq!(successes[0].0, "token-1");
    assert_eq!(successes[0].1["output_location"], pickup.to_string());
    assert!(h.orchestrator.failures().is_empty());

    let order = h.store.get_order(ORDER_ID).await.unwrap();
    assert_eq!(order.status, OrderStatus::Complete);
    assert_eq!(order.output_location, Some(pickup));

    assert_eq!(h.queue.deleted(), vec!["receipt-0".to_string()]);
}

#[tokio::test]
async fn test_order_without_grid_fails() {
    let h = harness(MemoryQueue::default());
    staged_order(&h, None).await;

    let outcome = h.worker.handle_message(&message(&grid_request("token-2"))).await;
    assert_eq!(outcome, MessageOutcome::Failed(ErrorKind::Validation));

    let failures = h.orchestrator.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "token-2");
    assert_eq!(failures[0].1, "ValidationError");
    assert!(h.orchestrator.successes().is_empty());

    assert_eq!(
        h.store.get_order(ORDER_ID).await.unwrap().status,
        OrderStatus::Error
    );
    assert_eq!(h.queue.deleted(), vec!["receipt-0".to_string()]);
}

#[tokio::test]
async fn test_missing_order_fails() {
    let h = harness(MemoryQueue::default());

    let outcome = h.worker.handle_message(&message(&grid_request("token-3"))).await;
    assert_eq!(outcome, MessageOutcome::Failed(ErrorKind::Validation));
    assert_eq!(h.orchestrator.failures().len(), 1);
}

#[tokio::test]
async fn test_malformed_request_is_rejected() {
    let h = harness(MemoryQueue::default());

    let outcome = h
        .worker
        .handle_message(&message(r#"{"TaskToken": "token-4"}"#))
        .await;
    assert_eq!(outcome, MessageOutcome::Rejected);

    let failures = h.orchestrator.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "token-4");
    assert_eq!(failures[0].1, "ValidationError");

    let outcome = h.worker.handle_message(&message("not json")).await;
    assert_eq!(outcome, MessageOutcome::Rejected);
    assert_eq!(h.orchestrator.failures().len(), 1);
    assert_eq!(h.queue.deleted().len(), 2);
}

#[tokio::test]
async fn test_run_drains_queue_until_shutdown() {
    let body = grid_request("token-5");
    let h = harness(MemoryQueue::with_messages(&[body.as_str(), "not json"]));
    staged_order(&h, Some(GridParams::new(50.0, 3).unwrap())).await;

    // in-flight messages finish before the worker stops
    let queue = h.queue.clone();
    let drained = async move {
        while queue.pending() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };

    tokio::time::timeout(Duration::from_secs(30), h.worker.run(drained))
        .await
        .unwrap();

    assert_eq!(h.queue.pending(), 0);
    assert_eq!(
        h.queue.deleted(),
        vec!["receipt-0".to_string(), "receipt-1".to_string()]
    );
    assert_eq!(h.orchestrator.successes().len(), 1);
    assert_eq!(
        h.store.get_order(ORDER_ID).await.unwrap().status,
        OrderStatus::Complete
    );
}
