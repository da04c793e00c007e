//! In-memory collaborators for saga and grid worker tests
//!
//! Every fake records what it was asked to do so tests can assert on the
//! signals, messages and notifications a step produced.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use pointstore_common::storage::LocalStorage;
use pointstore_common::types::BBox;
use pointstore_orders::query::PointQuery;
use pointstore_orders::saga::{
    CatalogClient, Notification, Notifier, Orchestrator, QueueMessage, SagaContext, TaskQueue,
};
use pointstore_orders::state::InMemoryOrderStore;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const OUTPUT_BUCKET: &str = "csb-order-output";
pub const PICKUP_BUCKET: &str = "order-pickup";

// ============================================================================
// Orchestrator
// ============================================================================

#[derive(Default)]
pub struct RecordingOrchestrator {
    pub started: Mutex<Vec<(String, Value)>>,
    pub successes: Mutex<Vec<(String, Value)>>,
    pub failures: Mutex<Vec<(String, String, String)>>,
}

impl RecordingOrchestrator {
    pub fn successes(&self) -> Vec<(String, Value)> {
        self.successes.lock().unwrap().clone()
    }

    pub fn failures(&self) -> Vec<(String, String, String)> {
        self.failures.lock().unwrap().clone()
    }
}

#[async_trait]
impl Orchestrator for RecordingOrchestrator {
    async fn start_saga(&self, order_id: &str, input: &Value) -> Result<String> {
        self.started
            .lock()
            .unwrap()
            .push((order_id.to_string(), input.clone()));
        Ok(format!("arn:aws:states:us-east-1:000000000000:execution:orders:{order_id}"))
    }

    async fn send_task_success(&self, task_token: &str, output: &Value) -> Result<()> {
        self.successes
            .lock()
            .unwrap()
            .push((task_token.to_string(), output.clone()));
        Ok(())
    }

    async fn send_task_failure(&self, task_token: &str, error: &str, cause: &str) -> Result<()> {
        self.failures.lock().unwrap().push((
            task_token.to_string(),
            error.to_string(),
            cause.to_string(),
        ));
        Ok(())
    }
}

// ============================================================================
// Queue
// ============================================================================

#[derive(Default)]
pub struct MemoryQueue {
    pending: Mutex<VecDeque<QueueMessage>>,
    pub sent: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
}

impl MemoryQueue {
    pub fn with_messages(bodies: &[&str]) -> Self {
        let queue = Self::default();
        {
            let mut pending = queue.pending.lock().unwrap();
            for (i, body) in bodies.iter().enumerate() {
                pending.push_back(QueueMessage {
                    body: body.to_string(),
                    receipt_handle: format!("receipt-{i}"),
                });
            }
        }
        queue
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn receive(&self, max: i32, _wait: Duration) -> Result<Vec<QueueMessage>> {
        let mut pending = self.pending.lock().unwrap();
        let count = (max.max(1) as usize).min(pending.len());
        Ok(pending.drain(..count).collect())
    }

    async fn delete(&self, receipt_handle: &str) -> Result<()> {
        self.deleted
            .lock()
            .unwrap()
            .push(receipt_handle.to_string());
        Ok(())
    }

    async fn send(&self, body: &str) -> Result<()> {
        self.sent.lock().unwrap().push(body.to_string());
        Ok(())
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Answers every lookup with a fixed listing, or fails when there is none
#[derive(Default)]
pub struct StaticCatalog {
    listing: Option<String>,
    pub requests: Mutex<Vec<(BBox, String)>>,
}

impl StaticCatalog {
    pub fn with_listing(listing: &str) -> Self {
        Self {
            listing: Some(listing.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogClient for StaticCatalog {
    async fn find_files(&self, bbox: &BBox, predicate: &str) -> Result<String> {
        self.requests
            .lock()
            .unwrap()
            .push((*bbox, predicate.to_string()));
        self.listing
            .clone()
            .ok_or_else(|| anyhow!("catalog returned 503 Service Unavailable"))
    }
}

// ============================================================================
// Notifier
// ============================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Saga context wired to in-memory fakes and a scratch object store
pub struct TestSaga {
    pub ctx: SagaContext,
    pub store: Arc<InMemoryOrderStore>,
    pub objects: Arc<LocalStorage>,
    pub orchestrator: Arc<RecordingOrchestrator>,
    pub catalog: Arc<StaticCatalog>,
    pub notifier: Arc<RecordingNotifier>,
    _objects_dir: TempDir,
}

impl TestSaga {
    pub fn new() -> Self {
        Self::with_catalog(StaticCatalog::with_listing(
            "survey-1/0001.mb58 58\nsurvey-1/0002.mb58 58\n",
        ))
    }

    pub fn with_catalog(catalog: StaticCatalog) -> Self {
        let objects_dir = TempDir::new().unwrap();
        let store = Arc::new(InMemoryOrderStore::new());
        let objects = Arc::new(LocalStorage::new(objects_dir.path()));
        let orchestrator = Arc::new(RecordingOrchestrator::default());
        let catalog = Arc::new(catalog);
        let notifier = Arc::new(RecordingNotifier::default());

        let ctx = SagaContext::new(
            store.clone(),
            objects.clone(),
            PointQuery::new("dcdb", "csb").unwrap(),
            OUTPUT_BUCKET,
        )
        .with_orchestrator(orchestrator.clone())
        .with_catalog(catalog.clone())
        .with_notifier(notifier.clone());

        Self {
            ctx,
            store,
            objects,
            orchestrator,
            catalog,
            notifier,
            _objects_dir: objects_dir,
        }
    }
}
