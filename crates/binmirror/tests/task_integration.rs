//! Integration tests for the task queue driving category syncs.
//!
//! These tests require the `sqlite` and `migrate` features to be enabled
//! and use an in-memory SQLite database.

#![cfg(all(feature = "sqlite", feature = "migrate"))]

mod common;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use binmirror::entity::task_state::TaskState;
use binmirror::repository;
use binmirror::retry::RetryConfig;
use binmirror::source::{RegistryOptions, SourceClient};
use binmirror::sync::SyncProgress;
use binmirror::task::{WorkerConfig, WorkerPool, resume_hint};
use binmirror::{
    AdapterKind, AdapterRegistry, CategoryConfig, DbTaskEngine, MemoryBlobStore, TaskEngine,
    connect_and_migrate,
};
use tokio::sync::watch;

use common::{DIST, FixtureTransport, node_dist};

struct Harness {
    db: Arc<sea_orm::DatabaseConnection>,
    engine: Arc<DbTaskEngine>,
    transport: FixtureTransport,
    store: MemoryBlobStore,
}

impl Harness {
    async fn new() -> Self {
        let db = Arc::new(
            connect_and_migrate("sqlite::memory:")
                .await
                .expect("Failed to create test database"),
        );
        let transport = FixtureTransport::new();
        node_dist(&transport);
        Self {
            engine: Arc::new(DbTaskEngine::new(Arc::clone(&db))),
            db,
            transport,
            store: MemoryBlobStore::new(),
        }
    }

    fn pool(&self, config: WorkerConfig) -> WorkerPool {
        let options = RegistryOptions {
            retry: RetryConfig::disabled(),
            ..RegistryOptions::default()
        };
        let mut node = CategoryConfig::new(AdapterKind::Index, DIST);
        node.ignored_dirs = vec!["/v20.0.0/docs/".to_string()];
        let registry = AdapterRegistry::new(
            BTreeMap::from([("node".to_string(), node)]),
            Arc::new(self.transport.clone()),
            &options,
        )
        .expect("valid registry");

        WorkerPool::new(
            self.engine.clone(),
            Arc::new(registry),
            Arc::clone(&self.db),
            Arc::new(self.store.clone()),
            SourceClient::new(Arc::new(self.transport.clone())).with_retry(RetryConfig::disabled()),
            config,
        )
    }
}

#[tokio::test]
async fn test_worker_completes_task_and_advances_hint() {
    let harness = Harness::new().await;
    harness.engine.create_or_join("node").await.expect("enqueue");

    let stats = harness
        .pool(WorkerConfig::default())
        .run_until_idle()
        .await
        .expect("run");
    assert_eq!(stats.complete, 1);
    assert_eq!(stats.total(), 1);

    let task = harness
        .engine
        .find("node")
        .await
        .expect("find")
        .expect("task exists");
    assert_eq!(task.state, TaskState::Done);
    assert!(task.finished_at.is_some());
    assert!(task.note.as_deref().is_some_and(|n| n.starts_with("node:")));

    let hint = resume_hint(&task).expect("decode").expect("hint stored");
    assert!(hint.last_synced_at <= chrono::Utc::now());
    assert_eq!(
        repository::count_by_category(harness.db.as_ref(), "node")
            .await
            .expect("count"),
        3
    );
}

#[tokio::test]
async fn test_incomplete_run_keeps_previous_hint() {
    let harness = Harness::new().await;
    harness.engine.create_or_join("node").await.expect("enqueue");
    harness
        .pool(WorkerConfig::default())
        .run_until_idle()
        .await
        .expect("first run");
    let first = harness.engine.find("node").await.expect("find").expect("task");
    let first_hint = resume_hint(&first).expect("decode");
    assert!(first_hint.is_some());

    harness
        .transport
        .route(&format!("{DIST}v20.0.0/"), 500, "Internal Server Error");
    let enqueued = harness.engine.create_or_join("node").await.expect("requeue");
    assert!(!enqueued.joined);

    let stats = harness
        .pool(WorkerConfig::default())
        .run_until_idle()
        .await
        .expect("second run");
    assert_eq!(stats.incomplete, 1);

    let second = harness.engine.find("node").await.expect("find").expect("task");
    assert_eq!(second.state, TaskState::Done);
    assert_eq!(resume_hint(&second).expect("decode"), first_hint);
    assert_eq!(second.attempts, 2);
}

#[tokio::test]
async fn test_unknown_category_fails_task() {
    let harness = Harness::new().await;
    harness.engine.create_or_join("retired").await.expect("enqueue");

    let stats = harness
        .pool(WorkerConfig::default())
        .run_until_idle()
        .await
        .expect("run");
    assert_eq!(stats.failed, 1);

    let task = harness
        .engine
        .find("retired")
        .await
        .expect("find")
        .expect("task exists");
    assert_eq!(task.state, TaskState::Failed);
    assert!(task.note.as_deref().is_some_and(|n| n.contains("retired")));
}

#[tokio::test]
async fn test_dry_run_never_records_a_hint() {
    let harness = Harness::new().await;
    harness.engine.create_or_join("node").await.expect("enqueue");

    let mut config = WorkerConfig::default();
    config.sync.dry_run = true;
    let stats = harness.pool(config).run_until_idle().await.expect("run");
    assert_eq!(stats.incomplete, 1);

    let task = harness.engine.find("node").await.expect("find").expect("task");
    assert_eq!(task.state, TaskState::Done);
    assert_eq!(resume_hint(&task).expect("decode"), None);
    assert_eq!(
        repository::count_by_category(harness.db.as_ref(), "node")
            .await
            .expect("count"),
        0
    );
}

#[tokio::test]
async fn test_progress_reaches_callback() {
    let harness = Harness::new().await;
    harness.engine.create_or_join("node").await.expect("enqueue");

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let pool = harness
        .pool(WorkerConfig::default())
        .with_progress(Box::new(move |event| {
            sink.lock().expect("events lock").push(event);
        }));
    pool.run_until_idle().await.expect("run");

    let events = events.lock().expect("events lock");
    assert!(matches!(events.first(), Some(SyncProgress::RunStarted { .. })));
    assert!(matches!(
        events.last(),
        Some(SyncProgress::RunFinished { complete: true, .. })
    ));
    let downloads = events
        .iter()
        .filter(|e| matches!(e, SyncProgress::Downloaded { .. }))
        .count();
    assert_eq!(downloads, 2);
}

#[tokio::test]
async fn test_run_drains_on_shutdown() {
    let harness = Harness::new().await;
    harness.engine.create_or_join("node").await.expect("enqueue");

    let config = WorkerConfig {
        poll_interval: Duration::from_millis(10),
        ..WorkerConfig::default()
    };
    let pool = harness.pool(config);
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { pool.run(rx).await });

    let engine = Arc::clone(&harness.engine);
    let mut done = false;
    for _ in 0..200 {
        let task = engine.find("node").await.expect("find").expect("task");
        if task.state == TaskState::Done {
            done = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(done, "task should finish while the pool runs");

    tx.send(true).expect("signal shutdown");
    let stats = handle.await.expect("join").expect("run");
    assert_eq!(stats.complete, 1);
}

#[tokio::test]
async fn test_overdue_run_is_cancelled_not_duplicated() {
    let harness = Harness::new().await;
    harness.transport.set_latency(Duration::from_millis(400));
    harness.engine.create_or_join("node").await.expect("enqueue");

    let config = WorkerConfig {
        concurrency: 4,
        poll_interval: Duration::from_millis(10),
        run_timeout: chrono::Duration::milliseconds(50),
        sweep_interval: Duration::from_millis(50),
        ..WorkerConfig::default()
    };
    let pool = harness.pool(config);
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { pool.run(rx).await });

    let mut failed = false;
    for _ in 0..200 {
        let task = harness.engine.find("node").await.expect("find").expect("task");
        if task.state == TaskState::Failed {
            failed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(failed, "overdue run should be failed");

    // Several sweep intervals pass without the category being claimed again.
    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.send(true).expect("signal shutdown");
    let stats = handle.await.expect("join").expect("run");

    assert_eq!(harness.transport.peak_in_flight(), 1);
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.total(), 1);

    let task = harness.engine.find("node").await.expect("find").expect("task");
    assert_eq!(task.state, TaskState::Failed);
    assert_eq!(task.attempts, 1);
    assert!(task.note.as_deref().is_some_and(|n| n.contains("timed out")));
}
