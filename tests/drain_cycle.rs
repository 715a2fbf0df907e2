//! End-to-end drain cycle against a real SQLite database.
//!
//! Covers the full path: seed trackers, fan out into the queue, drain
//! with bounded concurrency, record results, and verify the idempotency
//! guard short-circuits a second cycle on the same day.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use rankqueue::engine::{drain, DispatchConfig, Dispatcher, Producer, TaskHandler, WorkSource};
use rankqueue::repository::{
    run_migrations, AsyncSqlitePool, DieselProgressRepository, DieselQueueRepository,
    DieselResultRepository, DieselWorkRepository, TrackerSource,
};

/// Stand-in for the per-item HTTP endpoint: records a rank result the way
/// the real endpoint would, and counts invocations.
struct RecordingHandler {
    results: DieselResultRepository,
    kind: &'static str,
    calls: AtomicUsize,
}

#[async_trait]
impl TaskHandler for RecordingHandler {
    async fn handle(&self, payload: &serde_json::Value) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let tracker_id = payload
            .get("tracker_id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| anyhow::anyhow!("payload missing tracker_id"))?;
        self.results
            .record_result(self.kind, tracker_id, Some(1))
            .await?;
        Ok(())
    }
}

async fn setup() -> (tempfile::TempDir, AsyncSqlitePool) {
    let dir = tempfile::tempdir().unwrap();
    let url = dir.path().join("engine.db").display().to_string();
    run_migrations(&url).await.unwrap();
    let pool = AsyncSqlitePool::new(&url);
    (dir, pool)
}

fn test_config() -> DispatchConfig {
    DispatchConfig {
        page_size: 10,
        concurrency: 3,
        visibility: Duration::from_secs(60),
        max_deliveries: 5,
    }
}

#[tokio::test]
async fn full_cycle_enqueues_drains_and_dedups() {
    let (_dir, pool) = setup().await;

    let work = DieselWorkRepository::new(pool.clone());
    for i in 0..7 {
        work.insert_tracker(i, 1, 100 + i).await.unwrap();
    }

    let queue = Arc::new(DieselQueueRepository::new(pool.clone()));
    let results = DieselResultRepository::new(pool.clone());

    let producer = Producer::new(
        queue.clone(),
        Arc::new(TrackerSource::new(work.clone())),
        "serp",
    );
    let enqueued = producer.enumerate_and_enqueue(3).await.unwrap();
    assert_eq!(enqueued, 7);

    let handler = Arc::new(RecordingHandler {
        results: results.clone(),
        kind: "serp",
        calls: AtomicUsize::new(0),
    });
    let dispatcher = Dispatcher::new(
        queue.clone(),
        Arc::new(results.guard("serp")),
        handler.clone(),
        "serp",
        test_config(),
    );

    let report = drain(&dispatcher).await.unwrap();
    assert_eq!(report.processed, 7);
    assert_eq!(report.failed, 0);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 7);

    // Second cycle the same day: fan-out happens again, but the guard
    // archives every message without calling the handler.
    let enqueued = producer.enumerate_and_enqueue(3).await.unwrap();
    assert_eq!(enqueued, 7);

    let report = drain(&dispatcher).await.unwrap();
    assert_eq!(report.processed, 7);
    assert_eq!(report.failed, 0);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 7);

    // Everything archived.
    use rankqueue::engine::MessageQueue;
    assert_eq!(queue.pending_count("serp").await.unwrap(), 0);
}

/// Fixed rows with one page that fails to fetch.
struct PagedRows {
    rows: Vec<serde_json::Value>,
    bad_page: u64,
}

#[async_trait]
impl WorkSource for PagedRows {
    async fn count(&self) -> anyhow::Result<u64> {
        Ok(self.rows.len() as u64)
    }

    async fn fetch_page(
        &self,
        page: u64,
        page_size: usize,
    ) -> anyhow::Result<Vec<serde_json::Value>> {
        if page == self.bad_page {
            anyhow::bail!("page {page} unavailable");
        }
        let start = (page as usize) * page_size;
        let end = (start + page_size).min(self.rows.len());
        Ok(self.rows.get(start..end).unwrap_or_default().to_vec())
    }
}

#[tokio::test]
async fn parallel_drain_records_every_increment() {
    let (_dir, pool) = setup().await;

    let work = DieselWorkRepository::new(pool.clone());
    for i in 0..15 {
        work.insert_tracker(i, 3, 300 + i).await.unwrap();
    }

    let queue = Arc::new(DieselQueueRepository::new(pool.clone()));
    let results = DieselResultRepository::new(pool.clone());
    let progress_repo = Arc::new(DieselProgressRepository::new(pool.clone()));

    let progress = progress_repo.create(15).await.unwrap();
    let mut extra = serde_json::Map::new();
    extra.insert("progress_id".into(), serde_json::json!(progress.id));

    let producer = Producer::new(
        queue.clone(),
        Arc::new(TrackerSource::new(work)),
        "refresh",
    );
    assert_eq!(
        producer
            .enumerate_and_enqueue_with(20, Some(&extra))
            .await
            .unwrap(),
        15
    );

    let handler = Arc::new(RecordingHandler {
        results,
        kind: "refresh_all",
        calls: AtomicUsize::new(0),
    });
    let dispatcher = Dispatcher::new(
        queue,
        Arc::new(rankqueue::engine::NoDedup),
        handler.clone(),
        "refresh",
        test_config(),
    )
    .with_progress(progress_repo.clone());

    // Three handlers write results, archive, and increment concurrently;
    // none of the 15 increments may get lost to lock contention.
    let report = drain(&dispatcher).await.unwrap();
    assert_eq!(report.processed, 15);
    assert_eq!(report.failed, 0);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 15);

    let record = progress_repo.get(progress.id).await.unwrap().unwrap();
    assert_eq!(record.current_count, 15);
    assert!(record.is_complete());
}

#[tokio::test]
async fn partial_fanout_reconciles_total_and_completes() {
    let (_dir, pool) = setup().await;

    let queue = Arc::new(DieselQueueRepository::new(pool.clone()));
    let results = DieselResultRepository::new(pool.clone());
    let progress_repo = Arc::new(DieselProgressRepository::new(pool.clone()));

    let source = PagedRows {
        rows: (0..25)
            .map(|i| serde_json::json!({"tracker_id": i}))
            .collect(),
        bad_page: 1,
    };
    let progress = progress_repo.create(25).await.unwrap();
    let mut extra = serde_json::Map::new();
    extra.insert("progress_id".into(), serde_json::json!(progress.id));

    let producer = Producer::new(queue.clone(), Arc::new(source), "refresh");
    let enqueued = producer
        .enumerate_and_enqueue_with(10, Some(&extra))
        .await
        .unwrap();
    assert_eq!(enqueued, 15);

    // The run's goal is what enqueued, not the candidate count
    progress_repo
        .set_total(progress.id, enqueued as i32)
        .await
        .unwrap();

    let handler = Arc::new(RecordingHandler {
        results,
        kind: "refresh_partial",
        calls: AtomicUsize::new(0),
    });
    let dispatcher = Dispatcher::new(
        queue,
        Arc::new(rankqueue::engine::NoDedup),
        handler,
        "refresh",
        test_config(),
    )
    .with_progress(progress_repo.clone());

    let report = drain(&dispatcher).await.unwrap();
    assert_eq!(report.processed, 15);

    let record = progress_repo.get(progress.id).await.unwrap().unwrap();
    assert_eq!(record.total_count, 15);
    assert_eq!(record.current_count, 15);
    assert!(record.is_complete());
}

#[tokio::test]
async fn refresh_cycle_tracks_progress_to_completion() {
    let (_dir, pool) = setup().await;

    let work = DieselWorkRepository::new(pool.clone());
    for i in 0..4 {
        work.insert_tracker(i, 2, 200 + i).await.unwrap();
    }

    let queue = Arc::new(DieselQueueRepository::new(pool.clone()));
    let results = DieselResultRepository::new(pool.clone());
    let progress_repo = Arc::new(DieselProgressRepository::new(pool.clone()));

    let progress = progress_repo.create(4).await.unwrap();
    let mut extra = serde_json::Map::new();
    extra.insert("progress_id".into(), serde_json::json!(progress.id));

    let producer = Producer::new(
        queue.clone(),
        Arc::new(TrackerSource::new(work.clone())),
        "refresh",
    );
    let enqueued = producer
        .enumerate_and_enqueue_with(10, Some(&extra))
        .await
        .unwrap();
    assert_eq!(enqueued, 4);

    let handler = Arc::new(RecordingHandler {
        results,
        kind: "refresh_probe",
        calls: AtomicUsize::new(0),
    });
    let dispatcher = Dispatcher::new(
        queue,
        Arc::new(rankqueue::engine::NoDedup),
        handler,
        "refresh",
        test_config(),
    )
    .with_progress(progress_repo.clone());

    let report = drain(&dispatcher).await.unwrap();
    assert_eq!(report.processed, 4);

    let record = progress_repo.get(progress.id).await.unwrap().unwrap();
    assert_eq!(record.current_count, 4);
    assert!(record.is_complete());
}
