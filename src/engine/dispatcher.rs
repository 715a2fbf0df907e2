//! Dispatcher: drains one leased batch under a concurrency ceiling.
//!
//! Bounded fan-out is a counting semaphore gating task spawn plus a join
//! on every spawned task - at most `concurrency` handler invocations are
//! outstanding at any instant, and `drain_once` returns only when the
//! whole batch has settled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::models::{BatchSummary, DispatchOutcome, Message};

use super::{IdempotencyGuard, MessageQueue, ProgressSink, QueueError, TaskHandler};

/// Tuning for one task family's dispatch.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Messages leased per batch (distinct from the concurrency limit).
    pub page_size: usize,
    /// Maximum concurrent handler invocations.
    pub concurrency: usize,
    /// Lease visibility window. A handler running longer than this can see
    /// its message redelivered to another cycle.
    pub visibility: Duration,
    /// Deliveries after which a message is dead-lettered instead of
    /// dispatched.
    pub max_deliveries: i32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            concurrency: 5,
            visibility: Duration::from_secs(120),
            max_deliveries: 5,
        }
    }
}

/// Drains a queue batch by batch with bounded concurrency.
pub struct Dispatcher {
    queue: Arc<dyn MessageQueue>,
    guard: Arc<dyn IdempotencyGuard>,
    handler: Arc<dyn TaskHandler>,
    progress: Option<Arc<dyn ProgressSink>>,
    queue_name: String,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        guard: Arc<dyn IdempotencyGuard>,
        handler: Arc<dyn TaskHandler>,
        queue_name: impl Into<String>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            queue,
            guard,
            handler,
            progress: None,
            queue_name: queue_name.into(),
            config,
        }
    }

    /// Attach a progress sink; messages carrying a `progress_id` advance it
    /// by one per success.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Lease one batch and process it to completion.
    ///
    /// A lease error aborts the cycle and surfaces to the caller. Handler
    /// failures never do - each message's failure is captured as an outcome
    /// and its siblings keep running.
    pub async fn drain_once(&self) -> Result<BatchSummary, QueueError> {
        let messages = self
            .queue
            .lease(&self.queue_name, self.config.page_size, self.config.visibility)
            .await?;

        if messages.is_empty() {
            return Ok(BatchSummary {
                processed: 0,
                failed: 0,
                drained: true,
            });
        }

        debug!(queue = %self.queue_name, batch = messages.len(), "draining batch");

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut handles = Vec::with_capacity(messages.len());
        let mut summary = BatchSummary::default();

        for message in messages {
            // Poison check happens before any handler work.
            if message.read_count > self.config.max_deliveries {
                warn!(
                    queue = %self.queue_name,
                    id = message.id,
                    read_count = message.read_count,
                    "dead-lettering poison message"
                );
                if let Err(e) = self
                    .queue
                    .dead_letter(&self.queue_name, &message, "max delivery count exceeded")
                    .await
                {
                    warn!(queue = %self.queue_name, id = message.id, "dead-letter failed: {e}");
                }
                summary.failed += 1;
                continue;
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore never closed");

            let queue = Arc::clone(&self.queue);
            let guard = Arc::clone(&self.guard);
            let handler = Arc::clone(&self.handler);
            let progress = self.progress.clone();
            let queue_name = self.queue_name.clone();

            handles.push(tokio::spawn(async move {
                let outcome =
                    process_message(&queue, &guard, &handler, &queue_name, &message).await;
                if outcome == DispatchOutcome::Success {
                    if let (Some(progress), Some(progress_id)) =
                        (progress, message.progress_id())
                    {
                        if let Err(e) = progress.increment(progress_id).await {
                            warn!(progress_id, "progress increment failed: {e}");
                        }
                    }
                }
                drop(permit);
                outcome
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(DispatchOutcome::Success) => summary.processed += 1,
                Ok(DispatchOutcome::Failure(_)) => summary.failed += 1,
                Err(e) => {
                    // Panicked handler task: the message was never archived,
                    // so redelivery covers it.
                    warn!(queue = %self.queue_name, "dispatch task panicked: {e}");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }
}

/// Process a single message: idempotency check, handler, archive-or-leave.
///
/// Within one message's lifecycle the order is fixed: guard check, then
/// handler, then archive on success. Failures leave the message un-archived
/// for redelivery after its lease expires.
async fn process_message(
    queue: &Arc<dyn MessageQueue>,
    guard: &Arc<dyn IdempotencyGuard>,
    handler: &Arc<dyn TaskHandler>,
    queue_name: &str,
    message: &Message,
) -> DispatchOutcome {
    match guard.already_done(&message.payload).await {
        Ok(true) => {
            debug!(queue = queue_name, id = message.id, "already done, skipping handler");
            archive_quietly(queue, queue_name, message).await;
            return DispatchOutcome::Success;
        }
        Ok(false) => {}
        Err(e) => {
            // Best-effort guard: proceed as if not done. The handler must
            // tolerate duplicate invocation anyway.
            warn!(queue = queue_name, id = message.id, "idempotency check failed: {e}");
        }
    }

    match handler.handle(&message.payload).await {
        Ok(()) => {
            archive_quietly(queue, queue_name, message).await;
            DispatchOutcome::Success
        }
        Err(e) => {
            debug!(queue = queue_name, id = message.id, "handler failed: {e}");
            DispatchOutcome::Failure(e.to_string())
        }
    }
}

/// Archive errors do not flip an outcome: the message will be redelivered
/// and the idempotency guard absorbs the duplicate.
async fn archive_quietly(queue: &Arc<dyn MessageQueue>, queue_name: &str, message: &Message) {
    if let Err(e) = queue.archive(queue_name, message.id).await {
        warn!(queue = queue_name, id = message.id, "archive failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::super::memory::InMemoryQueue;
    use super::super::NoDedup;
    use super::*;

    fn config(concurrency: usize) -> DispatchConfig {
        DispatchConfig {
            page_size: 100,
            concurrency,
            visibility: Duration::from_secs(60),
            max_deliveries: 5,
        }
    }

    /// Handler that tracks call and in-flight counts, sleeps, and fails for
    /// payloads marked `"fail": true`.
    #[derive(Default)]
    struct ProbeHandler {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl TaskHandler for ProbeHandler {
        async fn handle(&self, payload: &serde_json::Value) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if payload.get("fail").and_then(|v| v.as_bool()) == Some(true) {
                anyhow::bail!("simulated handler failure");
            }
            Ok(())
        }
    }

    /// Guard that reports done for payloads marked `"done": true`.
    struct MarkedDone;

    #[async_trait]
    impl IdempotencyGuard for MarkedDone {
        async fn already_done(&self, payload: &serde_json::Value) -> Result<bool, QueueError> {
            Ok(payload.get("done").and_then(|v| v.as_bool()) == Some(true))
        }
    }

    #[derive(Default)]
    struct CountingProgress {
        count: AtomicI32,
    }

    #[async_trait]
    impl ProgressSink for CountingProgress {
        async fn increment(&self, _progress_id: i64) -> Result<i32, QueueError> {
            Ok(self.count.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    #[tokio::test]
    async fn empty_queue_returns_drained_immediately() {
        let queue = Arc::new(InMemoryQueue::new());
        let handler = Arc::new(ProbeHandler::default());
        let dispatcher = Dispatcher::new(
            queue,
            Arc::new(NoDedup),
            handler.clone(),
            "serp",
            config(3),
        );

        let summary = dispatcher.drain_once().await.unwrap();
        assert!(summary.drained);
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.failed, 0);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn archives_on_success_leaves_failures_for_redelivery() {
        let queue = Arc::new(InMemoryQueue::new());
        queue
            .push_batch(
                "serp",
                &[
                    serde_json::json!({"tracker_id": 1}),
                    serde_json::json!({"tracker_id": 2, "fail": true}),
                    serde_json::json!({"tracker_id": 3}),
                ],
            )
            .await
            .unwrap();

        let dispatcher = Dispatcher::new(
            queue.clone(),
            Arc::new(NoDedup),
            Arc::new(ProbeHandler::default()),
            "serp",
            config(3),
        );

        let summary = dispatcher.drain_once().await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.failed, 1);
        assert!(!summary.drained);

        // Only the failed message remains, un-archived
        assert_eq!(queue.pending_count("serp").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrency_ceiling_is_enforced() {
        let queue = Arc::new(InMemoryQueue::new());
        let payloads: Vec<_> = (0..10).map(|i| serde_json::json!({"tracker_id": i})).collect();
        queue.push_batch("serp", &payloads).await.unwrap();

        let handler = Arc::new(ProbeHandler {
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(
            queue,
            Arc::new(NoDedup),
            handler.clone(),
            "serp",
            config(3),
        );

        let summary = dispatcher.drain_once().await.unwrap();
        assert_eq!(summary.processed, 10);
        assert!(handler.max_in_flight.load(Ordering::SeqCst) <= 3);
        // And concurrency actually happened
        assert!(handler.max_in_flight.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn idempotent_skip_archives_without_handler_call() {
        let queue = Arc::new(InMemoryQueue::new());
        queue
            .push_batch("serp", &[serde_json::json!({"tracker_id": 1, "done": true})])
            .await
            .unwrap();

        let handler = Arc::new(ProbeHandler::default());
        let progress = Arc::new(CountingProgress::default());
        let dispatcher = Dispatcher::new(
            queue.clone(),
            Arc::new(MarkedDone),
            handler.clone(),
            "serp",
            config(3),
        );
        // No progress_id in payload, so the sink stays untouched even when attached
        let dispatcher = dispatcher.with_progress(progress.clone());

        let summary = dispatcher.drain_once().await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        assert_eq!(queue.pending_count("serp").await.unwrap(), 0);
        assert_eq!(progress.count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn progress_advances_once_per_success_only() {
        let queue = Arc::new(InMemoryQueue::new());
        queue
            .push_batch(
                "refresh",
                &[
                    serde_json::json!({"project_id": 1, "progress_id": 5}),
                    serde_json::json!({"project_id": 2, "progress_id": 5, "fail": true}),
                    serde_json::json!({"project_id": 3, "progress_id": 5, "done": true}),
                ],
            )
            .await
            .unwrap();

        let progress = Arc::new(CountingProgress::default());
        let dispatcher = Dispatcher::new(
            queue,
            Arc::new(MarkedDone),
            Arc::new(ProbeHandler::default()),
            "refresh",
            config(3),
        )
        .with_progress(progress.clone());

        let summary = dispatcher.drain_once().await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.failed, 1);
        // Success and idempotency-skip advance progress; the failure does not
        assert_eq!(progress.count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn poison_message_is_dead_lettered() {
        let queue = Arc::new(InMemoryQueue::new());
        queue
            .push_batch("serp", &[serde_json::json!({"tracker_id": 1, "fail": true})])
            .await
            .unwrap();

        let handler = Arc::new(ProbeHandler::default());
        let dispatcher = Dispatcher::new(
            queue.clone(),
            Arc::new(NoDedup),
            handler.clone(),
            "serp",
            DispatchConfig {
                page_size: 10,
                concurrency: 2,
                visibility: Duration::ZERO,
                max_deliveries: 2,
            },
        );

        // Leases 1 and 2 dispatch and fail; lease 3 exceeds max_deliveries
        for _ in 0..3 {
            dispatcher.drain_once().await.unwrap();
        }

        assert_eq!(queue.pending_count("serp").await.unwrap(), 0);
        let dead = queue.dead_letters("serp").await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].0.read_count, 3);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    }
}
