//! Task-queue processing engine.
//!
//! Every task family (SERP scraping, blog-rank scraping, visitor counts,
//! keyword metrics, notification sending) follows the same pattern:
//! enumerate work, fan it into a durable queue, drain the queue under a
//! concurrency ceiling, archive on success, leave failures for redelivery.
//! This module implements that pattern once, behind traits, so it can be
//! exercised and tested independent of what a task actually does.

mod dispatcher;
mod drain;
mod error;
pub mod memory;
mod producer;

pub use dispatcher::{DispatchConfig, Dispatcher};
pub use drain::drain;
pub use error::{EngineError, QueueError};
pub use producer::Producer;

use std::time::Duration;

use async_trait::async_trait;

use crate::models::{Message, MessageId};

/// Durable, ordered message store with visibility-timeout leasing.
///
/// The queue is the single shared mutable resource between concurrent drain
/// cycles; safety relies entirely on its lease semantics. Implementations
/// must make `lease` atomic: selecting eligible messages, bumping their
/// `read_count`, and pushing `visible_at` forward must happen as one unit.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Push a batch of payloads to the tail of the named queue.
    /// Returns the number of payloads pushed.
    async fn push_batch(
        &self,
        queue: &str,
        payloads: &[serde_json::Value],
    ) -> Result<usize, QueueError>;

    /// Lease up to `max_count` messages whose visibility window has opened.
    ///
    /// Returns an empty vec, never an error, when nothing is eligible -
    /// "empty" is a normal terminal condition. Leased messages become
    /// invisible to other consumers until `visibility` elapses; after that
    /// they are redelivered (at-least-once).
    async fn lease(
        &self,
        queue: &str,
        max_count: usize,
        visibility: Duration,
    ) -> Result<Vec<Message>, QueueError>;

    /// Delete a message after successful processing. Idempotent: archiving
    /// an already-archived or unknown id is not an error.
    async fn archive(&self, queue: &str, id: MessageId) -> Result<(), QueueError>;

    /// Move a poison message to the dead-letter store with its last error.
    async fn dead_letter(
        &self,
        queue: &str,
        message: &Message,
        error: &str,
    ) -> Result<(), QueueError>;

    /// Count messages currently in the queue without touching any lease.
    async fn pending_count(&self, queue: &str) -> Result<u64, QueueError>;
}

/// Domain-specific work execution - the black box behind the engine.
///
/// Handlers must be safe to invoke more than once for the same payload:
/// the idempotency guard is a best-effort point-in-time read, and a lease
/// that outlives its visibility window gets the same message redelivered
/// to another cycle. This is a hard requirement of the lease-based design.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, payload: &serde_json::Value) -> anyhow::Result<()>;
}

/// Answers whether a payload's work already has a result for the current
/// date partition. Checked before every handler invocation; true means the
/// message is archived without calling the handler and counts as a success.
///
/// Point-in-time read, not a transactional guard: two concurrent cycles can
/// both see false and both invoke the handler. Deduplication here is
/// best-effort; exclusivity is not promised.
#[async_trait]
pub trait IdempotencyGuard: Send + Sync {
    async fn already_done(&self, payload: &serde_json::Value) -> Result<bool, QueueError>;
}

/// Guard for task families without a dedup key.
pub struct NoDedup;

#[async_trait]
impl IdempotencyGuard for NoDedup {
    async fn already_done(&self, _payload: &serde_json::Value) -> Result<bool, QueueError> {
        Ok(false)
    }
}

/// Advances a shared progress counter by one. Must be implemented as a
/// single atomic update at the storage layer, never read-increment-write.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Returns the new count.
    async fn increment(&self, progress_id: i64) -> Result<i32, QueueError>;
}

/// Paginated enumeration of a work domain, consumed by the producer.
#[async_trait]
pub trait WorkSource: Send + Sync {
    /// Total candidate work units.
    async fn count(&self) -> anyhow::Result<u64>;

    /// Fetch one page of work units as queue payloads. Pages are 0-indexed.
    async fn fetch_page(&self, page: u64, page_size: usize)
        -> anyhow::Result<Vec<serde_json::Value>>;
}
