//! Queue message and dispatch outcome models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque message handle assigned by the queue. Stable for the lifetime
/// of the message; used for archiving and dead-lettering.
pub type MessageId = i64;

/// A message leased from the queue.
///
/// The queue owns identity and visibility state exclusively. Consumers
/// never mutate a message in place - they archive it, dead-letter it, or
/// let its lease expire for redelivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// Queue name (one per task family).
    pub queue: String,
    /// Task-specific payload: a JSON object of scalar values.
    pub payload: serde_json::Value,
    /// Number of times this message has been leased, including the
    /// current lease. Used for poison-message detection.
    pub read_count: i32,
    pub enqueued_at: DateTime<Utc>,
    /// When the message next becomes eligible for leasing.
    pub visible_at: DateTime<Utc>,
}

impl Message {
    /// Progress record id carried in the payload, if any.
    pub fn progress_id(&self) -> Option<i64> {
        self.payload.get("progress_id").and_then(|v| v.as_i64())
    }
}

/// Per-message outcome of one dispatch attempt. Used only for batch-level
/// counts; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handler succeeded, or the idempotency guard reported the work
    /// already done. The message was archived either way.
    Success,
    /// Handler failed; the message stays queued for redelivery.
    Failure(String),
}

/// Summary of one `drain_once` call.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub processed: usize,
    pub failed: usize,
    /// True when the lease returned no messages - the queue is drained.
    pub drained: bool,
}

/// Cumulative summary of a full drain loop.
#[derive(Debug, Clone, Default)]
pub struct DrainReport {
    pub processed: usize,
    pub failed: usize,
    pub batches: usize,
}

impl DrainReport {
    pub fn absorb(&mut self, batch: &BatchSummary) {
        self.processed += batch.processed;
        self.failed += batch.failed;
        if !batch.drained {
            self.batches += 1;
        }
    }
}
