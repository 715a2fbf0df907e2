//! Drain loop: runs `drain_once` until the queue is empty.
//!
//! One trigger finishes the whole queue in-process. The loop keeps
//! draining until a lease comes back empty; continuation never depends on
//! a network round-trip or a probe lease.

use tracing::info;

use crate::models::DrainReport;

use super::{Dispatcher, QueueError};

/// Drain the dispatcher's queue to empty.
///
/// A queue-read error aborts the loop and surfaces to the caller; progress
/// made by completed batches is already durable (archives happened per
/// message), so an external re-trigger resumes where this left off.
pub async fn drain(dispatcher: &Dispatcher) -> Result<DrainReport, QueueError> {
    let mut report = DrainReport::default();

    loop {
        let summary = dispatcher.drain_once().await?;
        report.absorb(&summary);
        if summary.drained {
            break;
        }
    }

    info!(
        queue = dispatcher.queue_name(),
        processed = report.processed,
        failed = report.failed,
        batches = report.batches,
        "drain complete"
    );
    Ok(report)
}
