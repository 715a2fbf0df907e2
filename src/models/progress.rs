//! Refresh-run progress record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shared counter for a refresh run, so observers can render "N of M done".
///
/// `total_count` starts as the candidate count and is reconciled to the
/// number of tasks that actually enqueued once fan-out finishes.
/// `current_count` is advanced only through the atomic, clamped increment
/// on the progress repository - never read-modify-write. Flipping `active`
/// belongs to the run's owner, not the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub id: i64,
    pub total_count: i32,
    pub current_count: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn is_complete(&self) -> bool {
        self.current_count >= self.total_count
    }
}
