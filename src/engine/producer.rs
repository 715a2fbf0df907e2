//! Producer: fans a work domain into the queue page by page.

use std::sync::Arc;

use tracing::{info, warn};

use super::{EngineError, MessageQueue, WorkSource};

/// Fans work units into a named queue in batches.
pub struct Producer {
    queue: Arc<dyn MessageQueue>,
    source: Arc<dyn WorkSource>,
    queue_name: String,
}

impl Producer {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        source: Arc<dyn WorkSource>,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            source,
            queue_name: queue_name.into(),
        }
    }

    /// Enumerate the work domain and enqueue every unit.
    ///
    /// A failed page (fetch or push) is logged and skipped so one bad page
    /// doesn't abort the whole fan-out; the return value counts only what
    /// actually landed in the queue. Zero candidate rows is success with 0.
    pub async fn enumerate_and_enqueue(&self, page_size: usize) -> Result<u64, EngineError> {
        self.enumerate_and_enqueue_with(page_size, None).await
    }

    /// Same as `enumerate_and_enqueue`, with extra fields merged into every
    /// payload (e.g. the `progress_id` of a refresh run).
    pub async fn enumerate_and_enqueue_with(
        &self,
        page_size: usize,
        extra: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Result<u64, EngineError> {
        let total = self.source.count().await?;
        if total == 0 {
            info!(queue = %self.queue_name, "no work to enqueue");
            return Ok(0);
        }

        let pages = total.div_ceil(page_size as u64);
        let mut pushed: u64 = 0;

        for page in 0..pages {
            let mut payloads = match self.source.fetch_page(page, page_size).await {
                Ok(payloads) => payloads,
                Err(e) => {
                    warn!(queue = %self.queue_name, page, "skipping page, fetch failed: {e}");
                    continue;
                }
            };

            if let Some(extra) = extra {
                for payload in payloads.iter_mut() {
                    if let Some(object) = payload.as_object_mut() {
                        object.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
                    }
                }
            }

            match self.queue.push_batch(&self.queue_name, &payloads).await {
                Ok(count) => pushed += count as u64,
                Err(e) => {
                    warn!(queue = %self.queue_name, page, "skipping page, push failed: {e}");
                }
            }
        }

        info!(queue = %self.queue_name, pushed, total, "fan-out complete");
        Ok(pushed)
    }
}
