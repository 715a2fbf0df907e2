//! In-memory queue implementation.
//!
//! Same lease semantics as the SQLite-backed queue, kept behind the same
//! trait so engine behavior can be exercised without a database. Also
//! handy for local development.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::models::{Message, MessageId};

use super::{MessageQueue, QueueError};

#[derive(Default)]
struct MemoryQueueState {
    next_id: MessageId,
    /// Live messages per queue name.
    queues: HashMap<String, Vec<Message>>,
    /// Dead-lettered messages with their last error.
    dead: HashMap<String, Vec<(Message, String)>>,
}

/// In-memory message queue.
#[derive(Clone, Default)]
pub struct InMemoryQueue {
    state: Arc<Mutex<MemoryQueueState>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dead-lettered messages for a queue (inspection and tests).
    pub async fn dead_letters(&self, queue: &str) -> Vec<(Message, String)> {
        let state = self.state.lock().await;
        state.dead.get(queue).cloned().unwrap_or_default()
    }

}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn push_batch(
        &self,
        queue: &str,
        payloads: &[serde_json::Value],
    ) -> Result<usize, QueueError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        for payload in payloads {
            state.next_id += 1;
            let id = state.next_id;
            state
                .queues
                .entry(queue.to_string())
                .or_default()
                .push(Message {
                    id,
                    queue: queue.to_string(),
                    payload: payload.clone(),
                    read_count: 0,
                    enqueued_at: now,
                    visible_at: now,
                });
        }
        Ok(payloads.len())
    }

    async fn lease(
        &self,
        queue: &str,
        max_count: usize,
        visibility: Duration,
    ) -> Result<Vec<Message>, QueueError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let next_visible: DateTime<Utc> =
            now + chrono::Duration::from_std(visibility).unwrap_or_default();

        let Some(messages) = state.queues.get_mut(queue) else {
            return Ok(Vec::new());
        };

        let mut leased = Vec::new();
        for message in messages.iter_mut() {
            if leased.len() >= max_count {
                break;
            }
            if message.visible_at <= now {
                message.read_count += 1;
                message.visible_at = next_visible;
                leased.push(message.clone());
            }
        }
        Ok(leased)
    }

    async fn archive(&self, queue: &str, id: MessageId) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if let Some(messages) = state.queues.get_mut(queue) {
            messages.retain(|m| m.id != id);
        }
        Ok(())
    }

    async fn dead_letter(
        &self,
        queue: &str,
        message: &Message,
        error: &str,
    ) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if let Some(messages) = state.queues.get_mut(queue) {
            messages.retain(|m| m.id != message.id);
        }
        state
            .dead
            .entry(queue.to_string())
            .or_default()
            .push((message.clone(), error.to_string()));
        Ok(())
    }

    async fn pending_count(&self, queue: &str) -> Result<u64, QueueError> {
        let state = self.state.lock().await;
        Ok(state.queues.get(queue).map(|m| m.len()).unwrap_or(0) as u64)
    }
}
