//! Durable queue backed by the `queue_messages` table.
//!
//! Leasing is transactional: eligible rows are selected, their
//! `read_count` bumped, and `visible_at` pushed forward in one unit, so a
//! message is visible to at most one lease holder until its window expires.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};
use tracing::warn;

use crate::engine::{MessageQueue, QueueError};
use crate::models::{Message, MessageId};
use crate::schema::{dead_letters, queue_messages};

use super::diesel_models::{NewDeadLetter, NewQueueMessage, QueueMessageRecord};
use super::format_datetime;
use super::pool::AsyncSqlitePool;

/// Queue repository over async SQLite.
#[derive(Clone)]
pub struct DieselQueueRepository {
    pool: AsyncSqlitePool,
}

impl DieselQueueRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Count rows currently parked in the dead-letter store for a queue.
    pub async fn dead_letter_count(&self, queue: &str) -> Result<u64, QueueError> {
        let mut conn = self.pool.get().await.map_err(QueueError::Database)?;
        let count: i64 = dead_letters::table
            .filter(dead_letters::queue.eq(queue))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(QueueError::Database)?;
        Ok(count as u64)
    }
}

#[async_trait]
impl MessageQueue for DieselQueueRepository {
    async fn push_batch(
        &self,
        queue: &str,
        payloads: &[serde_json::Value],
    ) -> Result<usize, QueueError> {
        if payloads.is_empty() {
            return Ok(0);
        }

        let now = format_datetime(Utc::now());
        let rows: Vec<NewQueueMessage> = payloads
            .iter()
            .map(|payload| {
                Ok(NewQueueMessage {
                    queue,
                    payload: serde_json::to_string(payload)?,
                    read_count: 0,
                    enqueued_at: now.clone(),
                    // Immediately visible
                    visible_at: now.clone(),
                })
            })
            .collect::<Result<_, serde_json::Error>>()?;

        let mut conn = self.pool.get().await.map_err(QueueError::Database)?;
        // SQLite's diesel dialect takes one row per INSERT; a transaction
        // keeps the batch atomic.
        let inserted = conn
            .transaction(|conn| {
                Box::pin(async move {
                    let mut inserted = 0;
                    for row in &rows {
                        inserted += diesel::insert_into(queue_messages::table)
                            .values(row)
                            .execute(conn)
                            .await?;
                    }
                    Ok::<_, diesel::result::Error>(inserted)
                })
            })
            .await
            .map_err(QueueError::Database)?;
        Ok(inserted)
    }

    async fn lease(
        &self,
        queue: &str,
        max_count: usize,
        visibility: Duration,
    ) -> Result<Vec<Message>, QueueError> {
        let queue = queue.to_string();
        let now = Utc::now();
        let now_s = format_datetime(now);
        let next_visible = format_datetime(now + chrono::Duration::from_std(visibility).unwrap_or_default());

        let mut conn = self.pool.get().await.map_err(QueueError::Database)?;
        let records: Vec<QueueMessageRecord> = conn
            .transaction(|conn| {
                let queue = queue.clone();
                let now_s = now_s.clone();
                let next_visible = next_visible.clone();
                Box::pin(async move {
                    let records: Vec<QueueMessageRecord> = queue_messages::table
                        .filter(queue_messages::queue.eq(&queue))
                        .filter(queue_messages::visible_at.le(&now_s))
                        .order((queue_messages::enqueued_at.asc(), queue_messages::id.asc()))
                        .limit(max_count as i64)
                        .load(conn)
                        .await?;

                    if records.is_empty() {
                        return Ok(Vec::new());
                    }

                    let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
                    diesel::update(queue_messages::table.filter(queue_messages::id.eq_any(&ids)))
                        .set((
                            queue_messages::visible_at.eq(&next_visible),
                            queue_messages::read_count.eq(queue_messages::read_count + 1),
                        ))
                        .execute(conn)
                        .await?;

                    Ok::<_, diesel::result::Error>(records)
                })
            })
            .await
            .map_err(QueueError::Database)?;

        let visible_at = now + chrono::Duration::from_std(visibility).unwrap_or_default();
        Ok(records
            .into_iter()
            .map(|record| {
                let mut message = Message::from(record);
                // Reflect the lease we just took
                message.read_count += 1;
                message.visible_at = visible_at;
                message
            })
            .collect())
    }

    async fn archive(&self, queue: &str, id: MessageId) -> Result<(), QueueError> {
        let mut conn = self.pool.get().await.map_err(QueueError::Database)?;
        let deleted = diesel::delete(
            queue_messages::table
                .filter(queue_messages::queue.eq(queue))
                .filter(queue_messages::id.eq(id)),
        )
        .execute(&mut conn)
        .await
        .map_err(QueueError::Database)?;

        if deleted == 0 {
            // Already archived or expired into another cycle's hands.
            warn!(queue, id, "archive found no row");
        }
        Ok(())
    }

    async fn dead_letter(
        &self,
        queue: &str,
        message: &Message,
        error: &str,
    ) -> Result<(), QueueError> {
        let payload = serde_json::to_string(&message.payload)?;
        let row = NewDeadLetter {
            queue,
            payload,
            read_count: message.read_count,
            enqueued_at: format_datetime(message.enqueued_at),
            dead_at: format_datetime(Utc::now()),
            last_error: error,
        };
        let id = message.id;

        let mut conn = self.pool.get().await.map_err(QueueError::Database)?;
        conn.transaction(|conn| {
            Box::pin(async move {
                diesel::insert_into(dead_letters::table)
                    .values(&row)
                    .execute(conn)
                    .await?;
                diesel::delete(queue_messages::table.filter(queue_messages::id.eq(id)))
                    .execute(conn)
                    .await?;
                Ok::<_, diesel::result::Error>(())
            })
        })
        .await
        .map_err(QueueError::Database)?;
        Ok(())
    }

    async fn pending_count(&self, queue: &str) -> Result<u64, QueueError> {
        let mut conn = self.pool.get().await.map_err(QueueError::Database)?;
        let count: i64 = queue_messages::table
            .filter(queue_messages::queue.eq(queue))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(QueueError::Database)?;
        Ok(count as u64)
    }
}
