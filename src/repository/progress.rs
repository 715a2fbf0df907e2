//! Refresh-progress repository.
//!
//! `current_count` only ever moves through the single-statement UPDATE in
//! `increment` - concurrent dispatch cycles never do a read-modify-write
//! round trip against it.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};

use crate::engine::{ProgressSink, QueueError};
use crate::models::ProgressRecord;
use crate::schema::refresh_progress;

use super::diesel_models::ProgressRow;
use super::format_datetime;
use super::pool::AsyncSqlitePool;

#[derive(Clone)]
pub struct DieselProgressRepository {
    pool: AsyncSqlitePool,
}

impl DieselProgressRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Create a progress record for a refresh run. `total_count` starts at
    /// the candidate count; reconcile it with `set_total` once fan-out
    /// reports how many tasks actually enqueued.
    pub async fn create(&self, total_count: i32) -> Result<ProgressRecord, QueueError> {
        let now = format_datetime(Utc::now());
        let mut conn = self.pool.get().await.map_err(QueueError::Database)?;
        conn.transaction(|conn| {
            Box::pin(async move {
                diesel::insert_into(refresh_progress::table)
                    .values((
                        refresh_progress::total_count.eq(total_count),
                        refresh_progress::current_count.eq(0),
                        refresh_progress::active.eq(1),
                        refresh_progress::created_at.eq(&now),
                    ))
                    .execute(conn)
                    .await?;

                let row: ProgressRow = refresh_progress::table
                    .order(refresh_progress::id.desc())
                    .first(conn)
                    .await?;
                Ok::<_, diesel::result::Error>(ProgressRecord::from(row))
            })
        })
        .await
        .map_err(QueueError::Database)
    }

    /// Reconcile `total_count` to the fan-out result. A skipped producer
    /// page would otherwise leave the run stuck below a total it can never
    /// reach.
    pub async fn set_total(&self, id: i64, total_count: i32) -> Result<(), QueueError> {
        let mut conn = self.pool.get().await.map_err(QueueError::Database)?;
        diesel::update(refresh_progress::table.filter(refresh_progress::id.eq(id)))
            .set(refresh_progress::total_count.eq(total_count))
            .execute(&mut conn)
            .await
            .map_err(QueueError::Database)?;
        Ok(())
    }

    /// Fetch a progress record for observers.
    pub async fn get(&self, id: i64) -> Result<Option<ProgressRecord>, QueueError> {
        let mut conn = self.pool.get().await.map_err(QueueError::Database)?;
        let row: Option<ProgressRow> = refresh_progress::table
            .filter(refresh_progress::id.eq(id))
            .first(&mut conn)
            .await
            .optional()
            .map_err(QueueError::Database)?;
        Ok(row.map(ProgressRecord::from))
    }

    /// Flip a finished run inactive. Owned by the caller/observer layer -
    /// the dispatcher never calls this.
    pub async fn deactivate(&self, id: i64) -> Result<(), QueueError> {
        let mut conn = self.pool.get().await.map_err(QueueError::Database)?;
        diesel::update(refresh_progress::table.filter(refresh_progress::id.eq(id)))
            .set(refresh_progress::active.eq(0))
            .execute(&mut conn)
            .await
            .map_err(QueueError::Database)?;
        Ok(())
    }
}

#[async_trait]
impl ProgressSink for DieselProgressRepository {
    async fn increment(&self, progress_id: i64) -> Result<i32, QueueError> {
        let mut conn = self.pool.get().await.map_err(QueueError::Database)?;
        conn.transaction(|conn| {
            Box::pin(async move {
                // Clamped at total_count: a duplicate success after
                // redelivery must not push the counter past the end.
                diesel::update(
                    refresh_progress::table
                        .filter(refresh_progress::id.eq(progress_id))
                        .filter(refresh_progress::current_count.lt(refresh_progress::total_count)),
                )
                .set(refresh_progress::current_count.eq(refresh_progress::current_count + 1))
                .execute(conn)
                .await?;

                let count: i32 = refresh_progress::table
                    .filter(refresh_progress::id.eq(progress_id))
                    .select(refresh_progress::current_count)
                    .first(conn)
                    .await?;
                Ok::<_, diesel::result::Error>(count)
            })
        })
        .await
        .map_err(QueueError::Database)
    }
}
