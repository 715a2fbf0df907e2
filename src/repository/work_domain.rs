//! Work-domain enumeration for producers.
//!
//! Rank-scraping families fan out over active trackers; notification
//! families fan out over a project's notification targets. Both expose the
//! same paginated `WorkSource` shape to the producer.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::engine::WorkSource;
use crate::models::{NotificationTarget, Tracker};
use crate::schema::{notification_targets, trackers};

use super::diesel_models::{NotificationTargetRecord, TrackerRecord};
use super::pool::AsyncSqlitePool;

#[derive(Clone)]
pub struct DieselWorkRepository {
    pool: AsyncSqlitePool,
}

impl DieselWorkRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    pub async fn count_active_trackers(&self) -> Result<u64, diesel::result::Error> {
        let mut conn = self.pool.get().await?;
        let count: i64 = trackers::table
            .filter(trackers::active.eq(1))
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count as u64)
    }

    pub async fn get_active_trackers_page(
        &self,
        page: u64,
        page_size: usize,
    ) -> Result<Vec<Tracker>, diesel::result::Error> {
        let mut conn = self.pool.get().await?;
        trackers::table
            .filter(trackers::active.eq(1))
            .order(trackers::id.asc())
            .limit(page_size as i64)
            .offset((page * page_size as u64) as i64)
            .load::<TrackerRecord>(&mut conn)
            .await
            .map(|records| records.into_iter().map(Tracker::from).collect())
    }

    pub async fn count_notification_targets(&self) -> Result<u64, diesel::result::Error> {
        let mut conn = self.pool.get().await?;
        let count: i64 = notification_targets::table
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count as u64)
    }

    pub async fn get_notification_targets_page(
        &self,
        page: u64,
        page_size: usize,
    ) -> Result<Vec<NotificationTarget>, diesel::result::Error> {
        let mut conn = self.pool.get().await?;
        notification_targets::table
            .order(notification_targets::id.asc())
            .limit(page_size as i64)
            .offset((page * page_size as u64) as i64)
            .load::<NotificationTargetRecord>(&mut conn)
            .await
            .map(|records| {
                records
                    .into_iter()
                    .map(NotificationTarget::from)
                    .collect()
            })
    }

    /// Seed helpers for tests and bootstrap tooling.
    pub async fn insert_tracker(
        &self,
        keyword_id: i64,
        project_id: i64,
        blog_id: i64,
    ) -> Result<(), diesel::result::Error> {
        let mut conn = self.pool.get().await?;
        diesel::insert_into(trackers::table)
            .values((
                trackers::keyword_id.eq(keyword_id),
                trackers::project_id.eq(project_id),
                trackers::blog_id.eq(blog_id),
                trackers::active.eq(1),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn insert_notification_target(
        &self,
        project_id: i64,
        phone_number: &str,
    ) -> Result<(), diesel::result::Error> {
        let mut conn = self.pool.get().await?;
        diesel::insert_into(notification_targets::table)
            .values((
                notification_targets::project_id.eq(project_id),
                notification_targets::phone_number.eq(phone_number),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}

/// Paginated source over active trackers.
#[derive(Clone)]
pub struct TrackerSource {
    repo: DieselWorkRepository,
}

impl TrackerSource {
    pub fn new(repo: DieselWorkRepository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl WorkSource for TrackerSource {
    async fn count(&self) -> anyhow::Result<u64> {
        Ok(self.repo.count_active_trackers().await?)
    }

    async fn fetch_page(
        &self,
        page: u64,
        page_size: usize,
    ) -> anyhow::Result<Vec<serde_json::Value>> {
        let rows = self.repo.get_active_trackers_page(page, page_size).await?;
        Ok(rows.iter().map(Tracker::to_payload).collect())
    }
}

/// Paginated source over notification targets.
#[derive(Clone)]
pub struct NotificationTargetSource {
    repo: DieselWorkRepository,
}

impl NotificationTargetSource {
    pub fn new(repo: DieselWorkRepository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl WorkSource for NotificationTargetSource {
    async fn count(&self) -> anyhow::Result<u64> {
        Ok(self.repo.count_notification_targets().await?)
    }

    async fn fetch_page(
        &self,
        page: u64,
        page_size: usize,
    ) -> anyhow::Result<Vec<serde_json::Value>> {
        let rows = self
            .repo
            .get_notification_targets_page(page, page_size)
            .await?;
        Ok(rows.iter().map(NotificationTarget::to_payload).collect())
    }
}
