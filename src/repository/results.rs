//! Rank-result store and the idempotency guard over it.
//!
//! The dedup key is (kind, tracker_id, capture date). The unique index on
//! `rank_results` is the real constraint; the guard in front of it is a
//! point-in-time read that lets the dispatcher skip handler calls for work
//! that already landed today.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use diesel::result::DatabaseErrorKind;

use crate::engine::{IdempotencyGuard, QueueError};
use crate::schema::rank_results;

use super::diesel_models::NewRankResult;
use super::pool::AsyncSqlitePool;

#[derive(Clone)]
pub struct DieselResultRepository {
    pool: AsyncSqlitePool,
}

impl DieselResultRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Record today's result for a tracker. Safe to call twice for the
    /// same key: the second insert hits the unique index and is ignored.
    pub async fn record_result(
        &self,
        kind: &str,
        tracker_id: i64,
        rank: Option<i32>,
    ) -> Result<(), QueueError> {
        let row = NewRankResult::today(kind, tracker_id, rank);
        let mut conn = self.pool.get().await.map_err(QueueError::Database)?;
        match diesel::insert_into(rank_results::table)
            .values(&row)
            .execute(&mut conn)
            .await
        {
            Ok(_) => Ok(()),
            Err(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _,
            )) => Ok(()),
            Err(e) => Err(QueueError::Database(e)),
        }
    }

    /// Does a result exist for this key in today's date partition?
    pub async fn exists_today(&self, kind: &str, tracker_id: i64) -> Result<bool, QueueError> {
        let today = Utc::now().date_naive().to_string();
        let mut conn = self.pool.get().await.map_err(QueueError::Database)?;
        let count: i64 = rank_results::table
            .filter(rank_results::kind.eq(kind))
            .filter(rank_results::tracker_id.eq(tracker_id))
            .filter(rank_results::captured_on.eq(&today))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(QueueError::Database)?;
        Ok(count > 0)
    }

    /// Idempotency guard for a given result kind (one per rank-scraping
    /// task family).
    pub fn guard(&self, kind: &str) -> RankResultGuard {
        RankResultGuard {
            repo: self.clone(),
            kind: kind.to_string(),
        }
    }
}

/// Guard answering "does this tracker already have a result of my kind
/// for today".
pub struct RankResultGuard {
    repo: DieselResultRepository,
    kind: String,
}

#[async_trait]
impl IdempotencyGuard for RankResultGuard {
    async fn already_done(&self, payload: &serde_json::Value) -> Result<bool, QueueError> {
        let Some(tracker_id) = payload.get("tracker_id").and_then(|v| v.as_i64()) else {
            // No dedup key in the payload; treat as not done.
            return Ok(false);
        };
        self.repo.exists_today(&self.kind, tracker_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::run_migrations;

    async fn test_repo() -> (DieselResultRepository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().join("results.db").display().to_string();
        run_migrations(&url).await.unwrap();
        (DieselResultRepository::new(AsyncSqlitePool::new(&url)), dir)
    }

    #[tokio::test]
    async fn guard_sees_today_partition_only_for_matching_kind() {
        let (repo, _dir) = test_repo().await;
        repo.record_result("serp", 42, Some(3)).await.unwrap();

        let serp_guard = repo.guard("serp");
        let blog_guard = repo.guard("blog_rank");
        let payload = serde_json::json!({"tracker_id": 42});

        assert!(serp_guard.already_done(&payload).await.unwrap());
        assert!(!blog_guard.already_done(&payload).await.unwrap());

        let other = serde_json::json!({"tracker_id": 7});
        assert!(!serp_guard.already_done(&other).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_result_insert_is_ignored() {
        let (repo, _dir) = test_repo().await;
        repo.record_result("serp", 1, Some(10)).await.unwrap();
        // Same key again - upsert-or-check pattern, not an error
        repo.record_result("serp", 1, Some(12)).await.unwrap();
        assert!(repo.exists_today("serp", 1).await.unwrap());
    }

    #[tokio::test]
    async fn payload_without_dedup_key_is_not_done() {
        let (repo, _dir) = test_repo().await;
        let guard = repo.guard("serp");
        let payload = serde_json::json!({"project_id": 1});
        assert!(!guard.already_done(&payload).await.unwrap());
    }
}
