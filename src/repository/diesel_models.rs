//! Diesel record types mapping database rows to domain models.

use diesel::prelude::*;

use crate::models::{Message, NotificationTarget, ProgressRecord, Tracker};
use crate::schema;

use super::{format_datetime, parse_datetime};

/// Queue message row from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::queue_messages)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct QueueMessageRecord {
    pub id: i64,
    pub queue: String,
    pub payload: String,
    pub read_count: i32,
    pub enqueued_at: String,
    pub visible_at: String,
}

impl From<QueueMessageRecord> for Message {
    fn from(record: QueueMessageRecord) -> Self {
        Message {
            id: record.id,
            queue: record.queue,
            payload: serde_json::from_str(&record.payload)
                .unwrap_or(serde_json::Value::Null),
            read_count: record.read_count,
            enqueued_at: parse_datetime(&record.enqueued_at),
            visible_at: parse_datetime(&record.visible_at),
        }
    }
}

/// New queue message for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::queue_messages)]
pub struct NewQueueMessage<'a> {
    pub queue: &'a str,
    pub payload: String,
    pub read_count: i32,
    pub enqueued_at: String,
    pub visible_at: String,
}

/// New dead letter for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::dead_letters)]
pub struct NewDeadLetter<'a> {
    pub queue: &'a str,
    pub payload: String,
    pub read_count: i32,
    pub enqueued_at: String,
    pub dead_at: String,
    pub last_error: &'a str,
}

/// Progress record row from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::refresh_progress)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ProgressRow {
    pub id: i64,
    pub total_count: i32,
    pub current_count: i32,
    pub active: i32,
    pub created_at: String,
}

impl From<ProgressRow> for ProgressRecord {
    fn from(row: ProgressRow) -> Self {
        ProgressRecord {
            id: row.id,
            total_count: row.total_count,
            current_count: row.current_count,
            active: row.active != 0,
            created_at: parse_datetime(&row.created_at),
        }
    }
}

/// Tracker row from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::trackers)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TrackerRecord {
    pub id: i64,
    pub keyword_id: i64,
    pub project_id: i64,
    pub blog_id: i64,
    pub active: i32,
}

impl From<TrackerRecord> for Tracker {
    fn from(record: TrackerRecord) -> Self {
        Tracker {
            id: record.id,
            keyword_id: record.keyword_id,
            project_id: record.project_id,
            blog_id: record.blog_id,
            active: record.active != 0,
        }
    }
}

/// Notification target row from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::notification_targets)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NotificationTargetRecord {
    pub id: i64,
    pub project_id: i64,
    pub phone_number: String,
}

impl From<NotificationTargetRecord> for NotificationTarget {
    fn from(record: NotificationTargetRecord) -> Self {
        NotificationTarget {
            id: record.id,
            project_id: record.project_id,
            phone_number: record.phone_number,
        }
    }
}

/// New rank result for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::rank_results)]
pub struct NewRankResult<'a> {
    pub kind: &'a str,
    pub tracker_id: i64,
    pub captured_on: String,
    pub rank: Option<i32>,
    pub created_at: String,
}

impl<'a> NewRankResult<'a> {
    pub fn today(kind: &'a str, tracker_id: i64, rank: Option<i32>) -> Self {
        let now = chrono::Utc::now();
        Self {
            kind,
            tracker_id,
            captured_on: now.date_naive().to_string(),
            rank,
            created_at: format_datetime(now),
        }
    }
}
