//! Work-domain rows enumerated by producers.

use serde::{Deserialize, Serialize};

/// A blog-rank tracker: one keyword watched for one blog in one project.
///
/// Maps deterministically to a queue payload of
/// `{tracker_id, keyword_id, project_id, blog_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tracker {
    pub id: i64,
    pub keyword_id: i64,
    pub project_id: i64,
    pub blog_id: i64,
    pub active: bool,
}

impl Tracker {
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "tracker_id": self.id,
            "keyword_id": self.keyword_id,
            "project_id": self.project_id,
            "blog_id": self.blog_id,
        })
    }
}

/// A Kakao notification recipient for a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTarget {
    pub id: i64,
    pub project_id: i64,
    pub phone_number: String,
}

impl NotificationTarget {
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "project_id": self.project_id,
            "phone_number": self.phone_number,
        })
    }
}
