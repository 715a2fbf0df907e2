//! Task families and the HTTP handler boundary.
//!
//! Each family owns one queue. What a task actually does (scraping a SERP,
//! counting visitors, sending a Kakao message) lives behind a per-family
//! item endpoint; the engine only moves payloads.

mod http_handler;

pub use http_handler::HttpTaskHandler;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The five job families plus the notification refresh run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskFamily {
    /// Search-engine result page scraping.
    Serp,
    /// Blog post rank scraping.
    BlogRank,
    /// Blog visitor-count scraping.
    Visitor,
    /// Keyword metrics scraping.
    KeywordMetrics,
    /// Kakao notification sending.
    Notification,
    /// Tracker-wide rank refresh run (the progress-tracked variant).
    Refresh,
}

impl TaskFamily {
    pub const ALL: [TaskFamily; 6] = [
        TaskFamily::Serp,
        TaskFamily::BlogRank,
        TaskFamily::Visitor,
        TaskFamily::KeywordMetrics,
        TaskFamily::Notification,
        TaskFamily::Refresh,
    ];

    /// Queue name for this family. Also the result `kind` for families
    /// with a dedup key.
    pub fn queue_name(self) -> &'static str {
        match self {
            TaskFamily::Serp => "serp",
            TaskFamily::BlogRank => "blog_rank",
            TaskFamily::Visitor => "visitor",
            TaskFamily::KeywordMetrics => "keyword_metrics",
            TaskFamily::Notification => "notification",
            TaskFamily::Refresh => "refresh",
        }
    }

    /// Families whose results are deduplicated per (tracker, date).
    pub fn has_dedup_key(self) -> bool {
        matches!(
            self,
            TaskFamily::Serp
                | TaskFamily::BlogRank
                | TaskFamily::Visitor
                | TaskFamily::KeywordMetrics
        )
    }

    /// Families that fan out over trackers; notification fans out over
    /// notification targets instead.
    pub fn enumerates_trackers(self) -> bool {
        !matches!(self, TaskFamily::Notification)
    }

    /// The refresh family is the only one wired to a progress record.
    pub fn tracks_progress(self) -> bool {
        matches!(self, TaskFamily::Refresh)
    }
}

impl fmt::Display for TaskFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.queue_name())
    }
}

impl FromStr for TaskFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "serp" => Ok(TaskFamily::Serp),
            "blog_rank" => Ok(TaskFamily::BlogRank),
            "visitor" => Ok(TaskFamily::Visitor),
            "keyword_metrics" => Ok(TaskFamily::KeywordMetrics),
            "notification" => Ok(TaskFamily::Notification),
            "refresh" => Ok(TaskFamily::Refresh),
            other => Err(format!("unknown task family: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_names_round_trip() {
        for family in TaskFamily::ALL {
            let parsed: TaskFamily = family.queue_name().parse().unwrap();
            assert_eq!(parsed, family);
        }
        assert!("serps".parse::<TaskFamily>().is_err());
    }

    #[test]
    fn only_refresh_tracks_progress() {
        for family in TaskFamily::ALL {
            assert_eq!(family.tracks_progress(), family == TaskFamily::Refresh);
        }
    }
}
