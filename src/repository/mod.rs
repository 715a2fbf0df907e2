//! Data access layer using Diesel with async SQLite connections.

mod diesel_models;
mod migrations;
mod pool;
mod progress;
mod queue;
mod results;
mod work_domain;

pub use migrations::run_migrations;
pub use pool::{AsyncSqliteConnection, AsyncSqlitePool, DieselError};
pub use progress::DieselProgressRepository;
pub use queue::DieselQueueRepository;
pub use results::DieselResultRepository;
pub use work_domain::{DieselWorkRepository, NotificationTargetSource, TrackerSource};

use chrono::{DateTime, SecondsFormat, Utc};

/// Parse a datetime string from the database.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Format a datetime for storage. Fixed-width microsecond precision so
/// lexicographic comparison in SQL follows time order.
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}
