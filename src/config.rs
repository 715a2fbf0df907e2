//! Configuration management for rankqueue.
//!
//! Settings come from an optional TOML file with environment overrides
//! (`RANKQUEUE_*`). The `.env` file, if any, is loaded by main before
//! settings are read.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::DispatchConfig;
use crate::tasks::TaskFamily;

fn default_database_url() -> String {
    "rankqueue.db".to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_page_size() -> usize {
    100
}

fn default_concurrency() -> usize {
    5
}

fn default_visibility_secs() -> u64 {
    120
}

fn default_max_deliveries() -> i32 {
    5
}

/// Queue tuning, shared by all task families unless overridden per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Messages leased per batch.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Maximum concurrent handler invocations per drain cycle.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Lease visibility window in seconds.
    #[serde(default = "default_visibility_secs")]
    pub visibility_secs: u64,
    /// Deliveries after which a message is dead-lettered.
    #[serde(default = "default_max_deliveries")]
    pub max_deliveries: i32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            concurrency: default_concurrency(),
            visibility_secs: default_visibility_secs(),
            max_deliveries: default_max_deliveries(),
        }
    }
}

impl QueueSettings {
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            page_size: self.page_size,
            concurrency: self.concurrency,
            visibility: Duration::from_secs(self.visibility_secs),
            max_deliveries: self.max_deliveries,
        }
    }
}

/// Top-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// SQLite database path or URL.
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Pre-shared credential for the trigger endpoints.
    #[serde(default)]
    pub secret_key: String,
    /// Bind address for the web server.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub queue: QueueSettings,
    /// Item endpoint URL per task family (queue name -> URL).
    #[serde(default)]
    pub handlers: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            secret_key: String::new(),
            bind_addr: default_bind_addr(),
            queue: QueueSettings::default(),
            handlers: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file, then apply environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut settings = match path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path)?;
                toml::from_str(&raw)?
            }
            Some(path) => {
                anyhow::bail!("config file not found: {}", path.display());
            }
            None => {
                let default_path = Path::new("rankqueue.toml");
                if default_path.exists() {
                    let raw = std::fs::read_to_string(default_path)?;
                    toml::from_str(&raw)?
                } else {
                    Settings::default()
                }
            }
        };

        if let Ok(url) = std::env::var("RANKQUEUE_DATABASE_URL") {
            settings.database_url = url;
        }
        if let Ok(secret) = std::env::var("RANKQUEUE_SECRET_KEY") {
            settings.secret_key = secret;
        }
        if let Ok(addr) = std::env::var("RANKQUEUE_BIND_ADDR") {
            settings.bind_addr = addr;
        }

        Ok(settings)
    }

    /// Item endpoint configured for a family, if any.
    pub fn handler_endpoint(&self, family: TaskFamily) -> Option<&str> {
        self.handlers.get(family.queue_name()).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let raw = r#"
            database_url = "data/rank.db"
            secret_key = "s3cret"
            bind_addr = "0.0.0.0:9000"

            [queue]
            page_size = 50
            concurrency = 8
            visibility_secs = 300
            max_deliveries = 3

            [handlers]
            serp = "http://scraper.internal/serp/item"
            notification = "http://notifier.internal/send"
        "#;
        let settings: Settings = toml::from_str(raw).unwrap();
        assert_eq!(settings.database_url, "data/rank.db");
        assert_eq!(settings.queue.page_size, 50);
        assert_eq!(settings.queue.max_deliveries, 3);
        assert_eq!(
            settings.handler_endpoint(TaskFamily::Serp),
            Some("http://scraper.internal/serp/item")
        );
        assert_eq!(settings.handler_endpoint(TaskFamily::Visitor), None);

        let config = settings.queue.dispatch_config();
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.visibility, Duration::from_secs(300));
    }

    #[test]
    fn defaults_apply_for_missing_sections() {
        let settings: Settings = toml::from_str("secret_key = \"k\"").unwrap();
        assert_eq!(settings.queue.page_size, 100);
        assert_eq!(settings.queue.concurrency, 5);
        assert_eq!(settings.database_url, "rankqueue.db");
    }
}
