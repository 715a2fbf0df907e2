//! HTTP task handler: POSTs a payload to a family's item endpoint.
//!
//! The item endpoint owns the actual work (scrape, parse, send) and
//! answers `{success: bool, error?: string}`. Endpoints must tolerate
//! duplicate invocations for the same payload; the engine only promises
//! at-least-once delivery.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::engine::TaskHandler;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct ItemResponse {
    success: bool,
    error: Option<String>,
}

/// Task handler forwarding payloads to a single item endpoint.
pub struct HttpTaskHandler {
    client: reqwest::Client,
    endpoint: String,
    secret_key: String,
}

impl HttpTaskHandler {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Client with sensible defaults for item endpoints.
    pub fn default_client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_default()
    }
}

#[async_trait]
impl TaskHandler for HttpTaskHandler {
    async fn handle(&self, payload: &serde_json::Value) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Secret-Key", &self.secret_key)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("item endpoint returned {status}");
        }

        let body: ItemResponse = response.json().await?;
        if !body.success {
            anyhow::bail!(
                "item endpoint reported failure: {}",
                body.error.unwrap_or_else(|| "unknown error".into())
            );
        }
        Ok(())
    }
}
