//! Engine error types.

use thiserror::Error;

/// Errors surfaced by queue backends.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("Malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Errors surfaced by the producer and drain loop.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
