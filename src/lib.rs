//! rankqueue - durable task queue engine for blog rank tracking.
//!
//! Fans per-tracker work out into per-family queues, then drains them
//! with visibility-timeout leasing, bounded concurrency, and a per-day
//! idempotency guard over recorded results.

pub mod cli;
pub mod config;
pub mod engine;
pub mod models;
pub mod repository;
pub mod schema;
pub mod server;
pub mod tasks;
