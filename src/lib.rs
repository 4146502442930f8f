//! statsd-agg - StatsD receiver with in-memory aggregation.
//!
//! Ingests StatsD datagrams over UDP, aggregates them per metric key and
//! type, and periodically hands the aggregated values to a sink.
//!
//! # Features
//!
//! - **StatsD Protocol**: counters (with sample rates), gauges, timers and sets
//! - **Dual-stack UDP**: one socket per resolved address, default port 8125
//! - **Deterministic Flush**: metrics are emitted in key order
//! - **Idle Eviction**: per-type delete-on-idle policy
//!
//! # Architecture
//!
//! - `protocol`: line parser
//! - `aggregation`: locked metric store and flush cycle
//! - `receiver`: UDP listener
//! - `sink`: downstream interface for flushed values
//! - `service`: lifecycle of a running aggregator
//! - `core`: domain types, errors and configuration
//! - `cli`: command-line host
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use statsd_agg::core::Config;
//! use statsd_agg::sink::TracingSink;
//! use statsd_agg::StatsdService;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = StatsdService::start(Config::default(), Arc::new(TracingSink)).await?;
//!     let stats = service.flush();
//!     println!("emitted {} metrics", stats.emitted);
//!     service.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod aggregation;
pub mod cli;
pub mod core;
pub mod protocol;
pub mod receiver;
pub mod service;
pub mod sink;

// Re-export core types for convenience
pub use crate::core::{Config, Result, StatsdError};
pub use crate::service::StatsdService;
