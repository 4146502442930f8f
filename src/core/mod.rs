//! Core domain models for the StatsD aggregator.
//!
//! This module contains the metric key and value types, the error
//! taxonomy and configuration shared by every other module.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigBuilder, DeletePolicy, LogLevel};
pub use error::{ParseError, Result, StatsdError};
pub use types::{MetricKey, MetricKind, MetricValue};
