//! Configuration management for the StatsD aggregator.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - Environment variable and CLI overrides (applied by `cli`)
//! - Validation and defaults
//!
//! Option names are matched case-insensitively and the collectd spellings
//! (`Host`, `DeleteCounters`, ...) are accepted. Unknown keys are reported
//! and ignored rather than rejected.

use crate::core::types::MetricKind;
use crate::core::{Result, StatsdError};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Default UDP service (port) for StatsD
pub const DEFAULT_PORT: &str = "8125";

/// Complete configuration for the aggregator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// UDP listener configuration
    pub listener: ListenerConfig,
    /// Per-type delete-on-idle flags
    pub delete: DeletePolicy,
    /// Flush scheduling
    pub flush: FlushConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
    /// Keys seen in the source document that no section recognizes
    #[serde(skip)]
    unknown_keys: Vec<String>,
}

/// UDP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind host; `None` binds all interfaces
    pub host: Option<String>,
    /// Port number or service name (e.g. `statsd`)
    #[serde(deserialize_with = "deserialize_port")]
    pub port: String,
}

/// Whether idle metrics of each type are evicted at flush time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeletePolicy {
    /// Evict counters with no updates since the last flush
    pub counters: bool,
    /// Evict idle timers
    pub timers: bool,
    /// Evict idle gauges
    pub gauges: bool,
    /// Evict idle sets
    pub sets: bool,
}

/// Flush scheduling owned by the host process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushConfig {
    /// Interval between flush cycles
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Include target, thread ids and line numbers
    pub structured: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Very verbose, per-datagram output
    Trace,
    /// Metric creation and eviction
    Debug,
    /// Startup, shutdown and bind results
    Info,
    /// Rejected lines and ignored options
    Warn,
    /// Fatal listener errors only
    Error,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        ListenerConfig {
            host: None,
            port: DEFAULT_PORT.to_string(),
        }
    }
}

impl Default for FlushConfig {
    fn default() -> Self {
        FlushConfig {
            interval: Duration::from_secs(10),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl DeletePolicy {
    /// Policy that evicts idle metrics of every type
    pub fn all() -> Self {
        DeletePolicy {
            counters: true,
            timers: true,
            gauges: true,
            sets: true,
        }
    }

    /// Whether idle metrics of `kind` should be evicted
    pub fn deletes(&self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Counter => self.counters,
            MetricKind::Timer => self.timers,
            MetricKind::Gauge => self.gauges,
            MetricKind::Set => self.sets,
        }
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.listener.validate_port()?;

        if let Some(host) = &self.listener.host {
            if host.trim().is_empty() {
                return Err(StatsdError::config("listener host must not be empty"));
            }
        }

        if self.flush.interval.is_zero() {
            return Err(StatsdError::config("flush interval must be greater than 0"));
        }

        Ok(())
    }

    /// Keys from the loaded document that were not recognized
    pub fn unknown_keys(&self) -> &[String] {
        &self.unknown_keys
    }

    /// Log every unrecognized key. They are otherwise ignored.
    pub fn report_unknown_keys(&self) {
        for key in &self.unknown_keys {
            let err = StatsdError::config(format!("the \"{}\" option is not valid", key));
            tracing::warn!(category = err.category(), "{}, ignoring it", err);
        }
    }
}

impl ListenerConfig {
    /// The port as a number, or `None` when it names a service that is
    /// resolved at bind time.
    pub fn port_number(&self) -> Option<u16> {
        self.port.trim().parse::<u16>().ok()
    }

    /// Service names are checked when binding; numbers must fit a `u16`.
    fn validate_port(&self) -> Result<()> {
        let port = self.port.trim();
        if port.is_empty() {
            return Err(StatsdError::config("listener port must not be empty"));
        }
        if port.bytes().all(|b| b.is_ascii_digit()) && self.port_number().is_none() {
            return Err(StatsdError::config(format!(
                "port must be in 0..=65535, got '{}'",
                self.port
            )));
        }
        Ok(())
    }

    /// Human-readable bind target for log messages
    pub fn display_target(&self) -> String {
        format!("[{}]:{}", self.host.as_deref().unwrap_or("::"), self.port)
    }
}

/// Accept both `port: 8125` and `port: "8125"`.
fn deserialize_port<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortRepr {
        Number(u64),
        Text(String),
    }

    Ok(match PortRepr::deserialize(deserializer)? {
        PortRepr::Number(n) => n.to_string(),
        PortRepr::Text(s) => s,
    })
}

/// Accepted spellings per section, compared case-insensitively, mapped to
/// the field name.
const LISTENER_KEYS: &[(&str, &str)] = &[("host", "host"), ("port", "port")];
const DELETE_KEYS: &[(&str, &str)] = &[
    ("counters", "counters"),
    ("deletecounters", "counters"),
    ("timers", "timers"),
    ("deletetimers", "timers"),
    ("gauges", "gauges"),
    ("deletegauges", "gauges"),
    ("sets", "sets"),
    ("deletesets", "sets"),
];
const FLUSH_KEYS: &[(&str, &str)] = &[("interval", "interval")];
const LOGGING_KEYS: &[(&str, &str)] = &[("level", "level"), ("structured", "structured")];

const SECTIONS: &[(&str, &[(&str, &str)])] = &[
    ("listener", LISTENER_KEYS),
    ("delete", DELETE_KEYS),
    ("flush", FLUSH_KEYS),
    ("logging", LOGGING_KEYS),
];

fn canonical<T: Copy>(table: &[(&str, T)], key: &str) -> Option<T> {
    table
        .iter()
        .find(|(name, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| *value)
}

/// Rewrite every recognized key to its field name and drop the rest.
///
/// Returns the rewritten document plus the dropped keys as dotted paths
/// in their original spelling (`listener.bogus`).
fn normalize_document(doc: serde_yaml::Value) -> (serde_yaml::Value, Vec<String>) {
    use serde_yaml::{Mapping, Value};

    let mut unknown = Vec::new();
    let top = match doc {
        Value::Mapping(top) => top,
        other => return (other, unknown),
    };

    let mut normalized = Mapping::new();
    for (key, value) in top {
        let Some(name) = key.as_str() else {
            unknown.push(format!("{:?}", key));
            continue;
        };
        let Some((section, fields)) = SECTIONS
            .iter()
            .find(|(section, _)| name.eq_ignore_ascii_case(section))
            .copied()
        else {
            unknown.push(name.to_string());
            continue;
        };

        let value = match value {
            Value::Mapping(children) => {
                let mut kept = Mapping::new();
                for (child, child_value) in children {
                    match child.as_str() {
                        Some(child_name) => match canonical(fields, child_name) {
                            Some(field) => {
                                kept.insert(Value::from(field), child_value);
                            },
                            None => unknown.push(format!("{}.{}", name, child_name)),
                        },
                        None => unknown.push(format!("{}.{:?}", name, child)),
                    }
                }
                Value::Mapping(kept)
            },
            other => other,
        };
        normalized.insert(Value::from(section), value);
    }

    (Value::Mapping(normalized), unknown)
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string. Unknown keys are recorded, not rejected.
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        let doc: serde_yaml::Value = serde_yaml::from_str(yaml)
            .map_err(|e| StatsdError::config(format!("Failed to parse YAML config: {}", e)))?;
        let (doc, unknown) = normalize_document(doc);

        let mut config: Config = if doc.is_null() {
            Config::default()
        } else {
            serde_yaml::from_value(doc)
                .map_err(|e| StatsdError::config(format!("Invalid configuration: {}", e)))?
        };
        config.debug = self.config.debug;
        config.unknown_keys = unknown;
        self.config = config;
        Ok(self)
    }

    /// Set bind host
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.listener.host = Some(host.into());
        self
    }

    /// Set bind port
    pub fn port<S: Into<String>>(mut self, port: S) -> Self {
        self.config.listener.port = port.into();
        self
    }

    /// Evict idle counters on flush
    pub fn delete_counters(mut self, enable: bool) -> Self {
        self.config.delete.counters = enable;
        self
    }

    /// Evict idle timers on flush
    pub fn delete_timers(mut self, enable: bool) -> Self {
        self.config.delete.timers = enable;
        self
    }

    /// Evict idle gauges on flush
    pub fn delete_gauges(mut self, enable: bool) -> Self {
        self.config.delete.gauges = enable;
        self
    }

    /// Evict idle sets on flush
    pub fn delete_sets(mut self, enable: bool) -> Self {
        self.config.delete.sets = enable;
        self
    }

    /// Set flush interval
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush.interval = interval;
        self
    }

    /// Set log level
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
