//! Core domain types for StatsD aggregation.
//!
//! A metric is identified by its [`MetricKey`], which embeds the StatsD type
//! as a two-character prefix (`c:`, `g:`, `t:`, `s:`). Identically named
//! metrics of different types therefore never collide in the store.

use crate::core::{Result, StatsdError};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;

/// StatsD metric type. Fixed when a key is first observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKind {
    /// Monotonic cumulative counter (`c`)
    Counter,
    /// Interval average of reported samples (`ms`)
    Timer,
    /// Last absolute value, or running sum of signed deltas (`g`)
    Gauge,
    /// Cardinality of distinct payloads (`s`)
    Set,
}

impl MetricKind {
    /// All kinds, in declaration order.
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Counter,
        MetricKind::Timer,
        MetricKind::Gauge,
        MetricKind::Set,
    ];

    /// Character used as the internal key prefix.
    pub fn prefix(&self) -> char {
        match self {
            MetricKind::Counter => 'c',
            MetricKind::Timer => 't',
            MetricKind::Gauge => 'g',
            MetricKind::Set => 's',
        }
    }

    /// Type token as it appears on the wire.
    pub fn wire_token(&self) -> &'static str {
        match self {
            MetricKind::Counter => "c",
            MetricKind::Timer => "ms",
            MetricKind::Gauge => "g",
            MetricKind::Set => "s",
        }
    }

    /// Parse a wire type token (`c`, `ms`, `g`, `s`).
    pub fn from_wire_token(token: &str) -> Option<MetricKind> {
        match token {
            "c" => Some(MetricKind::Counter),
            "ms" => Some(MetricKind::Timer),
            "g" => Some(MetricKind::Gauge),
            "s" => Some(MetricKind::Set),
            _ => None,
        }
    }

    /// Value type name used by downstream consumers.
    pub fn sink_type(&self) -> &'static str {
        match self {
            MetricKind::Counter => "derive",
            MetricKind::Timer => "latency",
            MetricKind::Gauge => "gauge",
            MetricKind::Set => "objects",
        }
    }

    /// Lowercase type name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Timer => "timer",
            MetricKind::Gauge => "gauge",
            MetricKind::Set => "set",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store key: the type prefix followed by the raw metric name, e.g. `c:requests`.
///
/// Ordering and equality are those of the underlying string, so the store
/// iterates in a stable, reproducible order.
#[derive(Debug, Clone)]
pub struct MetricKey {
    kind: MetricKind,
    raw: String,
}

impl MetricKey {
    /// Build the key for `name` of the given kind.
    ///
    /// Fails with [`StatsdError::Allocation`] if the key buffer cannot be reserved.
    pub fn new(kind: MetricKind, name: &str) -> Result<Self> {
        let mut raw = String::new();
        raw.try_reserve_exact(name.len() + 2)
            .map_err(|e| StatsdError::allocation(format!("metric key for '{}': {}", name, e)))?;
        raw.push(kind.prefix());
        raw.push(':');
        raw.push_str(name);
        Ok(Self { kind, raw })
    }

    /// Type encoded in the prefix.
    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Metric name without the internal type prefix.
    pub fn name(&self) -> &str {
        &self.raw[2..]
    }

    /// Full key including the prefix, e.g. `c:requests`.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for MetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for MetricKey {}

impl PartialOrd for MetricKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MetricKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl Borrow<str> for MetricKey {
    fn borrow(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Value handed to the sink on flush.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    /// Cumulative integer value; the sink derives a rate from it.
    Derive(i64),
    /// Point-in-time floating point value. May be NaN for idle timers.
    Gauge(f64),
}

impl MetricValue {
    /// Value as a float, whatever the variant.
    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::Derive(v) => *v as f64,
            MetricValue::Gauge(v) => *v,
        }
    }

    /// True for the NaN reported by idle timers.
    pub fn is_nan(&self) -> bool {
        matches!(self, MetricValue::Gauge(v) if v.is_nan())
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Derive(v) => write!(f, "{}", v),
            MetricValue::Gauge(v) => write!(f, "{}", v),
        }
    }
}
