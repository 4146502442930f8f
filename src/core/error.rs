//! Error types for parsing, transport, configuration and store updates.

use crate::core::types::MetricKind;
use thiserror::Error;

/// Why a single StatsD line was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// No `:` before the first `|`
    #[error("missing ':' between name and value")]
    MissingValue,

    /// No `|` anywhere in the line
    #[error("missing '|' before type")]
    MissingType,

    /// Nothing before the value separator
    #[error("empty metric name")]
    EmptyName,

    /// Type token other than `c`, `ms`, `g` or `s`
    #[error("unknown metric type '{0}'")]
    UnknownType(String),

    /// Value is not a whole signed 64-bit number
    #[error("invalid integer value '{0}'")]
    InvalidValue(String),

    /// Counters only accept increments of 1 or more
    #[error("counter increment must be at least 1, got {0}")]
    CounterBelowOne(i64),

    /// `@` suffix that is not a float
    #[error("invalid sample rate '{0}'")]
    InvalidSampleRate(String),

    /// Sample rate outside `(0, 1]`
    #[error("sample rate must be in (0, 1], got {0}")]
    SampleRateOutOfRange(f64),

    /// Counter suffix without the leading `@`
    #[error("counter suffix must start with '@', got '{0}'")]
    MalformedSuffix(String),

    /// Any suffix on a gauge, timer or set
    #[error("suffix '{suffix}' is only valid for counters, not {kind}")]
    UnexpectedSuffix {
        /// Type of the offending line
        kind: MetricKind,
        /// Text after the second `|`
        suffix: String,
    },

    /// Datagram line with invalid UTF-8
    #[error("line is not valid UTF-8")]
    NotUtf8,
}

/// Main error type for the aggregator
#[derive(Error, Debug)]
pub enum StatsdError {
    /// A line was rejected by the parser
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Socket resolution, bind or receive failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Memory for a key or set member could not be reserved
    #[error("Allocation failed: {0}")]
    Allocation(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Update kind does not match the key's type
    #[error("Metric '{key}' is not a {expected}")]
    TypeMismatch {
        /// Prefixed store key
        key: String,
        /// Kind the operation needs
        expected: MetricKind,
    },

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The listener task panicked or was cancelled
    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type alias for StatsD operations
pub type Result<T> = std::result::Result<T, StatsdError>;

impl StatsdError {
    /// Creates a new transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a new allocation error
    pub fn allocation<S: Into<String>>(msg: S) -> Self {
        Self::Allocation(msg.into())
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Returns true if the error only affects the update or line that caused it
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::Allocation(_) | Self::TypeMismatch { .. })
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse",
            Self::Transport(_) | Self::Io(_) => "transport",
            Self::Allocation(_) => "allocation",
            Self::Config(_) => "config",
            Self::TypeMismatch { .. } => "validation",
            Self::Join(_) => "async",
        }
    }
}
