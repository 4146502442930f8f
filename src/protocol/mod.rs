//! StatsD wire protocol.
//!
//! A datagram carries one or more CR/LF separated lines of the form
//! `name:value|type[|@rate]`. See [`parser`] for the exact grammar.

pub mod parser;

pub use parser::{parse_bytes, parse_line, split_lines, MetricUpdate, UpdateAction};
