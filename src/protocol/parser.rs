//! StatsD line parser.
//!
//! Grammar: `<name>:<value>|<type>[|@<sampleRate>]`. The first `|` ends the
//! value; within what precedes it, the last `:` separates name from value,
//! so names may themselves contain `:`.

use crate::core::{MetricKey, MetricKind, ParseError, Result};
use nom::{
    character::complete::char, combinator::all_consuming, number::complete::double,
    sequence::preceded, IResult,
};

/// What a parsed line does to its metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpdateAction<'a> {
    /// Add to the accumulator (counters, timers, signed gauges)
    Add(i64),
    /// Replace the accumulator (unsigned gauges)
    Set(i64),
    /// Insert a member into a set
    Insert(&'a str),
}

/// A single validated update, borrowing from the input line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricUpdate<'a> {
    pub name: &'a str,
    pub kind: MetricKind,
    pub action: UpdateAction<'a>,
}

impl<'a> MetricUpdate<'a> {
    /// Store key for this update.
    pub fn key(&self) -> Result<MetricKey> {
        MetricKey::new(self.kind, self.name)
    }
}

/// Parse one StatsD line into a typed update.
///
/// Rejected lines have no effect; callers log and skip them.
pub fn parse_line(line: &str) -> std::result::Result<MetricUpdate<'_>, ParseError> {
    let (head, type_section) = line.split_once('|').ok_or(ParseError::MissingType)?;
    let (name, value) = head.rsplit_once(':').ok_or(ParseError::MissingValue)?;
    if name.is_empty() {
        return Err(ParseError::EmptyName);
    }

    let (type_token, suffix) = match type_section.split_once('|') {
        Some((token, suffix)) => (token, Some(suffix)),
        None => (type_section, None),
    };
    let kind = MetricKind::from_wire_token(type_token)
        .ok_or_else(|| ParseError::UnknownType(type_token.to_string()))?;

    if kind != MetricKind::Counter {
        if let Some(suffix) = suffix {
            return Err(ParseError::UnexpectedSuffix {
                kind,
                suffix: suffix.to_string(),
            });
        }
    }

    let action = match kind {
        MetricKind::Counter => UpdateAction::Add(counter_delta(value, suffix)?),
        MetricKind::Gauge => {
            let parsed = parse_integer(value)?;
            if value.starts_with('+') || value.starts_with('-') {
                UpdateAction::Add(parsed)
            } else {
                UpdateAction::Set(parsed)
            }
        },
        MetricKind::Timer => UpdateAction::Add(parse_integer(value)?),
        MetricKind::Set => UpdateAction::Insert(value),
    };

    Ok(MetricUpdate { name, kind, action })
}

/// Parse a raw line from a datagram, rejecting invalid UTF-8.
pub fn parse_bytes(line: &[u8]) -> std::result::Result<MetricUpdate<'_>, ParseError> {
    let line = std::str::from_utf8(line).map_err(|_| ParseError::NotUtf8)?;
    parse_line(line)
}

/// Split a datagram payload into lines on any run of CR/LF, skipping empty segments.
pub fn split_lines(payload: &[u8]) -> impl Iterator<Item = &[u8]> {
    payload
        .split(|b| *b == b'\r' || *b == b'\n')
        .filter(|line| !line.is_empty())
}

/// `@<rate>` with nothing trailing.
fn sample_rate(input: &str) -> IResult<&str, f64> {
    all_consuming(preceded(char('@'), double))(input)
}

fn parse_integer(value: &str) -> std::result::Result<i64, ParseError> {
    value
        .parse::<i64>()
        .map_err(|_| ParseError::InvalidValue(value.to_string()))
}

fn counter_delta(value: &str, suffix: Option<&str>) -> std::result::Result<i64, ParseError> {
    let rate = match suffix {
        None => 1.0,
        Some(suffix) if !suffix.starts_with('@') => {
            return Err(ParseError::MalformedSuffix(suffix.to_string()));
        },
        Some(suffix) => {
            let (_, rate) =
                sample_rate(suffix).map_err(|_| ParseError::InvalidSampleRate(suffix.to_string()))?;
            if !rate.is_finite() || rate <= 0.0 || rate > 1.0 {
                return Err(ParseError::SampleRateOutOfRange(rate));
            }
            rate
        },
    };

    let raw = parse_integer(value)?;
    if raw < 1 {
        return Err(ParseError::CounterBelowOne(raw));
    }

    // `as` saturates at i64::MAX for very small rates
    Ok((raw as f64 / rate).round() as i64)
}
