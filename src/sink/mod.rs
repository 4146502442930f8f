//! Downstream sinks for flushed metric values.
//!
//! The aggregator only produces values; where they go is up to the host.
//! Implement [`MetricSink`] (or pass a closure) to receive them.

use crate::core::{MetricKind, MetricValue};
use parking_lot::Mutex;

/// Receives one call per non-evicted metric per flush.
pub trait MetricSink: Send + Sync {
    /// `name` is the raw metric name, without the internal type prefix.
    fn emit(&self, name: &str, kind: MetricKind, value: MetricValue);
}

impl<F> MetricSink for F
where
    F: Fn(&str, MetricKind, MetricValue) + Send + Sync,
{
    fn emit(&self, name: &str, kind: MetricKind, value: MetricValue) {
        self(name, kind, value)
    }
}

/// Writes every flushed value as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricSink for TracingSink {
    fn emit(&self, name: &str, kind: MetricKind, value: MetricValue) {
        tracing::info!(
            target: "statsd_agg::flush",
            metric = name,
            kind = kind.as_str(),
            value_type = kind.sink_type(),
            value = %value,
        );
    }
}

/// One value captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedMetric {
    pub name: String,
    pub kind: MetricKind,
    pub value: MetricValue,
}

/// Keeps emitted values in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    emitted: Mutex<Vec<EmittedMetric>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<EmittedMetric> {
        std::mem::take(&mut *self.emitted.lock())
    }

    pub fn len(&self) -> usize {
        self.emitted.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.emitted.lock().is_empty()
    }
}

impl MetricSink for RecordingSink {
    fn emit(&self, name: &str, kind: MetricKind, value: MetricValue) {
        self.emitted.lock().push(EmittedMetric {
            name: name.to_string(),
            kind,
            value,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_recording_sink_take_drains() {
        let sink = RecordingSink::new();
        sink.emit("hits", MetricKind::Counter, MetricValue::Derive(3));
        assert_eq!(sink.len(), 1);

        let taken = sink.take();
        assert_eq!(taken[0].name, "hits");
        assert!(sink.is_empty());
    }

    #[test]
    fn test_closure_sink() {
        let calls = AtomicUsize::new(0);
        let sink = |_: &str, _: MetricKind, _: MetricValue| {
            calls.fetch_add(1, Ordering::Relaxed);
        };
        sink.emit("a", MetricKind::Gauge, MetricValue::Gauge(1.0));
        sink.emit("b", MetricKind::Gauge, MetricValue::Gauge(2.0));
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }
}
