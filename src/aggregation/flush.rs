//! Flush cycle: emit one value per metric, then reset or evict.

use crate::aggregation::store::{FlushAction, MetricRecord, MetricStore};
use crate::core::{DeletePolicy, MetricKind, MetricValue};
use crate::sink::MetricSink;

/// Outcome of one flush cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub emitted: usize,
    pub evicted: usize,
}

impl MetricRecord {
    /// Value reported for this record at flush time.
    pub fn flush_value(&self) -> MetricValue {
        match self.kind() {
            MetricKind::Counter => MetricValue::Derive(self.accumulator()),
            MetricKind::Gauge => MetricValue::Gauge(self.accumulator() as f64),
            MetricKind::Timer => {
                if self.update_count() == 0 {
                    MetricValue::Gauge(f64::NAN)
                } else {
                    MetricValue::Gauge(self.accumulator() as f64 / self.update_count() as f64)
                }
            },
            MetricKind::Set => MetricValue::Gauge(self.cardinality() as f64),
        }
    }
}

/// Run one flush cycle against `store`.
///
/// Idle records whose kind is enabled in `policy` are evicted without being
/// emitted. Every other record is emitted in key order with its type prefix
/// stripped.
///
/// The sink is called while the store lock is held, so concurrent flushes
/// reach it one whole cycle at a time. It must not call back into `store`.
pub fn flush(store: &MetricStore, policy: &DeletePolicy, sink: &dyn MetricSink) -> FlushStats {
    let mut emitted = 0;

    let evicted = store.drain_and_reset(|key, record| {
        if record.is_idle() && policy.deletes(record.kind()) {
            return FlushAction::Evict;
        }
        sink.emit(key.name(), key.kind(), record.flush_value());
        emitted += 1;
        FlushAction::Retain
    });

    let stats = FlushStats {
        emitted,
        evicted: evicted.len(),
    };
    tracing::debug!(emitted = stats.emitted, evicted = stats.evicted, "Flush cycle complete");
    stats
}
