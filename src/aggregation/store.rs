//! Thread-safe aggregation store.
//!
//! One coarse `parking_lot::Mutex` guards an ordered map from [`MetricKey`]
//! to [`MetricRecord`]. The listener writes through the upsert operations;
//! the flush cycle walks and resets everything under the same lock.

use crate::core::{MetricKey, MetricKind, Result, StatsdError};
use crate::protocol::{MetricUpdate, UpdateAction};
use parking_lot::Mutex;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

/// Aggregate state for one metric key.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    kind: MetricKind,
    accumulator: i64,
    members: Option<BTreeSet<String>>,
    update_count: u64,
}

/// Decision returned by a [`MetricStore::drain_and_reset`] visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushAction {
    /// Keep the record and reset it for the next interval
    Retain,
    /// Remove the record once the walk completes
    Evict,
}

impl MetricRecord {
    fn with_value(kind: MetricKind, value: i64) -> Self {
        Self {
            kind,
            accumulator: value,
            members: None,
            update_count: 1,
        }
    }

    fn empty_set() -> Self {
        Self {
            kind: MetricKind::Set,
            accumulator: 0,
            members: None,
            update_count: 0,
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn accumulator(&self) -> i64 {
        self.accumulator
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Distinct members observed since the last flush; `None` until the first insert.
    pub fn members(&self) -> Option<&BTreeSet<String>> {
        self.members.as_ref()
    }

    /// Set cardinality (0 when no members were ever added).
    pub fn cardinality(&self) -> usize {
        self.members.as_ref().map_or(0, BTreeSet::len)
    }

    /// No updates since the last flush.
    pub fn is_idle(&self) -> bool {
        self.update_count == 0
    }

    /// Start a new interval. Counter and gauge accumulators carry over;
    /// timer sums and set members only describe the interval that just ended.
    fn reset(&mut self) {
        self.update_count = 0;
        match self.kind {
            MetricKind::Timer => self.accumulator = 0,
            MetricKind::Set => {
                if let Some(members) = self.members.as_mut() {
                    members.clear();
                }
            },
            MetricKind::Counter | MetricKind::Gauge => {},
        }
    }
}

/// Concurrent, ordered map of aggregated metrics.
#[derive(Debug, Default)]
pub struct MetricStore {
    metrics: Mutex<BTreeMap<MetricKey, MetricRecord>>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the accumulator, creating the record if needed.
    pub fn upsert_absolute(&self, key: MetricKey, value: i64) -> Result<()> {
        ensure_numeric(&key)?;
        let mut metrics = self.metrics.lock();
        match metrics.entry(key) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                record.accumulator = value;
                record.update_count += 1;
            },
            Entry::Vacant(entry) => {
                tracing::debug!("Adding new metric \"{}\"", entry.key());
                let kind = entry.key().kind();
                entry.insert(MetricRecord::with_value(kind, value));
            },
        }
        Ok(())
    }

    /// Add to the accumulator, creating the record with `delta` if needed.
    pub fn upsert_delta(&self, key: MetricKey, delta: i64) -> Result<()> {
        ensure_numeric(&key)?;
        let mut metrics = self.metrics.lock();
        match metrics.entry(key) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                record.accumulator = record.accumulator.saturating_add(delta);
                record.update_count += 1;
            },
            Entry::Vacant(entry) => {
                tracing::debug!("Adding new metric \"{}\"", entry.key());
                let kind = entry.key().kind();
                entry.insert(MetricRecord::with_value(kind, delta));
            },
        }
        Ok(())
    }

    /// Insert `member` into a set metric. Counts as one update even when
    /// the member is already present.
    pub fn add_set_member(&self, key: MetricKey, member: &str) -> Result<()> {
        if key.kind() != MetricKind::Set {
            return Err(StatsdError::TypeMismatch {
                key: key.to_string(),
                expected: MetricKind::Set,
            });
        }

        // Reserve before locking so a failure leaves the map untouched.
        let mut owned = String::new();
        owned
            .try_reserve_exact(member.len())
            .map_err(|e| StatsdError::allocation(format!("set member for '{}': {}", key, e)))?;
        owned.push_str(member);

        let mut metrics = self.metrics.lock();
        let record = metrics.entry(key).or_insert_with_key(|key| {
            tracing::debug!("Adding new metric \"{}\"", key);
            MetricRecord::empty_set()
        });
        record.members.get_or_insert_with(BTreeSet::new).insert(owned);
        record.update_count += 1;
        Ok(())
    }

    /// Apply a parsed line through the matching upsert.
    pub fn apply(&self, update: &MetricUpdate<'_>) -> Result<()> {
        let key = update.key()?;
        match update.action {
            UpdateAction::Add(delta) => self.upsert_delta(key, delta),
            UpdateAction::Set(value) => self.upsert_absolute(key, value),
            UpdateAction::Insert(member) => self.add_set_member(key, member),
        }
    }

    /// Walk every record in key order under a single lock.
    ///
    /// `visit` sees each record before it is reset. Records it marks
    /// [`FlushAction::Evict`] are removed after the walk; all others have
    /// their update count zeroed (plus per-kind interval state, see
    /// [`MetricRecord`]). Returns the evicted keys.
    pub fn drain_and_reset<F>(&self, mut visit: F) -> Vec<MetricKey>
    where
        F: FnMut(&MetricKey, &MetricRecord) -> FlushAction,
    {
        let mut metrics = self.metrics.lock();
        let mut evicted = Vec::new();

        for (key, record) in metrics.iter_mut() {
            match visit(key, record) {
                FlushAction::Evict => evicted.push(key.clone()),
                FlushAction::Retain => record.reset(),
            }
        }

        for key in &evicted {
            tracing::debug!("Deleting metric \"{}\"", key);
            metrics.remove(key);
        }

        evicted
    }

    /// Snapshot of one record.
    pub fn get(&self, key: &str) -> Option<MetricRecord> {
        self.metrics.lock().get(key).cloned()
    }

    /// Keys currently held, in iteration order.
    pub fn keys(&self) -> Vec<MetricKey> {
        self.metrics.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.metrics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.lock().is_empty()
    }

    #[cfg(test)]
    pub(crate) fn is_locked(&self) -> bool {
        self.metrics.is_locked()
    }
}

fn ensure_numeric(key: &MetricKey) -> Result<()> {
    if key.kind() == MetricKind::Set {
        return Err(StatsdError::TypeMismatch {
            key: key.to_string(),
            expected: MetricKind::Counter,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::parse_line;
    use std::sync::Arc;

    fn key(kind: MetricKind, name: &str) -> MetricKey {
        MetricKey::new(kind, name).unwrap()
    }

    #[test]
    fn test_upsert_delta_creates_then_adds() {
        let store = MetricStore::new();
        store.upsert_delta(key(MetricKind::Counter, "hits"), 3).unwrap();
        store.upsert_delta(key(MetricKind::Counter, "hits"), 4).unwrap();

        let record = store.get("c:hits").unwrap();
        assert_eq!(record.accumulator(), 7);
        assert_eq!(record.update_count(), 2);
        assert_eq!(record.kind(), MetricKind::Counter);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_upsert_absolute_overwrites() {
        let store = MetricStore::new();
        store.upsert_absolute(key(MetricKind::Gauge, "temp"), 5).unwrap();
        store.upsert_absolute(key(MetricKind::Gauge, "temp"), 9).unwrap();

        let record = store.get("g:temp").unwrap();
        assert_eq!(record.accumulator(), 9);
        assert_eq!(record.update_count(), 2);
    }

    #[test]
    fn test_gauge_delta_after_absolute() {
        let store = MetricStore::new();
        store.apply(&parse_line("temp:5|g").unwrap()).unwrap();
        store.apply(&parse_line("temp:-2|g").unwrap()).unwrap();
        assert_eq!(store.get("g:temp").unwrap().accumulator(), 3);
    }

    #[test]
    fn test_set_members_deduplicate() {
        let store = MetricStore::new();
        for user in ["alice", "bob", "alice"] {
            store.add_set_member(key(MetricKind::Set, "users"), user).unwrap();
        }

        let record = store.get("s:users").unwrap();
        assert_eq!(record.cardinality(), 2);
        assert_eq!(record.update_count(), 3);
    }

    #[test]
    fn test_same_name_different_types_do_not_collide() {
        let store = MetricStore::new();
        store.apply(&parse_line("x:1|c").unwrap()).unwrap();
        store.apply(&parse_line("x:1|g").unwrap()).unwrap();
        store.apply(&parse_line("x:1|ms").unwrap()).unwrap();
        store.apply(&parse_line("x:1|s").unwrap()).unwrap();

        let keys: Vec<String> = store.keys().iter().map(ToString::to_string).collect();
        assert_eq!(keys, vec!["c:x", "g:x", "s:x", "t:x"]);
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let store = MetricStore::new();
        let err = store.upsert_delta(key(MetricKind::Set, "users"), 1).unwrap_err();
        assert!(matches!(err, StatsdError::TypeMismatch { .. }));

        let err = store.add_set_member(key(MetricKind::Counter, "hits"), "a").unwrap_err();
        assert!(matches!(err, StatsdError::TypeMismatch { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_drain_resets_update_counts_and_sets() {
        let store = MetricStore::new();
        store.apply(&parse_line("hits:2|c").unwrap()).unwrap();
        store.apply(&parse_line("lat:40|ms").unwrap()).unwrap();
        store.apply(&parse_line("users:a|s").unwrap()).unwrap();

        let mut visited = Vec::new();
        let evicted = store.drain_and_reset(|key, record| {
            visited.push((key.to_string(), record.update_count()));
            FlushAction::Retain
        });

        assert!(evicted.is_empty());
        assert_eq!(
            visited,
            vec![("c:hits".to_string(), 1), ("s:users".to_string(), 1), ("t:lat".to_string(), 1)]
        );

        let counter = store.get("c:hits").unwrap();
        assert_eq!(counter.accumulator(), 2);
        assert!(counter.is_idle());

        let timer = store.get("t:lat").unwrap();
        assert_eq!(timer.accumulator(), 0);

        let set = store.get("s:users").unwrap();
        assert_eq!(set.cardinality(), 0);
        assert!(set.members().is_some());
    }

    #[test]
    fn test_drain_evicts_after_walk() {
        let store = MetricStore::new();
        store.apply(&parse_line("a:1|c").unwrap()).unwrap();
        store.apply(&parse_line("b:1|c").unwrap()).unwrap();

        let evicted = store.drain_and_reset(|key, _| {
            if key.name() == "a" {
                FlushAction::Evict
            } else {
                FlushAction::Retain
            }
        });

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].as_str(), "c:a");
        assert!(store.get("c:a").is_none());
        assert!(store.get("c:b").is_some());
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let store = Arc::new(MetricStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        store.apply(&parse_line("shared:1|c").unwrap()).unwrap();
                    }
                })
            })
            .collect();

        let mut flushed_updates = 0;
        for _ in 0..10 {
            store.drain_and_reset(|_, record| {
                flushed_updates += record.update_count();
                FlushAction::Retain
            });
        }

        for handle in handles {
            handle.join().unwrap();
        }
        store.drain_and_reset(|_, record| {
            flushed_updates += record.update_count();
            FlushAction::Retain
        });

        assert_eq!(store.get("c:shared").unwrap().accumulator(), 8_000);
        assert_eq!(flushed_updates, 8_000);
    }
}
