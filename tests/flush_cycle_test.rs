//! Flush cycle behaviour across several intervals.

mod common;

use common::{loopback_config, TestHarness};
use pretty_assertions::assert_eq;
use statsd_agg::aggregation::{flush, MetricStore};
use statsd_agg::core::{DeletePolicy, MetricValue};
use statsd_agg::protocol::parse_line;
use statsd_agg::sink::RecordingSink;

fn feed(store: &MetricStore, lines: &[&str]) {
    for line in lines {
        store.apply(&parse_line(line).unwrap()).unwrap();
    }
}

#[test]
fn test_values_across_intervals() {
    let store = MetricStore::new();
    let sink = RecordingSink::new();
    let policy = DeletePolicy::default();

    feed(&store, &["c:2|c", "g:10|g", "t:100|ms", "t:200|ms", "s:a|s", "s:b|s"]);
    let stats = flush(&store, &policy, &sink);
    assert_eq!(stats.emitted, 4);
    assert_eq!(stats.evicted, 0);

    let first: Vec<(String, MetricValue)> =
        sink.take().into_iter().map(|m| (m.name, m.value)).collect();
    assert_eq!(
        first,
        vec![
            ("c".to_string(), MetricValue::Derive(2)),
            ("g".to_string(), MetricValue::Gauge(10.0)),
            ("s".to_string(), MetricValue::Gauge(2.0)),
            ("t".to_string(), MetricValue::Gauge(150.0)),
        ]
    );

    // Quiet interval: counter and gauge hold, set is empty, timer has no data.
    flush(&store, &policy, &sink);
    let second = sink.take();
    assert_eq!(second.len(), 4);
    assert_eq!(second[0].value, MetricValue::Derive(2));
    assert_eq!(second[1].value, MetricValue::Gauge(10.0));
    assert_eq!(second[2].value, MetricValue::Gauge(0.0));
    assert!(second[3].value.is_nan());

    // Third interval: only new timer samples count.
    feed(&store, &["c:1|c", "g:+5|g", "t:40|ms"]);
    flush(&store, &policy, &sink);
    let third = sink.take();
    assert_eq!(third[0].value, MetricValue::Derive(3));
    assert_eq!(third[1].value, MetricValue::Gauge(15.0));
    assert_eq!(third[3].value, MetricValue::Gauge(40.0));
}

#[test]
fn test_eviction_of_idle_kinds() {
    let store = MetricStore::new();
    let sink = RecordingSink::new();
    let policy = DeletePolicy {
        counters: true,
        timers: false,
        gauges: true,
        sets: false,
    };

    feed(&store, &["c:1|c", "g:1|g", "t:1|ms", "s:x|s"]);
    assert_eq!(flush(&store, &policy, &sink).emitted, 4);
    sink.take();

    let stats = flush(&store, &policy, &sink);
    assert_eq!(stats.evicted, 2);
    assert_eq!(stats.emitted, 2);
    let names: Vec<String> = sink.take().into_iter().map(|m| m.name).collect();
    assert_eq!(names, vec!["s".to_string(), "t".to_string()]);
    assert!(store.get("c:c").is_none());
    assert!(store.get("g:g").is_none());

    // An evicted counter starts again from zero.
    feed(&store, &["c:4|c"]);
    flush(&store, &policy, &sink);
    let again = sink.take();
    assert_eq!(again[0].name, "c");
    assert_eq!(again[0].value, MetricValue::Derive(4));
}

#[tokio::test]
async fn test_service_flush_uses_configured_policy() {
    let config = loopback_config().delete_sets(true).build().unwrap();
    let harness = TestHarness::start(config).await;

    harness.send("visitors:u1|s\nvisitors:u2|s").await;
    harness.wait_for_datagrams(1).await;

    let first = harness.service.flush();
    assert_eq!(first.emitted, 1);
    assert_eq!(harness.sink.take()[0].value, MetricValue::Gauge(2.0));

    let second = harness.service.flush();
    assert_eq!(second.emitted, 0);
    assert_eq!(second.evicted, 1);
    assert!(harness.service.store().is_empty());

    harness.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_run_until_emits_periodically_and_on_shutdown() {
    let harness = TestHarness::start(loopback_config().build().unwrap()).await;

    harness.send("beats:1|c").await;
    harness.wait_for_datagrams(1).await;

    harness
        .service
        .run_until(tokio::time::sleep(std::time::Duration::from_millis(180)))
        .await
        .unwrap();

    let emitted = harness.sink.take();
    // Periodic flushes plus the final one on shutdown.
    assert!(emitted.len() >= 2);
    assert!(emitted.iter().all(|m| m.name == "beats" && m.value == MetricValue::Derive(1)));
    assert!(!harness.service.listener_alive());
}
