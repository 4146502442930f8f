//! Configuration system tests.

use statsd_agg::core::{Config, ConfigBuilder, DeletePolicy, LogLevel, MetricKind};
use std::time::Duration;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.listener.port, "8125");
    assert_eq!(config.listener.port_number().unwrap(), 8125);
    assert!(config.listener.host.is_none());
    assert_eq!(config.flush.interval, Duration::from_secs(10));
    assert!(MetricKind::ALL.iter().all(|k| !config.delete.deletes(*k)));
}

#[test]
fn test_config_builder() {
    let config = ConfigBuilder::new()
        .host("::1")
        .port("9125")
        .delete_counters(true)
        .delete_sets(true)
        .flush_interval(Duration::from_secs(60))
        .log_level(LogLevel::Warn)
        .debug(true)
        .build()
        .unwrap();

    assert_eq!(config.listener.host.as_deref(), Some("::1"));
    assert_eq!(config.listener.port_number().unwrap(), 9125);
    assert_eq!(
        config.delete,
        DeletePolicy {
            counters: true,
            timers: false,
            gauges: false,
            sets: true,
        }
    );
    assert_eq!(config.logging.level, LogLevel::Warn);
    assert!(config.debug);
}

#[test]
fn test_yaml_config() {
    let yaml = r#"
listener:
  host: "0.0.0.0"
  port: "8125"
delete:
  counters: true
  timers: true
  gauges: false
  sets: true
flush:
  interval: 1m
logging:
  level: warn
  structured: true
"#;

    let config = ConfigBuilder::new().from_yaml(yaml).unwrap().build().unwrap();

    assert_eq!(config.listener.host.as_deref(), Some("0.0.0.0"));
    assert!(config.delete.counters);
    assert!(config.delete.timers);
    assert!(!config.delete.gauges);
    assert!(config.delete.sets);
    assert_eq!(config.flush.interval, Duration::from_secs(60));
    assert_eq!(config.logging.level, LogLevel::Warn);
    assert!(config.logging.structured);
}

#[test]
fn test_unknown_options_do_not_abort() {
    let yaml = r#"
listener:
  port: 8125
  TimerPercentile: 90
delete:
  DeleteCounters: true
CounterSum: true
"#;

    let config = ConfigBuilder::new().from_yaml(yaml).unwrap().build().unwrap();
    assert!(config.delete.counters);
    assert_eq!(config.unknown_keys().len(), 2);
    assert!(config.unknown_keys().contains(&"listener.TimerPercentile".to_string()));
    assert!(config.unknown_keys().contains(&"CounterSum".to_string()));
    config.report_unknown_keys();
}

#[test]
fn test_error_handling() {
    // Invalid YAML
    let result = ConfigBuilder::new().from_yaml("invalid: yaml: content: [");
    assert!(result.is_err());

    // Wrong value types
    let result = ConfigBuilder::new().from_yaml("delete:\n  counters: sometimes\n");
    assert!(result.is_err());

    // Valid YAML, invalid values
    let result = ConfigBuilder::new().from_yaml("listener:\n  port: 123456\n").unwrap().build();
    assert!(result.is_err());

    let result = ConfigBuilder::new().from_yaml("flush:\n  interval: 0s\n").unwrap().build();
    assert!(result.is_err());
}
