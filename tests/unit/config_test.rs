//! Tests for configuration validation

use std::time::Duration;

use deferred_tasks::config::SchedulerConfig;

#[test]
fn test_scheduler_config_validation() {
    let valid = SchedulerConfig::new()
        .with_max_concurrency(4)
        .with_max_queue_depth(100);
    assert!(valid.validate().is_ok());
    assert!(SchedulerConfig::default().validate().is_ok());
}

#[test]
fn test_scheduler_config_invalid_concurrency() {
    let invalid = SchedulerConfig::new().with_max_concurrency(0);
    assert!(invalid.validate().is_err());

    let invalid = SchedulerConfig::new().with_min_concurrency(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_scheduler_config_invalid_queue_depth() {
    let invalid = SchedulerConfig::new().with_max_queue_depth(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_scheduler_config_invalid_timeout() {
    let invalid = SchedulerConfig {
        default_queue_timeout_ms: Some(0),
        ..SchedulerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_scheduler_config_empty_prefix() {
    let invalid = SchedulerConfig::new().with_thread_name_prefix("");
    assert!(invalid.validate().is_err());
}

#[test]
fn test_scheduler_config_from_json() {
    let json = r#"{
        "max_concurrency": 6,
        "max_queue_depth": 200,
        "default_queue_timeout_ms": 5000
    }"#;

    let config = SchedulerConfig::from_json_str(json).unwrap();
    assert_eq!(config.max_concurrency, Some(6));
    assert_eq!(config.max_queue_depth, Some(200));
    assert_eq!(config.default_queue_timeout(), Some(Duration::from_secs(5)));
    assert_eq!(config.thread_name_prefix, "deferred-worker");
    assert_eq!(config.resolved_max_concurrency(), 6);
}

#[test]
fn test_scheduler_config_from_json_rejects_invalid() {
    assert!(SchedulerConfig::from_json_str(r#"{"max_concurrency": 0}"#).is_err());
    assert!(SchedulerConfig::from_json_str("not json").is_err());
}

#[test]
fn test_scheduler_config_json_roundtrip() {
    let config = SchedulerConfig::new()
        .with_max_concurrency(2)
        .with_thread_stack_size(256 * 1024);
    let json = serde_json::to_string(&config).unwrap();
    assert_eq!(SchedulerConfig::from_json_str(&json).unwrap(), config);
}
