//! Tests for audit sink

use deferred_tasks::core::{build_audit_event, AuditAction, AuditSink, InMemoryAuditSink};

#[test]
fn test_in_memory_audit_sink() {
    let sink = InMemoryAuditSink::new(10);

    let event = build_audit_event(
        1,
        AuditAction::Submitted,
        Some("report"),
        Some("priority=50".to_string()),
    );

    sink.record(event);
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0].task_id, 1);
    assert_eq!(events[0].action, AuditAction::Submitted);
    assert_eq!(events[0].label.as_deref(), Some("report"));
    assert_eq!(events[0].detail.as_deref(), Some("priority=50"));
    assert!(events[0].created_at_ms > 0);
}

#[test]
fn test_audit_sink_overflow() {
    let sink = InMemoryAuditSink::new(2);

    sink.record(build_audit_event(1, AuditAction::Submitted, None, None));
    sink.record(build_audit_event(2, AuditAction::Submitted, None, None));
    sink.record(build_audit_event(3, AuditAction::Submitted, None, None));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].task_id, 2); // First one popped
    assert_eq!(events[1].task_id, 3);
}

#[test]
fn test_audit_event_serializes_snake_case() {
    let event = build_audit_event(7, AuditAction::Discarded, None, None);
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["task_id"], 7);
    assert_eq!(json["action"], "discarded");
    assert!(json["label"].is_null());
}
