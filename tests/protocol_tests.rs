#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire-format tests against captured server frames.

use pulseboard_client::protocol::{
    AlertLevel, ChartData, DashboardUpdate, PollResponse, ServerEvent,
};

#[test]
fn notification_frame_parses_with_renamed_category_field() {
    let raw = r#"{
        "type": "notification",
        "notification": {
            "type": "timesheet",
            "message": "Your timesheet was approved",
            "timestamp": "2026-08-24T09:30:00Z"
        }
    }"#;

    match serde_json::from_str::<ServerEvent>(raw).unwrap() {
        ServerEvent::Notification { notification } => {
            assert_eq!(notification.category, "timesheet");
            assert_eq!(notification.message, "Your timesheet was approved");
        }
        other => panic!("expected notification, got {other:?}"),
    }
}

#[test]
fn dashboard_update_branches_on_the_nested_type() {
    let metric = r#"{
        "type": "dashboard_update",
        "update": {"type": "company_metric", "metric_id": "revenue",
                   "value": "$52k", "trend": -1.5}
    }"#;
    match serde_json::from_str::<ServerEvent>(metric).unwrap() {
        ServerEvent::DashboardUpdate {
            update: DashboardUpdate::CompanyMetric(m),
        } => assert_eq!(m.trend, -1.5),
        other => panic!("expected company_metric, got {other:?}"),
    }

    let activity = r#"{
        "type": "dashboard_update",
        "update": {"type": "activity_log", "timestamp": "t",
                   "user": "dana", "action": "created", "resource": "invoice"}
    }"#;
    match serde_json::from_str::<ServerEvent>(activity).unwrap() {
        ServerEvent::DashboardUpdate {
            update: DashboardUpdate::ActivityLog(entry),
        } => assert_eq!(entry.action, "created"),
        other => panic!("expected activity_log, got {other:?}"),
    }
}

#[test]
fn alert_levels_parse_lowercase() {
    let raw = r#"{
        "type": "system_alert",
        "alert": {"level": "danger", "title": "Outage", "message": "m"}
    }"#;
    match serde_json::from_str::<ServerEvent>(raw).unwrap() {
        ServerEvent::SystemAlert { alert } => assert_eq!(alert.level, AlertLevel::Danger),
        other => panic!("expected system_alert, got {other:?}"),
    }
}

#[test]
fn pie_chart_metric_update_parses_with_optional_colors() {
    let raw = r#"{
        "type": "metric_update",
        "metric": {"id": "expense_breakdown", "data_type": "pie",
                   "labels": ["Payroll", "Rent"], "data": [70.0, 30.0]}
    }"#;
    match serde_json::from_str::<ServerEvent>(raw).unwrap() {
        ServerEvent::MetricUpdate { metric } => match metric.data {
            ChartData::Pie { labels, colors, .. } => {
                assert_eq!(labels.len(), 2);
                assert_eq!(colors, None);
            }
            other => panic!("expected pie data, got {other:?}"),
        },
        other => panic!("expected metric_update, got {other:?}"),
    }
}

#[test]
fn chat_message_fields_default_sensibly() {
    // No id, no attachment, no is_edited flag.
    let raw = r#"{
        "type": "new_message",
        "message": {"content": "hi"},
        "sender": {"first_name": "Dana", "last_name": "Reyes"},
        "timestamp": "t"
    }"#;
    match serde_json::from_str::<ServerEvent>(raw).unwrap() {
        ServerEvent::NewMessage { message, .. } => {
            assert_eq!(message.id, None);
            assert!(!message.is_edited);
            assert_eq!(message.attachment, None);
        }
        other => panic!("expected new_message, got {other:?}"),
    }
}

#[test]
fn poll_response_tolerates_missing_message_list() {
    let response: PollResponse = serde_json::from_str(r#"{"success": true}"#).unwrap();
    assert!(response.success);
    assert!(response.new_messages.is_empty());
}

#[test]
fn unknown_and_missing_types_fail_to_parse() {
    assert!(serde_json::from_str::<ServerEvent>(r#"{"type":"mystery"}"#).is_err());
    assert!(serde_json::from_str::<ServerEvent>(r#"{"count":1}"#).is_err());
    assert!(serde_json::from_str::<ServerEvent>("not json").is_err());
}

#[test]
fn extra_fields_are_tolerated() {
    // Servers may add fields; clients must not reject them.
    let raw = r#"{"type":"unread_count","count":2,"server_time":"t"}"#;
    let event: ServerEvent = serde_json::from_str(raw).unwrap();
    assert_eq!(event, ServerEvent::UnreadCount { count: 2 });
}
