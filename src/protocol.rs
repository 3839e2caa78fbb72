//! Wire types for the Pulseboard realtime protocol.
//!
//! Every frame is a JSON object tagged by a `type` field. Inbound frames
//! deserialize into [`ServerEvent`]; outbound control frames serialize from
//! [`ClientMessage`]. Frames whose `type` is missing or unknown fail to
//! deserialize and are dropped by the dispatcher — lenient parsing is the
//! contract, not an accident.

use serde::{Deserialize, Serialize};

// ── Outbound frames ─────────────────────────────────────────────────

/// Control frames sent from the client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask the server to report the current unread notification count.
    FetchUnreadCount,
    /// Keep-alive probe; the server answers with a `pong` frame.
    Ping,
}

// ── Inbound frames ──────────────────────────────────────────────────

/// Inbound frames, tagged by the wire `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A new notification for the current user.
    Notification { notification: Notification },
    /// Unread notification count report.
    UnreadCount { count: u64 },
    /// Owner-dashboard update carrying a nested sub-type.
    DashboardUpdate { update: DashboardUpdate },
    /// A system-wide alert banner.
    SystemAlert { alert: SystemAlert },
    /// New series data for an existing dashboard chart.
    MetricUpdate { metric: MetricUpdate },
    /// In-place patch of project fields.
    ProjectUpdate { update: ProjectUpdate },
    /// In-place patch of task fields.
    TaskUpdate { update: TaskUpdate },
    /// In-place patch of team fields, optionally with a full member list.
    TeamUpdate { update: TeamUpdate },
    /// A chat message pushed to the room.
    NewMessage {
        message: ChatMessage,
        sender: ChatSender,
        timestamp: String,
    },
    /// Reply to a client `ping`.
    Pong,
}

/// Closed set of inbound event tags, used as the typed-dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Notification,
    UnreadCount,
    DashboardUpdate,
    SystemAlert,
    MetricUpdate,
    ProjectUpdate,
    TaskUpdate,
    TeamUpdate,
    NewMessage,
    Pong,
}

impl ServerEvent {
    /// The dispatch key for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::Notification { .. } => EventKind::Notification,
            ServerEvent::UnreadCount { .. } => EventKind::UnreadCount,
            ServerEvent::DashboardUpdate { .. } => EventKind::DashboardUpdate,
            ServerEvent::SystemAlert { .. } => EventKind::SystemAlert,
            ServerEvent::MetricUpdate { .. } => EventKind::MetricUpdate,
            ServerEvent::ProjectUpdate { .. } => EventKind::ProjectUpdate,
            ServerEvent::TaskUpdate { .. } => EventKind::TaskUpdate,
            ServerEvent::TeamUpdate { .. } => EventKind::TeamUpdate,
            ServerEvent::NewMessage { .. } => EventKind::NewMessage,
            ServerEvent::Pong => EventKind::Pong,
        }
    }
}

// ── Payloads ────────────────────────────────────────────────────────

/// A notification entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Category label shown in the entry header (e.g. `"timesheet"`).
    #[serde(rename = "type")]
    pub category: String,
    pub message: String,
    pub timestamp: String,
}

/// Owner-dashboard update, tagged by a nested `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardUpdate {
    /// A labeled company-metric value with a trend percentage.
    CompanyMetric(CompanyMetric),
    /// A new activity-log entry.
    ActivityLog(ActivityLogEntry),
}

/// A labeled company-metric value and its trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyMetric {
    pub metric_id: String,
    pub value: String,
    /// Percentage change; sign selects the trend indicator.
    pub trend: f64,
}

/// One entry in the owner-dashboard activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub timestamp: String,
    pub user: String,
    pub action: String,
    pub resource: String,
}

/// Severity of a system alert. `Danger` alerts are never auto-dismissed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Success,
    Warning,
    Danger,
}

/// A dismissible system-alert banner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemAlert {
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
}

/// New series data for an existing chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricUpdate {
    pub id: String,
    #[serde(flatten)]
    pub data: ChartData,
}

/// Chart payload shape, tagged by the wire `data_type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "data_type", rename_all = "snake_case")]
pub enum ChartData {
    /// Labeled time-series with one data vector per dataset.
    TimeSeries {
        labels: Vec<String>,
        datasets: Vec<Dataset>,
    },
    /// Single-dataset pie chart, optionally recoloring the slices.
    Pie {
        labels: Vec<String>,
        data: Vec<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        colors: Option<Vec<String>>,
    },
}

/// One dataset of a time-series chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub data: Vec<f64>,
}

/// In-place patch of project fields. Absent fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectUpdate {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Completion percentage (0–100).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

/// In-place patch of task fields. Absent fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
}

/// In-place patch of team fields. A present `members` list replaces the
/// rendered member list wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamUpdate {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<TeamMember>>,
}

/// One member in a team's member list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub name: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// A chat message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server-assigned id; drives duplicate suppression. Messages without
    /// an id are rendered unconditionally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_name: Option<String>,
    #[serde(default)]
    pub is_edited: bool,
}

/// The author of a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSender {
    pub first_name: String,
    pub last_name: String,
}

// ── Polling fallback ────────────────────────────────────────────────

/// Response body of the chat polling endpoint
/// (`GET <room>?ajax=1&last_message=<id>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResponse {
    pub success: bool,
    #[serde(default)]
    pub new_messages: Vec<PolledMessage>,
}

/// One message returned by the polling endpoint. Same shape as the
/// socket-pushed `new_message` frame payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolledMessage {
    pub message: ChatMessage,
    pub sender: ChatSender,
    pub timestamp: String,
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn client_message_wire_shape() {
        let json = serde_json::to_string(&ClientMessage::FetchUnreadCount).unwrap();
        assert_eq!(json, r#"{"type":"fetch_unread_count"}"#);
        let json = serde_json::to_string(&ClientMessage::Ping).unwrap();
        assert_eq!(json, r#"{"type":"ping"}"#);
    }

    #[test]
    fn unread_count_round_trips() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"unread_count","count":5}"#).unwrap();
        assert_eq!(event, ServerEvent::UnreadCount { count: 5 });
        assert_eq!(event.kind(), EventKind::UnreadCount);
    }

    #[test]
    fn dashboard_update_nested_tag() {
        let raw = r#"{
            "type": "dashboard_update",
            "update": {"type": "activity_log", "timestamp": "t1",
                       "user": "u", "action": "a", "resource": "r"}
        }"#;
        let event: ServerEvent = serde_json::from_str(raw).unwrap();
        match event {
            ServerEvent::DashboardUpdate {
                update: DashboardUpdate::ActivityLog(entry),
            } => assert_eq!(entry.user, "u"),
            other => panic!("expected activity_log, got {other:?}"),
        }
    }

    #[test]
    fn metric_update_flattens_chart_data() {
        let raw = r#"{
            "type": "metric_update",
            "metric": {"id": "revenue", "data_type": "time_series",
                       "labels": ["Jan"], "datasets": [{"data": [1.0]}]}
        }"#;
        let event: ServerEvent = serde_json::from_str(raw).unwrap();
        match event {
            ServerEvent::MetricUpdate { metric } => {
                assert_eq!(metric.id, "revenue");
                assert!(matches!(metric.data, ChartData::TimeSeries { .. }));
            }
            other => panic!("expected metric_update, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result = serde_json::from_str::<ServerEvent>(r#"{"type":"mystery","x":1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn missing_type_is_rejected() {
        let result = serde_json::from_str::<ServerEvent>(r#"{"count":5}"#);
        assert!(result.is_err());
    }
}
