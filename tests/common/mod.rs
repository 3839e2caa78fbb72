#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
#![allow(dead_code)]
//! Shared test utilities for Pulseboard Client integration tests.
//!
//! Provides a scripted [`MockTransport`]/[`MockConnector`] pair and helper
//! functions for constructing common server frame JSON strings.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;

use async_trait::async_trait;
use pulseboard_client::protocol::{
    ActivityLogEntry, AlertLevel, ChatMessage, ChatSender, CompanyMetric, DashboardUpdate,
    Notification, ProjectUpdate, ServerEvent, SystemAlert, TaskUpdate, TeamUpdate,
};
use pulseboard_client::{Connector, RealtimeError, Transport};

/// One scripted `recv()` result. An explicit `None` entry scripts a clean
/// server close.
pub type ScriptedFrame = Option<Result<String, RealtimeError>>;

// ── MockTransport ───────────────────────────────────────────────────

/// A scripted mock transport.
///
/// Scripted server frames are consumed in order by `recv()`; once exhausted
/// the transport stays open until shut down. All frames sent by the client
/// are recorded in `sent`.
pub struct MockTransport {
    incoming: VecDeque<ScriptedFrame>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a mock transport with the given scripted frames, plus shared
    /// handles for inspecting sent frames and whether close was called.
    pub fn new(
        incoming: Vec<ScriptedFrame>,
    ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: String) -> Result<(), RealtimeError> {
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, RealtimeError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            // No more scripted frames — hang forever so the channel stays
            // open until shutdown.
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), RealtimeError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// One scripted dial outcome: `Err` frames a failed dial, `Ok(frames)` a
/// successful one whose transport replays `frames`.
pub type DialOutcome = Result<Vec<ScriptedFrame>, RealtimeError>;

/// A connector replaying scripted dial outcomes in order.
///
/// Records the instant of every dial so tests can reason about reconnect
/// spacing; once the script is exhausted further dials hang forever.
#[derive(Clone)]
pub struct MockConnector {
    outcomes: Arc<StdMutex<VecDeque<DialOutcome>>>,
    pub dial_times: Arc<StdMutex<Vec<Instant>>>,
    pub dials: Arc<AtomicU32>,
    pub sent: Arc<StdMutex<Vec<String>>>,
}

impl MockConnector {
    pub fn new(outcomes: Vec<DialOutcome>) -> Self {
        Self {
            outcomes: Arc::new(StdMutex::new(VecDeque::from(outcomes))),
            dial_times: Arc::new(StdMutex::new(Vec::new())),
            dials: Arc::new(AtomicU32::new(0)),
            sent: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    /// A connector whose every dial succeeds with the same scripted frames.
    pub fn always(frames: Vec<ScriptedFrame>) -> Self {
        // Ten outcomes is far more than any test dials. `RealtimeError` is
        // not `Clone`, so each copy of the script is rebuilt: text frames and
        // clean closes verbatim, errored frames as fresh transport errors.
        let replay = |frames: &[ScriptedFrame]| -> Vec<ScriptedFrame> {
            frames
                .iter()
                .map(|frame| match frame {
                    Some(Ok(text)) => Some(Ok(text.clone())),
                    Some(Err(_)) => Some(Err(RealtimeError::TransportClosed)),
                    None => None,
                })
                .collect()
        };
        Self::new((0..10).map(|_| Ok(replay(&frames))).collect())
    }

    pub fn dial_count(&self) -> u32 {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn sent_frames(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Durations between consecutive dials.
    pub fn dial_gaps(&self) -> Vec<std::time::Duration> {
        let times = self.dial_times.lock().unwrap();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self) -> Result<Self::Transport, RealtimeError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        self.dial_times.lock().unwrap().push(Instant::now());
        let outcome = self.outcomes.lock().unwrap().pop_front();
        match outcome {
            Some(Ok(frames)) => Ok(MockTransport {
                incoming: VecDeque::from(frames),
                sent: Arc::clone(&self.sent),
                closed: Arc::new(AtomicBool::new(false)),
            }),
            Some(Err(e)) => Err(e),
            // Script exhausted — hang the dial forever.
            None => std::future::pending().await,
        }
    }
}

/// Shorthand for a failed dial outcome.
pub fn dial_failure() -> DialOutcome {
    Err(RealtimeError::TransportClosed)
}

// ── JSON helper functions ───────────────────────────────────────────

/// Returns the JSON string for a `notification` frame.
pub fn notification_json(category: &str, message: &str) -> String {
    serde_json::to_string(&ServerEvent::Notification {
        notification: Notification {
            category: category.into(),
            message: message.into(),
            timestamp: "2026-08-24T10:00:00Z".into(),
        },
    })
    .expect("notification_json serialization")
}

/// Returns the JSON string for an `unread_count` frame.
pub fn unread_count_json(count: u64) -> String {
    serde_json::to_string(&ServerEvent::UnreadCount { count })
        .expect("unread_count_json serialization")
}

/// Returns the JSON string for a `dashboard_update` frame carrying a
/// company metric.
pub fn company_metric_json(metric_id: &str, value: &str, trend: f64) -> String {
    serde_json::to_string(&ServerEvent::DashboardUpdate {
        update: DashboardUpdate::CompanyMetric(CompanyMetric {
            metric_id: metric_id.into(),
            value: value.into(),
            trend,
        }),
    })
    .expect("company_metric_json serialization")
}

/// Returns the JSON string for a `dashboard_update` frame carrying an
/// activity-log entry.
pub fn activity_log_json(timestamp: &str) -> String {
    serde_json::to_string(&ServerEvent::DashboardUpdate {
        update: DashboardUpdate::ActivityLog(ActivityLogEntry {
            timestamp: timestamp.into(),
            user: "dana".into(),
            action: "created".into(),
            resource: "invoice #12".into(),
        }),
    })
    .expect("activity_log_json serialization")
}

/// Returns the JSON string for a `system_alert` frame.
pub fn system_alert_json(level: AlertLevel, title: &str) -> String {
    serde_json::to_string(&ServerEvent::SystemAlert {
        alert: SystemAlert {
            level,
            title: title.into(),
            message: "details".into(),
        },
    })
    .expect("system_alert_json serialization")
}

/// Returns the JSON string for a `project_update` frame.
pub fn project_update_json(id: u64, status: Option<&str>, progress: Option<u8>) -> String {
    serde_json::to_string(&ServerEvent::ProjectUpdate {
        update: ProjectUpdate {
            id,
            name: None,
            status: status.map(Into::into),
            progress,
        },
    })
    .expect("project_update_json serialization")
}

/// Returns the JSON string for a `task_update` frame.
pub fn task_update_json(id: u64, status: &str, assignee: &str) -> String {
    serde_json::to_string(&ServerEvent::TaskUpdate {
        update: TaskUpdate {
            id,
            title: None,
            status: Some(status.into()),
            assignee: Some(assignee.into()),
        },
    })
    .expect("task_update_json serialization")
}

/// Returns the JSON string for a `team_update` frame.
pub fn team_update_json(id: u64, member_count: u32) -> String {
    serde_json::to_string(&ServerEvent::TeamUpdate {
        update: TeamUpdate {
            id,
            name: None,
            member_count: Some(member_count),
            members: None,
        },
    })
    .expect("team_update_json serialization")
}

/// Returns the JSON string for a `new_message` chat frame.
pub fn new_message_json(id: u64, content: &str) -> String {
    serde_json::to_string(&ServerEvent::NewMessage {
        message: ChatMessage {
            id: Some(id),
            content: content.into(),
            attachment: None,
            attachment_name: None,
            is_edited: false,
        },
        sender: ChatSender {
            first_name: "Dana".into(),
            last_name: "Reyes".into(),
        },
        timestamp: "2026-08-24T10:00:00Z".into(),
    })
    .expect("new_message_json serialization")
}

/// Returns the JSON string for a `pong` frame.
pub fn pong_json() -> String {
    serde_json::to_string(&ServerEvent::Pong).expect("pong_json serialization")
}
