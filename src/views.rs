//! Data-only view models mutated by channel handlers.
//!
//! The rendering layer is deliberately out of scope: handlers patch these
//! models and the embedding application draws them however it likes. Widgets
//! are registered up front (a metric card, a chart, a project row); an update
//! for an unregistered widget is silently ignored, mirroring a page that
//! simply does not contain that element.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::protocol::{
    ActivityLogEntry, AlertLevel, ChartData, ChatMessage, ChatSender, CompanyMetric, MetricUpdate,
    Notification, ProjectUpdate, SystemAlert, TaskUpdate, TeamMember, TeamUpdate,
};

// ── Notifications ───────────────────────────────────────────────────

/// Unread-count badge state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Badge {
    pub count: u64,
    /// Hidden while the count is zero.
    pub visible: bool,
}

/// Notification dropdown: badge, entry list, optional native notifications.
#[derive(Debug, Default)]
pub struct NotificationPanel {
    badge: Option<Badge>,
    entries: Vec<Notification>,
    native_enabled: bool,
    native_raised: Vec<Notification>,
}

impl NotificationPanel {
    /// A panel whose layout includes the unread badge.
    pub fn new() -> Self {
        Self {
            badge: Some(Badge {
                count: 0,
                visible: false,
            }),
            ..Self::default()
        }
    }

    /// A panel for layouts without a badge; unread-count updates no-op.
    pub fn without_badge() -> Self {
        Self::default()
    }

    /// Opt in to native (OS-level) notifications.
    pub fn enable_native(&mut self, enabled: bool) {
        self.native_enabled = enabled;
    }

    /// Patch the badge with a fresh unread count. The badge hides at zero;
    /// panels without a badge ignore this.
    pub fn set_unread(&mut self, count: u64) {
        if let Some(badge) = self.badge.as_mut() {
            badge.count = count;
            badge.visible = count > 0;
        }
    }

    /// Prepend a notification entry, raising a native notification when
    /// enabled.
    pub fn push(&mut self, notification: Notification) {
        if self.native_enabled {
            self.native_raised.push(notification.clone());
        }
        self.entries.insert(0, notification);
    }

    pub fn badge(&self) -> Option<Badge> {
        self.badge
    }

    /// Entries, newest first.
    pub fn entries(&self) -> &[Notification] {
        &self.entries
    }

    /// Notifications raised natively, in arrival order.
    pub fn native_raised(&self) -> &[Notification] {
        &self.native_raised
    }
}

// ── Owner dashboard ─────────────────────────────────────────────────

/// Direction of a metric's trend indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    /// Sign of the trend percentage selects the indicator.
    pub fn from_pct(pct: f64) -> Self {
        if pct > 0.0 {
            Trend::Up
        } else if pct < 0.0 {
            Trend::Down
        } else {
            Trend::Flat
        }
    }
}

/// One labeled metric card.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricCard {
    pub value: String,
    pub trend: Trend,
    pub trend_pct: f64,
}

/// A dismissible alert banner. Non-`danger` alerts carry an auto-dismiss
/// flag; `danger` alerts stay until dismissed explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
    pub auto_dismiss: bool,
}

/// Maximum retained activity-log entries; the oldest is evicted beyond this.
pub const ACTIVITY_LOG_CAP: usize = 50;

/// Owner-dashboard model: metric cards, charts, activity log, alerts.
#[derive(Debug, Default)]
pub struct OwnerDashboard {
    metrics: HashMap<String, MetricCard>,
    charts: HashMap<String, ChartData>,
    /// Newest first, capped at [`ACTIVITY_LOG_CAP`].
    activity: VecDeque<ActivityLogEntry>,
    alerts: Vec<Alert>,
}

impl OwnerDashboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a metric card present on this page.
    pub fn register_metric(&mut self, id: impl Into<String>) {
        self.metrics.insert(
            id.into(),
            MetricCard {
                value: String::new(),
                trend: Trend::Flat,
                trend_pct: 0.0,
            },
        );
    }

    /// Register a chart present on this page with its initial series.
    pub fn register_chart(&mut self, id: impl Into<String>, initial: ChartData) {
        self.charts.insert(id.into(), initial);
    }

    /// Patch a registered metric card; unregistered ids are ignored.
    pub fn apply_metric(&mut self, update: &CompanyMetric) {
        if let Some(card) = self.metrics.get_mut(&update.metric_id) {
            card.value = update.value.clone();
            card.trend = Trend::from_pct(update.trend);
            card.trend_pct = update.trend;
        }
    }

    /// Replace a registered chart's series; unregistered ids are ignored.
    pub fn apply_chart(&mut self, update: &MetricUpdate) {
        if let Some(chart) = self.charts.get_mut(&update.id) {
            *chart = update.data.clone();
        }
    }

    /// Prepend an activity-log entry, evicting the oldest past the cap.
    pub fn push_activity(&mut self, entry: ActivityLogEntry) {
        self.activity.push_front(entry);
        while self.activity.len() > ACTIVITY_LOG_CAP {
            self.activity.pop_back();
        }
    }

    /// Add an alert banner. Auto-dismiss applies to every level but `danger`.
    pub fn push_alert(&mut self, alert: SystemAlert) {
        self.alerts.push(Alert {
            auto_dismiss: alert.level != AlertLevel::Danger,
            level: alert.level,
            title: alert.title,
            message: alert.message,
        });
    }

    /// Dismiss the alert at `index`. Returns `false` when out of range.
    pub fn dismiss_alert(&mut self, index: usize) -> bool {
        if index < self.alerts.len() {
            self.alerts.remove(index);
            true
        } else {
            false
        }
    }

    /// Drop every alert flagged for auto-dismissal (the embedding app calls
    /// this when the dismiss timer fires).
    pub fn prune_auto_dismissed(&mut self) {
        self.alerts.retain(|alert| !alert.auto_dismiss);
    }

    pub fn metric(&self, id: &str) -> Option<&MetricCard> {
        self.metrics.get(id)
    }

    pub fn chart(&self, id: &str) -> Option<&ChartData> {
        self.charts.get(id)
    }

    /// Activity log, newest first.
    pub fn activity(&self) -> impl Iterator<Item = &ActivityLogEntry> {
        self.activity.iter()
    }

    pub fn activity_len(&self) -> usize {
        self.activity.len()
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }
}

// ── Projects and tasks ──────────────────────────────────────────────

/// One project row.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectCard {
    pub name: String,
    pub status: String,
    /// Completion percentage (0–100).
    pub progress: u8,
}

/// One task row.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRow {
    pub title: String,
    pub status: String,
    pub assignee: String,
}

/// Project-page model: project rows and task rows patched in place.
#[derive(Debug, Default)]
pub struct ProjectBoard {
    projects: HashMap<u64, ProjectCard>,
    tasks: HashMap<u64, TaskRow>,
}

impl ProjectBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_project(&mut self, id: u64, card: ProjectCard) {
        self.projects.insert(id, card);
    }

    pub fn register_task(&mut self, id: u64, row: TaskRow) {
        self.tasks.insert(id, row);
    }

    /// Patch the fields present in the update; absent fields and unknown ids
    /// are left untouched.
    pub fn apply_project(&mut self, update: &ProjectUpdate) {
        if let Some(card) = self.projects.get_mut(&update.id) {
            if let Some(name) = &update.name {
                card.name = name.clone();
            }
            if let Some(status) = &update.status {
                card.status = status.clone();
            }
            if let Some(progress) = update.progress {
                card.progress = progress;
            }
        }
    }

    /// Patch the fields present in the update; absent fields and unknown ids
    /// are left untouched.
    pub fn apply_task(&mut self, update: &TaskUpdate) {
        if let Some(row) = self.tasks.get_mut(&update.id) {
            if let Some(title) = &update.title {
                row.title = title.clone();
            }
            if let Some(status) = &update.status {
                row.status = status.clone();
            }
            if let Some(assignee) = &update.assignee {
                row.assignee = assignee.clone();
            }
        }
    }

    pub fn project(&self, id: u64) -> Option<&ProjectCard> {
        self.projects.get(&id)
    }

    pub fn task(&self, id: u64) -> Option<&TaskRow> {
        self.tasks.get(&id)
    }
}

// ── Teams ───────────────────────────────────────────────────────────

/// One team card with its rendered member list.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamCard {
    pub name: String,
    pub member_count: u32,
    pub members: Vec<TeamMember>,
}

/// Team-page model.
#[derive(Debug, Default)]
pub struct TeamPanel {
    teams: HashMap<u64, TeamCard>,
}

impl TeamPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_team(&mut self, id: u64, card: TeamCard) {
        self.teams.insert(id, card);
    }

    /// Patch name and member count in place; a present member list replaces
    /// the rendered list wholesale. Unknown ids are ignored.
    pub fn apply(&mut self, update: &TeamUpdate) {
        if let Some(card) = self.teams.get_mut(&update.id) {
            if let Some(name) = &update.name {
                card.name = name.clone();
            }
            if let Some(count) = update.member_count {
                card.member_count = count;
            }
            if let Some(members) = &update.members {
                card.members = members.clone();
            }
        }
    }

    pub fn team(&self, id: u64) -> Option<&TeamCard> {
        self.teams.get(&id)
    }
}

// ── Chat ────────────────────────────────────────────────────────────

/// One rendered chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub message: ChatMessage,
    pub sender: ChatSender,
    pub timestamp: String,
}

/// Chat message list with duplicate suppression.
///
/// Messages arrive over the socket and over the polling fallback, sometimes
/// both; the id set guarantees each server-assigned id renders exactly once,
/// in first-seen order. Messages without an id are rendered unconditionally.
#[derive(Debug, Default)]
pub struct ChatLog {
    messages: Vec<RenderedMessage>,
    seen: HashSet<u64>,
    last_id: u64,
    banner: Option<String>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message unless its id has been rendered before. Returns
    /// whether the message was appended.
    pub fn push(&mut self, message: ChatMessage, sender: ChatSender, timestamp: String) -> bool {
        if let Some(id) = message.id {
            if !self.seen.insert(id) {
                return false;
            }
            self.last_id = self.last_id.max(id);
        }
        self.messages.push(RenderedMessage {
            message,
            sender,
            timestamp,
        });
        true
    }

    /// Highest rendered message id; the polling fallback resumes from here.
    pub fn last_message_id(&self) -> u64 {
        self.last_id
    }

    /// Messages in first-seen order.
    pub fn messages(&self) -> &[RenderedMessage] {
        &self.messages
    }

    /// Show a connection-status banner (e.g. "Reconnecting…").
    pub fn set_banner(&mut self, text: impl Into<String>) {
        self.banner = Some(text.into());
    }

    /// Clear the connection-status banner.
    pub fn clear_banner(&mut self) {
        self.banner = None;
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }
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

    fn notification(message: &str) -> Notification {
        Notification {
            category: "timesheet".into(),
            message: message.into(),
            timestamp: "2026-08-24T10:00:00Z".into(),
        }
    }

    fn chat_message(id: Option<u64>, content: &str) -> ChatMessage {
        ChatMessage {
            id,
            content: content.into(),
            attachment: None,
            attachment_name: None,
            is_edited: false,
        }
    }

    fn chat_sender() -> ChatSender {
        ChatSender {
            first_name: "Dana".into(),
            last_name: "Reyes".into(),
        }
    }

    #[test]
    fn badge_hides_at_zero_and_shows_above() {
        let mut panel = NotificationPanel::new();

        panel.set_unread(5);
        assert_eq!(
            panel.badge(),
            Some(Badge {
                count: 5,
                visible: true
            })
        );

        panel.set_unread(0);
        assert_eq!(
            panel.badge(),
            Some(Badge {
                count: 0,
                visible: false
            })
        );
    }

    #[test]
    fn badgeless_panel_ignores_unread_updates() {
        let mut panel = NotificationPanel::without_badge();
        panel.set_unread(7);
        assert_eq!(panel.badge(), None);
    }

    #[test]
    fn notifications_prepend_newest_first() {
        let mut panel = NotificationPanel::new();
        panel.push(notification("first"));
        panel.push(notification("second"));

        let messages: Vec<_> = panel.entries().iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, vec!["second", "first"]);
    }

    #[test]
    fn native_notifications_only_when_enabled() {
        let mut panel = NotificationPanel::new();
        panel.push(notification("silent"));
        assert!(panel.native_raised().is_empty());

        panel.enable_native(true);
        panel.push(notification("loud"));
        assert_eq!(panel.native_raised().len(), 1);
    }

    #[test]
    fn trend_indicator_is_three_way() {
        assert_eq!(Trend::from_pct(3.2), Trend::Up);
        assert_eq!(Trend::from_pct(-0.1), Trend::Down);
        assert_eq!(Trend::from_pct(0.0), Trend::Flat);
    }

    #[test]
    fn metric_update_for_unregistered_card_is_ignored() {
        let mut dashboard = OwnerDashboard::new();
        dashboard.register_metric("revenue");

        dashboard.apply_metric(&CompanyMetric {
            metric_id: "headcount".into(),
            value: "12".into(),
            trend: 1.0,
        });

        assert_eq!(dashboard.metric("headcount"), None);
        assert_eq!(dashboard.metric("revenue").unwrap().value, "");
    }

    #[test]
    fn metric_update_patches_registered_card() {
        let mut dashboard = OwnerDashboard::new();
        dashboard.register_metric("revenue");

        dashboard.apply_metric(&CompanyMetric {
            metric_id: "revenue".into(),
            value: "$48k".into(),
            trend: -2.5,
        });

        let card = dashboard.metric("revenue").unwrap();
        assert_eq!(card.value, "$48k");
        assert_eq!(card.trend, Trend::Down);
    }

    #[test]
    fn activity_log_caps_at_fifty_evicting_oldest() {
        let mut dashboard = OwnerDashboard::new();
        for i in 0..51 {
            dashboard.push_activity(ActivityLogEntry {
                timestamp: format!("t{i}"),
                user: "u".into(),
                action: "a".into(),
                resource: "r".into(),
            });
        }

        assert_eq!(dashboard.activity_len(), 50);
        let timestamps: Vec<_> = dashboard.activity().map(|e| e.timestamp.as_str()).collect();
        // Newest first; the very first entry (t0) was evicted.
        assert_eq!(timestamps.first(), Some(&"t50"));
        assert_eq!(timestamps.last(), Some(&"t1"));
    }

    #[test]
    fn danger_alerts_are_not_auto_dismissed() {
        let mut dashboard = OwnerDashboard::new();
        dashboard.push_alert(SystemAlert {
            level: AlertLevel::Info,
            title: "Heads up".into(),
            message: "m".into(),
        });
        dashboard.push_alert(SystemAlert {
            level: AlertLevel::Danger,
            title: "Outage".into(),
            message: "m".into(),
        });

        dashboard.prune_auto_dismissed();
        assert_eq!(dashboard.alerts().len(), 1);
        assert_eq!(dashboard.alerts()[0].title, "Outage");
        assert!(!dashboard.alerts()[0].auto_dismiss);
    }

    #[test]
    fn dismiss_alert_out_of_range_is_false() {
        let mut dashboard = OwnerDashboard::new();
        assert!(!dashboard.dismiss_alert(0));
    }

    #[test]
    fn project_patch_touches_only_present_fields() {
        let mut board = ProjectBoard::new();
        board.register_project(
            7,
            ProjectCard {
                name: "Redesign".into(),
                status: "active".into(),
                progress: 20,
            },
        );

        board.apply_project(&ProjectUpdate {
            id: 7,
            name: None,
            status: Some("on_hold".into()),
            progress: Some(35),
        });

        let card = board.project(7).unwrap();
        assert_eq!(card.name, "Redesign");
        assert_eq!(card.status, "on_hold");
        assert_eq!(card.progress, 35);
    }

    #[test]
    fn unknown_project_and_task_ids_are_ignored() {
        let mut board = ProjectBoard::new();
        board.apply_project(&ProjectUpdate {
            id: 99,
            name: Some("ghost".into()),
            status: None,
            progress: None,
        });
        board.apply_task(&TaskUpdate {
            id: 99,
            title: Some("ghost".into()),
            status: None,
            assignee: None,
        });
        assert_eq!(board.project(99), None);
        assert_eq!(board.task(99), None);
    }

    #[test]
    fn team_member_list_is_replaced_wholesale() {
        let mut panel = TeamPanel::new();
        panel.register_team(
            3,
            TeamCard {
                name: "Ops".into(),
                member_count: 2,
                members: vec![
                    TeamMember {
                        name: "A".into(),
                        role: "lead".into(),
                        avatar: None,
                    },
                    TeamMember {
                        name: "B".into(),
                        role: "member".into(),
                        avatar: None,
                    },
                ],
            },
        );

        panel.apply(&TeamUpdate {
            id: 3,
            name: None,
            member_count: Some(1),
            members: Some(vec![TeamMember {
                name: "C".into(),
                role: "lead".into(),
                avatar: None,
            }]),
        });

        let card = panel.team(3).unwrap();
        assert_eq!(card.name, "Ops");
        assert_eq!(card.member_count, 1);
        assert_eq!(card.members.len(), 1);
        assert_eq!(card.members[0].name, "C");
    }

    #[test]
    fn chat_log_suppresses_duplicate_ids_in_first_seen_order() {
        let mut log = ChatLog::new();
        for id in [1u64, 2, 2, 3] {
            log.push(
                chat_message(Some(id), &format!("msg {id}")),
                chat_sender(),
                "t".into(),
            );
        }

        let ids: Vec<_> = log.messages().iter().filter_map(|m| m.message.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(log.last_message_id(), 3);
    }

    #[test]
    fn chat_messages_without_id_always_render() {
        let mut log = ChatLog::new();
        assert!(log.push(chat_message(None, "a"), chat_sender(), "t".into()));
        assert!(log.push(chat_message(None, "a"), chat_sender(), "t".into()));
        assert_eq!(log.messages().len(), 2);
        assert_eq!(log.last_message_id(), 0);
    }

    #[test]
    fn banner_set_and_clear() {
        let mut log = ChatLog::new();
        log.set_banner("Reconnecting (attempt 2)");
        assert_eq!(log.banner(), Some("Reconnecting (attempt 2)"));
        log.clear_banner();
        assert_eq!(log.banner(), None);
    }
}
