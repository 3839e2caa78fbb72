//! Page bootstrap: which channels a page opens.
//!
//! The hosting page describes itself as plain data — origin, body classes,
//! and the id markers it carries — and [`bootstrap`] opens the matching
//! channels: notifications on every authenticated page, the owner dashboard
//! on owner-dashboard pages, project/team channels when their ids are
//! present, and chat on chat pages (socket when a room id exists, polling
//! otherwise).

use crate::endpoint::PageOrigin;

/// What the hosting page knows about itself.
#[derive(Debug, Clone)]
pub struct PageContext {
    pub origin: PageOrigin,
    /// CSS classes of the page body; drives page-type detection.
    pub body_classes: Vec<String>,
    /// Present on project pages.
    pub project_id: Option<u64>,
    /// Present on team pages.
    pub team_id: Option<u64>,
    /// Present on chat pages that have an active room.
    pub chat_room_id: Option<String>,
    /// Path of the chat page itself, which doubles as the polling endpoint.
    /// Present only on chat pages.
    pub chat_page_path: Option<String>,
}

impl PageContext {
    /// A minimal context for the given origin; marker fields start empty.
    pub fn new(origin: PageOrigin) -> Self {
        Self {
            origin,
            body_classes: Vec::new(),
            project_id: None,
            team_id: None,
            chat_room_id: None,
            chat_page_path: None,
        }
    }

    fn has_class(&self, class: &str) -> bool {
        self.body_classes.iter().any(|c| c == class)
    }

    /// Unauthenticated pages get no realtime channels at all.
    pub fn is_unauthenticated(&self) -> bool {
        self.has_class("login-page") || self.has_class("register-page")
    }

    /// Whether this page shows the owner dashboard.
    pub fn is_owner_dashboard(&self) -> bool {
        self.has_class("owner-dashboard")
    }
}

#[cfg(all(feature = "transport-websocket", feature = "polling-http"))]
pub use bootstrap_impl::{bootstrap, Page};

#[cfg(all(feature = "transport-websocket", feature = "polling-http"))]
mod bootstrap_impl {
    use std::sync::{Arc, Mutex};

    use super::PageContext;
    use crate::channels;
    use crate::chat::{ChatChannel, ChatConfig};
    use crate::registry::ChannelRegistry;
    use crate::views::{ChatLog, NotificationPanel, OwnerDashboard, ProjectBoard, TeamPanel};

    /// Everything [`bootstrap`] wires up for one page. The embedding
    /// application keeps this alive for the page's lifetime and reads the
    /// view models from it.
    #[derive(Debug)]
    pub struct Page {
        pub registry: ChannelRegistry,
        pub notifications: Arc<Mutex<NotificationPanel>>,
        pub dashboard: Option<Arc<Mutex<OwnerDashboard>>>,
        pub projects: Option<Arc<Mutex<ProjectBoard>>>,
        pub teams: Option<Arc<Mutex<TeamPanel>>>,
        pub chat: Option<ChatChannel>,
    }

    impl Page {
        /// Tear down every channel this page opened.
        pub fn shutdown(mut self) {
            self.registry.disconnect_all();
            if let Some(chat) = self.chat.take() {
                chat.shutdown();
            }
        }
    }

    /// Open the channels this page calls for and return their view models.
    pub fn bootstrap(ctx: &PageContext) -> Page {
        let mut registry = ChannelRegistry::new();
        let notifications = Arc::new(Mutex::new(NotificationPanel::new()));
        let mut dashboard = None;
        let mut projects = None;
        let mut teams = None;
        let mut chat = None;

        if ctx.is_unauthenticated() {
            tracing::debug!("unauthenticated page, no realtime channels");
            return Page {
                registry,
                notifications,
                dashboard,
                projects,
                teams,
                chat,
            };
        }

        channels::notifications::connect(
            &mut registry,
            &ctx.origin,
            Arc::clone(&notifications),
        );

        if ctx.is_owner_dashboard() {
            let view = Arc::new(Mutex::new(OwnerDashboard::new()));
            channels::dashboard::connect(&mut registry, &ctx.origin, Arc::clone(&view));
            dashboard = Some(view);
        }

        if let Some(project_id) = ctx.project_id {
            let board = Arc::new(Mutex::new(ProjectBoard::new()));
            channels::project::connect(&mut registry, &ctx.origin, project_id, Arc::clone(&board));
            projects = Some(board);
        }

        if let Some(team_id) = ctx.team_id {
            let panel = Arc::new(Mutex::new(TeamPanel::new()));
            channels::team::connect(&mut registry, &ctx.origin, team_id, Arc::clone(&panel));
            teams = Some(panel);
        }

        if let Some(page_path) = &ctx.chat_page_path {
            let log = Arc::new(Mutex::new(ChatLog::new()));
            chat = Some(ChatChannel::start(
                &ctx.origin,
                ctx.chat_room_id.as_deref(),
                page_path,
                log,
                ChatConfig::default(),
            ));
        }

        Page {
            registry,
            notifications,
            dashboard,
            projects,
            teams,
            chat,
        }
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

    fn ctx(host: &str) -> PageContext {
        PageContext::new(PageOrigin::new(host, false))
    }

    #[test]
    fn login_and_register_pages_are_unauthenticated() {
        let mut page = ctx("app.example.com");
        page.body_classes = vec!["login-page".into()];
        assert!(page.is_unauthenticated());

        page.body_classes = vec!["register-page".into()];
        assert!(page.is_unauthenticated());

        page.body_classes = vec!["owner-dashboard".into()];
        assert!(!page.is_unauthenticated());
        assert!(page.is_owner_dashboard());
    }

    #[cfg(all(feature = "transport-websocket", feature = "polling-http"))]
    mod bootstrap_tests {
        use super::*;
        use crate::page::bootstrap;

        #[tokio::test]
        async fn unauthenticated_pages_open_no_channels() {
            let mut context = ctx("app.example.com");
            context.body_classes = vec!["login-page".into()];

            let page = bootstrap(&context);
            assert!(page.registry.is_empty());
            assert!(page.chat.is_none());
            page.shutdown();
        }

        #[tokio::test]
        async fn development_host_skips_global_channels_but_not_project() {
            let mut context = ctx("localhost:8000");
            context.body_classes = vec!["owner-dashboard".into()];
            context.project_id = Some(42);

            let page = bootstrap(&context);
            // Notifications and dashboard are gated; the project channel
            // connects regardless of host.
            let names: Vec<_> = page.registry.names().map(String::from).collect();
            assert_eq!(names, vec!["project_42".to_string()]);
            assert!(page.projects.is_some());
            assert!(page.dashboard.is_some());
            page.shutdown();
        }

        #[tokio::test]
        async fn chat_page_without_room_polls_only() {
            let mut context = ctx("localhost:8000");
            context.chat_page_path = Some("/employee/chat/".into());

            let page = bootstrap(&context);
            let chat = page.chat.as_ref().unwrap();
            assert!(chat.is_polling());
            page.shutdown();
        }

        #[tokio::test]
        async fn team_page_opens_its_team_channel() {
            let mut context = ctx("localhost:8000");
            context.team_id = Some(7);

            let page = bootstrap(&context);
            assert!(page.registry.get("team_7").is_some());
            assert!(page.teams.is_some());
            page.shutdown();
        }
    }
}
