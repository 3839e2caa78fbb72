//! Endpoint URL construction and environment gating.
//!
//! Channel URLs mirror the hosting page's scheme: a page served over TLS
//! talks `wss://`, a plain page talks `ws://`. The polling fallback uses the
//! matching `https://`/`http://` scheme.

/// The origin of the hosting page: host (with optional port) plus whether it
/// was served encrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOrigin {
    host: String,
    secure: bool,
}

impl PageOrigin {
    /// Create an origin from a `host[:port]` string and the page's scheme.
    pub fn new(host: impl Into<String>, secure: bool) -> Self {
        Self {
            host: host.into(),
            secure,
        }
    }

    /// The host (with port, if any).
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Whether the page was served over an encrypted scheme.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Build the socket URL for a channel path:
    /// `{ws|wss}://{host}{path}`.
    pub fn channel_url(&self, path: &str) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}{path}", self.host)
    }

    /// Build the HTTP URL for a path, used by the polling fallback.
    pub fn http_url(&self, path: &str) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}{path}", self.host)
    }

    /// True when the page is served from a local development host.
    ///
    /// The notifications and owner-dashboard channels are skipped on these
    /// hosts because the backing pub/sub transport is assumed unavailable.
    pub fn is_development_host(&self) -> bool {
        let hostname = self.host.split(':').next().unwrap_or(&self.host);
        hostname == "localhost" || hostname == "127.0.0.1"
    }
}

/// Known channel paths, parameterized where the endpoint is keyed by an id.
pub mod paths {
    /// Global per-session notifications channel.
    pub const NOTIFICATIONS: &str = "/ws/notifications/";

    /// Global owner-dashboard channel.
    pub const OWNER_DASHBOARD: &str = "/ws/dashboard/owner/";

    /// Per-project channel.
    pub fn project(project_id: u64) -> String {
        format!("/ws/projects/{project_id}/")
    }

    /// Per-team channel.
    pub fn team(team_id: u64) -> String {
        format!("/ws/teams/{team_id}/")
    }

    /// Per-chat-room channel.
    pub fn chat_room(room_id: &str) -> String {
        format!("/ws/chat/room/{room_id}/")
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

    #[test]
    fn channel_url_mirrors_page_scheme() {
        let plain = PageOrigin::new("app.example.com", false);
        assert_eq!(
            plain.channel_url(paths::NOTIFICATIONS),
            "ws://app.example.com/ws/notifications/"
        );

        let secure = PageOrigin::new("app.example.com", true);
        assert_eq!(
            secure.channel_url(paths::NOTIFICATIONS),
            "wss://app.example.com/ws/notifications/"
        );
    }

    #[test]
    fn http_url_mirrors_page_scheme() {
        let secure = PageOrigin::new("app.example.com:8443", true);
        assert_eq!(
            secure.http_url("/employee/chat/7/"),
            "https://app.example.com:8443/employee/chat/7/"
        );
    }

    #[test]
    fn parameterized_paths() {
        assert_eq!(paths::project(42), "/ws/projects/42/");
        assert_eq!(paths::team(7), "/ws/teams/7/");
        assert_eq!(paths::chat_room("dev-room"), "/ws/chat/room/dev-room/");
    }

    #[test]
    fn development_host_detection_ignores_port() {
        assert!(PageOrigin::new("localhost", false).is_development_host());
        assert!(PageOrigin::new("localhost:8000", false).is_development_host());
        assert!(PageOrigin::new("127.0.0.1:8000", false).is_development_host());
        assert!(!PageOrigin::new("app.example.com", true).is_development_host());
        // A subdomain that merely contains "localhost" is not local.
        assert!(!PageOrigin::new("localhost.example.com", true).is_development_host());
    }
}
