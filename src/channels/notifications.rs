//! The per-session notifications channel.
//!
//! On every open (including reconnects) the channel requests a fresh unread
//! count. Incoming notifications are prepended to the panel and trigger a
//! re-request of the count, so the badge never drifts from the server.

use std::sync::{Arc, Mutex};

use crate::dispatch::Handlers;
use crate::protocol::{ClientMessage, EventKind, ServerEvent};
use crate::views::NotificationPanel;

/// Registry name of the notifications channel.
pub const NAME: &str = "notifications";

/// Handler set updating `panel`.
pub fn handlers(panel: Arc<Mutex<NotificationPanel>>) -> Handlers {
    let notification_panel = Arc::clone(&panel);
    let count_panel = panel;

    Handlers::new()
        .on_open(|sender| {
            sender.send(ClientMessage::FetchUnreadCount);
        })
        .on(EventKind::Notification, move |event, sender| {
            if let ServerEvent::Notification { notification } = event {
                if let Ok(mut panel) = notification_panel.lock() {
                    panel.push(notification.clone());
                }
                // The server recomputes the unread count server-side.
                sender.send(ClientMessage::FetchUnreadCount);
            }
        })
        .on(EventKind::UnreadCount, move |event, _| {
            if let ServerEvent::UnreadCount { count } = event {
                if let Ok(mut panel) = count_panel.lock() {
                    panel.set_unread(*count);
                }
            }
        })
}

/// Connect the notifications channel, unless the page is served from a
/// development host. Returns whether a connection was registered.
#[cfg(feature = "transport-websocket")]
pub fn connect(
    registry: &mut crate::registry::ChannelRegistry,
    origin: &crate::endpoint::PageOrigin,
    panel: Arc<Mutex<NotificationPanel>>,
) -> bool {
    use crate::endpoint::paths;
    use crate::transports::WebSocketConnector;

    if origin.is_development_host() {
        tracing::info!(host = %origin.host(), "development host, skipping notifications channel");
        return false;
    }

    let connector = WebSocketConnector::new(origin.channel_url(paths::NOTIFICATIONS));
    registry.connect(NAME, connector, handlers(panel));
    true
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
    use crate::dispatch::{ChannelSender, Dispatcher};
    use tokio::sync::mpsc;

    fn dispatcher(panel: &Arc<Mutex<NotificationPanel>>) -> Dispatcher {
        Dispatcher::new(NAME, handlers(Arc::clone(panel)))
    }

    fn sender() -> (ChannelSender, mpsc::UnboundedReceiver<ClientMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelSender::new(tx), rx)
    }

    #[test]
    fn open_requests_unread_count() {
        let panel = Arc::new(Mutex::new(NotificationPanel::new()));
        let mut dispatcher = dispatcher(&panel);
        let (tx, mut rx) = sender();

        dispatcher.open(&tx);
        assert_eq!(rx.try_recv().unwrap(), ClientMessage::FetchUnreadCount);
    }

    #[test]
    fn notification_prepends_entry_and_rerequests_count() {
        let panel = Arc::new(Mutex::new(NotificationPanel::new()));
        let mut dispatcher = dispatcher(&panel);
        let (tx, mut rx) = sender();

        let raw = r#"{"type":"notification","notification":
            {"type":"leave","message":"Leave approved","timestamp":"t"}}"#;
        dispatcher.dispatch(raw, &tx);

        assert_eq!(panel.lock().unwrap().entries().len(), 1);
        assert_eq!(rx.try_recv().unwrap(), ClientMessage::FetchUnreadCount);
    }

    #[test]
    fn unread_count_patches_badge() {
        let panel = Arc::new(Mutex::new(NotificationPanel::new()));
        let mut dispatcher = dispatcher(&panel);
        let (tx, _rx) = sender();

        dispatcher.dispatch(r#"{"type":"unread_count","count":5}"#, &tx);
        let badge = panel.lock().unwrap().badge().unwrap();
        assert_eq!(badge.count, 5);
        assert!(badge.visible);

        dispatcher.dispatch(r#"{"type":"unread_count","count":0}"#, &tx);
        let badge = panel.lock().unwrap().badge().unwrap();
        assert!(!badge.visible);
    }

    #[cfg(feature = "transport-websocket")]
    #[tokio::test]
    async fn development_host_skips_connection() {
        use crate::endpoint::PageOrigin;
        use crate::registry::ChannelRegistry;

        let mut registry = ChannelRegistry::new();
        let panel = Arc::new(Mutex::new(NotificationPanel::new()));
        let origin = PageOrigin::new("localhost:8000", false);

        assert!(!connect(&mut registry, &origin, panel));
        assert!(registry.is_empty());
    }
}
