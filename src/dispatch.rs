//! Inbound frame parsing and handler dispatch.
//!
//! Every inbound frame is parsed as JSON into a
//! [`ServerEvent`](crate::protocol::ServerEvent). Frames that fail to parse —
//! not JSON, missing `type`, unknown `type` — are logged and dropped; this is
//! the lenient-parsing policy, never an error path.
//!
//! Dispatch is dual: the generic handler (if registered) runs first, then the
//! handler registered for the event's [`EventKind`]. Both see the same parsed
//! event. Handler registration is a lookup table over the closed `EventKind`
//! set, so an unhandled event type is a visible gap at the registration site
//! rather than a silent runtime no-op.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::protocol::{ClientMessage, EventKind, ServerEvent};

/// Outbound handle given to handlers so they can queue control frames on
/// their own channel (e.g. re-requesting the unread count after rendering a
/// notification).
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<ClientMessage>,
}

impl ChannelSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ClientMessage>) -> Self {
        Self { tx }
    }

    /// Queue a control frame for transmission. Returns `false` when the
    /// channel task has already exited; best-effort by design.
    pub fn send(&self, msg: ClientMessage) -> bool {
        self.tx.send(msg).is_ok()
    }
}

/// A handler for parsed inbound events.
pub type EventHandler = Box<dyn FnMut(&ServerEvent, &ChannelSender) + Send>;

/// A handler invoked on every successful open (including reconnects).
pub type OpenHandler = Box<dyn FnMut(&ChannelSender) + Send>;

/// The handler set for one channel.
///
/// Built by the channel factories in [`channels`](crate::channels); custom
/// channels can assemble their own.
///
/// # Example
///
/// ```
/// use pulseboard_client::dispatch::Handlers;
/// use pulseboard_client::protocol::{ClientMessage, EventKind};
///
/// let handlers = Handlers::new()
///     .on_open(|sender| {
///         sender.send(ClientMessage::FetchUnreadCount);
///     })
///     .on(EventKind::UnreadCount, |event, _sender| {
///         println!("unread count event: {event:?}");
///     });
/// # let _ = handlers;
/// ```
#[derive(Default)]
pub struct Handlers {
    on_open: Option<OpenHandler>,
    on_event: Option<EventHandler>,
    typed: HashMap<EventKind, EventHandler>,
}

impl Handlers {
    /// An empty handler set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler invoked on every successful open.
    #[must_use]
    pub fn on_open(mut self, f: impl FnMut(&ChannelSender) + Send + 'static) -> Self {
        self.on_open = Some(Box::new(f));
        self
    }

    /// Register the generic handler, invoked for every parsed event before
    /// any typed handler.
    #[must_use]
    pub fn on_event(mut self, f: impl FnMut(&ServerEvent, &ChannelSender) + Send + 'static) -> Self {
        self.on_event = Some(Box::new(f));
        self
    }

    /// Register a typed handler for one event kind. A later registration for
    /// the same kind replaces the earlier one.
    #[must_use]
    pub fn on(
        mut self,
        kind: EventKind,
        f: impl FnMut(&ServerEvent, &ChannelSender) + Send + 'static,
    ) -> Self {
        self.typed.insert(kind, Box::new(f));
        self
    }
}

impl std::fmt::Debug for Handlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handlers")
            .field("has_on_open", &self.on_open.is_some())
            .field("has_on_event", &self.on_event.is_some())
            .field("typed", &self.typed.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Parses raw frames and routes them through a [`Handlers`] set.
pub struct Dispatcher {
    channel: String,
    handlers: Handlers,
}

impl Dispatcher {
    /// Create a dispatcher for the named channel.
    pub fn new(channel: impl Into<String>, handlers: Handlers) -> Self {
        Self {
            channel: channel.into(),
            handlers,
        }
    }

    /// Invoke the open handler, if registered.
    pub fn open(&mut self, sender: &ChannelSender) {
        if let Some(on_open) = self.handlers.on_open.as_mut() {
            on_open(sender);
        }
    }

    /// Parse one raw frame and dispatch it.
    ///
    /// Returns the event kind that was dispatched, or `None` when the frame
    /// was dropped as malformed. Never panics, never propagates an error.
    pub fn dispatch(&mut self, raw: &str, sender: &ChannelSender) -> Option<EventKind> {
        let event = match serde_json::from_str::<ServerEvent>(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(channel = %self.channel, error = %e, "dropping malformed frame");
                return None;
            }
        };

        let kind = event.kind();
        debug!(channel = %self.channel, ?kind, "dispatching frame");

        // Generic handler first, typed handler second; both see the same
        // parsed event.
        if let Some(on_event) = self.handlers.on_event.as_mut() {
            on_event(&event, sender);
        }
        if let Some(typed) = self.handlers.typed.get_mut(&kind) {
            typed(&event, sender);
        }

        Some(kind)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("channel", &self.channel)
            .field("handlers", &self.handlers)
            .finish()
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
    use std::sync::{Arc, Mutex};

    fn sender() -> (ChannelSender, mpsc::UnboundedReceiver<ClientMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelSender::new(tx), rx)
    }

    #[test]
    fn generic_handler_runs_before_typed_handler() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let generic_order = Arc::clone(&order);
        let typed_order = Arc::clone(&order);

        let handlers = Handlers::new()
            .on_event(move |event, _| {
                generic_order
                    .lock()
                    .unwrap()
                    .push(("generic", event.clone()));
            })
            .on(EventKind::UnreadCount, move |event, _| {
                typed_order.lock().unwrap().push(("typed", event.clone()));
            });

        let mut dispatcher = Dispatcher::new("notifications", handlers);
        let (tx, _rx) = sender();

        let kind = dispatcher.dispatch(r#"{"type":"unread_count","count":3}"#, &tx);
        assert_eq!(kind, Some(EventKind::UnreadCount));

        let calls = order.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "generic");
        assert_eq!(calls[1].0, "typed");
        // Both handlers saw the same parsed payload.
        assert_eq!(calls[0].1, calls[1].1);
    }

    #[test]
    fn malformed_frames_invoke_no_handler() {
        let called = Arc::new(Mutex::new(0u32));
        let generic_called = Arc::clone(&called);
        let typed_called = Arc::clone(&called);

        let handlers = Handlers::new()
            .on_event(move |_, _| *generic_called.lock().unwrap() += 1)
            .on(EventKind::Pong, move |_, _| {
                *typed_called.lock().unwrap() += 1
            });

        let mut dispatcher = Dispatcher::new("test", handlers);
        let (tx, _rx) = sender();

        assert_eq!(dispatcher.dispatch("not json", &tx), None);
        assert_eq!(dispatcher.dispatch(r#"{"count":5}"#, &tx), None);
        assert_eq!(dispatcher.dispatch(r#"{"type":"mystery"}"#, &tx), None);
        assert_eq!(*called.lock().unwrap(), 0);
    }

    #[test]
    fn typed_handler_without_generic() {
        let seen = Arc::new(Mutex::new(None));
        let seen_in = Arc::clone(&seen);

        let handlers = Handlers::new().on(EventKind::Pong, move |event, _| {
            *seen_in.lock().unwrap() = Some(event.clone());
        });

        let mut dispatcher = Dispatcher::new("chat", handlers);
        let (tx, _rx) = sender();

        dispatcher.dispatch(r#"{"type":"pong"}"#, &tx);
        assert_eq!(*seen.lock().unwrap(), Some(ServerEvent::Pong));
    }

    #[test]
    fn unregistered_kind_dispatches_generic_only() {
        let count = Arc::new(Mutex::new(0u32));
        let count_in = Arc::clone(&count);

        let handlers = Handlers::new().on_event(move |_, _| *count_in.lock().unwrap() += 1);
        let mut dispatcher = Dispatcher::new("test", handlers);
        let (tx, _rx) = sender();

        let kind = dispatcher.dispatch(r#"{"type":"pong"}"#, &tx);
        assert_eq!(kind, Some(EventKind::Pong));
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn open_handler_can_queue_control_frames() {
        let handlers = Handlers::new().on_open(|sender| {
            assert!(sender.send(ClientMessage::FetchUnreadCount));
        });

        let mut dispatcher = Dispatcher::new("notifications", handlers);
        let (tx, mut rx) = sender();

        dispatcher.open(&tx);
        assert_eq!(rx.try_recv().unwrap(), ClientMessage::FetchUnreadCount);
    }

    #[test]
    fn handler_can_send_from_event_callback() {
        let handlers = Handlers::new().on(EventKind::Notification, |_, sender| {
            // Rendering a notification re-requests the unread count.
            sender.send(ClientMessage::FetchUnreadCount);
        });

        let mut dispatcher = Dispatcher::new("notifications", handlers);
        let (tx, mut rx) = sender();

        let raw = r#"{"type":"notification","notification":
            {"type":"timesheet","message":"m","timestamp":"t"}}"#;
        dispatcher.dispatch(raw, &tx);
        assert_eq!(rx.try_recv().unwrap(), ClientMessage::FetchUnreadCount);
    }
}
