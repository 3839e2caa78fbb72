//! The chat room channel with graceful degradation to polling.
//!
//! Chat differs from the registry channels: the reconnect delay is fixed
//! rather than exponential, the retry budget is capped, and losing the socket
//! never loses messages — an HTTP poller takes over whenever the socket is
//! down and stops as soon as it is back. After the final failed reconnect the
//! room stays in polling-only mode for the rest of the session.
//!
//! A room page without a room id marker never dials at all and starts in
//! polling-only mode.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::backoff::RetryPolicy;
use crate::channel::{spawn_channel, ChannelConfig, ChannelHandle, ChannelStatus};
use crate::dispatch::Handlers;
use crate::polling::{PollClient, PollingFallback, DEFAULT_POLL_INTERVAL};
use crate::protocol::{EventKind, ServerEvent};
use crate::transport::Connector;
use crate::views::ChatLog;

/// Chat connection behavior.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Fixed delay between reconnect attempts (3 s).
    pub reconnect_delay: Duration,
    /// Reconnect attempts before degrading to polling for good (5).
    pub max_attempts: u32,
    /// Keep-alive ping interval while the socket is open (30 s).
    pub ping_interval: Duration,
    /// Fallback poll interval (3 s).
    pub poll_interval: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(3),
            max_attempts: 5,
            ping_interval: Duration::from_secs(30),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ChatConfig {
    fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            // Equal base and ceiling make the backoff a fixed delay.
            base_delay: self.reconnect_delay,
            max_delay: self.reconnect_delay,
            retry: RetryPolicy::Limited(self.max_attempts),
            keepalive: Some(self.ping_interval),
        }
    }
}

/// Connection state shown in the chat banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStatus {
    /// First dial in flight.
    Connecting,
    /// The socket is open; messages arrive live.
    Connected,
    /// The socket dropped; a retry is scheduled and polling covers the gap.
    Reconnecting { attempt: u32 },
    /// The retry budget is spent (or there is no room to dial); polling is
    /// the only source of messages.
    PollingOnly,
}

/// A chat room connection: socket when possible, polling otherwise.
pub struct ChatChannel {
    log: Arc<Mutex<ChatLog>>,
    status_rx: watch::Receiver<ChatStatus>,
    poller: Arc<PollingFallback>,
    handle: Option<ChannelHandle>,
}

impl ChatChannel {
    /// Dial the room socket and fall back to polling per `config`.
    pub fn connect<C: Connector>(
        connector: C,
        poll_client: Arc<dyn PollClient>,
        log: Arc<Mutex<ChatLog>>,
        config: ChatConfig,
    ) -> Self {
        let poller = Arc::new(PollingFallback::with_interval(
            poll_client,
            Arc::clone(&log),
            config.poll_interval,
        ));

        let handle = spawn_channel(
            "chat",
            connector,
            handlers(Arc::clone(&log)),
            config.channel_config(),
        );

        let (status_tx, status_rx) = watch::channel(ChatStatus::Connecting);
        tokio::spawn(watch_socket(
            handle.watch_status(),
            status_tx,
            Arc::clone(&poller),
            Arc::clone(&log),
            config.max_attempts,
        ));

        Self {
            log,
            status_rx,
            poller,
            handle: Some(handle),
        }
    }

    /// Skip the socket entirely and poll from the start. Used when the page
    /// carries no room id marker.
    pub fn polling_only(
        poll_client: Arc<dyn PollClient>,
        log: Arc<Mutex<ChatLog>>,
        config: ChatConfig,
    ) -> Self {
        debug!("no chat room id, starting in polling-only mode");
        let poller = Arc::new(PollingFallback::with_interval(
            poll_client,
            Arc::clone(&log),
            config.poll_interval,
        ));
        poller.start();

        let (_status_tx, status_rx) = watch::channel(ChatStatus::PollingOnly);
        Self {
            log,
            status_rx,
            poller,
            handle: None,
        }
    }

    /// Dial the room when `room_id` is present, otherwise start polling
    /// immediately. `page_path` is the room page, which doubles as the AJAX
    /// polling endpoint.
    #[cfg(all(feature = "transport-websocket", feature = "polling-http"))]
    pub fn start(
        origin: &crate::endpoint::PageOrigin,
        room_id: Option<&str>,
        page_path: &str,
        log: Arc<Mutex<ChatLog>>,
        config: ChatConfig,
    ) -> Self {
        use crate::endpoint::paths;
        use crate::polling::HttpPollClient;
        use crate::transports::WebSocketConnector;

        let poll_client = Arc::new(HttpPollClient::new(origin.http_url(page_path)));
        match room_id {
            Some(room) => {
                let url = origin.channel_url(&paths::chat_room(room));
                Self::connect(WebSocketConnector::new(url), poll_client, log, config)
            }
            None => Self::polling_only(poll_client, log, config),
        }
    }

    /// Current banner state.
    pub fn status(&self) -> ChatStatus {
        *self.status_rx.borrow()
    }

    /// A watch receiver for observing banner-state transitions.
    pub fn watch_status(&self) -> watch::Receiver<ChatStatus> {
        self.status_rx.clone()
    }

    /// Whether the polling fallback is currently active.
    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    /// The message log this channel renders into.
    pub fn log(&self) -> &Arc<Mutex<ChatLog>> {
        &self.log
    }

    /// Tear down the socket and the poller.
    pub fn shutdown(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.shutdown();
        }
        self.poller.stop();
    }
}

impl std::fmt::Debug for ChatChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatChannel")
            .field("status", &self.status())
            .field("polling", &self.is_polling())
            .finish()
    }
}

/// Handler set rendering pushed messages into the log.
fn handlers(log: Arc<Mutex<ChatLog>>) -> Handlers {
    Handlers::new().on(EventKind::NewMessage, move |event, _| {
        if let ServerEvent::NewMessage {
            message,
            sender,
            timestamp,
        } = event
        {
            if let Ok(mut log) = log.lock() {
                log.push(message.clone(), sender.clone(), timestamp.clone());
            }
        }
    })
}

/// Mirror socket status into the chat banner and drive the poller: polling
/// runs exactly while the socket is down.
async fn watch_socket(
    mut socket_rx: watch::Receiver<ChannelStatus>,
    status_tx: watch::Sender<ChatStatus>,
    poller: Arc<PollingFallback>,
    log: Arc<Mutex<ChatLog>>,
    max_attempts: u32,
) {
    loop {
        let status = *socket_rx.borrow_and_update();
        match status {
            // Initial dial, or a redial already announced as Reconnecting.
            ChannelStatus::Connecting => {}
            ChannelStatus::Open => {
                poller.stop();
                status_tx.send_replace(ChatStatus::Connected);
                if let Ok(mut log) = log.lock() {
                    log.clear_banner();
                }
            }
            ChannelStatus::Reconnecting { attempt } => {
                poller.start();
                status_tx.send_replace(ChatStatus::Reconnecting { attempt });
                if let Ok(mut log) = log.lock() {
                    log.set_banner(format!(
                        "Connection lost. Reconnecting ({attempt}/{max_attempts})"
                    ));
                }
            }
            ChannelStatus::Failed => {
                poller.start();
                status_tx.send_replace(ChatStatus::PollingOnly);
                if let Ok(mut log) = log.lock() {
                    log.set_banner("Live updates unavailable. Checking for new messages");
                }
                // Terminal: polling carries the rest of the session.
                return;
            }
            ChannelStatus::Closed => {
                // Intentional teardown; nothing left to cover.
                poller.stop();
                return;
            }
        }

        if socket_rx.changed().await.is_err() {
            poller.stop();
            return;
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
    use crate::error::RealtimeError;
    use crate::protocol::{ChatMessage, ChatSender, PollResponse, PolledMessage};
    use crate::transport::Transport;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    fn fast_config() -> ChatConfig {
        ChatConfig {
            reconnect_delay: Duration::from_millis(10),
            max_attempts: 2,
            ping_interval: Duration::from_secs(30),
            poll_interval: Duration::from_millis(10),
        }
    }

    fn polled(id: u64, content: &str) -> PolledMessage {
        PolledMessage {
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
            timestamp: "t".into(),
        }
    }

    /// Poll client that repeats one canned response.
    struct CannedPollClient {
        response: PollResponse,
    }

    #[async_trait]
    impl PollClient for CannedPollClient {
        async fn fetch(&self, _last: u64) -> Result<PollResponse, RealtimeError> {
            Ok(self.response.clone())
        }
    }

    fn quiet_poll_client() -> Arc<CannedPollClient> {
        Arc::new(CannedPollClient {
            response: PollResponse {
                success: true,
                new_messages: vec![],
            },
        })
    }

    /// Transport replaying scripted frames, then idling until shutdown.
    struct ScriptedTransport {
        incoming: VecDeque<Option<Result<String, RealtimeError>>>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, _frame: String) -> Result<(), RealtimeError> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String, RealtimeError>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<(), RealtimeError> {
            Ok(())
        }
    }

    /// Connector replaying scripted dial outcomes; `None` is a failed dial.
    struct ScriptedConnector {
        outcomes: std::sync::Mutex<VecDeque<Option<Vec<Option<Result<String, RealtimeError>>>>>>,
    }

    impl ScriptedConnector {
        fn new(
            outcomes: Vec<Option<Vec<Option<Result<String, RealtimeError>>>>>,
        ) -> Self {
            Self {
                outcomes: std::sync::Mutex::new(VecDeque::from(outcomes)),
            }
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        type Transport = ScriptedTransport;

        async fn connect(&self) -> Result<Self::Transport, RealtimeError> {
            let outcome = self.outcomes.lock().unwrap().pop_front();
            match outcome {
                Some(Some(frames)) => Ok(ScriptedTransport {
                    incoming: VecDeque::from(frames),
                }),
                Some(None) => Err(RealtimeError::TransportClosed),
                None => std::future::pending().await,
            }
        }
    }

    async fn wait_status(chat: &ChatChannel, want: ChatStatus) {
        let mut rx = chat.watch_status();
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if *rx.borrow() == want {
                    return;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn missing_room_id_starts_polling_immediately() {
        let log = Arc::new(Mutex::new(ChatLog::new()));
        let client = Arc::new(CannedPollClient {
            response: PollResponse {
                success: true,
                new_messages: vec![polled(1, "hello")],
            },
        });

        let chat = ChatChannel::polling_only(client, Arc::clone(&log), fast_config());
        assert_eq!(chat.status(), ChatStatus::PollingOnly);
        assert!(chat.is_polling());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(log.lock().unwrap().messages().len(), 1);

        chat.shutdown();
    }

    #[tokio::test]
    async fn socket_messages_render_into_the_log() {
        let log = Arc::new(Mutex::new(ChatLog::new()));
        let frame = r#"{"type":"new_message",
            "message":{"id":1,"content":"hi"},
            "sender":{"first_name":"Dana","last_name":"Reyes"},
            "timestamp":"t"}"#;
        let connector = ScriptedConnector::new(vec![Some(vec![Some(Ok(frame.into()))])]);

        let chat = ChatChannel::connect(
            connector,
            quiet_poll_client(),
            Arc::clone(&log),
            fast_config(),
        );
        wait_status(&chat, ChatStatus::Connected).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        let log = chat.log().lock().unwrap().messages().len();
        assert_eq!(log, 1);
        assert!(!chat.is_polling());

        chat.shutdown();
    }

    #[tokio::test]
    async fn exhausted_retries_degrade_to_polling_only() {
        let log = Arc::new(Mutex::new(ChatLog::new()));
        let client = Arc::new(CannedPollClient {
            response: PollResponse {
                success: true,
                new_messages: vec![polled(9, "via polling")],
            },
        });
        // Every dial fails; max_attempts is 2.
        let connector = ScriptedConnector::new(vec![None, None, None]);

        let chat = ChatChannel::connect(connector, client, Arc::clone(&log), fast_config());
        wait_status(&chat, ChatStatus::PollingOnly).await;
        assert!(chat.is_polling());

        tokio::time::sleep(Duration::from_millis(50)).await;
        {
            let log = log.lock().unwrap();
            assert_eq!(log.messages().len(), 1);
            assert!(log.banner().is_some());
        }

        chat.shutdown();
    }

    #[tokio::test]
    async fn reopening_the_socket_stops_polling_and_clears_banner() {
        let log = Arc::new(Mutex::new(ChatLog::new()));
        // First dial fails (polling starts), second succeeds.
        let connector = ScriptedConnector::new(vec![None, Some(vec![])]);

        let chat = ChatChannel::connect(
            connector,
            quiet_poll_client(),
            Arc::clone(&log),
            fast_config(),
        );
        wait_status(&chat, ChatStatus::Connected).await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!chat.is_polling());
        assert_eq!(log.lock().unwrap().banner(), None);

        chat.shutdown();
    }

    #[tokio::test]
    async fn reconnecting_sets_the_banner_and_starts_polling() {
        let log = Arc::new(Mutex::new(ChatLog::new()));
        // Open, then the transport errors; the next dial hangs.
        let abnormal = vec![Some(Err(RealtimeError::TransportReceive("drop".into())))];
        let connector = ScriptedConnector::new(vec![Some(abnormal)]);
        let config = ChatConfig {
            reconnect_delay: Duration::from_secs(60),
            ..fast_config()
        };

        let chat = ChatChannel::connect(connector, quiet_poll_client(), Arc::clone(&log), config);
        wait_status(&chat, ChatStatus::Reconnecting { attempt: 1 }).await;

        assert!(chat.is_polling());
        let banner = log.lock().unwrap().banner().unwrap().to_string();
        assert!(banner.contains("Reconnecting"), "{banner}");

        chat.shutdown();
    }

    #[tokio::test]
    async fn socket_and_polling_overlap_renders_each_message_once() {
        let log = Arc::new(Mutex::new(ChatLog::new()));
        // Polling keeps returning message 1; the socket also pushes it.
        let client = Arc::new(CannedPollClient {
            response: PollResponse {
                success: true,
                new_messages: vec![polled(1, "hello")],
            },
        });
        let frame = r#"{"type":"new_message",
            "message":{"id":1,"content":"hello"},
            "sender":{"first_name":"Dana","last_name":"Reyes"},
            "timestamp":"t"}"#;
        // Dial fails once so polling runs, then the socket opens and pushes.
        let connector = ScriptedConnector::new(vec![None, Some(vec![Some(Ok(frame.into()))])]);

        let chat = ChatChannel::connect(connector, client, Arc::clone(&log), fast_config());
        wait_status(&chat, ChatStatus::Connected).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(log.lock().unwrap().messages().len(), 1);

        chat.shutdown();
    }
}
