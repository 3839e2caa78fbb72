//! HTTP polling fallback for chat.
//!
//! When the chat socket is down, messages are fetched over plain HTTP every
//! few seconds: `GET <room page>?ajax=1&last_message=<id>`. Responses render
//! through the same [`ChatLog`] as socket frames, so its id set suppresses
//! anything already seen; the brief overlap while a socket reconnects cannot
//! duplicate messages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::RealtimeError;
use crate::protocol::PollResponse;
use crate::views::ChatLog;

/// Default interval between polls (3 seconds).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Fetches chat messages newer than a given id.
#[async_trait]
pub trait PollClient: Send + Sync + 'static {
    /// Fetch messages with ids greater than `last_message_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Poll`] when the request fails or the body
    /// does not parse; the poller logs and tries again next tick.
    async fn fetch(&self, last_message_id: u64) -> Result<PollResponse, RealtimeError>;
}

/// [`PollClient`] backed by `reqwest`, hitting the room page's AJAX endpoint.
#[cfg(feature = "polling-http")]
#[derive(Debug, Clone)]
pub struct HttpPollClient {
    client: reqwest::Client,
    base_url: String,
}

#[cfg(feature = "polling-http")]
impl HttpPollClient {
    /// A client polling the given room page URL (without query string).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[cfg(feature = "polling-http")]
#[async_trait]
impl PollClient for HttpPollClient {
    async fn fetch(&self, last_message_id: u64) -> Result<PollResponse, RealtimeError> {
        let url = format!("{}?ajax=1&last_message={last_message_id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RealtimeError::Poll(e.to_string()))?
            .error_for_status()
            .map_err(|e| RealtimeError::Poll(e.to_string()))?;

        response
            .json::<PollResponse>()
            .await
            .map_err(|e| RealtimeError::Poll(e.to_string()))
    }
}

/// Periodic poller rendering fetched messages into a [`ChatLog`].
///
/// `start` and `stop` are idempotent; the chat channel flips the poller on
/// and off as its socket status changes.
pub struct PollingFallback {
    client: Arc<dyn PollClient>,
    log: Arc<Mutex<ChatLog>>,
    interval: Duration,
    current: Mutex<Option<Arc<PollTask>>>,
}

/// Cancellation token owned by one spawned poll loop. A new `start` installs
/// a fresh token, so a stop raced against an in-flight fetch can never be
/// undone by a later start: the old loop only ever consults its own token.
struct PollTask {
    live: AtomicBool,
    stop: Notify,
}

impl PollingFallback {
    /// A poller with the default 3-second interval.
    pub fn new(client: Arc<dyn PollClient>, log: Arc<Mutex<ChatLog>>) -> Self {
        Self::with_interval(client, log, DEFAULT_POLL_INTERVAL)
    }

    /// A poller with an explicit interval.
    pub fn with_interval(
        client: Arc<dyn PollClient>,
        log: Arc<Mutex<ChatLog>>,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            log,
            interval,
            current: Mutex::new(None),
        }
    }

    /// Begin polling. A second call while running is a no-op.
    pub fn start(&self) {
        let Ok(mut current) = self.current.lock() else {
            return;
        };
        if current
            .as_ref()
            .is_some_and(|task| task.live.load(Ordering::SeqCst))
        {
            debug!("polling already running");
            return;
        }
        debug!(interval = ?self.interval, "starting chat polling");

        let task = Arc::new(PollTask {
            live: AtomicBool::new(true),
            stop: Notify::new(),
        });
        *current = Some(Arc::clone(&task));
        drop(current);

        let client = Arc::clone(&self.client);
        let log = Arc::clone(&self.log);
        let interval = self.interval;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = task.stop.notified() => {}
                }
                if !task.live.load(Ordering::SeqCst) {
                    debug!("chat polling stopped");
                    return;
                }
                poll_once(client.as_ref(), &log).await;
            }
        });
    }

    /// Stop polling. Safe to call when not running.
    pub fn stop(&self) {
        let Ok(current) = self.current.lock() else {
            return;
        };
        if let Some(task) = current.as_ref() {
            if task.live.swap(false, Ordering::SeqCst) {
                // Wake the task out of its sleep so it exits promptly.
                task.stop.notify_waiters();
            }
        }
    }

    /// Whether the poll loop is active.
    pub fn is_running(&self) -> bool {
        self.current
            .lock()
            .map(|current| {
                current
                    .as_ref()
                    .is_some_and(|task| task.live.load(Ordering::SeqCst))
            })
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for PollingFallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingFallback")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

/// One poll cycle: fetch everything newer than the last rendered id and push
/// it through the log's duplicate suppression.
async fn poll_once(client: &dyn PollClient, log: &Mutex<ChatLog>) {
    let last_id = match log.lock() {
        Ok(log) => log.last_message_id(),
        Err(_) => return,
    };

    match client.fetch(last_id).await {
        Ok(response) if response.success => {
            if response.new_messages.is_empty() {
                return;
            }
            if let Ok(mut log) = log.lock() {
                for polled in response.new_messages {
                    log.push(polled.message, polled.sender, polled.timestamp);
                }
            }
        }
        Ok(_) => debug!("poll endpoint reported failure"),
        Err(e) => warn!(error = %e, "chat poll failed"),
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
    use crate::protocol::{ChatMessage, ChatSender, PolledMessage};
    use std::sync::atomic::AtomicU32;

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

    /// Client that hands out one scripted response per call and records the
    /// requested ids.
    struct ScriptedPollClient {
        responses: Mutex<Vec<Result<PollResponse, RealtimeError>>>,
        requested: Mutex<Vec<u64>>,
        calls: AtomicU32,
    }

    impl ScriptedPollClient {
        fn new(responses: Vec<Result<PollResponse, RealtimeError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                requested: Mutex::new(Vec::new()),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl PollClient for ScriptedPollClient {
        async fn fetch(&self, last_message_id: u64) -> Result<PollResponse, RealtimeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().unwrap().push(last_message_id);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(PollResponse {
                    success: true,
                    new_messages: vec![],
                })
            } else {
                responses.remove(0)
            }
        }
    }

    fn fast_poller(
        client: Arc<ScriptedPollClient>,
        log: Arc<Mutex<ChatLog>>,
    ) -> PollingFallback {
        PollingFallback::with_interval(client, log, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn polled_messages_render_through_dedup() {
        let log = Arc::new(Mutex::new(ChatLog::new()));
        // Message 2 was already rendered from the socket.
        log.lock().unwrap().push(
            polled(2, "from socket").message,
            ChatSender {
                first_name: "Dana".into(),
                last_name: "Reyes".into(),
            },
            "t".into(),
        );

        let client = ScriptedPollClient::new(vec![Ok(PollResponse {
            success: true,
            new_messages: vec![polled(2, "dup"), polled(3, "fresh")],
        })]);

        let poller = fast_poller(Arc::clone(&client), Arc::clone(&log));
        poller.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        poller.stop();

        let log = log.lock().unwrap();
        let contents: Vec<_> = log
            .messages()
            .iter()
            .map(|m| m.message.content.as_str())
            .collect();
        assert_eq!(contents, vec!["from socket", "fresh"]);
        assert_eq!(log.last_message_id(), 3);
    }

    #[tokio::test]
    async fn poll_requests_resume_from_last_rendered_id() {
        let log = Arc::new(Mutex::new(ChatLog::new()));
        let client = ScriptedPollClient::new(vec![Ok(PollResponse {
            success: true,
            new_messages: vec![polled(7, "m7")],
        })]);

        let poller = fast_poller(Arc::clone(&client), log);
        poller.start();
        tokio::time::sleep(Duration::from_millis(45)).await;
        poller.stop();

        let requested = client.requested.lock().unwrap().clone();
        assert_eq!(requested.first(), Some(&0));
        // After rendering message 7, later polls ask for ids beyond it.
        assert!(requested.last().unwrap() >= &7);
    }

    #[tokio::test]
    async fn failed_polls_keep_the_loop_alive() {
        let log = Arc::new(Mutex::new(ChatLog::new()));
        let client = ScriptedPollClient::new(vec![
            Err(RealtimeError::Poll("503".into())),
            Ok(PollResponse {
                success: true,
                new_messages: vec![polled(1, "after failure")],
            }),
        ]);

        let poller = fast_poller(Arc::clone(&client), Arc::clone(&log));
        poller.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        poller.stop();

        assert_eq!(log.lock().unwrap().messages().len(), 1);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let log = Arc::new(Mutex::new(ChatLog::new()));
        let client = ScriptedPollClient::new(vec![]);

        let poller = fast_poller(Arc::clone(&client), log);
        poller.start();
        poller.start();
        tokio::time::sleep(Duration::from_millis(35)).await;
        poller.stop();
        tokio::time::sleep(Duration::from_millis(30)).await;

        // A duplicate start would roughly double the call rate.
        let calls = client.calls.load(Ordering::SeqCst);
        assert!((1..=5).contains(&calls), "unexpected call count {calls}");
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let log = Arc::new(Mutex::new(ChatLog::new()));
        let client = ScriptedPollClient::new(vec![]);
        let poller = fast_poller(client, log);

        poller.stop();
        assert!(!poller.is_running());
    }

    /// Client whose fetch takes long enough that a stop/start pair can land
    /// while a fetch is in flight.
    struct SlowPollClient {
        calls: AtomicU32,
    }

    #[async_trait]
    impl PollClient for SlowPollClient {
        async fn fetch(&self, _last_message_id: u64) -> Result<PollResponse, RealtimeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(PollResponse {
                success: true,
                new_messages: vec![],
            })
        }
    }

    #[tokio::test]
    async fn restart_mid_fetch_does_not_leak_a_second_loop() {
        let log = Arc::new(Mutex::new(ChatLog::new()));
        let client = Arc::new(SlowPollClient {
            calls: AtomicU32::new(0),
        });
        let poller = PollingFallback::with_interval(
            Arc::clone(&client) as Arc<dyn PollClient>,
            log,
            Duration::from_millis(10),
        );

        poller.start();
        // Land the restart while the first fetch is still in flight; the old
        // loop must not survive alongside the new one.
        tokio::time::sleep(Duration::from_millis(15)).await;
        poller.stop();
        poller.start();
        tokio::time::sleep(Duration::from_millis(400)).await;
        poller.stop();

        // One loop completes a cycle roughly every 40 ms (10 ms sleep plus
        // 30 ms fetch); a leaked second loop would about double the count.
        let calls = client.calls.load(Ordering::SeqCst);
        assert!(calls <= 13, "saw {calls} fetches, more than one loop makes");
    }

    #[tokio::test]
    async fn stop_halts_polling() {
        let log = Arc::new(Mutex::new(ChatLog::new()));
        let client = ScriptedPollClient::new(vec![]);

        let poller = fast_poller(Arc::clone(&client), log);
        poller.start();
        tokio::time::sleep(Duration::from_millis(25)).await;
        poller.stop();

        let calls_at_stop = client.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(client.calls.load(Ordering::SeqCst), calls_at_stop);
    }
}
