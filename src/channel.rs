//! Per-channel connection state machine with automatic reconnection.
//!
//! Each logical channel runs one coordinating task that owns the transport:
//!
//! ```text
//! CONNECTING ──ok──► OPEN ──server close / disconnect()──► CLOSED (terminal)
//!     │                │
//!     │ dial error     │ transport error
//!     ▼                ▼
//!  RECONNECTING { attempt } ──budget left──► CONNECTING (loop)
//!     │
//!     └──budget exhausted (Limited policy)──► FAILED (terminal)
//! ```
//!
//! The reconnect delay follows [`Backoff`]: `min(base * 2^attempt, max)`,
//! with the attempt counter reset on every successful open. The task
//! multiplexes outbound commands, inbound frames, the optional keep-alive
//! ticker, and shutdown via `tokio::select!`; frames dispatch in arrival
//! order. Status transitions are published on a `watch` channel so callers
//! (the chat fallback, connectivity banners) can observe them.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::backoff::{Backoff, RetryPolicy};
use crate::dispatch::{ChannelSender, Dispatcher, Handlers};
use crate::protocol::ClientMessage;
use crate::transport::{Connector, Transport};

// ── Configuration ───────────────────────────────────────────────────

/// Default base reconnect delay (1 second).
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum reconnect delay (30 seconds).
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Per-channel connection behavior.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Base reconnect delay; doubles per attempt.
    pub base_delay: Duration,
    /// Hard ceiling on the reconnect delay.
    pub max_delay: Duration,
    /// Retry budget. Registry channels default to `Unbounded`; the chat
    /// channel caps attempts and degrades to polling.
    pub retry: RetryPolicy,
    /// When set, a `ping` control frame is queued at this interval while the
    /// channel is open.
    pub keepalive: Option<Duration>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            retry: RetryPolicy::Unbounded,
            keepalive: None,
        }
    }
}

// ── Status ──────────────────────────────────────────────────────────

/// Observable connection state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// A dial attempt is in flight.
    Connecting,
    /// The transport is open; frames flow.
    Open,
    /// An abnormal closure occurred; a retry is scheduled. `attempt` counts
    /// consecutive failures since the last successful open (1-based).
    Reconnecting { attempt: u32 },
    /// Closed cleanly (explicit disconnect or server close frame). Terminal.
    Closed,
    /// The retry budget is exhausted. Terminal; only `Limited` channels
    /// reach this state.
    Failed,
}

impl ChannelStatus {
    /// Whether the channel task has exited and will never reconnect.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChannelStatus::Closed | ChannelStatus::Failed)
    }
}

// ── Handle ──────────────────────────────────────────────────────────

/// Handle to a running channel task.
///
/// Dropping the handle shuts the task down (the command and shutdown
/// channels close); [`shutdown`](ChannelHandle::shutdown) does the same
/// explicitly and is how the registry implements `disconnect`.
#[derive(Debug)]
pub struct ChannelHandle {
    name: String,
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    status_rx: watch::Receiver<ChannelStatus>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ChannelHandle {
    /// The channel's registry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current connection status.
    pub fn status(&self) -> ChannelStatus {
        *self.status_rx.borrow()
    }

    /// A watch receiver for observing status transitions.
    pub fn watch_status(&self) -> watch::Receiver<ChannelStatus> {
        self.status_rx.clone()
    }

    /// Queue a control frame on this channel.
    ///
    /// Returns `false` (and logs) when the channel is not open; sends are
    /// best-effort and never an error.
    pub fn send(&self, msg: ClientMessage) -> bool {
        if self.status() != ChannelStatus::Open {
            warn!(channel = %self.name, status = ?self.status(), "send on non-open channel");
            return false;
        }
        self.cmd_tx.send(msg).is_ok()
    }

    /// An outbound sender usable from handler callbacks.
    pub fn sender(&self) -> ChannelSender {
        ChannelSender::new(self.cmd_tx.clone())
    }

    /// Close the channel with a normal-closure code and stop the task.
    ///
    /// Any pending reconnect is cancelled; no handler fires for this channel
    /// after the task observes the signal.
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

// ── Spawning ────────────────────────────────────────────────────────

/// Spawn the coordinating task for one channel and return its handle.
///
/// The task dials through `connector`, dispatches inbound frames through
/// `handlers`, and reconnects per `config` until a terminal state.
pub fn spawn_channel<C: Connector>(
    name: impl Into<String>,
    connector: C,
    handlers: Handlers,
    config: ChannelConfig,
) -> ChannelHandle {
    let name = name.into();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientMessage>();
    let (status_tx, status_rx) = watch::channel(ChannelStatus::Connecting);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let dispatcher = Dispatcher::new(name.clone(), handlers);
    let sender = ChannelSender::new(cmd_tx.clone());

    tokio::spawn(channel_loop(
        name.clone(),
        connector,
        dispatcher,
        config,
        cmd_rx,
        sender,
        status_tx,
        shutdown_rx,
    ));

    ChannelHandle {
        name,
        cmd_tx,
        status_rx,
        shutdown_tx: Some(shutdown_tx),
    }
}

// ── Task ────────────────────────────────────────────────────────────

/// How an open transport ended.
enum Closure {
    /// Explicit disconnect or server close frame. No reconnect.
    Clean,
    /// Anything else. Schedules a reconnect.
    Abnormal,
}

#[allow(clippy::too_many_arguments)]
async fn channel_loop<C: Connector>(
    name: String,
    connector: C,
    mut dispatcher: Dispatcher,
    config: ChannelConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    sender: ChannelSender,
    status_tx: watch::Sender<ChannelStatus>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut backoff = Backoff::new(config.base_delay, config.max_delay);

    loop {
        let _ = status_tx.send(ChannelStatus::Connecting);

        let dial = tokio::select! {
            result = connector.connect() => result,
            // Fires on explicit shutdown and when the handle is dropped.
            _ = &mut shutdown_rx => {
                debug!(channel = %name, "shutdown during dial");
                let _ = status_tx.send(ChannelStatus::Closed);
                return;
            }
        };

        match dial {
            Ok(mut transport) => {
                backoff.reset();
                let _ = status_tx.send(ChannelStatus::Open);
                info!(channel = %name, "channel open");
                dispatcher.open(&sender);

                let closure = run_open(
                    &name,
                    &mut transport,
                    &mut dispatcher,
                    &mut cmd_rx,
                    &sender,
                    &mut shutdown_rx,
                    config.keepalive,
                )
                .await;

                if matches!(closure, Closure::Clean) {
                    debug!(channel = %name, "channel closed cleanly");
                    let _ = status_tx.send(ChannelStatus::Closed);
                    return;
                }
            }
            Err(e) => {
                warn!(channel = %name, error = %e, "dial failed");
            }
        }

        // Abnormal closure: schedule a retry or give up.
        if !config.retry.allows(backoff.attempt()) {
            warn!(
                channel = %name,
                attempts = backoff.attempt(),
                "retry budget exhausted, giving up"
            );
            let _ = status_tx.send(ChannelStatus::Failed);
            return;
        }

        let delay = backoff.next();
        let _ = status_tx.send(ChannelStatus::Reconnecting {
            attempt: backoff.attempt(),
        });
        debug!(channel = %name, ?delay, attempt = backoff.attempt(), "reconnect scheduled");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut shutdown_rx => {
                debug!(channel = %name, "shutdown cancelled pending reconnect");
                let _ = status_tx.send(ChannelStatus::Closed);
                return;
            }
        }
    }
}

/// Drive one open transport until it closes. Inbound frames dispatch in
/// arrival order; outbound commands are serialized and sent as they arrive.
async fn run_open<T: Transport>(
    name: &str,
    transport: &mut T,
    dispatcher: &mut Dispatcher,
    cmd_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
    sender: &ChannelSender,
    shutdown_rx: &mut oneshot::Receiver<()>,
    keepalive: Option<Duration>,
) -> Closure {
    let mut ticker = keepalive.map(|period| {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            _ = &mut *shutdown_rx => {
                if let Err(e) = transport.close().await {
                    debug!(channel = %name, error = %e, "close handshake failed");
                }
                return Closure::Clean;
            }

            cmd = cmd_rx.recv() => {
                // The task holds its own ChannelSender clone, so recv() only
                // yields None if that invariant is ever broken; treat it as
                // a clean stop.
                let Some(msg) = cmd else {
                    let _ = transport.close().await;
                    return Closure::Clean;
                };
                match serde_json::to_string(&msg) {
                    Ok(json) => {
                        if let Err(e) = transport.send(json).await {
                            warn!(channel = %name, error = %e, "transport send failed");
                            return Closure::Abnormal;
                        }
                    }
                    Err(e) => {
                        // A ClientMessage that fails to serialize is a bug;
                        // don't kill the connection over it.
                        error!(channel = %name, error = %e, "failed to serialize control frame");
                    }
                }
            }

            _ = tick(&mut ticker) => {
                let _ = sender.send(ClientMessage::Ping);
            }

            frame = transport.recv() => match frame {
                Some(Ok(text)) => {
                    dispatcher.dispatch(&text, sender);
                }
                Some(Err(e)) => {
                    warn!(channel = %name, error = %e, "transport receive failed");
                    return Closure::Abnormal;
                }
                None => {
                    debug!(channel = %name, "transport closed by server");
                    return Closure::Clean;
                }
            }
        }
    }
}

/// Await the next keep-alive tick, or forever when keep-alive is disabled.
async fn tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker.as_mut() {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
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
    use crate::protocol::{EventKind, ServerEvent};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    type Scripted = Vec<Option<Result<String, RealtimeError>>>;

    /// Transport that replays scripted frames, then hangs until shutdown.
    struct ScriptedTransport {
        incoming: VecDeque<Option<Result<String, RealtimeError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, frame: String) -> Result<(), RealtimeError> {
            self.sent.lock().unwrap().push(frame);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String, RealtimeError>> {
            match self.incoming.pop_front() {
                // An explicit None entry scripts a clean server close.
                Some(item) => item,
                // Script exhausted: stay open until shut down.
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<(), RealtimeError> {
            Ok(())
        }
    }

    /// Connector replaying scripted dial outcomes; hangs once exhausted.
    #[derive(Clone)]
    struct ScriptedConnector {
        outcomes: Arc<StdMutex<VecDeque<Option<Scripted>>>>,
        dials: Arc<AtomicU32>,
        dial_times: Arc<StdMutex<Vec<std::time::Instant>>>,
        sent: Arc<StdMutex<Vec<String>>>,
    }

    impl ScriptedConnector {
        /// `None` outcomes are failed dials; `Some(frames)` succeed with a
        /// transport scripted to replay `frames`.
        fn new(outcomes: Vec<Option<Scripted>>) -> Self {
            Self {
                outcomes: Arc::new(StdMutex::new(VecDeque::from(outcomes))),
                dials: Arc::new(AtomicU32::new(0)),
                dial_times: Arc::new(StdMutex::new(Vec::new())),
                sent: Arc::new(StdMutex::new(Vec::new())),
            }
        }

        fn dials(&self) -> u32 {
            self.dials.load(Ordering::SeqCst)
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        /// Durations between consecutive dials.
        fn dial_gaps(&self) -> Vec<Duration> {
            let times = self.dial_times.lock().unwrap();
            times.windows(2).map(|w| w[1] - w[0]).collect()
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        type Transport = ScriptedTransport;

        async fn connect(&self) -> Result<Self::Transport, RealtimeError> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            self.dial_times.lock().unwrap().push(std::time::Instant::now());
            let outcome = self.outcomes.lock().unwrap().pop_front();
            match outcome {
                Some(Some(frames)) => Ok(ScriptedTransport {
                    incoming: VecDeque::from(frames),
                    sent: Arc::clone(&self.sent),
                }),
                Some(None) => Err(RealtimeError::TransportClosed),
                // Script exhausted: hang the dial forever.
                None => std::future::pending().await,
            }
        }
    }

    fn fast_config() -> ChannelConfig {
        ChannelConfig {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            ..ChannelConfig::default()
        }
    }

    /// Wait (bounded) until the watched status satisfies the predicate.
    async fn wait_for(
        rx: &mut watch::Receiver<ChannelStatus>,
        mut pred: impl FnMut(ChannelStatus) -> bool,
    ) -> ChannelStatus {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let status = *rx.borrow();
                if pred(status) {
                    return status;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn open_dispatches_frames_in_order() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen_in = Arc::clone(&seen);
        let handlers = Handlers::new().on_event(move |event, _| {
            seen_in.lock().unwrap().push(event.clone());
        });

        let connector = ScriptedConnector::new(vec![Some(vec![
            Some(Ok(r#"{"type":"unread_count","count":1}"#.into())),
            Some(Ok(r#"{"type":"unread_count","count":2}"#.into())),
        ])]);

        let handle = spawn_channel("notifications", connector, handlers, fast_config());
        let mut status = handle.watch_status();
        wait_for(&mut status, |s| s == ChannelStatus::Open).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        let events = seen.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                ServerEvent::UnreadCount { count: 1 },
                ServerEvent::UnreadCount { count: 2 },
            ]
        );

        handle.shutdown();
    }

    #[tokio::test]
    async fn clean_server_close_does_not_reconnect() {
        // One successful dial whose transport immediately closes cleanly.
        let connector = ScriptedConnector::new(vec![Some(vec![None])]);
        let probe = connector.clone();

        let handle = spawn_channel("notifications", connector, Handlers::new(), fast_config());
        let mut status = handle.watch_status();
        wait_for(&mut status, |s| s == ChannelStatus::Closed).await;

        // Give any (incorrect) reconnect a chance to fire.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(probe.dials(), 1);
    }

    #[tokio::test]
    async fn abnormal_closes_reconnect_and_reset_attempts() {
        // Three failed dials, then a success.
        let connector = ScriptedConnector::new(vec![None, None, None, Some(vec![])]);
        let probe = connector.clone();

        let handle = spawn_channel("team_7", connector, Handlers::new(), fast_config());
        let mut status = handle.watch_status();

        let mut attempts_seen = Vec::new();
        let opened = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let s = *status.borrow();
                if let ChannelStatus::Reconnecting { attempt } = s {
                    if attempts_seen.last() != Some(&attempt) {
                        attempts_seen.push(attempt);
                    }
                }
                if s == ChannelStatus::Open {
                    return true;
                }
                status.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        assert!(opened);
        assert_eq!(attempts_seen, vec![1, 2, 3]);
        assert_eq!(probe.dials(), 4);

        handle.shutdown();
    }

    #[tokio::test]
    async fn backoff_restarts_after_successful_open() {
        // Fail twice, succeed, transport errors out, fail once more, succeed.
        let abnormal: Scripted = vec![Some(Err(RealtimeError::TransportReceive("drop".into())))];
        let connector =
            ScriptedConnector::new(vec![None, None, Some(abnormal), None, Some(vec![])]);
        let probe = connector.clone();
        let config = ChannelConfig {
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(160),
            ..ChannelConfig::default()
        };

        let handle = spawn_channel("team_7", connector, Handlers::new(), config);
        let mut status = handle.watch_status();

        // Five dials: the last one succeeds and stays open.
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if probe.dials() == 5 && *status.borrow() == ChannelStatus::Open {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        // The first streak climbed to the doubled delay; the dial right after
        // the successful open came at the base delay again.
        let gaps = probe.dial_gaps();
        assert!(gaps[2] < gaps[1], "{gaps:?}");

        handle.shutdown();
    }

    #[tokio::test]
    async fn limited_retry_ends_in_failed() {
        let connector = ScriptedConnector::new(vec![None, None, None]);
        let probe = connector.clone();
        let config = ChannelConfig {
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(5),
            retry: RetryPolicy::Limited(2),
            keepalive: None,
        };

        let handle = spawn_channel("chat_room_1", connector, Handlers::new(), config);
        let mut status = handle.watch_status();
        let terminal = wait_for(&mut status, |s| s.is_terminal()).await;

        assert_eq!(terminal, ChannelStatus::Failed);
        // Initial dial plus two retries.
        assert_eq!(probe.dials(), 3);
    }

    #[tokio::test]
    async fn send_on_non_open_channel_returns_false() {
        // Dial hangs forever, so the channel never opens.
        let connector = ScriptedConnector::new(vec![]);
        let handle = spawn_channel("notifications", connector, Handlers::new(), fast_config());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.send(ClientMessage::Ping));

        handle.shutdown();
    }

    #[tokio::test]
    async fn shutdown_cancels_pending_reconnect() {
        // One failed dial, then a very long backoff window.
        let connector = ScriptedConnector::new(vec![None]);
        let probe = connector.clone();
        let config = ChannelConfig {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            ..ChannelConfig::default()
        };

        let handle = spawn_channel("project_42", connector, Handlers::new(), config);
        let mut status = handle.watch_status();
        wait_for(&mut status, |s| matches!(s, ChannelStatus::Reconnecting { .. })).await;

        handle.shutdown();
        wait_for(&mut status, |s| s == ChannelStatus::Closed).await;
        assert_eq!(probe.dials(), 1);
    }

    #[tokio::test]
    async fn keepalive_sends_periodic_pings() {
        let connector = ScriptedConnector::new(vec![Some(vec![])]);
        let probe = connector.clone();
        let config = ChannelConfig {
            keepalive: Some(Duration::from_millis(20)),
            ..fast_config()
        };

        let handle = spawn_channel("chat_room_1", connector, Handlers::new(), config);
        let mut status = handle.watch_status();
        wait_for(&mut status, |s| s == ChannelStatus::Open).await;

        tokio::time::sleep(Duration::from_millis(90)).await;
        let pings = probe
            .sent()
            .iter()
            .filter(|f| f.as_str() == r#"{"type":"ping"}"#)
            .count();
        assert!(pings >= 2, "expected at least 2 pings, got {pings}");

        handle.shutdown();
    }

    #[tokio::test]
    async fn open_handler_frames_are_transmitted() {
        let handlers = Handlers::new().on_open(|sender| {
            sender.send(ClientMessage::FetchUnreadCount);
        });
        let connector = ScriptedConnector::new(vec![Some(vec![])]);
        let probe = connector.clone();

        let handle = spawn_channel("notifications", connector, handlers, fast_config());
        let mut status = handle.watch_status();
        wait_for(&mut status, |s| s == ChannelStatus::Open).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(probe.sent(), vec![r#"{"type":"fetch_unread_count"}"#.to_string()]);

        handle.shutdown();
    }

    #[tokio::test]
    async fn malformed_frames_do_not_kill_the_channel() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen_in = Arc::clone(&seen);
        let handlers = Handlers::new().on(EventKind::Pong, move |event, _| {
            seen_in.lock().unwrap().push(event.clone());
        });

        let connector = ScriptedConnector::new(vec![Some(vec![
            Some(Ok("not json".into())),
            Some(Ok(r#"{"type":"pong"}"#.into())),
        ])]);

        let handle = spawn_channel("chat_room_1", connector, handlers, fast_config());
        let mut status = handle.watch_status();
        wait_for(&mut status, |s| s == ChannelStatus::Open).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.lock().unwrap().clone(), vec![ServerEvent::Pong]);

        handle.shutdown();
    }
}
