//! Named channel registry.
//!
//! The registry owns one [`ChannelHandle`] per logical channel name
//! (`"notifications"`, `"owner_dashboard"`, `"project_42"`, ...). Connecting
//! an already-connected name is a no-op returning the existing handle, so at
//! most one live connection exists per name. Channels that have reached a
//! terminal state no longer count as registered: reads skip them and
//! `connect` drops them before opening a fresh connection.
//!
//! Reconnect behavior for registry channels comes from [`RegistryConfig`],
//! injected at construction.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info};

use crate::backoff::RetryPolicy;
use crate::channel::{spawn_channel, ChannelConfig, ChannelHandle, ChannelStatus};
use crate::channel::{DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY};
use crate::dispatch::Handlers;
use crate::protocol::ClientMessage;
use crate::transport::Connector;

/// Reconnect settings applied to every channel the registry opens.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Base reconnect delay; doubles per consecutive failure.
    pub base_delay: Duration,
    /// Ceiling on the reconnect delay.
    pub max_delay: Duration,
    /// Retry budget; registry channels retry indefinitely by default.
    pub retry: RetryPolicy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            retry: RetryPolicy::Unbounded,
        }
    }
}

impl RegistryConfig {
    fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            retry: self.retry,
            keepalive: None,
        }
    }
}

/// Registry of named realtime channels.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    config: RegistryConfig,
    channels: HashMap<String, ChannelHandle>,
}

impl ChannelRegistry {
    /// A registry with default reconnect settings (1 s base, 30 s cap,
    /// unbounded retries).
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// A registry with explicit reconnect settings.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            config,
            channels: HashMap::new(),
        }
    }

    /// Open the named channel, or return the existing handle when it is
    /// already connected. A terminal (closed or failed) entry under the same
    /// name has been pruned by then, so the name dials fresh.
    pub fn connect<C: Connector>(
        &mut self,
        name: impl Into<String>,
        connector: C,
        handlers: Handlers,
    ) -> &ChannelHandle {
        use std::collections::hash_map::Entry;

        self.prune();
        let name = name.into();
        let config = self.config.channel_config();

        match self.channels.entry(name) {
            Entry::Occupied(occupied) => {
                debug!(channel = %occupied.key(), "already connected, reusing handle");
                occupied.into_mut()
            }
            Entry::Vacant(vacant) => {
                let name = vacant.key().clone();
                info!(channel = %name, "opening channel");
                vacant.insert(spawn_channel(name, connector, handlers, config))
            }
        }
    }

    /// Drop entries whose channel has reached a terminal state. Their tasks
    /// have already exited, so dropping the handle is enough.
    fn prune(&mut self) {
        self.channels.retain(|name, handle| {
            let keep = !handle.status().is_terminal();
            if !keep {
                debug!(channel = %name, "dropping terminal channel");
            }
            keep
        });
    }

    /// The named handle, skipping entries in a terminal state.
    fn live(&self, name: &str) -> Option<&ChannelHandle> {
        self.channels
            .get(name)
            .filter(|handle| !handle.status().is_terminal())
    }

    /// Close the named channel and remove it. Unknown names are a no-op, and
    /// a pending reconnect is cancelled, so calling this twice is safe.
    pub fn disconnect(&mut self, name: &str) {
        match self.channels.remove(name) {
            Some(handle) => {
                info!(channel = %name, "disconnecting channel");
                handle.shutdown();
            }
            None => debug!(channel = %name, "disconnect on unknown channel"),
        }
    }

    /// Close every channel and empty the registry.
    pub fn disconnect_all(&mut self) {
        for (name, handle) in self.channels.drain() {
            debug!(channel = %name, "disconnecting channel");
            handle.shutdown();
        }
    }

    /// Queue a control frame on the named channel.
    ///
    /// Returns `false` when the channel is unknown or not open; best-effort,
    /// never an error.
    pub fn send(&self, name: &str, msg: ClientMessage) -> bool {
        match self.live(name) {
            Some(handle) => handle.send(msg),
            None => {
                debug!(channel = %name, "send on unknown channel");
                false
            }
        }
    }

    /// Current status of the named channel, if registered. Terminal channels
    /// are no longer registered, so this never reports `Closed` or `Failed`.
    pub fn status(&self, name: &str) -> Option<ChannelStatus> {
        self.live(name).map(ChannelHandle::status)
    }

    /// Handle for the named channel, if registered.
    pub fn get(&self, name: &str) -> Option<&ChannelHandle> {
        self.live(name)
    }

    /// Names of all registered channels, in arbitrary order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.channels
            .iter()
            .filter(|(_, handle)| !handle.status().is_terminal())
            .map(|(name, _)| name.as_str())
    }

    /// Number of registered channels.
    pub fn len(&self) -> usize {
        self.names().count()
    }

    /// Whether the registry holds no channels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
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
    use crate::transport::Transport;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Transport that stays open and discards everything sent.
    struct IdleTransport;

    #[async_trait]
    impl Transport for IdleTransport {
        async fn send(&mut self, _frame: String) -> Result<(), RealtimeError> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String, RealtimeError>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<(), RealtimeError> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct CountingConnector {
        dials: Arc<AtomicU32>,
    }

    impl CountingConnector {
        fn dials(&self) -> u32 {
            self.dials.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for CountingConnector {
        type Transport = IdleTransport;

        async fn connect(&self) -> Result<Self::Transport, RealtimeError> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            Ok(IdleTransport)
        }
    }

    async fn wait_open(registry: &ChannelRegistry, name: &str) {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if registry.status(name) == Some(ChannelStatus::Open) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn connect_is_idempotent_per_name() {
        let mut registry = ChannelRegistry::new();
        let connector = CountingConnector::default();
        let probe = connector.clone();

        registry.connect("notifications", connector.clone(), Handlers::new());
        wait_open(&registry, "notifications").await;

        // Second connect under the same name must not dial again.
        registry.connect("notifications", connector, Handlers::new());
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(registry.len(), 1);
        assert_eq!(probe.dials(), 1);
    }

    #[tokio::test]
    async fn distinct_names_get_distinct_connections() {
        let mut registry = ChannelRegistry::new();
        let connector = CountingConnector::default();
        let probe = connector.clone();

        registry.connect("project_1", connector.clone(), Handlers::new());
        registry.connect("project_2", connector, Handlers::new());
        wait_open(&registry, "project_1").await;
        wait_open(&registry, "project_2").await;

        assert_eq!(registry.len(), 2);
        assert_eq!(probe.dials(), 2);
    }

    #[tokio::test]
    async fn disconnect_removes_and_is_idempotent() {
        let mut registry = ChannelRegistry::new();
        registry.connect("team_9", CountingConnector::default(), Handlers::new());
        wait_open(&registry, "team_9").await;

        registry.disconnect("team_9");
        assert!(registry.is_empty());
        assert_eq!(registry.status("team_9"), None);

        // Repeat and unknown-name disconnects are no-ops.
        registry.disconnect("team_9");
        registry.disconnect("never_existed");
    }

    #[tokio::test]
    async fn send_on_unknown_channel_returns_false() {
        let registry = ChannelRegistry::new();
        assert!(!registry.send("notifications", ClientMessage::Ping));
    }

    #[tokio::test]
    async fn send_on_open_channel_succeeds() {
        let mut registry = ChannelRegistry::new();
        registry.connect("notifications", CountingConnector::default(), Handlers::new());
        wait_open(&registry, "notifications").await;

        assert!(registry.send("notifications", ClientMessage::FetchUnreadCount));
    }

    #[tokio::test]
    async fn disconnect_all_empties_the_registry() {
        let mut registry = ChannelRegistry::new();
        registry.connect("a", CountingConnector::default(), Handlers::new());
        registry.connect("b", CountingConnector::default(), Handlers::new());

        registry.disconnect_all();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn reconnect_after_terminal_state_redials() {
        /// Connector whose transport closes cleanly straight away.
        #[derive(Clone, Default)]
        struct ClosingConnector {
            dials: Arc<AtomicU32>,
        }

        struct ClosedTransport;

        #[async_trait]
        impl Transport for ClosedTransport {
            async fn send(&mut self, _frame: String) -> Result<(), RealtimeError> {
                Err(RealtimeError::TransportClosed)
            }

            async fn recv(&mut self) -> Option<Result<String, RealtimeError>> {
                None
            }

            async fn close(&mut self) -> Result<(), RealtimeError> {
                Ok(())
            }
        }

        #[async_trait]
        impl Connector for ClosingConnector {
            type Transport = ClosedTransport;

            async fn connect(&self) -> Result<Self::Transport, RealtimeError> {
                self.dials.fetch_add(1, Ordering::SeqCst);
                Ok(ClosedTransport)
            }
        }

        let mut registry = ChannelRegistry::new();
        let connector = ClosingConnector::default();
        let probe = connector.clone();

        registry.connect("chat_room_1", connector.clone(), Handlers::new());
        // Once the clean close lands the entry stops being registered.
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if registry.status("chat_room_1").is_none() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(registry.len(), 0);
        assert!(!registry.names().any(|n| n == "chat_room_1"));

        // The name is free again, so connect dials fresh.
        registry.connect("chat_room_1", connector, Handlers::new());
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if probe.dials.load(Ordering::SeqCst) >= 2 {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
}
