#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Registry semantics: idempotent connect, best-effort send, idempotent
//! disconnect.

mod common;

use std::time::Duration;

use pulseboard_client::channel::ChannelStatus;
use pulseboard_client::{ChannelRegistry, ClientMessage, Handlers, RegistryConfig, RetryPolicy};

use common::MockConnector;

async fn wait_status(registry: &ChannelRegistry, name: &str, want: ChannelStatus) {
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            if registry.status(name) == Some(want) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("channel did not reach expected status");
}

#[tokio::test]
async fn at_most_one_connection_per_name() {
    let mut registry = ChannelRegistry::new();
    let connector = MockConnector::always(vec![]);
    let probe = connector.clone();

    registry.connect("notifications", connector.clone(), Handlers::new());
    wait_status(&registry, "notifications", ChannelStatus::Open).await;

    registry.connect("notifications", connector.clone(), Handlers::new());
    registry.connect("notifications", connector, Handlers::new());
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(registry.len(), 1);
    assert_eq!(probe.dial_count(), 1);

    registry.disconnect_all();
}

#[tokio::test]
async fn names_are_independent_connections() {
    let mut registry = ChannelRegistry::new();
    let connector = MockConnector::always(vec![]);
    let probe = connector.clone();

    registry.connect("project_1", connector.clone(), Handlers::new());
    registry.connect("team_1", connector, Handlers::new());
    wait_status(&registry, "project_1", ChannelStatus::Open).await;
    wait_status(&registry, "team_1", ChannelStatus::Open).await;

    assert_eq!(registry.len(), 2);
    assert_eq!(probe.dial_count(), 2);

    registry.disconnect_all();
    assert!(registry.is_empty());
}

#[tokio::test]
async fn disconnect_is_idempotent_and_tolerates_unknown_names() {
    let mut registry = ChannelRegistry::new();
    registry.connect("team_9", MockConnector::always(vec![]), Handlers::new());
    wait_status(&registry, "team_9", ChannelStatus::Open).await;

    registry.disconnect("team_9");
    registry.disconnect("team_9");
    registry.disconnect("never_connected");

    assert!(registry.is_empty());
    assert_eq!(registry.status("team_9"), None);
}

#[tokio::test]
async fn disconnect_cancels_a_pending_reconnect() {
    // The dial always fails; with a long base delay the channel parks in
    // Reconnecting.
    let config = RegistryConfig {
        base_delay: Duration::from_secs(60),
        max_delay: Duration::from_secs(60),
        retry: RetryPolicy::Unbounded,
    };
    let mut registry = ChannelRegistry::with_config(config);
    let connector = MockConnector::new(vec![common::dial_failure()]);
    let probe = connector.clone();

    registry.connect("project_3", connector, Handlers::new());
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            if matches!(
                registry.status("project_3"),
                Some(ChannelStatus::Reconnecting { .. })
            ) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    registry.disconnect("project_3");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(probe.dial_count(), 1, "no redial after disconnect");
}

#[tokio::test]
async fn send_is_best_effort() {
    let mut registry = ChannelRegistry::new();

    // Unknown channel.
    assert!(!registry.send("notifications", ClientMessage::Ping));

    // Known and open channel.
    let connector = MockConnector::always(vec![]);
    let probe = connector.clone();
    registry.connect("notifications", connector, Handlers::new());
    wait_status(&registry, "notifications", ChannelStatus::Open).await;

    assert!(registry.send("notifications", ClientMessage::FetchUnreadCount));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        probe.sent_frames(),
        vec![r#"{"type":"fetch_unread_count"}"#.to_string()]
    );

    registry.disconnect_all();
}

#[tokio::test]
async fn clean_close_removes_the_entry_and_frees_the_name() {
    let mut registry = ChannelRegistry::new();
    // Transport closes cleanly right away; the entry becomes terminal.
    let connector = MockConnector::new(vec![Ok(vec![None]), Ok(vec![])]);
    let probe = connector.clone();

    registry.connect("chat", connector.clone(), Handlers::new());

    // A cleanly closed channel drops out of every read: no status, no name,
    // an empty registry.
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            if registry.status("chat").is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("closed channel still registered");
    assert!(registry.is_empty());
    assert_eq!(registry.names().count(), 0);
    assert!(!registry.send("chat", ClientMessage::Ping));

    // The freed name dials fresh on the next connect.
    registry.connect("chat", connector, Handlers::new());
    wait_status(&registry, "chat", ChannelStatus::Open).await;
    assert_eq!(probe.dial_count(), 2);

    registry.disconnect_all();
}
