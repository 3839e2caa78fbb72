#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Chat degradation tests: socket/polling handoff in both directions and
//! duplicate suppression across the two sources.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pulseboard_client::chat::{ChatChannel, ChatConfig, ChatStatus};
use pulseboard_client::polling::PollClient;
use pulseboard_client::protocol::{ChatMessage, ChatSender, PollResponse, PolledMessage};
use pulseboard_client::views::ChatLog;
use pulseboard_client::RealtimeError;

use common::{dial_failure, new_message_json, MockConnector};

fn fast_config() -> ChatConfig {
    ChatConfig {
        reconnect_delay: Duration::from_millis(15),
        max_attempts: 2,
        ping_interval: Duration::from_secs(30),
        poll_interval: Duration::from_millis(15),
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

/// Poll client that serves messages newer than the requested id from a
/// fixed backlog, like the real endpoint.
struct BacklogPollClient {
    backlog: Vec<PolledMessage>,
}

#[async_trait]
impl PollClient for BacklogPollClient {
    async fn fetch(&self, last_message_id: u64) -> Result<PollResponse, RealtimeError> {
        let new_messages = self
            .backlog
            .iter()
            .filter(|m| m.message.id.is_some_and(|id| id > last_message_id))
            .cloned()
            .collect();
        Ok(PollResponse {
            success: true,
            new_messages,
        })
    }
}

fn backlog(messages: Vec<PolledMessage>) -> Arc<BacklogPollClient> {
    Arc::new(BacklogPollClient { backlog: messages })
}

async fn wait_status(chat: &ChatChannel, want: ChatStatus) {
    let mut rx = chat.watch_status();
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            if *rx.borrow() == want {
                return;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("chat status not reached in time");
}

#[tokio::test]
async fn no_room_id_means_polling_from_the_start() {
    let log = Arc::new(Mutex::new(ChatLog::new()));
    let chat = ChatChannel::polling_only(
        backlog(vec![polled(1, "hello")]),
        Arc::clone(&log),
        fast_config(),
    );

    assert_eq!(chat.status(), ChatStatus::PollingOnly);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(log.lock().unwrap().messages().len(), 1);

    chat.shutdown();
}

#[tokio::test]
async fn socket_drop_hands_over_to_polling_and_back() {
    let log = Arc::new(Mutex::new(ChatLog::new()));
    // Open with one pushed message, drop abnormally, then reopen with
    // another pushed message.
    let connector = MockConnector::new(vec![
        Ok(vec![
            Some(Ok(new_message_json(1, "over socket"))),
            Some(Err(RealtimeError::TransportReceive("reset".into()))),
        ]),
        Ok(vec![Some(Ok(new_message_json(3, "socket again")))]),
    ]);

    // While the socket is down, polling serves message 2. The reconnect
    // delay dwarfs the poll interval so polling is guaranteed a turn.
    let config = ChatConfig {
        reconnect_delay: Duration::from_millis(120),
        poll_interval: Duration::from_millis(10),
        ..fast_config()
    };
    let chat = ChatChannel::connect(
        connector,
        backlog(vec![polled(1, "dup"), polled(2, "over polling")]),
        Arc::clone(&log),
        config,
    );

    // End state: reconnected, poller off, every message rendered once.
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            if chat.status() == ChatStatus::Connected
                && log.lock().unwrap().messages().len() == 3
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!chat.is_polling());

    let log = log.lock().unwrap();
    let ids: Vec<_> = log.messages().iter().filter_map(|m| m.message.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    chat.shutdown();
}

#[tokio::test]
async fn duplicate_ids_across_sources_render_once() {
    let log = Arc::new(Mutex::new(ChatLog::new()));
    // The socket pushes ids 1 and 2; polling keeps offering 2 and 3 while
    // the socket is briefly down.
    let connector = MockConnector::new(vec![
        Ok(vec![
            Some(Ok(new_message_json(1, "one"))),
            Some(Ok(new_message_json(2, "two"))),
            Some(Err(RealtimeError::TransportReceive("reset".into()))),
        ]),
        Ok(vec![]),
    ]);

    let config = ChatConfig {
        reconnect_delay: Duration::from_millis(120),
        poll_interval: Duration::from_millis(10),
        ..fast_config()
    };
    let chat = ChatChannel::connect(
        connector,
        backlog(vec![polled(2, "two again"), polled(3, "three")]),
        Arc::clone(&log),
        config,
    );

    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            if chat.status() == ChatStatus::Connected
                && log.lock().unwrap().last_message_id() >= 3
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let log = log.lock().unwrap();
    let ids: Vec<_> = log.messages().iter().filter_map(|m| m.message.id).collect();
    assert_eq!(ids, vec![1, 2, 3], "each id rendered exactly once");

    chat.shutdown();
}

#[tokio::test]
async fn exhausted_reconnects_leave_polling_as_the_only_source() {
    let log = Arc::new(Mutex::new(ChatLog::new()));
    let connector = MockConnector::new(vec![dial_failure(), dial_failure(), dial_failure()]);

    let chat = ChatChannel::connect(
        connector,
        backlog(vec![polled(5, "still flowing")]),
        Arc::clone(&log),
        fast_config(),
    );

    wait_status(&chat, ChatStatus::PollingOnly).await;
    assert!(chat.is_polling());

    tokio::time::sleep(Duration::from_millis(60)).await;
    {
        let log = log.lock().unwrap();
        assert_eq!(log.messages().len(), 1);
        assert!(log.banner().is_some(), "degraded state shows a banner");
    }

    chat.shutdown();
}

#[tokio::test]
async fn reconnect_banner_counts_attempts() {
    let log = Arc::new(Mutex::new(ChatLog::new()));
    // First dial fails; the second hangs (script exhausted) so the channel
    // parks after announcing the retry.
    let connector = MockConnector::new(vec![dial_failure()]);

    let chat = ChatChannel::connect(
        connector,
        backlog(vec![]),
        Arc::clone(&log),
        fast_config(),
    );

    wait_status(&chat, ChatStatus::Reconnecting { attempt: 1 }).await;
    let banner = log.lock().unwrap().banner().unwrap().to_string();
    assert!(banner.contains("1/2"), "{banner}");

    chat.shutdown();
}
