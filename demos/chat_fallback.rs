//! # Chat Fallback Example
//!
//! Demonstrates chat's graceful degradation without a server: the socket
//! connector always fails, so after the capped reconnect attempts the room
//! lands in polling-only mode and keeps receiving messages from a simulated
//! polling endpoint.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example chat_fallback
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pulseboard_client::chat::{ChatChannel, ChatConfig};
use pulseboard_client::polling::PollClient;
use pulseboard_client::protocol::{ChatMessage, ChatSender, PollResponse, PolledMessage};
use pulseboard_client::views::ChatLog;
use pulseboard_client::{Connector, RealtimeError, Transport};

/// A connector standing in for an unreachable chat server.
struct UnreachableConnector;

/// Never constructed; the dial always fails.
struct NeverTransport;

#[async_trait]
impl Transport for NeverTransport {
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
impl Connector for UnreachableConnector {
    type Transport = NeverTransport;

    async fn connect(&self) -> Result<Self::Transport, RealtimeError> {
        Err(RealtimeError::TransportClosed)
    }
}

/// Simulated polling endpoint that produces one new message per fetch.
struct SimulatedRoom {
    next_id: AtomicU64,
}

#[async_trait]
impl PollClient for SimulatedRoom {
    async fn fetch(&self, last_message_id: u64) -> Result<PollResponse, RealtimeError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("poll request with last_message={last_message_id}");
        Ok(PollResponse {
            success: true,
            new_messages: vec![PolledMessage {
                message: ChatMessage {
                    id: Some(id),
                    content: format!("simulated message #{id}"),
                    attachment: None,
                    attachment_name: None,
                    is_edited: false,
                },
                sender: ChatSender {
                    first_name: "Poll".into(),
                    last_name: "Bot".into(),
                },
                timestamp: "now".into(),
            }],
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let log = Arc::new(Mutex::new(ChatLog::new()));
    let config = ChatConfig {
        reconnect_delay: Duration::from_millis(500),
        max_attempts: 3,
        poll_interval: Duration::from_secs(1),
        ..ChatConfig::default()
    };

    let chat = ChatChannel::connect(
        UnreachableConnector,
        Arc::new(SimulatedRoom {
            next_id: AtomicU64::new(1),
        }),
        Arc::clone(&log),
        config,
    );
    let mut status = chat.watch_status();

    // Watch the degradation unfold for a few seconds.
    let run = async {
        loop {
            tracing::info!("chat status: {:?}", *status.borrow());
            if let Ok(log) = log.lock() {
                if let Some(banner) = log.banner() {
                    tracing::info!("banner: {banner}");
                }
                for message in log.messages() {
                    tracing::info!(
                        "[{}] {} {}: {}",
                        message.timestamp,
                        message.sender.first_name,
                        message.sender.last_name,
                        message.message.content
                    );
                }
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    };

    tokio::select! {
        _ = run => {}
        _ = tokio::time::sleep(Duration::from_secs(8)) => {
            tracing::info!("done");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received");
        }
    }

    chat.shutdown();
    Ok(())
}
