//! # Pulseboard Client
//!
//! Async Rust client for the Pulseboard realtime update channels:
//! notifications, the owner dashboard, per-project and per-team updates, and
//! chat with an HTTP polling fallback.
//!
//! The server pushes JSON text frames tagged by a `type` field; this crate
//! keeps one reconnecting connection per channel, parses the frames, and
//! patches plain data view models that the embedding application renders
//! however it likes.
//!
//! ## Features
//!
//! - **Transport-agnostic** — implement the [`Transport`] trait for any
//!   backend; the default `transport-websocket` feature provides
//!   [`WebSocketTransport`](transports::WebSocketTransport)
//! - **Automatic reconnection** — exponential backoff per channel, with
//!   observable [`ChannelStatus`] transitions
//! - **Graceful degradation** — chat falls back to HTTP polling (the
//!   `polling-http` feature) whenever its socket is down, without
//!   duplicating messages
//! - **Data-only views** — handlers mutate view models, never a UI
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::{Arc, Mutex};
//! use pulseboard_client::endpoint::{paths, PageOrigin};
//! use pulseboard_client::channels;
//! use pulseboard_client::registry::ChannelRegistry;
//! use pulseboard_client::views::NotificationPanel;
//!
//! # #[cfg(feature = "transport-websocket")]
//! # async fn run() {
//! let origin = PageOrigin::new("app.example.com", true);
//! let panel = Arc::new(Mutex::new(NotificationPanel::new()));
//!
//! let mut registry = ChannelRegistry::new();
//! channels::notifications::connect(&mut registry, &origin, Arc::clone(&panel));
//! # }
//! ```

pub mod backoff;
pub mod channels;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod page;
pub mod protocol;
pub mod transport;
pub mod transports;
pub mod views;

// Background channel tasks need a runtime; everything above is plain types
// and traits usable from any executor.
#[cfg(feature = "tokio-runtime")]
pub mod channel;
#[cfg(feature = "tokio-runtime")]
pub mod chat;
#[cfg(feature = "tokio-runtime")]
pub mod polling;
#[cfg(feature = "tokio-runtime")]
pub mod registry;

// Re-export primary types for ergonomic imports.
pub use backoff::{Backoff, RetryPolicy};
pub use dispatch::{ChannelSender, Handlers};
pub use endpoint::PageOrigin;
pub use error::{RealtimeError, Result};
pub use protocol::{ClientMessage, ServerEvent};
pub use transport::{Connector, Transport};

#[cfg(feature = "tokio-runtime")]
pub use channel::{ChannelConfig, ChannelHandle, ChannelStatus};
#[cfg(feature = "tokio-runtime")]
pub use chat::{ChatChannel, ChatConfig, ChatStatus};
#[cfg(feature = "tokio-runtime")]
pub use registry::{ChannelRegistry, RegistryConfig};
