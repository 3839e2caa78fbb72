//! Transport abstraction for realtime channels.
//!
//! The [`Transport`] trait defines a bidirectional text frame stream between
//! the client and server. The protocol uses JSON text frames, so every
//! transport implementation handles framing internally (WebSocket frames
//! here; anything that delivers whole text messages works).
//!
//! Reconnection re-dials through a [`Connector`], which produces a fresh
//! [`Transport`] for every attempt. Tests script connectors that fail a few
//! times before succeeding, or hand out pre-wired mock transports.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use pulseboard_client::error::RealtimeError;
//! use pulseboard_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, frame: String) -> Result<(), RealtimeError> {
//!         // Send one complete JSON text frame
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, RealtimeError>> {
//!         // Receive the next frame; None = clean close
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), RealtimeError> {
//!         // Gracefully shut down the connection
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::RealtimeError;

/// A bidirectional text frame transport for one realtime channel.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON frame;
/// each call to [`recv`](Transport::recv) yields one complete JSON frame.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because the
/// channel task polls it inside `tokio::select!`. If `recv` is cancelled
/// before completion, calling it again must not lose frames.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text frame to the server.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::TransportSend`] if the frame could not be
    /// sent (connection broken, write buffer full).
    async fn send(&mut self, frame: String) -> Result<(), RealtimeError>;

    /// Receive the next JSON text frame from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — a complete frame was received
    /// - `Some(Err(e))` — a transport error occurred (abnormal closure)
    /// - `None` — the connection was closed cleanly
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe (see [trait documentation](Transport)).
    async fn recv(&mut self) -> Option<Result<String, RealtimeError>>;

    /// Close the transport connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations
    /// should still release resources when the close handshake fails.
    async fn close(&mut self) -> Result<(), RealtimeError>;
}

/// Dials a fresh [`Transport`] for a channel.
///
/// A channel keeps its connector for its whole lifetime and re-dials through
/// it on every reconnect attempt, so the connector must be reusable.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The transport this connector produces.
    type Transport: Transport;

    /// Establish a new connection.
    ///
    /// # Errors
    ///
    /// Returns an error when the dial fails; the channel treats this like an
    /// abnormal closure and schedules a retry.
    async fn connect(&self) -> Result<Self::Transport, RealtimeError>;
}
