//! Error types for the Pulseboard realtime client.

use thiserror::Error;

/// Errors that can occur when using the Pulseboard realtime client.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol frame.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an open channel, but the channel
    /// is not open.
    #[error("channel not open")]
    NotConnected,

    /// The polling endpoint returned an error or an unusable body.
    #[error("poll error: {0}")]
    Poll(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for realtime client operations.
pub type Result<T> = std::result::Result<T, RealtimeError>;
