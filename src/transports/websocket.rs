//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] speaks the text-frame protocol over a WebSocket
//! connection; both `ws://` and `wss://` URLs are supported, with TLS handled
//! transparently via [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//! [`WebSocketConnector`] holds a channel URL and dials a fresh transport for
//! every (re)connect attempt.
//!
//! Only available when the `transport-websocket` feature is enabled (default).

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::RealtimeError;
use crate::transport::{Connector, Transport};

/// Type alias for the underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] backed by a WebSocket connection.
///
/// A clean server close (close frame) surfaces as `recv() -> None`; protocol
/// and I/O failures surface as `Some(Err(_))`, which the channel treats as an
/// abnormal closure and retries.
///
/// # Cancel Safety
///
/// `recv` is cancel-safe: dropping its future before completion does not
/// consume or lose frames, so it is safe inside `tokio::select!`.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Establish a new WebSocket connection to the given URL.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Io`] if the URL is invalid or the connection
    /// cannot be established. When the underlying error is an I/O error its
    /// [`ErrorKind`](std::io::ErrorKind) is preserved; all other errors map
    /// to [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, RealtimeError> {
        tracing::debug!(url = %url, "dialing channel endpoint");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            RealtimeError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::debug!(url = %url, "channel endpoint connected");

        Ok(Self {
            stream,
            closed: false,
        })
    }

    /// Wrap an already-established WebSocket stream.
    ///
    /// Useful when the connection needs custom TLS configuration or headers
    /// that [`connect`](Self::connect) does not expose.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: String) -> Result<(), RealtimeError> {
        if self.closed {
            return Err(RealtimeError::TransportClosed);
        }
        self.stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| RealtimeError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, RealtimeError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(RealtimeError::TransportReceive(e.to_string())));
                }
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "received WebSocket close frame");
                    return None;
                }
                Message::Ping(_) | Message::Pong(_) => {
                    // tungstenite auto-queues a Pong reply for Pings; the
                    // application-level ping/pong travels as text frames.
                }
                Message::Binary(_) => {
                    tracing::warn!("skipping unexpected binary WebSocket frame");
                }
                Message::Frame(_) => {
                    // Never produced by the read half; kept for exhaustiveness.
                    tracing::debug!("skipping raw WebSocket frame");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), RealtimeError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // close(None) sends a normal-closure code, signalling an intentional
        // disconnect to the server.
        self.stream
            .close(None)
            .await
            .map_err(|e| RealtimeError::TransportSend(e.to_string()))
    }
}

/// A [`Connector`] that dials a fixed channel URL.
///
/// Built by the channel factories from a
/// [`PageOrigin`](crate::endpoint::PageOrigin) and a channel path; the
/// registry re-dials through it on every reconnect attempt.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    /// Create a connector for the given channel URL (`ws://` or `wss://`).
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// The URL this connector dials.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self) -> Result<Self::Transport, RealtimeError> {
        WebSocketTransport::connect(&self.url).await
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

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let result = WebSocketTransport::connect("not-a-valid-url").await;
        assert!(matches!(result.unwrap_err(), RealtimeError::Io(_)));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let result = WebSocketTransport::connect("ws://127.0.0.1:1").await;
        assert!(matches!(result.unwrap_err(), RealtimeError::Io(_)));
    }

    // ── Mock-server helpers ─────────────────────────────────────────

    use tokio::net::TcpListener;

    /// Start a local WebSocket server that runs `handler` on the accepted
    /// connection and returns the address to connect to.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn recv_receives_text_frames_in_order() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text(r#"{"type":"pong"}"#.into()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"{"type":"unread_count","count":2}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), r#"{"type":"pong"}"#);
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            r#"{"type":"unread_count","count":2}"#
        );
    }

    #[tokio::test]
    async fn recv_returns_none_on_close_frame() {
        let url = start_mock_server(|mut ws| async move {
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_skips_binary_frames() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text("after_binary".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "after_binary");
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url = start_mock_server(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("oops".to_string()).await.unwrap_err();
        assert!(matches!(err, RealtimeError::TransportClosed));
    }

    #[tokio::test]
    async fn double_close_is_idempotent() {
        let url =
            start_mock_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn connector_dials_fresh_transports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            // Accept two successive connections, greet each, and hang up.
            for greeting in ["first", "second"] {
                let (tcp, _) = listener.accept().await.unwrap();
                let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
                ws.send(Message::Text(greeting.into())).await.unwrap();
                ws.close(None).await.unwrap();
            }
        });

        let connector = WebSocketConnector::new(format!("ws://{addr}"));

        let mut first = connector.connect().await.unwrap();
        assert_eq!(first.recv().await.unwrap().unwrap(), "first");
        assert!(first.recv().await.is_none());

        let mut second = connector.connect().await.unwrap();
        assert_eq!(second.recv().await.unwrap().unwrap(), "second");
    }
}
