//! Concrete [`Transport`](crate::Transport) implementations behind feature
//! gates.
//!
//! | Feature                | Types                                        |
//! |------------------------|----------------------------------------------|
//! | `transport-websocket`  | [`WebSocketTransport`], [`WebSocketConnector`] |

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};
