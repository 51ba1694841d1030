//! Socket abstraction the Connection Manager runs on: a [`Dialer`]
//! produces a [`SocketHandle`], a pair of channel endpoints bridged to
//! the real socket by a pump task. The WebSocket dialer is the
//! production implementation; the mock dialer scripts connections for
//! tests.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use url::Url;

pub mod mock;
pub mod websocket;

pub use websocket::WebSocketDialer;

/// Normal/intentional closure; anything else triggers the reconnect
/// policy.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Synthetic code for a connection that dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Inbound socket traffic, in receipt order. `Failed` reports a
/// transport error without ending the stream; `Closed` always
/// terminates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Binary(Bytes),
    Text(String),
    Failed(String),
    Closed { code: u16 },
}

/// Outbound commands accepted by the socket pump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Text(String),
    /// Close the socket with the normal-closure code.
    Close,
}

/// One live socket: an outgoing command channel and the inbound event
/// stream. Dropping the handle tears the socket down.
pub struct SocketHandle {
    pub outgoing: mpsc::UnboundedSender<Outgoing>,
    pub events: mpsc::UnboundedReceiver<SocketEvent>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
}

/// Opens sockets. Abstracted so the Connection Manager can run against
/// scripted connections in tests.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, url: &Url) -> Result<SocketHandle, TransportError>;
}
