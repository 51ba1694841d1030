//! Scriptable in-memory dialer for tests: every `dial` hands the test a
//! [`MockConnection`] controller that injects inbound traffic and
//! observes outbound commands.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;

use super::{Dialer, Outgoing, SocketEvent, SocketHandle, TransportError};

/// Test-side controller for one mocked socket.
pub struct MockConnection {
    pub url: Url,
    events: mpsc::UnboundedSender<SocketEvent>,
    outgoing: mpsc::UnboundedReceiver<Outgoing>,
}

impl MockConnection {
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.events.send(SocketEvent::Text(text.into()));
    }

    pub fn send_binary(&self, bytes: impl Into<Bytes>) {
        let _ = self.events.send(SocketEvent::Binary(bytes.into()));
    }

    pub fn fail(&self, message: impl Into<String>) {
        let _ = self.events.send(SocketEvent::Failed(message.into()));
    }

    pub fn close(&self, code: u16) {
        let _ = self.events.send(SocketEvent::Closed { code });
    }

    /// Next outbound command, or `None` once the manager side is gone.
    pub async fn recv_outgoing(&mut self) -> Option<Outgoing> {
        self.outgoing.recv().await
    }

    /// Drain whatever outbound traffic is already queued.
    pub fn drain_outgoing(&mut self) -> Vec<Outgoing> {
        let mut drained = Vec::new();
        while let Ok(command) = self.outgoing.try_recv() {
            drained.push(command);
        }
        drained
    }
}

/// Dialer that parks a [`MockConnection`] controller on an mpsc channel
/// for every successful dial. Set `refuse_next` to make upcoming dials
/// fail without producing a connection.
pub struct MockDialer {
    connections: mpsc::UnboundedSender<MockConnection>,
    refuse: Mutex<u32>,
}

impl MockDialer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockConnection>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                connections: tx,
                refuse: Mutex::new(0),
            },
            rx,
        )
    }

    /// Make the next `count` dials fail with a connect error.
    pub fn refuse_next(&self, count: u32) {
        *self.refuse.lock() = count;
    }
}

#[async_trait]
impl Dialer for MockDialer {
    async fn dial(&self, url: &Url) -> Result<SocketHandle, TransportError> {
        {
            let mut refuse = self.refuse.lock();
            if *refuse > 0 {
                *refuse -= 1;
                return Err(TransportError::Connect("connection refused".to_string()));
            }
        }
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let _ = self.connections.send(MockConnection {
            url: url.clone(),
            events: event_tx,
            outgoing: outgoing_rx,
        });
        Ok(SocketHandle {
            outgoing: outgoing_tx,
            events: event_rx,
        })
    }
}
