use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};
use url::Url;

use super::{ABNORMAL_CLOSURE, Dialer, Outgoing, SocketEvent, SocketHandle, TransportError};

/// WebSocket implementation of [`Dialer`] over `tokio-tungstenite`.
pub struct WebSocketDialer;

#[async_trait]
impl Dialer for WebSocketDialer {
    async fn dial(&self, url: &Url) -> Result<SocketHandle, TransportError> {
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        debug!(%url, "websocket open");

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(pump(stream, outgoing_rx, event_tx));

        Ok(SocketHandle {
            outgoing: outgoing_tx,
            events: event_rx,
        })
    }
}

/// Bridge the split socket to the handle's channels. Ends when the
/// socket closes, errors out, or the handle is dropped.
async fn pump(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    events: mpsc::UnboundedSender<SocketEvent>,
) {
    let (mut sink, mut source) = stream.split();

    let send_task = tokio::spawn(async move {
        while let Some(command) = outgoing.recv().await {
            let message = match command {
                Outgoing::Text(text) => Message::Text(text),
                Outgoing::Close => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "".into(),
                        })))
                        .await;
                    break;
                }
            };
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = source.next().await {
        match message {
            Ok(Message::Binary(data)) => {
                if events.send(SocketEvent::Binary(Bytes::from(data))).is_err() {
                    break;
                }
            }
            Ok(Message::Text(text)) => {
                if events.send(SocketEvent::Text(text)).is_err() {
                    break;
                }
            }
            Ok(Message::Close(frame)) => {
                let code = frame
                    .map(|f| u16::from(f.code))
                    .unwrap_or(ABNORMAL_CLOSURE);
                trace!(code, "websocket closed by peer");
                let _ = events.send(SocketEvent::Closed { code });
                break;
            }
            Ok(_) => {} // Ping/Pong/Frame handled by tungstenite
            Err(err) => {
                // Report the error, then the terminating close; the
                // manager's reconnect policy keys off the close.
                let _ = events.send(SocketEvent::Failed(err.to_string()));
                let _ = events.send(SocketEvent::Closed {
                    code: ABNORMAL_CLOSURE,
                });
                break;
            }
        }
    }

    send_task.abort();
    let _ = send_task.await;
}
