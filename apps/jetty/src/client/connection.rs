//! The Connection Manager: owns the one live socket for its target,
//! drives the lifecycle state machine and bounded reconnection, and
//! fans decoded traffic out on the event bus.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use sync_bus::{EventBus, SubscriptionId};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::config::{Config, Target};
use crate::geometry::Viewport;
use crate::protocol::{ClientMessage, Frame, ServerMessage, decode_frame};
use crate::transport::{
    Dialer, NORMAL_CLOSURE, Outgoing, SocketEvent, SocketHandle, WebSocketDialer,
};

/// Lifecycle/dispatch topics the manager publishes on, alongside the
/// per-type control topics from [`ServerMessage::topic`].
pub mod topics {
    pub const CONNECTED: &str = "connected";
    pub const DISCONNECTED: &str = "disconnected";
    pub const ERROR: &str = "error";
    pub const FRAME: &str = "frame";
    pub const UNHANDLED: &str = "unhandled";
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events delivered to bus subscribers. Treat payloads as immutable
/// snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Connected,
    Disconnected,
    Error { message: String },
    Frame(Frame),
    Control(ServerMessage),
    Unhandled { raw: String },
}

#[derive(Default)]
struct ConnState {
    status: ConnectionStatus,
    target: Option<Target>,
    attempt: u32,
    intentional: bool,
    generation: u64,
    outgoing: Option<tokio::sync::mpsc::UnboundedSender<Outgoing>>,
    reconnect_timer: Option<tokio::task::JoinHandle<()>>,
}

struct Inner {
    config: Config,
    dialer: Arc<dyn Dialer>,
    bus: EventBus<SyncEvent>,
    state: Mutex<ConnState>,
    // Bumped on every teardown so stale socket tasks and timers see
    // they have been superseded.
    generation: watch::Sender<u64>,
    viewport: RwLock<Option<Viewport>>,
}

/// Cheap to clone; all clones share the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(config: Config, dialer: Arc<dyn Dialer>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                dialer,
                bus: EventBus::new(),
                state: Mutex::new(ConnState::default()),
                generation: watch::Sender::new(0),
                viewport: RwLock::new(None),
            }),
        }
    }

    /// Production constructor: WebSocket transport.
    pub fn with_websocket(config: Config) -> Self {
        Self::new(config, Arc::new(WebSocketDialer))
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.state.lock().status
    }

    pub fn target(&self) -> Option<Target> {
        self.inner.state.lock().target.clone()
    }

    /// Latest viewport seen in a frame header, if any frame arrived yet.
    pub fn viewport(&self) -> Option<Viewport> {
        *self.inner.viewport.read()
    }

    pub fn on<F>(&self, topic: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.inner.bus.on(topic, callback)
    }

    pub fn off(&self, topic: &str, id: SubscriptionId) {
        self.inner.bus.off(topic, id);
    }

    /// Open a connection to `target`. No-op when already connected to
    /// the same target; an existing connection to a different target is
    /// torn down first. Resets the reconnect budget.
    pub fn connect(&self, target: Target) {
        {
            let state = self.inner.state.lock();
            if state.status == ConnectionStatus::Connected
                && state.target.as_ref() == Some(&target)
            {
                trace!(?target, "connect: already connected");
                return;
            }
        }
        self.disconnect();

        let generation = {
            let mut state = self.inner.state.lock();
            state.target = Some(target.clone());
            state.intentional = false;
            state.attempt = 0;
            state.status = ConnectionStatus::Connecting;
            state.generation
        };
        debug!(?target, "connecting");
        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_connection(target, generation).await;
        });
    }

    /// Idempotent teardown: cancels any pending reconnect, closes the
    /// socket with the normal code, settles to `Disconnected`.
    pub fn disconnect(&self) {
        let emit = {
            let mut state = self.inner.state.lock();
            state.intentional = true;
            self.teardown_locked(&mut state);
            let was = state.status;
            state.status = ConnectionStatus::Disconnected;
            state.target = None;
            was != ConnectionStatus::Disconnected
        };
        if emit {
            info!("disconnected");
            self.inner
                .bus
                .publish(topics::DISCONNECTED, &SyncEvent::Disconnected);
        }
    }

    /// Serialize and write `message` if connected; otherwise a silent
    /// drop — this is a best-effort control channel, not guaranteed
    /// delivery. Returns whether the message was handed to the socket.
    pub fn send(&self, message: &ClientMessage) -> bool {
        let outgoing = {
            let state = self.inner.state.lock();
            if state.status != ConnectionStatus::Connected {
                trace!(status = ?state.status, "dropping send while not connected");
                return false;
            }
            state.outgoing.clone()
        };
        let Some(outgoing) = outgoing else {
            return false;
        };
        match serde_json::to_string(message) {
            Ok(json) => outgoing.send(Outgoing::Text(json)).is_ok(),
            Err(err) => {
                warn!(error = %err, "failed to serialize control message");
                false
            }
        }
    }

    // Must hold the state lock. Leaves status/target untouched.
    fn teardown_locked(&self, state: &mut ConnState) {
        if let Some(timer) = state.reconnect_timer.take() {
            timer.abort();
        }
        if let Some(outgoing) = state.outgoing.take() {
            let _ = outgoing.send(Outgoing::Close);
        }
        state.generation += 1;
        self.inner.generation.send_replace(state.generation);
    }

    async fn run_connection(self, target: Target, generation: u64) {
        let url = match self.inner.config.socket_url(&target) {
            Ok(url) => url,
            Err(err) => {
                warn!(error = %err, "cannot derive socket url");
                let mut state = self.inner.state.lock();
                if state.generation == generation {
                    state.status = ConnectionStatus::Error;
                }
                drop(state);
                self.publish_error(format!("invalid socket url: {err}"));
                return;
            }
        };

        match self.inner.dialer.dial(&url).await {
            Ok(handle) => self.run_socket(handle, generation).await,
            Err(err) => {
                warn!(error = %err, %url, "dial failed");
                self.publish_error(err.to_string());
                self.handle_close(generation, None);
            }
        }
    }

    async fn run_socket(&self, handle: SocketHandle, generation: u64) {
        let SocketHandle {
            outgoing,
            mut events,
        } = handle;

        let mut generation_rx = self.inner.generation.subscribe();
        {
            let mut state = self.inner.state.lock();
            if state.generation != generation || state.intentional {
                let _ = outgoing.send(Outgoing::Close);
                return;
            }
            state.status = ConnectionStatus::Connected;
            state.attempt = 0;
            state.outgoing = Some(outgoing.clone());
        }
        // Teardown may have raced the registration above.
        if *generation_rx.borrow_and_update() != generation {
            let _ = outgoing.send(Outgoing::Close);
            return;
        }

        info!("connected");
        self.inner.bus.publish(topics::CONNECTED, &SyncEvent::Connected);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(SocketEvent::Binary(bytes)) => self.handle_binary(&bytes),
                    Some(SocketEvent::Text(text)) => self.handle_text(&text),
                    Some(SocketEvent::Failed(message)) => {
                        // Transport error: surface it, let the close
                        // event that follows drive recovery.
                        warn!(error = %message, "socket error");
                        self.publish_error(message);
                    }
                    Some(SocketEvent::Closed { code }) => {
                        self.handle_close(generation, Some(code));
                        return;
                    }
                    None => {
                        self.handle_close(generation, None);
                        return;
                    }
                },
                _ = generation_rx.changed() => {
                    if *generation_rx.borrow_and_update() != generation {
                        let _ = outgoing.send(Outgoing::Close);
                        return;
                    }
                }
            }
        }
    }

    fn handle_binary(&self, bytes: &[u8]) {
        match decode_frame(bytes) {
            Ok(frame) => {
                let viewport = Viewport {
                    width: frame.width,
                    height: frame.height,
                };
                let changed = {
                    let mut current = self.inner.viewport.write();
                    if *current == Some(viewport) {
                        false
                    } else {
                        *current = Some(viewport);
                        true
                    }
                };
                if changed {
                    debug!(width = viewport.width, height = viewport.height, "viewport changed");
                }
                self.inner.bus.publish(topics::FRAME, &SyncEvent::Frame(frame));
            }
            Err(err) => warn!(error = %err, "dropping invalid binary frame"),
        }
    }

    fn handle_text(&self, text: &str) {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(ServerMessage::Unknown) => {
                trace!(raw = text, "unhandled control message type");
                self.inner.bus.publish(
                    topics::UNHANDLED,
                    &SyncEvent::Unhandled {
                        raw: text.to_string(),
                    },
                );
            }
            Ok(message) => {
                let topic = message.topic();
                trace!(topic, "control message");
                self.inner.bus.publish(topic, &SyncEvent::Control(message));
            }
            Err(err) => warn!(error = %err, "dropping malformed control message"),
        }
    }

    /// Close handling: intentional or normal closes settle; abnormal
    /// closes burn one reconnect attempt each until the budget is
    /// exhausted. `code` is `None` when the socket died without a close
    /// frame, which counts as abnormal.
    fn handle_close(&self, generation: u64, code: Option<u16>) {
        enum Followup {
            Settled,
            Retry,
            Exhausted,
        }

        let policy = self.inner.config.reconnect;
        let followup = {
            let mut state = self.inner.state.lock();
            if state.generation != generation {
                return; // superseded by a newer connect/disconnect
            }
            state.outgoing = None;
            if state.intentional || code == Some(NORMAL_CLOSURE) {
                let was = state.status;
                state.status = ConnectionStatus::Disconnected;
                if was == ConnectionStatus::Disconnected {
                    return;
                }
                Followup::Settled
            } else if state.attempt < policy.max_attempts {
                state.attempt += 1;
                state.status = ConnectionStatus::Connecting;
                let attempt = state.attempt;
                let target = state
                    .target
                    .clone()
                    .expect("connecting state always has a target");
                debug!(attempt, max = policy.max_attempts, "scheduling reconnect");
                let manager = self.clone();
                state.reconnect_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(policy.delay).await;
                    let proceed = {
                        let mut state = manager.inner.state.lock();
                        if state.generation != generation || state.intentional {
                            false
                        } else {
                            state.reconnect_timer = None;
                            true
                        }
                    };
                    if proceed {
                        manager.run_connection(target, generation).await;
                    }
                }));
                Followup::Retry
            } else {
                state.status = ConnectionStatus::Error;
                Followup::Exhausted
            }
        };

        match followup {
            Followup::Settled => {
                info!("disconnected");
                self.inner
                    .bus
                    .publish(topics::DISCONNECTED, &SyncEvent::Disconnected);
            }
            Followup::Retry => {}
            Followup::Exhausted => {
                warn!(attempts = policy.max_attempts, "reconnect budget exhausted");
                self.publish_error("reconnect attempts exhausted".to_string());
            }
        }
    }

    fn publish_error(&self, message: String) {
        self.inner
            .bus
            .publish(topics::ERROR, &SyncEvent::Error { message });
    }
}
