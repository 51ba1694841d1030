//! Input forwarding: local pointer/keyboard events in, throttled and
//! coordinate-mapped control messages out.
//!
//! The capability interface is an `mpsc` channel of [`InputEvent`]s: a
//! browser shell binds its DOM listeners to it, tests feed synthetic
//! events. The host surface is expected to suppress its own default
//! wheel handling once it hands events over.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::trace;

use super::connection::{ConnectionManager, ConnectionStatus};
use crate::geometry::{DisplayRect, map_to_remote};
use crate::protocol::{ClientMessage, button_name};

/// Keyboard modifier state at event time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

/// Raw local input. Pointer events carry the capture surface's current
/// rect so mapping always uses live dimensions.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    PointerMove {
        x: f64,
        y: f64,
        rect: DisplayRect,
    },
    PointerDown {
        x: f64,
        y: f64,
        rect: DisplayRect,
        button: u8,
    },
    PointerUp {
        x: f64,
        y: f64,
        rect: DisplayRect,
        button: u8,
    },
    /// Pointer left the capture surface: cancels any buffered move.
    PointerLeave,
    Wheel {
        x: f64,
        y: f64,
        rect: DisplayRect,
        delta_x: f64,
        delta_y: f64,
        delta_z: f64,
    },
    KeyDown {
        key: String,
        code: String,
        modifiers: Modifiers,
        repeat: bool,
    },
    KeyUp {
        key: String,
        code: String,
        modifiers: Modifiers,
    },
}

/// Forwards local input through the Connection Manager. Pointer moves
/// are throttled to one message per throttle window (trailing edge,
/// latest position wins); everything else forwards immediately. All
/// messages are dropped unless the connection is up and the streaming
/// flag is set.
pub struct InputForwarder {
    events: mpsc::UnboundedSender<InputEvent>,
    streaming: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

impl InputForwarder {
    pub fn spawn(manager: ConnectionManager) -> Self {
        let (events, rx) = mpsc::unbounded_channel();
        let streaming = Arc::new(AtomicBool::new(false));
        let throttle = manager.config().pointer_throttle;
        let task = tokio::spawn(run_forwarder(manager, rx, streaming.clone(), throttle));
        Self {
            events,
            streaming,
            task,
        }
    }

    /// Channel the host binds its input source to.
    pub fn handle(&self) -> mpsc::UnboundedSender<InputEvent> {
        self.events.clone()
    }

    pub fn set_streaming(&self, streaming: bool) {
        self.streaming.store(streaming, Ordering::SeqCst);
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }
}

impl Drop for InputForwarder {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_forwarder(
    manager: ConnectionManager,
    mut events: mpsc::UnboundedReceiver<InputEvent>,
    streaming: Arc<AtomicBool>,
    throttle: Duration,
) {
    // At most one buffered move and one armed window at a time.
    let mut pending: Option<(f64, f64, DisplayRect)> = None;
    let window = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(window);
    let mut window_armed = false;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    InputEvent::PointerMove { x, y, rect } => {
                        pending = Some((x, y, rect));
                        if !window_armed {
                            window.as_mut().reset(Instant::now() + throttle);
                            window_armed = true;
                        }
                    }
                    InputEvent::PointerLeave => {
                        pending = None;
                        window_armed = false;
                    }
                    other => forward(&manager, &streaming, other),
                }
            }
            () = &mut window, if window_armed => {
                window_armed = false;
                if let Some((x, y, rect)) = pending.take() {
                    forward_move(&manager, &streaming, x, y, rect);
                }
            }
        }
    }
}

fn gate_open(manager: &ConnectionManager, streaming: &AtomicBool) -> bool {
    streaming.load(Ordering::SeqCst) && manager.status() == ConnectionStatus::Connected
}

fn forward_move(
    manager: &ConnectionManager,
    streaming: &AtomicBool,
    x: f64,
    y: f64,
    rect: DisplayRect,
) {
    if !gate_open(manager, streaming) {
        return;
    }
    let Some(viewport) = manager.viewport() else {
        trace!("dropping pointer move before first frame");
        return;
    };
    let point = map_to_remote(x, y, rect, viewport);
    manager.send(&ClientMessage::MouseMove {
        x: point.x,
        y: point.y,
    });
}

fn forward(manager: &ConnectionManager, streaming: &AtomicBool, event: InputEvent) {
    if !gate_open(manager, streaming) {
        trace!("dropping input event while gated");
        return;
    }
    let message = match event {
        InputEvent::PointerDown { x, y, rect, button } => {
            let Some(viewport) = manager.viewport() else { return };
            let point = map_to_remote(x, y, rect, viewport);
            ClientMessage::MouseDown {
                x: point.x,
                y: point.y,
                button: button_name(button).to_string(),
            }
        }
        InputEvent::PointerUp { x, y, rect, button } => {
            let Some(viewport) = manager.viewport() else { return };
            let point = map_to_remote(x, y, rect, viewport);
            ClientMessage::MouseUp {
                x: point.x,
                y: point.y,
                button: button_name(button).to_string(),
            }
        }
        InputEvent::Wheel {
            x,
            y,
            rect,
            delta_x,
            delta_y,
            delta_z,
        } => {
            let Some(viewport) = manager.viewport() else { return };
            let point = map_to_remote(x, y, rect, viewport);
            ClientMessage::Wheel {
                x: point.x,
                y: point.y,
                delta_x,
                delta_y,
                delta_z,
            }
        }
        InputEvent::KeyDown {
            key,
            code,
            modifiers,
            repeat,
        } => ClientMessage::Keydown {
            key,
            code,
            ctrl_key: modifiers.ctrl,
            alt_key: modifiers.alt,
            shift_key: modifiers.shift,
            meta_key: modifiers.meta,
            repeat,
        },
        InputEvent::KeyUp {
            key,
            code,
            modifiers,
        } => ClientMessage::Keyup {
            key,
            code,
            ctrl_key: modifiers.ctrl,
            alt_key: modifiers.alt,
            shift_key: modifiers.shift,
            meta_key: modifiers.meta,
        },
        InputEvent::PointerMove { .. } | InputEvent::PointerLeave => return,
    };
    manager.send(&message);
}
