//! Realtime synchronization client for a workflow-automation product:
//! streams a remotely rendered browser to a local surface, forwards
//! local input back, and keeps a reconciled view of workflow execution
//! state across disconnects.
//!
//! The Connection Manager owns the one live socket per logical target
//! and fans decoded traffic out on a typed event bus; everything else
//! (input forwarding, rendering, state sync) subscribes to it.

pub mod client;
pub mod config;
pub mod geometry;
pub mod protocol;
pub mod sync;
pub mod transport;

pub use client::connection::{ConnectionManager, ConnectionStatus, SyncEvent, topics};
pub use client::input::{InputEvent, InputForwarder, Modifiers};
pub use client::renderer::{CanvasRenderer, JpegPassthrough, SharedFramebuffer};
pub use config::{Config, ReconnectPolicy, Target};
pub use geometry::{DisplayRect, Viewport};
pub use sync::{ExecutionSync, PageSync, WorkflowExecutionState};
