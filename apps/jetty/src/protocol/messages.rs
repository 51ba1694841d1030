//! JSON control protocol: closed sum types for everything that crosses
//! the socket as text.
//!
//! Tags and field names are wire-exact: event tags are the lower-case
//! words the remote source uses (`mousemove`, not `mouse_move`) and
//! input fields keep their camelCase names (`deltaX`, `ctrlKey`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Overall workflow execution status as reported by the remote source.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

/// A node currently executing. Lives in a map keyed by `node_id`;
/// created on `node_started`, removed on completion or failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutingNode {
    pub node_id: String,
    #[serde(default)]
    pub node_type: String,
    /// Epoch milliseconds, carried opaquely from the remote source.
    #[serde(default)]
    pub started_at: f64,
    #[serde(default)]
    pub duration_seconds: f64,
}

/// A node that finished during this session. Appended on
/// `node_completed` and never removed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletedNode {
    pub node_id: String,
    #[serde(default)]
    pub node_type: String,
    #[serde(default)]
    pub completed_at: f64,
    #[serde(default)]
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
}

/// One tab of the remotely rendered browser session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageInfo {
    pub page_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Server→client control messages.
///
/// Unknown `type` values deserialize to [`ServerMessage::Unknown`] so a
/// newer server never breaks an older client; the manager republishes
/// them on the `unhandled` topic instead of treating them as errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    StateSync {
        #[serde(default)]
        status: WorkflowStatus,
        #[serde(default)]
        executing_nodes: HashMap<String, ExecutingNode>,
        #[serde(default)]
        completed_nodes: Vec<CompletedNode>,
        #[serde(default)]
        completed_count: u32,
        #[serde(default)]
        total_nodes: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    NodeStarted {
        node_id: String,
        #[serde(default)]
        node_type: String,
        #[serde(default)]
        started_at: f64,
    },
    NodeCompleted {
        node_id: String,
        #[serde(default)]
        node_type: String,
        #[serde(default)]
        completed_at: f64,
        #[serde(default)]
        duration_seconds: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        route: Option<String>,
    },
    NodeFailed {
        node_id: String,
        #[serde(default)]
        node_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    WorkflowCompleted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<f64>,
    },
    WorkflowFailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    PageAdded {
        page_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    PageRemoved {
        page_id: String,
    },
    PagesSync {
        #[serde(default)]
        pages: Vec<PageInfo>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        active_page: Option<String>,
    },
    PageSwitched {
        page_id: String,
    },
    UrlChanged {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        page_id: Option<String>,
    },
    Error {
        message: String,
    },
    Pong,
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// The event-bus topic this message is published on: the wire tag
    /// for known variants, `unhandled` for everything else.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::StateSync { .. } => "state_sync",
            Self::NodeStarted { .. } => "node_started",
            Self::NodeCompleted { .. } => "node_completed",
            Self::NodeFailed { .. } => "node_failed",
            Self::WorkflowCompleted { .. } => "workflow_completed",
            Self::WorkflowFailed { .. } => "workflow_failed",
            Self::PageAdded { .. } => "page_added",
            Self::PageRemoved { .. } => "page_removed",
            Self::PagesSync { .. } => "pages_sync",
            Self::PageSwitched { .. } => "page_switched",
            Self::UrlChanged { .. } => "url_changed",
            Self::Error { .. } => "error",
            Self::Pong => "pong",
            Self::Unknown => "unhandled",
        }
    }
}

/// Navigation actions the client can request of the remote browser.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NavigateAction {
    Back,
    Forward,
    Refresh,
    Goto,
}

/// Client→server control messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Start,
    #[serde(rename = "mousemove")]
    MouseMove {
        x: u32,
        y: u32,
    },
    #[serde(rename = "mousedown")]
    MouseDown {
        x: u32,
        y: u32,
        button: String,
    },
    #[serde(rename = "mouseup")]
    MouseUp {
        x: u32,
        y: u32,
        button: String,
    },
    #[serde(rename_all = "camelCase")]
    Wheel {
        x: u32,
        y: u32,
        delta_x: f64,
        delta_y: f64,
        delta_z: f64,
    },
    #[serde(rename_all = "camelCase")]
    Keydown {
        key: String,
        code: String,
        ctrl_key: bool,
        alt_key: bool,
        shift_key: bool,
        meta_key: bool,
        repeat: bool,
    },
    #[serde(rename_all = "camelCase")]
    Keyup {
        key: String,
        code: String,
        ctrl_key: bool,
        alt_key: bool,
        shift_key: bool,
        meta_key: bool,
    },
    Navigate {
        action: NavigateAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    PageSwitch {
        page_id: String,
    },
    CloseTab {
        page_id: String,
    },
    NewTab,
    RequestState,
}

/// Normalized pointer-button name for the wire, from the numeric
/// button index local input sources report. Unmapped buttons fall back
/// to the primary button.
pub fn button_name(button: u8) -> &'static str {
    match button {
        1 => "middle",
        2 => "right",
        _ => "left",
    }
}
