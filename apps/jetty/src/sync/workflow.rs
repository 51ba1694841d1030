//! Reconciled workflow execution state. The synchronizer replaces its
//! view wholesale on `state_sync` and applies deltas incrementally
//! otherwise; after a reconnect it sends `request_state` because events
//! missed during the gap are never redelivered.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use sync_bus::SubscriptionId;
use tracing::{debug, trace};

use crate::client::connection::{ConnectionManager, SyncEvent, topics};
use crate::protocol::{ClientMessage, CompletedNode, ExecutingNode, ServerMessage, WorkflowStatus};

/// The reconciled view. Owned by [`ExecutionSync`]; consumers only ever
/// see cloned snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowExecutionState {
    pub status: WorkflowStatus,
    pub executing_nodes: HashMap<String, ExecutingNode>,
    pub completed_nodes: Vec<CompletedNode>,
    pub completed_count: u32,
    pub total_nodes: u32,
    pub error: Option<String>,
}

struct SyncInner {
    state: RwLock<WorkflowExecutionState>,
    finished: AtomicBool,
}

impl SyncInner {
    fn apply(&self, message: &ServerMessage) {
        match message {
            ServerMessage::StateSync {
                status,
                executing_nodes,
                completed_nodes,
                completed_count,
                total_nodes,
                error,
            } => {
                debug!(?status, executing = executing_nodes.len(), "full state sync");
                *self.state.write() = WorkflowExecutionState {
                    status: *status,
                    executing_nodes: executing_nodes.clone(),
                    completed_nodes: completed_nodes.clone(),
                    completed_count: *completed_count,
                    total_nodes: *total_nodes,
                    error: error.clone(),
                };
                self.finished.store(
                    matches!(status, WorkflowStatus::Completed | WorkflowStatus::Failed),
                    Ordering::SeqCst,
                );
            }
            ServerMessage::NodeStarted {
                node_id,
                node_type,
                started_at,
            } => {
                trace!(node_id, "node started");
                self.state.write().executing_nodes.insert(
                    node_id.clone(),
                    ExecutingNode {
                        node_id: node_id.clone(),
                        node_type: node_type.clone(),
                        started_at: *started_at,
                        duration_seconds: 0.0,
                    },
                );
            }
            ServerMessage::NodeCompleted {
                node_id,
                node_type,
                completed_at,
                duration_seconds,
                route,
            } => {
                trace!(node_id, "node completed");
                let mut state = self.state.write();
                state.executing_nodes.remove(node_id);
                state.completed_nodes.push(CompletedNode {
                    node_id: node_id.clone(),
                    node_type: node_type.clone(),
                    completed_at: *completed_at,
                    duration_seconds: *duration_seconds,
                    route: route.clone(),
                });
                state.completed_count += 1;
            }
            ServerMessage::NodeFailed { node_id, .. } => {
                // The terminal transition arrives separately as
                // workflow_failed; this only clears the executing entry.
                trace!(node_id, "node failed");
                self.state.write().executing_nodes.remove(node_id);
            }
            ServerMessage::WorkflowCompleted { .. } => {
                debug!("workflow completed");
                let mut state = self.state.write();
                state.status = WorkflowStatus::Completed;
                state.executing_nodes.clear();
                drop(state);
                self.finished.store(true, Ordering::SeqCst);
            }
            ServerMessage::WorkflowFailed { error } => {
                debug!(?error, "workflow failed");
                let mut state = self.state.write();
                state.status = WorkflowStatus::Failed;
                state.executing_nodes.clear();
                state.error = error.clone();
                drop(state);
                self.finished.store(true, Ordering::SeqCst);
            }
            _ => {}
        }
    }
}

/// Subscribes to Connection Manager events for as long as it lives and
/// maintains the reconciled [`WorkflowExecutionState`].
pub struct ExecutionSync {
    manager: ConnectionManager,
    inner: Arc<SyncInner>,
    subscriptions: Vec<(&'static str, SubscriptionId)>,
}

const CONTROL_TOPICS: [&str; 6] = [
    "state_sync",
    "node_started",
    "node_completed",
    "node_failed",
    "workflow_completed",
    "workflow_failed",
];

impl ExecutionSync {
    pub fn attach(manager: &ConnectionManager) -> Self {
        let inner = Arc::new(SyncInner {
            state: RwLock::new(WorkflowExecutionState::default()),
            finished: AtomicBool::new(false),
        });

        let mut subscriptions = Vec::new();
        for topic in CONTROL_TOPICS {
            let handler = inner.clone();
            let id = manager.on(topic, move |event| {
                if let SyncEvent::Control(message) = event {
                    handler.apply(message);
                }
            });
            subscriptions.push((topic, id));
        }

        // Events missed while disconnected are gone; state is only
        // trustworthy again after the server answers with state_sync.
        let resync_manager = manager.clone();
        let resync_inner = inner.clone();
        let id = manager.on(topics::CONNECTED, move |_| {
            resync_inner.finished.store(false, Ordering::SeqCst);
            debug!("requesting state resync after connect");
            resync_manager.send(&ClientMessage::RequestState);
        });
        subscriptions.push((topics::CONNECTED, id));

        Self {
            manager: manager.clone(),
            inner,
            subscriptions,
        }
    }

    /// Current reconciled state, as an immutable snapshot.
    pub fn snapshot(&self) -> WorkflowExecutionState {
        self.inner.state.read().clone()
    }

    /// True once a terminal `workflow_completed`/`workflow_failed` has
    /// been applied; collaborators use this to drive teardown.
    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::SeqCst)
    }

    /// Apply a control message directly, outside the bus path.
    pub fn apply(&self, message: &ServerMessage) {
        self.inner.apply(message);
    }
}

impl Drop for ExecutionSync {
    fn drop(&mut self) {
        for (topic, id) in self.subscriptions.drain(..) {
            self.manager.off(topic, id);
        }
    }
}
