use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

/// Identifies a registered subscriber so it can later be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Subscriber<T> {
    id: SubscriptionId,
    callback: Callback<T>,
}

/// Typed publish/subscribe registry keyed by event name.
///
/// Dispatch is synchronous and in registration order. A subscriber that
/// panics is caught and logged; the remaining subscribers still receive
/// the event.
pub struct EventBus<T> {
    topics: RwLock<HashMap<String, Vec<Subscriber<T>>>>,
    next_id: RwLock<u64>,
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            next_id: RwLock::new(0),
        }
    }
}

impl<T> EventBus<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for a topic. Multiple subscribers per topic
    /// are supported.
    pub fn on<F>(&self, topic: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut next = self.next_id.write();
            *next += 1;
            SubscriptionId(*next)
        };
        let mut topics = self.topics.write();
        topics.entry(topic.to_string()).or_default().push(Subscriber {
            id,
            callback: Arc::new(callback),
        });
        id
    }

    /// Remove a previously registered callback. Unknown ids are ignored.
    pub fn off(&self, topic: &str, id: SubscriptionId) {
        let mut topics = self.topics.write();
        if let Some(subscribers) = topics.get_mut(topic) {
            subscribers.retain(|s| s.id != id);
            if subscribers.is_empty() {
                topics.remove(topic);
            }
        }
    }

    /// Deliver an event to every subscriber of `topic`, returning the
    /// number of callbacks invoked.
    pub fn publish(&self, topic: &str, event: &T) -> usize {
        let callbacks: Vec<Callback<T>> = {
            let topics = self.topics.read();
            match topics.get(topic) {
                Some(subscribers) => subscribers.iter().map(|s| s.callback.clone()).collect(),
                None => return 0,
            }
        };
        let mut delivered = 0;
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                warn!(topic, "event subscriber panicked; continuing dispatch");
            }
            delivered += 1;
        }
        delivered
    }

    /// Number of subscribers currently registered for `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.read().get(topic).map_or(0, Vec::len)
    }
}
