//! Page-set synchronization for the remote browser session: which tabs
//! exist, which is active, and the current URL. Same reconciliation
//! discipline as the workflow synchronizer — wholesale on `pages_sync`,
//! incremental otherwise.

use std::sync::Arc;

use parking_lot::RwLock;
use sync_bus::SubscriptionId;
use tracing::trace;

use crate::client::connection::{ConnectionManager, SyncEvent};
use crate::protocol::{PageInfo, ServerMessage};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSetState {
    pub pages: Vec<PageInfo>,
    pub active_page: Option<String>,
    pub current_url: Option<String>,
}

struct PagesInner {
    state: RwLock<PageSetState>,
}

impl PagesInner {
    fn apply(&self, message: &ServerMessage) {
        let mut state = self.state.write();
        match message {
            ServerMessage::PagesSync { pages, active_page } => {
                trace!(count = pages.len(), "page set sync");
                let url = active_page
                    .as_ref()
                    .and_then(|id| pages.iter().find(|p| &p.page_id == id))
                    .and_then(|p| p.url.clone());
                state.pages = pages.clone();
                state.active_page = active_page.clone();
                state.current_url = url;
            }
            ServerMessage::PageAdded { page_id, url, title } => {
                if !state.pages.iter().any(|p| &p.page_id == page_id) {
                    state.pages.push(PageInfo {
                        page_id: page_id.clone(),
                        url: url.clone(),
                        title: title.clone(),
                    });
                }
            }
            ServerMessage::PageRemoved { page_id } => {
                state.pages.retain(|p| &p.page_id != page_id);
                if state.active_page.as_ref() == Some(page_id) {
                    state.active_page = None;
                }
            }
            ServerMessage::PageSwitched { page_id } => {
                let url = state
                    .pages
                    .iter()
                    .find(|p| &p.page_id == page_id)
                    .and_then(|p| p.url.clone());
                state.active_page = Some(page_id.clone());
                state.current_url = url;
            }
            ServerMessage::UrlChanged { url, page_id } => {
                state.current_url = Some(url.clone());
                let target = page_id.as_ref().or(state.active_page.as_ref()).cloned();
                if let Some(id) = target {
                    if let Some(page) = state.pages.iter_mut().find(|p| p.page_id == id) {
                        page.url = Some(url.clone());
                    }
                }
            }
            _ => {}
        }
    }
}

const PAGE_TOPICS: [&str; 5] = [
    "pages_sync",
    "page_added",
    "page_removed",
    "page_switched",
    "url_changed",
];

/// Subscribes to page events for as long as it lives.
pub struct PageSync {
    manager: ConnectionManager,
    inner: Arc<PagesInner>,
    subscriptions: Vec<(&'static str, SubscriptionId)>,
}

impl PageSync {
    pub fn attach(manager: &ConnectionManager) -> Self {
        let inner = Arc::new(PagesInner {
            state: RwLock::new(PageSetState::default()),
        });
        let mut subscriptions = Vec::new();
        for topic in PAGE_TOPICS {
            let handler = inner.clone();
            let id = manager.on(topic, move |event| {
                if let SyncEvent::Control(message) = event {
                    handler.apply(message);
                }
            });
            subscriptions.push((topic, id));
        }
        Self {
            manager: manager.clone(),
            inner,
            subscriptions,
        }
    }

    pub fn snapshot(&self) -> PageSetState {
        self.inner.state.read().clone()
    }

    pub fn apply(&self, message: &ServerMessage) {
        self.inner.apply(message);
    }
}

impl Drop for PageSync {
    fn drop(&mut self) {
        for (topic, id) in self.subscriptions.drain(..) {
            self.manager.off(topic, id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::transport::mock::MockDialer;

    fn detached_sync() -> PageSync {
        let (dialer, _connections) = MockDialer::new();
        PageSync::attach(&ConnectionManager::new(Config::default(), Arc::new(dialer)))
    }

    fn page(id: &str, url: &str) -> PageInfo {
        PageInfo {
            page_id: id.to_string(),
            url: Some(url.to_string()),
            title: None,
        }
    }

    #[tokio::test]
    async fn pages_sync_replaces_and_sets_active_url() {
        let sync = detached_sync();
        sync.apply(&ServerMessage::PagesSync {
            pages: vec![page("p1", "https://a.test"), page("p2", "https://b.test")],
            active_page: Some("p2".to_string()),
        });

        let state = sync.snapshot();
        assert_eq!(state.pages.len(), 2);
        assert_eq!(state.active_page.as_deref(), Some("p2"));
        assert_eq!(state.current_url.as_deref(), Some("https://b.test"));
    }

    #[tokio::test]
    async fn add_switch_remove_round() {
        let sync = detached_sync();
        sync.apply(&ServerMessage::PageAdded {
            page_id: "p1".to_string(),
            url: Some("https://a.test".to_string()),
            title: None,
        });
        sync.apply(&ServerMessage::PageSwitched { page_id: "p1".to_string() });
        assert_eq!(sync.snapshot().current_url.as_deref(), Some("https://a.test"));

        sync.apply(&ServerMessage::PageRemoved { page_id: "p1".to_string() });
        let state = sync.snapshot();
        assert!(state.pages.is_empty());
        assert_eq!(state.active_page, None);
    }

    #[tokio::test]
    async fn url_change_tracks_the_active_page() {
        let sync = detached_sync();
        sync.apply(&ServerMessage::PagesSync {
            pages: vec![page("p1", "https://a.test")],
            active_page: Some("p1".to_string()),
        });
        sync.apply(&ServerMessage::UrlChanged {
            url: "https://a.test/next".to_string(),
            page_id: None,
        });

        let state = sync.snapshot();
        assert_eq!(state.current_url.as_deref(), Some("https://a.test/next"));
        assert_eq!(state.pages[0].url.as_deref(), Some("https://a.test/next"));
    }

    #[tokio::test]
    async fn duplicate_page_added_is_ignored() {
        let sync = detached_sync();
        for _ in 0..2 {
            sync.apply(&ServerMessage::PageAdded {
                page_id: "p1".to_string(),
                url: None,
                title: None,
            });
        }
        assert_eq!(sync.snapshot().pages.len(), 1);
    }
}
