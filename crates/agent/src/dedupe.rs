//! Redelivery de-duplication.
//!
//! Providers redeliver webhooks on their own schedule. Side effects are
//! already gated behind successful dispatch, so reprocessing is safe; this
//! window additionally stops a redelivered message from producing a second
//! reply. Held in memory because inbound messages are ephemeral: a bounded
//! seen-set with oldest-first eviction.

use std::collections::{HashSet, VecDeque};

use tokio::sync::RwLock;

pub struct RedeliveryWindow {
    inner: RwLock<WindowInner>,
    capacity: usize,
}

#[derive(Default)]
struct WindowInner {
    seen: HashSet<String>,
    order: VecDeque<String>,
}

impl RedeliveryWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(WindowInner::default()),
            capacity,
        }
    }

    /// Claim a provider message id. Returns `true` when this is the first
    /// sighting; `false` means the id was already processed within the
    /// window. Empty ids are never tracked.
    pub async fn claim(&self, id: &str) -> bool {
        if id.is_empty() {
            return true;
        }
        let mut inner = self.inner.write().await;
        if inner.seen.contains(id) {
            return false;
        }
        inner.seen.insert(id.to_string());
        inner.order.push_back(id.to_string());
        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.seen.remove(&evicted);
            }
        }
        true
    }
}
