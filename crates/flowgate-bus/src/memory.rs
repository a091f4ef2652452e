//! In-process event aggregator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::trace;

use crate::{BusError, BusHandler, EventBus, Payload, SubscriptionHandle};

/// In-process [`EventBus`]: a map of message path to live handlers.
///
/// Handlers run synchronously on the publisher's task, in subscription
/// order per path. Subscribing never fails here; the fallible signature
/// belongs to the trait, where remote transports can reject.
#[derive(Default)]
pub struct MemoryBus {
    state: RwLock<BusState>,
    next_handle: AtomicU64,
}

#[derive(Default)]
struct BusState {
    by_path: HashMap<String, Vec<(SubscriptionHandle, BusHandler)>>,
    path_of: HashMap<SubscriptionHandle, String>,
}

impl MemoryBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions on `path`.
    #[must_use]
    pub fn subscriber_count(&self, path: &str) -> usize {
        self.state
            .read()
            .by_path
            .get(path)
            .map_or(0, Vec::len)
    }

    /// Number of live subscriptions across all paths.
    #[must_use]
    pub fn total_subscriptions(&self) -> usize {
        self.state.read().path_of.len()
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn subscribe(&self, path: &str, handler: BusHandler) -> Result<SubscriptionHandle, BusError> {
        let handle = SubscriptionHandle::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let mut state = self.state.write();
        state
            .by_path
            .entry(path.to_owned())
            .or_default()
            .push((handle, handler));
        let _ = state.path_of.insert(handle, path.to_owned());
        trace!(path, handle = handle.raw(), "subscribed");
        Ok(handle)
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), BusError> {
        let mut state = self.state.write();
        let Some(path) = state.path_of.remove(&handle) else {
            return Err(BusError::UnknownHandle(handle.raw()));
        };
        if let Some(handlers) = state.by_path.get_mut(&path) {
            handlers.retain(|(h, _)| *h != handle);
            if handlers.is_empty() {
                let _ = state.by_path.remove(&path);
            }
        }
        trace!(path, handle = handle.raw(), "unsubscribed");
        Ok(())
    }

    fn publish(&self, path: &str, payload: serde_json::Value) {
        // Clone the handler list out of the lock so a handler that
        // publishes again cannot deadlock.
        let handlers: Vec<BusHandler> = {
            let state = self.state.read();
            state
                .by_path
                .get(path)
                .map(|subs| subs.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default()
        };
        if handlers.is_empty() {
            trace!(path, "published with no subscribers");
            return;
        }
        let payload: Payload = std::sync::Arc::new(payload);
        for handler in handlers {
            handler(payload.clone());
        }
    }
}
