//! # flowgate-bus
//!
//! The publish/subscribe primitive the gateway consumes backend lifecycle
//! events from. The transport itself belongs to the workflow engine; the
//! gateway only depends on the [`EventBus`] trait. [`MemoryBus`] is the
//! in-process aggregator used when the gateway is embedded next to the
//! engine, and the double every test subscribes against.

#![deny(unsafe_code)]

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryBus;

/// Payload of one bus message, shared across all handlers of a path.
pub type Payload = Arc<serde_json::Value>;

/// Callback invoked for every message published on a subscribed path.
pub type BusHandler = Arc<dyn Fn(Payload) + Send + Sync>;

/// Opaque token identifying one live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    /// Build a handle from its raw value (transport-internal).
    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw value (transport-internal).
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Transport failures surfaced by an [`EventBus`] implementation.
#[derive(Debug, Error)]
pub enum BusError {
    /// The transport refused to create the subscription.
    #[error("subscribe to '{path}' rejected: {reason}")]
    SubscribeRejected {
        /// The message path the subscribe targeted.
        path: String,
        /// Transport-supplied reason.
        reason: String,
    },

    /// `unsubscribe` was called with a handle the transport does not know.
    #[error("unknown subscription handle {0}")]
    UnknownHandle(u64),
}

/// A publish/subscribe transport keyed by message-path strings.
///
/// `subscribe` may suspend (a remote transport negotiates the
/// registration); `publish` is fire-and-forget and must not block on
/// slow subscribers.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Register `handler` for every message published on `path`.
    async fn subscribe(&self, path: &str, handler: BusHandler) -> Result<SubscriptionHandle, BusError>;

    /// Remove a subscription previously created by [`EventBus::subscribe`].
    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), BusError>;

    /// Publish `payload` to every current subscriber of `path`.
    fn publish(&self, path: &str, payload: serde_json::Value);
}
