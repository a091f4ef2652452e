//! # flowgate-gateway
//!
//! The push-notification gateway core: a static catalog of forwarded
//! lifecycle events, the hub that fans events out to open channels, the
//! registry that owns every event-bus subscription, and the lifecycle
//! manager that ties channel open/close to subscription create/teardown.
//!
//! ## Data flow
//!
//! Backend publishes on the event bus → a registry-installed handler
//! resolves the wire path (substituting payload or identity parameters)
//! → the hub delivers to the audience: every channel for `Global`
//! entries, only the owning user's channels for `PerIdentity` entries.
//!
//! ## Lifecycle guarantees
//!
//! - A channel is `Active` only after its identity scope is fully
//!   subscribed; a partial scope never survives a failed open.
//! - One refcounted scope per user: the last channel closing tears it
//!   down, and only then.
//! - Open/close races (including a close overtaking its own open) are
//!   serialized through the registry and resolved with a per-channel
//!   scope hold that can be taken exactly once.

#![deny(unsafe_code)]

pub mod catalog;
pub mod channel;
pub mod error;
pub mod hub;
pub mod lifecycle;
pub mod registry;
pub mod wire;

pub use catalog::{CatalogEntry, EventCatalog, EventKind, Scope};
pub use channel::{ClientChannel, ConnectionState};
pub use error::GatewayError;
pub use hub::ChannelHub;
pub use lifecycle::LifecycleManager;
pub use registry::{Subscription, SubscriptionRegistry};
pub use wire::WireEvent;
