//! Ownership of every live event-bus subscription.
//!
//! The registry holds the global subscriptions (created once at start,
//! torn down only at shutdown) and one refcounted scope per connected
//! user. All mutation goes through one async mutex: two logically
//! concurrent opens for the same user cannot double-create a scope, and
//! a close racing an in-flight open serializes behind it, so a scope
//! created by a late-completing open is always observed and released.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use flowgate_bus::{BusHandler, EventBus, SubscriptionHandle};
use flowgate_core::{Identity, UserId};

use crate::catalog::{EventCatalog, EventKind};
use crate::error::GatewayError;
use crate::hub::ChannelHub;
use crate::wire::{WireEvent, resolve_for_user, resolve_from_payload};

/// One live registration with the event bus.
#[derive(Debug, Clone, Copy)]
pub struct Subscription {
    /// The bus handle to unsubscribe with.
    pub handle: SubscriptionHandle,
    /// The catalog kind this subscription forwards.
    pub kind: EventKind,
}

/// The subscriptions of one connected user, refcounted by open channels.
struct IdentityScope {
    subscriptions: Vec<Subscription>,
    channels: usize,
}

#[derive(Default)]
struct RegistryState {
    global: Vec<Subscription>,
    identity_scopes: HashMap<UserId, IdentityScope>,
}

/// Owns subscription lifecycles against the event bus.
pub struct SubscriptionRegistry {
    bus: Arc<dyn EventBus>,
    hub: Arc<ChannelHub>,
    catalog: EventCatalog,
    state: Mutex<RegistryState>,
}

impl SubscriptionRegistry {
    /// Create a registry over `bus`, delivering through `hub`.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>, hub: Arc<ChannelHub>, catalog: EventCatalog) -> Self {
        Self {
            bus,
            hub,
            catalog,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Subscribe every `Global` catalog entry.
    ///
    /// Called once at gateway start. Handlers resolve the wire path from
    /// the message payload and broadcast to every open channel. If the
    /// bus rejects any subscribe, the ones already created for this call
    /// are rolled back and the error is returned.
    pub async fn create_global_scope(&self) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        if !state.global.is_empty() {
            debug!("global scope already created");
            return Ok(());
        }

        let mut created = Vec::new();
        for entry in self.catalog.global() {
            let hub = self.hub.clone();
            let wire_template = entry.wire_path;
            let handler: BusHandler = Arc::new(move |payload| {
                let path = resolve_from_payload(wire_template, &payload);
                hub.broadcast_all(&WireEvent::new(path, (*payload).clone()));
            });
            match self.bus.subscribe(entry.message_path, handler).await {
                Ok(handle) => created.push(Subscription {
                    handle,
                    kind: entry.kind,
                }),
                Err(e) => {
                    self.rollback(&created).await;
                    return Err(e.into());
                }
            }
        }
        info!(subscriptions = created.len(), "global scope created");
        state.global = created;
        Ok(())
    }

    /// Materialize (or refcount) the identity scope for `identity`.
    ///
    /// The first channel of a user subscribes every `PerIdentity` catalog
    /// entry with `{user_id}` substituted into both paths; handlers
    /// deliver only to that user's channels. Further channels of the
    /// same user only increment the refcount; the scope must exist at
    /// most once per user.
    pub async fn create_identity_scope(&self, identity: &Identity) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        if let Some(scope) = state.identity_scopes.get_mut(&identity.user_id) {
            scope.channels += 1;
            debug!(user_id = %identity.user_id, channels = scope.channels, "identity scope refcounted");
            return Ok(());
        }

        let mut created = Vec::new();
        for entry in self.catalog.per_identity() {
            let message_path = resolve_for_user(entry.message_path, &identity.user_id);
            let wire_path = resolve_for_user(entry.wire_path, &identity.user_id);
            let hub = self.hub.clone();
            let user_id = identity.user_id.clone();
            let handler: BusHandler = Arc::new(move |payload| {
                hub.broadcast_to_user(&user_id, &WireEvent::new(wire_path.clone(), (*payload).clone()));
            });
            match self.bus.subscribe(&message_path, handler).await {
                Ok(handle) => created.push(Subscription {
                    handle,
                    kind: entry.kind,
                }),
                Err(e) => {
                    warn!(user_id = %identity.user_id, error = %e, "identity scope creation failed, rolling back");
                    self.rollback(&created).await;
                    return Err(e.into());
                }
            }
        }
        debug!(user_id = %identity.user_id, subscriptions = created.len(), "identity scope created");
        let _ = state.identity_scopes.insert(
            identity.user_id.clone(),
            IdentityScope {
                subscriptions: created,
                channels: 1,
            },
        );
        Ok(())
    }

    /// Release one channel's hold on the identity scope of `user_id`.
    ///
    /// Tears the scope down when the last channel goes away. Releasing a
    /// user with no recorded scope is a logged no-op: a racing close has
    /// already cleared it.
    pub async fn release_identity_scope(&self, user_id: &UserId) {
        let mut state = self.state.lock().await;
        let Some(scope) = state.identity_scopes.get_mut(user_id) else {
            debug!(user_id = %user_id, "release for absent identity scope (already cleared)");
            return;
        };
        scope.channels -= 1;
        if scope.channels > 0 {
            debug!(user_id = %user_id, channels = scope.channels, "identity scope still held");
            return;
        }
        // Last channel for this user: the whole scope goes.
        if let Some(scope) = state.identity_scopes.remove(user_id) {
            self.rollback(&scope.subscriptions).await;
            debug!(user_id = %user_id, "identity scope torn down");
        }
    }

    /// Tear down everything: global scope and every identity scope.
    ///
    /// Shutdown only. Idempotent: a second call finds nothing to do.
    pub async fn dispose_all(&self) {
        let mut state = self.state.lock().await;
        let global = std::mem::take(&mut state.global);
        self.rollback(&global).await;
        for (user_id, scope) in state.identity_scopes.drain().collect::<Vec<_>>() {
            self.rollback(&scope.subscriptions).await;
            debug!(user_id = %user_id, "identity scope disposed");
        }
        info!("all subscriptions disposed");
    }

    /// Number of users with a live identity scope.
    pub async fn identity_scope_count(&self) -> usize {
        self.state.lock().await.identity_scopes.len()
    }

    /// Whether `user_id` currently holds an identity scope.
    pub async fn has_identity_scope(&self, user_id: &UserId) -> bool {
        self.state.lock().await.identity_scopes.contains_key(user_id)
    }

    /// Number of live global subscriptions.
    pub async fn global_subscription_count(&self) -> usize {
        self.state.lock().await.global.len()
    }

    /// Unsubscribe a batch, logging (not propagating) transport refusals.
    async fn rollback(&self, subscriptions: &[Subscription]) {
        for sub in subscriptions {
            if let Err(e) = self.bus.unsubscribe(sub.handle).await {
                warn!(kind = ?sub.kind, error = %e, "unsubscribe failed during teardown");
            }
        }
    }
}
