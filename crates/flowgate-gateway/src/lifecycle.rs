//! Connection lifecycle orchestration.
//!
//! Reacts to channel open/close: wires a freshly authenticated channel
//! into the hub, materializes its identity scope, and guarantees the
//! scope is released exactly once when the channel goes away, whatever
//! order closes, evictions and late-completing opens arrive in.

use std::sync::Arc;

use tracing::{debug, info};

use crate::channel::{ClientChannel, ConnectionState};
use crate::error::GatewayError;
use crate::hub::ChannelHub;
use crate::registry::SubscriptionRegistry;

/// Orchestrates channel open and close against hub and registry.
pub struct LifecycleManager {
    hub: Arc<ChannelHub>,
    registry: Arc<SubscriptionRegistry>,
}

impl LifecycleManager {
    /// Create a manager over the shared hub and registry.
    #[must_use]
    pub fn new(hub: Arc<ChannelHub>, registry: Arc<SubscriptionRegistry>) -> Self {
        Self { hub, registry }
    }

    /// Bring an authenticated channel into service.
    ///
    /// Registers the channel for fan-out, then creates (or refcounts)
    /// the identity scope. The channel only becomes `Active` once the
    /// scope is fully in place; if scope creation fails, the channel is
    /// deregistered again and nothing of the attempt survives.
    pub async fn on_open(&self, channel: Arc<ClientChannel>) -> Result<(), GatewayError> {
        if !channel.advance(ConnectionState::Authenticated) {
            // A close already won the race; set nothing up.
            debug!(channel_id = %channel.id, "open for already-disconnected channel");
            return Ok(());
        }
        self.hub.add(channel.clone());

        if let Err(e) = self.registry.create_identity_scope(&channel.identity).await {
            let _ = self.hub.remove(&channel.id);
            let _ = channel.advance(ConnectionState::Disconnected);
            return Err(e);
        }
        channel.mark_scope_held();

        if !channel.advance(ConnectionState::Active) {
            // A close fired while the scope was being created. If the
            // close observed the hold it has released it already;
            // otherwise the release is ours.
            let _ = self.hub.remove(&channel.id);
            if channel.take_scope_hold() {
                self.registry.release_identity_scope(channel.user_id()).await;
            }
            debug!(channel_id = %channel.id, "open overtaken by close, scope released");
            return Ok(());
        }
        info!(channel_id = %channel.id, user_id = %channel.user_id(), "channel active");
        Ok(())
    }

    /// Take a channel out of service.
    ///
    /// Safe to call for channels that never became `Active` and safe to
    /// call more than once: only the transition into `Disconnected`
    /// releases the identity scope, so a close racing an eviction cannot
    /// release twice. A scope already cleared by a concurrent close is a
    /// registry-level no-op.
    pub async fn on_close(&self, channel: &ClientChannel) {
        if !channel.advance(ConnectionState::Disconnected) {
            debug!(channel_id = %channel.id, "close for already-disconnected channel");
            return;
        }
        let _ = self.hub.remove(&channel.id);
        if channel.take_scope_hold() {
            self.registry.release_identity_scope(channel.user_id()).await;
        }
        info!(channel_id = %channel.id, user_id = %channel.user_id(), "channel closed");
    }
}
