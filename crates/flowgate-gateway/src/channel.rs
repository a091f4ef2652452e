//! Per-client channel state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use flowgate_core::{ChannelId, Identity, UserId};

/// Lifecycle of one channel.
///
/// Strictly forward-only: `Connecting → Authenticated → Active →
/// Disconnected`. A reconnect is a new channel with a new ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    /// Handshake received, identity not yet resolved.
    Connecting,
    /// Identity resolved; subscriptions not yet in place.
    Authenticated,
    /// Fully subscribed and receiving scoped events.
    Active,
    /// Closed. Terminal.
    Disconnected,
}

/// One open client channel and its outbound queue.
///
/// The identity is immutable for the channel's lifetime; it was resolved
/// before the channel existed.
pub struct ClientChannel {
    /// Unique channel ID.
    pub id: ChannelId,
    /// The authenticated principal behind this channel.
    pub identity: Identity,
    /// Send half feeding the channel's socket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this channel was established.
    pub connected_at: Instant,
    /// Whether the client has responded since the last ping.
    pub is_alive: AtomicBool,
    /// When the last pong (or any liveness signal) was received.
    last_pong: Mutex<Instant>,
    /// Messages dropped because the outbound queue was full or closed.
    pub dropped_messages: AtomicU64,
    state: Mutex<ConnectionState>,
    /// Whether this channel currently holds one refcount on its user's
    /// identity scope. Cleared exactly once, by whoever releases it.
    holds_scope: AtomicBool,
}

impl ClientChannel {
    /// Create a channel in the `Connecting` state.
    #[must_use]
    pub fn new(id: ChannelId, identity: Identity, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            identity,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            state: Mutex::new(ConnectionState::Connecting),
            holds_scope: AtomicBool::new(false),
        }
    }

    /// The owning user.
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.identity.user_id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Advance to `next` if it is a forward transition.
    ///
    /// Returns `false` when the transition is not forward (notably any
    /// transition out of `Disconnected`), leaving the state unchanged.
    pub fn advance(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if next > *state {
            *state = next;
            true
        } else {
            false
        }
    }

    /// Record that this channel holds a refcount on its identity scope.
    pub fn mark_scope_held(&self) {
        self.holds_scope.store(true, Ordering::SeqCst);
    }

    /// Take the scope hold, if any.
    ///
    /// Returns `true` for exactly one caller; open/close paths racing on
    /// the same channel use this to decide who releases the scope.
    pub fn take_scope_hold(&self) -> bool {
        self.holds_scope.swap(false, Ordering::SeqCst)
    }

    /// Enqueue a serialized event for this channel.
    ///
    /// Returns `false` and counts a drop when the queue is full or the
    /// socket task has gone away. Never blocks.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total messages dropped for this channel.
    #[must_use]
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record liveness (pong or client traffic).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last liveness signal.
    #[must_use]
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the liveness flag for the heartbeat.
    ///
    /// Returns `true` if the channel was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Channel age.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
