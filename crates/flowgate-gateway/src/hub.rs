//! Event fan-out to open channels.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use metrics::counter;
use parking_lot::RwLock;
use tracing::{debug, warn};

use flowgate_core::{ChannelId, UserId};

use crate::channel::ClientChannel;
use crate::wire::WireEvent;

/// Maximum lifetime message drops before a slow client is evicted.
const MAX_TOTAL_DROPS: u64 = 100;

/// Holds every open channel and delivers events to an audience.
///
/// Delivery is synchronous and lock-cheap so event-bus handlers can call
/// straight into it; the actual socket writes happen on each channel's
/// own task behind its queue.
pub struct ChannelHub {
    /// Open channels indexed by channel ID.
    channels: RwLock<HashMap<ChannelId, Arc<ClientChannel>>>,
    /// Tracks the channel count without read-locking.
    active_count: AtomicUsize,
}

impl ChannelHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Add a channel.
    pub fn add(&self, channel: Arc<ClientChannel>) {
        let mut channels = self.channels.write();
        if channels.insert(channel.id.clone(), channel).is_none() {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove a channel by ID. Returns whether it was present.
    pub fn remove(&self, channel_id: &ChannelId) -> bool {
        let mut channels = self.channels.write();
        if channels.remove(channel_id).is_some() {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Number of open channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Number of open channels belonging to `user_id`.
    #[must_use]
    pub fn user_channel_count(&self, user_id: &UserId) -> usize {
        self.channels
            .read()
            .values()
            .filter(|c| c.user_id() == user_id)
            .count()
    }

    /// Deliver an event to every open channel.
    pub fn broadcast_all(&self, event: &WireEvent) {
        self.broadcast_to(|_| true, event, "all");
    }

    /// Deliver an event only to the channels of `user_id`.
    pub fn broadcast_to_user(&self, user_id: &UserId, event: &WireEvent) {
        self.broadcast_to(|c| c.user_id() == user_id, event, user_id.as_str());
    }

    /// Serialize once, fan out to matching channels, evict slow clients.
    fn broadcast_to(&self, filter: impl Fn(&ClientChannel) -> bool, event: &WireEvent, label: &str) {
        let json = match serde_json::to_string(event) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(event = event.event, error = %e, "failed to serialize wire event");
                return;
            }
        };
        let mut to_evict = Vec::new();
        {
            let channels = self.channels.read();
            let mut recipients = 0u32;
            for channel in channels.values() {
                if filter(channel) {
                    recipients += 1;
                    if !channel.send(Arc::clone(&json)) {
                        counter!("ws_delivery_drops_total").increment(1);
                        let drops = channel.drop_count();
                        if drops >= MAX_TOTAL_DROPS {
                            warn!(channel_id = %channel.id, label, drops, "evicting slow client");
                            to_evict.push(channel.id.clone());
                        } else {
                            warn!(channel_id = %channel.id, label, total_drops = drops, "dropped event for slow client (queue full)");
                        }
                    }
                }
            }
            debug!(event = event.event, label, recipients, "fan-out");
        }
        for id in &to_evict {
            let _ = self.remove(id);
        }
    }
}

impl Default for ChannelHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use flowgate_core::Identity;

    use super::*;

    fn make_channel(id: &str, user: &str) -> (Arc<ClientChannel>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        let channel = ClientChannel::new(ChannelId::from(id), Identity::new("tok", user), tx);
        (Arc::new(channel), rx)
    }

    fn make_event(path: &str) -> WireEvent {
        WireEvent::new(path, serde_json::json!({"k": "v"}))
    }

    #[test]
    fn add_and_count() {
        let hub = ChannelHub::new();
        let (c1, _rx) = make_channel("c1", "u1");
        hub.add(c1);
        assert_eq!(hub.channel_count(), 1);
    }

    #[test]
    fn remove_reports_presence() {
        let hub = ChannelHub::new();
        let (c1, _rx) = make_channel("c1", "u1");
        hub.add(c1);
        assert!(hub.remove(&ChannelId::from("c1")));
        assert!(!hub.remove(&ChannelId::from("c1")));
        assert_eq!(hub.channel_count(), 0);
    }

    #[test]
    fn broadcast_all_reaches_every_user() {
        let hub = ChannelHub::new();
        let (c1, mut rx1) = make_channel("c1", "u1");
        let (c2, mut rx2) = make_channel("c2", "u2");
        hub.add(c1);
        hub.add(c2);

        hub.broadcast_all(&make_event("process_started"));

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn user_broadcast_respects_identity() {
        let hub = ChannelHub::new();
        let (c1, mut rx1) = make_channel("c1", "u1");
        let (c2, mut rx2) = make_channel("c2", "u2");
        let (c3, mut rx3) = make_channel("c3", "u1");
        hub.add(c1);
        hub.add(c2);
        hub.add(c3);

        hub.broadcast_to_user(&UserId::from("u1"), &make_event("user_task_for_identity_waiting/u1"));

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
        assert!(rx3.try_recv().is_ok());
    }

    #[test]
    fn broadcast_to_empty_hub_is_noop() {
        let hub = ChannelHub::new();
        hub.broadcast_all(&make_event("process_ended"));
        hub.broadcast_to_user(&UserId::from("u1"), &make_event("x"));
    }

    #[test]
    fn user_channel_count_counts_only_that_user() {
        let hub = ChannelHub::new();
        let (c1, _r1) = make_channel("c1", "u1");
        let (c2, _r2) = make_channel("c2", "u2");
        let (c3, _r3) = make_channel("c3", "u1");
        hub.add(c1);
        hub.add(c2);
        hub.add(c3);
        assert_eq!(hub.user_channel_count(&UserId::from("u1")), 2);
        assert_eq!(hub.user_channel_count(&UserId::from("u2")), 1);
        assert_eq!(hub.user_channel_count(&UserId::from("u3")), 0);
    }

    #[test]
    fn delivered_event_is_valid_json() {
        let hub = ChannelHub::new();
        let (c1, mut rx) = make_channel("c1", "u1");
        hub.add(c1);

        hub.broadcast_all(&WireEvent::new(
            "user_task_waiting",
            serde_json::json!({"flow_node_id": "approve"}),
        ));

        let msg = rx.try_recv().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["type"], "user_task_waiting");
        assert_eq!(parsed["payload"]["flow_node_id"], "approve");
    }

    #[test]
    fn fanout_shares_one_serialization() {
        let hub = ChannelHub::new();
        let (c1, mut rx1) = make_channel("c1", "u1");
        let (c2, mut rx2) = make_channel("c2", "u1");
        hub.add(c1);
        hub.add(c2);

        hub.broadcast_to_user(&UserId::from("u1"), &make_event("e"));

        let m1 = rx1.try_recv().unwrap();
        let m2 = rx2.try_recv().unwrap();
        assert!(Arc::ptr_eq(&m1, &m2));
    }

    #[test]
    fn slow_client_evicted_after_threshold() {
        let hub = ChannelHub::new();
        let (tx, _rx) = mpsc::channel(1);
        let slow = Arc::new(ClientChannel::new(
            ChannelId::from("slow"),
            Identity::new("tok", "u1"),
            tx,
        ));
        let (fast, mut fast_rx) = make_channel("fast", "u1");
        hub.add(slow);
        hub.add(fast);

        let event = make_event("e");
        // First send fills the queue, then MAX_TOTAL_DROPS misses.
        for _ in 0..=MAX_TOTAL_DROPS {
            hub.broadcast_all(&event);
            while fast_rx.try_recv().is_ok() {}
        }

        assert_eq!(hub.channel_count(), 1);
        assert_eq!(hub.user_channel_count(&UserId::from("u1")), 1);
    }

    #[test]
    fn fast_client_survives_repeated_broadcasts() {
        let hub = ChannelHub::new();
        let (fast, mut rx) = make_channel("fast", "u1");
        hub.add(fast);

        for _ in 0..20 {
            hub.broadcast_all(&make_event("e"));
            while rx.try_recv().is_ok() {}
        }
        assert_eq!(hub.channel_count(), 1);
    }

    #[test]
    fn eviction_scoped_to_target_audience() {
        let hub = ChannelHub::new();
        let (tx, _rx) = mpsc::channel(1);
        let slow_u1 = Arc::new(ClientChannel::new(
            ChannelId::from("slow"),
            Identity::new("tok", "u1"),
            tx,
        ));
        let (fast_u2, _rx2) = make_channel("fast", "u2");
        hub.add(slow_u1);
        hub.add(fast_u2);

        let event = make_event("e");
        for _ in 0..=MAX_TOTAL_DROPS {
            hub.broadcast_to_user(&UserId::from("u1"), &event);
        }

        assert_eq!(hub.channel_count(), 1);
        assert_eq!(hub.user_channel_count(&UserId::from("u2")), 1);
    }
}
