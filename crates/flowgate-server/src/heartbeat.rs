//! Heartbeat liveness monitoring for one channel.
//!
//! The session's write task sends the actual Ping frames; this task only
//! watches the channel's liveness flag and decides when the client is
//! gone.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use flowgate_gateway::ClientChannel;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client stopped responding within the timeout window.
    TimedOut,
    /// The heartbeat was cancelled externally (session ended).
    Cancelled,
}

/// Watch liveness for `channel`.
///
/// At each `interval` tick the alive flag is checked and reset. Misses
/// accumulate; `timeout / interval` consecutive misses (at least one)
/// mean the client is dead and `HeartbeatResult::TimedOut` is returned.
pub async fn run_heartbeat(
    channel: Arc<ClientChannel>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut check_interval = time::interval(interval);
    // The first tick fires immediately; skip it so a fresh connection
    // gets a full interval before its first check.
    let _ = check_interval.tick().await;

    let mut missed: u32 = 0;
    let interval_secs = interval.as_secs().max(1);
    #[allow(clippy::cast_possible_truncation)]
    let max_missed = (timeout.as_secs() / interval_secs).max(1) as u32;

    loop {
        tokio::select! {
            _ = check_interval.tick() => {
                if channel.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
                // Not alive again until the next pong.
                channel.is_alive.store(false, Ordering::Relaxed);
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}
