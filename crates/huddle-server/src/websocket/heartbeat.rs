//! Heartbeat liveness monitoring.

use std::sync::Arc;
use std::time::Duration;

use huddle_hub::Session;
use tokio::time;
use tokio_util::sync::CancellationToken;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// No frame or pong arrived within the timeout window.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Consecutive silent ticks tolerated before a session is declared dead.
fn max_missed(interval: Duration, timeout: Duration) -> u32 {
    let interval_ms = interval.as_millis().max(1);
    u32::try_from(timeout.as_millis() / interval_ms)
        .unwrap_or(u32::MAX)
        .max(1)
}

/// Watch a session's alive flag.
///
/// Every `interval` the flag is read and reset. A tick that finds no activity
/// since the previous one counts as missed; `timeout / interval` consecutive
/// misses (at least one) end the loop with [`HeartbeatResult::TimedOut`].
/// Pings themselves are sent by the session writer.
pub async fn run_heartbeat(
    session: Arc<Session>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut check_interval = time::interval(interval);
    check_interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    let limit = max_missed(interval, timeout);
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            _ = check_interval.tick() => {
                if session.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= limit {
                        return HeartbeatResult::TimedOut;
                    }
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}
