//! Server-side representative of one live connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use huddle_core::SessionId;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// A pre-encoded outbound frame.
///
/// One broadcast encodes once and every recipient's queue holds the same
/// allocation. Each writer copies it into its own transport message when
/// it sends.
pub type Frame = Arc<str>;

/// Lifecycle of a session.
///
/// `Connecting -> Joined -> Closing -> Closed`. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SessionState {
    /// Upgrade accepted, not yet a room member.
    Connecting = 0,
    /// Member of its room; the only state that takes part in broadcast.
    Joined = 1,
    /// Disconnect detected; inbound frames are discarded.
    Closing = 2,
    /// Terminal.
    Closed = 3,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connecting,
            1 => Self::Joined,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Result of handing one frame to a session's outbound channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the writer.
    Enqueued,
    /// The queue is at capacity; the recipient is not draining.
    Full,
    /// The writer is gone.
    Closed,
}

/// One connection's membership handle.
///
/// Shared between the room it is joined to and the transport tasks. The
/// room name is fixed at construction; a session never moves rooms.
pub struct Session {
    id: SessionId,
    room: String,
    tx: mpsc::Sender<Frame>,
    state: AtomicU8,
    /// Fired to ask the transport tasks to shut the connection down.
    shutdown: CancellationToken,
    /// Whether any frame or pong arrived since the last heartbeat check.
    is_alive: AtomicBool,
    last_activity: Mutex<Instant>,
    connected_at: Instant,
}

impl Session {
    /// Create a session bound to `room` with an outbound queue of `capacity`
    /// frames. Returns the session and the receiving half for its writer.
    pub fn new(room: impl Into<String>, capacity: usize) -> (Arc<Self>, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let now = Instant::now();
        let session = Self {
            id: SessionId::new(),
            room: room.into(),
            tx,
            state: AtomicU8::new(SessionState::Connecting as u8),
            shutdown: CancellationToken::new(),
            is_alive: AtomicBool::new(true),
            last_activity: Mutex::new(now),
            connected_at: now,
        };
        (Arc::new(session), rx)
    }

    /// Session id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Name of the room this session belongs to.
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `Connecting -> Joined`. Returns `false` from any other state.
    pub(crate) fn mark_joined(&self) -> bool {
        self.state
            .compare_exchange(
                SessionState::Connecting as u8,
                SessionState::Joined as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to `Closing`. Returns `true` only for the call that performed
    /// the transition, so teardown runs exactly once.
    pub fn begin_closing(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current >= SessionState::Closing as u8 {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                SessionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.shutdown.cancel();
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Enter the terminal state.
    pub fn mark_closed(&self) {
        self.state.store(SessionState::Closed as u8, Ordering::Release);
        self.shutdown.cancel();
    }

    /// Whether the session should stop taking part in its room: either it
    /// is past `Joined`, or something asked it to shut down.
    pub fn is_closing(&self) -> bool {
        self.shutdown.is_cancelled() || self.state() >= SessionState::Closing
    }

    /// Ask the transport tasks to close the connection.
    ///
    /// Used by forced eviction and process shutdown. Membership removal is
    /// the caller's responsibility.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Resolves once [`Session::close`] (or teardown) has been requested.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.shutdown.cancelled()
    }

    /// Clone of the shutdown token, for tasks that outlive a borrow.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Non-blocking enqueue onto the outbound channel.
    pub fn deliver(&self, frame: Frame) -> Delivery {
        match self.tx.try_send(frame) {
            Ok(()) => Delivery::Enqueued,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Record inbound activity (any frame, including pongs).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_activity.lock() = Instant::now();
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last inbound activity (or since connect).
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("room", &self.room)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
