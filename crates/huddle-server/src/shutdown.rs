//! Graceful shutdown: stop admitting, close every live session, wait for
//! rooms to empty, then wind down background tasks.

use std::time::Duration;

use huddle_hub::RoomRegistry;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How often the drain re-checks the registry.
const DRAIN_POLL: Duration = Duration::from_millis(20);

/// What a graceful shutdown managed to do before its deadline.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Sessions asked to close.
    pub sessions_closed: usize,
    /// Sessions still joined when the deadline passed.
    pub sessions_remaining: usize,
    /// Background tasks aborted after the deadline.
    pub tasks_aborted: usize,
}

impl ShutdownReport {
    /// Whether everything wound down in time.
    pub fn is_clean(&self) -> bool {
        self.sessions_remaining == 0 && self.tasks_aborted == 0
    }
}

/// Owns the server-wide stop signal and the hub's drain sequence.
///
/// The listener and every session task watch [`token`](Self::token); the
/// front door refuses upgrades once it has fired.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    registry: RoomRegistry,
}

impl ShutdownCoordinator {
    /// Coordinator for the sessions held by `registry`.
    pub fn new(registry: RoomRegistry) -> Self {
        Self {
            token: CancellationToken::new(),
            registry,
        }
    }

    /// The stop signal watched by the listener and session tasks.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fire the stop signal and ask every joined session to close.
    ///
    /// Returns how many sessions were asked. Later calls ask again, which is
    /// harmless.
    pub fn begin(&self) -> usize {
        self.token.cancel();
        self.registry.close_all()
    }

    /// Wait until no session is joined anywhere, or until `deadline`.
    /// Returns the number still joined.
    async fn drain_sessions(&self, deadline: Instant) -> usize {
        loop {
            let remaining = self.registry.session_count();
            if remaining == 0 || Instant::now() >= deadline {
                return remaining;
            }
            tokio::time::sleep_until(deadline.min(Instant::now() + DRAIN_POLL)).await;
        }
    }

    /// Run the whole sequence within `timeout`: [`begin`](Self::begin),
    /// drain the rooms, then wait for `handles` with whatever time is left.
    /// Tasks still running at the deadline are aborted.
    pub async fn graceful_shutdown(
        &self,
        handles: Vec<JoinHandle<()>>,
        timeout: Duration,
    ) -> ShutdownReport {
        let deadline = Instant::now() + timeout;
        let sessions_closed = self.begin();
        info!(
            sessions = sessions_closed,
            rooms = self.registry.room_count(),
            tasks = handles.len(),
            "closing live sessions"
        );

        let sessions_remaining = self.drain_sessions(deadline).await;
        if sessions_remaining > 0 {
            warn!(
                remaining = sessions_remaining,
                rooms = ?self.registry.room_names(),
                "sessions still joined at shutdown deadline"
            );
        }

        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let joined = tokio::time::timeout_at(deadline, futures::future::join_all(handles)).await;
        let tasks_aborted = if joined.is_ok() {
            0
        } else {
            let running: Vec<_> = aborts.into_iter().filter(|a| !a.is_finished()).collect();
            for handle in &running {
                handle.abort();
            }
            warn!(aborted = running.len(), "background tasks outlived the shutdown deadline");
            running.len()
        };

        ShutdownReport {
            sessions_closed,
            sessions_remaining,
            tasks_aborted,
        }
    }
}
