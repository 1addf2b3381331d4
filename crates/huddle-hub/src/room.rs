//! One room's live membership and its broadcast fan-out.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use huddle_core::constants::{
    ROOM_BROADCASTS_TOTAL, ROOM_DELIVERIES_TOTAL, ROOM_LAGGING_EVICTIONS_TOTAL,
};
use huddle_core::{ChatMessage, SessionId};
use metrics::counter;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::registry::RegistryInner;
use crate::session::{Delivery, Frame, Session};

/// Outcome of [`Room::join`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The session is now a member.
    Joined,
    /// The session was already a member; nothing changed.
    AlreadyJoined,
    /// The session is closing or closed and may not join anything.
    SessionClosed,
    /// The session belongs to a different room.
    WrongRoom,
    /// This room object was evicted from the registry; look it up again.
    Retired,
}

/// Outcome of [`Room::leave`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The session was removed; `remaining` members are left.
    Left {
        /// Membership size after the removal.
        remaining: usize,
    },
    /// The session was not a member. Repeated leaves land here.
    NotMember,
}

/// What one [`Room::broadcast`] call did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions the frame was enqueued for.
    pub delivered: usize,
    /// Sessions dropped from the room during this broadcast, either because
    /// their outbound queue was full or their writer was already gone.
    pub evicted: Vec<SessionId>,
}

#[derive(Default)]
struct Members {
    sessions: HashMap<SessionId, Arc<Session>>,
    /// Set under the registry's lock when this object is removed from it.
    retired: bool,
}

/// A named fan-out group.
///
/// Membership and the retired flag live behind one mutex, which also
/// serializes broadcasts: every member sees frames in invocation order.
pub struct Room {
    name: String,
    members: Mutex<Members>,
    registry: Weak<RegistryInner>,
}

impl Room {
    pub(crate) fn new(name: impl Into<String>, registry: Weak<RegistryInner>) -> Self {
        Self {
            name: name.into(),
            members: Mutex::new(Members::default()),
            registry,
        }
    }

    /// Create a room that is not attached to any registry.
    pub fn detached(name: impl Into<String>) -> Self {
        Self::new(name, Weak::new())
    }

    /// Room name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add `session` to the membership. Join is silent: nobody is notified.
    pub fn join(&self, session: &Arc<Session>) -> JoinOutcome {
        if session.room() != self.name {
            return JoinOutcome::WrongRoom;
        }
        let mut members = self.members.lock();
        if members.retired {
            return JoinOutcome::Retired;
        }
        if members.sessions.contains_key(session.id()) {
            return JoinOutcome::AlreadyJoined;
        }
        if session.is_closing() || !session.mark_joined() {
            return JoinOutcome::SessionClosed;
        }
        let _ = members.sessions.insert(session.id().clone(), Arc::clone(session));
        debug!(
            room = %self.name,
            session_id = %session.id(),
            members = members.sessions.len(),
            "session joined"
        );
        JoinOutcome::Joined
    }

    /// Remove `session` from the membership.
    ///
    /// When the membership drops to zero the registry is asked to evict this
    /// room. Safe to call any number of times and from any task.
    pub fn leave(&self, session: &Session) -> LeaveOutcome {
        let remaining = {
            let mut members = self.members.lock();
            if members.sessions.remove(session.id()).is_none() {
                return LeaveOutcome::NotMember;
            }
            members.sessions.len()
        };
        debug!(room = %self.name, session_id = %session.id(), remaining, "session left");
        if remaining == 0 {
            self.notify_registry_empty();
        }
        LeaveOutcome::Left { remaining }
    }

    /// Deliver `message` to every current member, the originator included.
    ///
    /// Never waits on a recipient. A member whose queue is full is evicted
    /// from the room and asked to close; the rest still get the frame.
    pub fn broadcast(&self, origin: &SessionId, message: &ChatMessage) -> BroadcastReport {
        let frame: Frame = match message.encode() {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!(
                    room = %self.name,
                    session_id = %origin,
                    error = %e,
                    "failed to encode chat message"
                );
                return BroadcastReport::default();
            }
        };
        self.broadcast_frame(origin, &frame)
    }

    /// Fan out an already-encoded frame.
    pub fn broadcast_frame(&self, origin: &SessionId, frame: &Frame) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut lagging = 0_u64;
        let remaining = {
            let mut members = self.members.lock();
            for (id, session) in &members.sessions {
                match session.deliver(Arc::clone(frame)) {
                    Delivery::Enqueued => report.delivered += 1,
                    Delivery::Full => {
                        warn!(
                            room = %self.name,
                            session_id = %id,
                            "outbound queue full, evicting lagging session"
                        );
                        session.close();
                        lagging += 1;
                        report.evicted.push(id.clone());
                    }
                    Delivery::Closed => {
                        debug!(room = %self.name, session_id = %id, "writer gone, pruning session");
                        session.close();
                        report.evicted.push(id.clone());
                    }
                }
            }
            for id in &report.evicted {
                let _ = members.sessions.remove(id);
            }
            members.sessions.len()
        };

        counter!(ROOM_BROADCASTS_TOTAL).increment(1);
        counter!(ROOM_DELIVERIES_TOTAL).increment(report.delivered as u64);
        if lagging > 0 {
            counter!(ROOM_LAGGING_EVICTIONS_TOTAL).increment(lagging);
        }
        debug!(
            room = %self.name,
            session_id = %origin,
            recipients = report.delivered,
            evicted = report.evicted.len(),
            "broadcast"
        );

        if remaining == 0 && !report.evicted.is_empty() {
            self.notify_registry_empty();
        }
        report
    }

    /// Current membership size.
    pub fn member_count(&self) -> usize {
        self.members.lock().sessions.len()
    }

    /// Whether `id` is currently a member.
    pub fn contains(&self, id: &SessionId) -> bool {
        self.members.lock().sessions.contains_key(id)
    }

    /// Whether this object has been evicted from its registry.
    #[cfg(test)]
    pub(crate) fn is_retired(&self) -> bool {
        self.members.lock().retired
    }

    /// Ask every member to close its connection. Returns how many were asked.
    ///
    /// Members leave through their own teardown path.
    pub fn close_all(&self) -> usize {
        let members = self.members.lock();
        for session in members.sessions.values() {
            session.close();
        }
        members.sessions.len()
    }

    /// Mark retired if empty. Called by the registry while it holds the
    /// lock on this room's entry, so the check and the removal are atomic.
    pub(crate) fn retire_if_empty(&self) -> bool {
        let mut members = self.members.lock();
        if members.sessions.is_empty() {
            members.retired = true;
            true
        } else {
            false
        }
    }

    fn notify_registry_empty(&self) {
        if let Some(registry) = self.registry.upgrade() {
            let _ = registry.remove_if_empty(&self.name, Some(self));
        }
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("name", &self.name)
            .field("members", &self.member_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use tokio::sync::mpsc;

    fn session(room: &str) -> (Arc<Session>, mpsc::Receiver<Frame>) {
        Session::new(room, 8)
    }

    fn hi() -> ChatMessage {
        ChatMessage::new("hi", "111", "a.png")
    }

    #[test]
    fn join_adds_member() {
        let room = Room::detached("lobby");
        let (a, _rx) = session("lobby");
        assert_eq!(room.join(&a), JoinOutcome::Joined);
        assert_eq!(room.member_count(), 1);
        assert!(room.contains(a.id()));
        assert_eq!(a.state(), SessionState::Joined);
    }

    #[test]
    fn second_join_is_a_noop() {
        let room = Room::detached("lobby");
        let (a, _rx) = session("lobby");
        assert_eq!(room.join(&a), JoinOutcome::Joined);
        assert_eq!(room.join(&a), JoinOutcome::AlreadyJoined);
        assert_eq!(room.member_count(), 1);
    }

    #[test]
    fn join_from_other_room_is_rejected() {
        let room = Room::detached("lobby");
        let (a, _rx) = session("kitchen");
        assert_eq!(room.join(&a), JoinOutcome::WrongRoom);
        assert_eq!(room.member_count(), 0);
    }

    #[test]
    fn join_after_close_is_rejected() {
        let room = Room::detached("lobby");
        let (a, _rx) = session("lobby");
        assert!(a.begin_closing());
        assert_eq!(room.join(&a), JoinOutcome::SessionClosed);
        assert_eq!(room.member_count(), 0);
    }

    #[test]
    fn rejoin_after_leave_is_rejected() {
        let room = Room::detached("lobby");
        let (a, _rx) = session("lobby");
        let _ = room.join(&a);
        let _ = room.leave(&a);
        // the session already left its Connecting state
        assert_eq!(room.join(&a), JoinOutcome::SessionClosed);
    }

    #[test]
    fn leave_is_idempotent() {
        let room = Room::detached("lobby");
        let (a, _rx) = session("lobby");
        let (b, _rx_b) = session("lobby");
        let _ = room.join(&a);
        let _ = room.join(&b);
        assert_eq!(room.leave(&a), LeaveOutcome::Left { remaining: 1 });
        assert_eq!(room.leave(&a), LeaveOutcome::NotMember);
        assert_eq!(room.member_count(), 1);
    }

    #[test]
    fn leave_of_stranger_is_noop() {
        let room = Room::detached("lobby");
        let (a, _rx) = session("lobby");
        assert_eq!(room.leave(&a), LeaveOutcome::NotMember);
    }

    #[tokio::test]
    async fn broadcast_echoes_to_sender() {
        let room = Room::detached("lobby");
        let (a, mut rx_a) = session("lobby");
        let (b, mut rx_b) = session("lobby");
        let _ = room.join(&a);
        let _ = room.join(&b);

        let report = room.broadcast(a.id(), &hi());
        assert_eq!(report.delivered, 2);
        assert!(report.evicted.is_empty());

        let expected =
            serde_json::json!({"message": "hi", "phone_number": "111", "avatar": "a.png"});
        for rx in [&mut rx_a, &mut rx_b] {
            let frame = rx.recv().await.unwrap();
            let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
            assert_eq!(value, expected);
        }
    }

    #[test]
    fn broadcast_skips_late_joiners_and_leavers() {
        let room = Room::detached("lobby");
        let (a, mut rx_a) = session("lobby");
        let (b, mut rx_b) = session("lobby");
        let (c, mut rx_c) = session("lobby");
        let _ = room.join(&a);
        let _ = room.join(&b);
        let _ = room.leave(&b);

        let report = room.broadcast(a.id(), &hi());
        let _ = room.join(&c);

        assert_eq!(report.delivered, 1);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
        assert!(rx_c.try_recv().is_err());
    }

    #[test]
    fn broadcast_to_empty_room_delivers_nothing() {
        let room = Room::detached("lobby");
        let report = room.broadcast(&SessionId::new(), &hi());
        assert_eq!(report, BroadcastReport::default());
    }

    #[test]
    fn full_queue_evicts_only_the_lagging_session() {
        let room = Room::detached("lobby");
        let (fast, mut rx_fast) = Session::new("lobby", 8);
        let (slow, _rx_slow) = Session::new("lobby", 1);
        let _ = room.join(&fast);
        let _ = room.join(&slow);

        let first = room.broadcast(fast.id(), &hi());
        assert_eq!(first.delivered, 2);

        let second = room.broadcast(fast.id(), &hi());
        assert_eq!(second.delivered, 1);
        assert_eq!(second.evicted, vec![slow.id().clone()]);
        assert!(!room.contains(slow.id()));
        assert!(slow.is_closing());
        assert!(!fast.is_closing());

        assert!(rx_fast.try_recv().is_ok());
        assert!(rx_fast.try_recv().is_ok());

        // the evicted session's own teardown finds nothing to remove
        assert_eq!(room.leave(&slow), LeaveOutcome::NotMember);
    }

    #[test]
    fn dead_writer_is_pruned() {
        let room = Room::detached("lobby");
        let (a, rx_a) = session("lobby");
        let (b, _rx_b) = session("lobby");
        let _ = room.join(&a);
        let _ = room.join(&b);
        drop(rx_a);

        let report = room.broadcast(b.id(), &hi());
        assert_eq!(report.delivered, 1);
        assert_eq!(report.evicted, vec![a.id().clone()]);
        assert_eq!(room.member_count(), 1);
    }

    #[test]
    fn broadcast_order_matches_invocation_order() {
        let room = Room::detached("lobby");
        let (a, mut rx_a) = session("lobby");
        let (b, mut rx_b) = session("lobby");
        let _ = room.join(&a);
        let _ = room.join(&b);

        for i in 0..5 {
            let _ = room.broadcast(a.id(), &ChatMessage::new(format!("m{i}"), "1", "x"));
        }
        for rx in [&mut rx_a, &mut rx_b] {
            for i in 0..5 {
                let frame = rx.try_recv().unwrap();
                let msg = ChatMessage::decode(&frame).unwrap();
                assert_eq!(msg.text, format!("m{i}"));
            }
        }
    }

    #[test]
    fn recipients_share_one_encoded_frame() {
        let room = Room::detached("lobby");
        let (a, mut rx_a) = session("lobby");
        let (b, mut rx_b) = session("lobby");
        let _ = room.join(&a);
        let _ = room.join(&b);

        let _ = room.broadcast(a.id(), &hi());
        let fa = rx_a.try_recv().unwrap();
        let fb = rx_b.try_recv().unwrap();
        assert!(Arc::ptr_eq(&fa, &fb));
    }

    #[test]
    fn close_all_signals_every_member() {
        let room = Room::detached("lobby");
        let (a, _rx_a) = session("lobby");
        let (b, _rx_b) = session("lobby");
        let _ = room.join(&a);
        let _ = room.join(&b);

        assert_eq!(room.close_all(), 2);
        assert!(a.is_closing());
        assert!(b.is_closing());
        // membership is released by each session's teardown
        assert_eq!(room.member_count(), 2);
    }

    #[test]
    fn retire_only_when_empty() {
        let room = Room::detached("lobby");
        let (a, _rx) = session("lobby");
        let _ = room.join(&a);
        assert!(!room.retire_if_empty());
        assert!(!room.is_retired());

        let _ = room.leave(&a);
        assert!(room.retire_if_empty());
        assert!(room.is_retired());

        let (b, _rx_b) = session("lobby");
        assert_eq!(room.join(&b), JoinOutcome::Retired);
        // a retired lookup does not consume the session
        assert_eq!(b.state(), SessionState::Connecting);
    }
}
