//! Process-wide directory of live rooms.
//!
//! Rooms are created on first join and removed as soon as their membership
//! reaches zero. The check-then-remove in [`RoomRegistry::notify_empty`]
//! runs under the map's shard lock and the room's own lock, so a joiner that
//! raced the eviction either lands in the old room before the check (and
//! keeps it alive) or finds it retired and retries against a fresh one.

use std::sync::Arc;

use dashmap::DashMap;
use huddle_core::constants::ROOMS_ACTIVE;
use metrics::gauge;
use tracing::debug;

use crate::room::{JoinOutcome, Room};
use crate::session::Session;

#[derive(Default)]
pub(crate) struct RegistryInner {
    rooms: DashMap<String, Arc<Room>>,
}

impl RegistryInner {
    /// Remove `name` if its room is still empty. With `expected`, only that
    /// exact room object is removed, so a stale notification cannot evict a
    /// successor room created under the same name.
    pub(crate) fn remove_if_empty(&self, name: &str, expected: Option<&Room>) -> bool {
        let removed = self
            .rooms
            .remove_if(name, |_, room| {
                let same = expected.is_none_or(|e| std::ptr::eq(e, Arc::as_ptr(room)));
                same && room.retire_if_empty()
            })
            .is_some();
        if removed {
            debug!(room = name, "room evicted");
            self.record_room_gauge();
        }
        removed
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_room_gauge(&self) {
        gauge!(ROOMS_ACTIVE).set(self.rooms.len() as f64);
    }
}

/// Shared handle to the room directory.
///
/// Cheap to clone; every clone sees the same rooms. Constructed once at
/// startup and handed to the front door and the presence query.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    inner: Arc<RegistryInner>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the room for `name`, creating it if absent.
    ///
    /// Concurrent callers for the same new name all receive the same object.
    pub fn get_or_create(&self, name: &str) -> Arc<Room> {
        if let Some(room) = self.inner.rooms.get(name) {
            return Arc::clone(room.value());
        }
        let mut created = false;
        let room = Arc::clone(
            self.inner
                .rooms
                .entry(name.to_owned())
                .or_insert_with(|| {
                    created = true;
                    Arc::new(Room::new(name, Arc::downgrade(&self.inner)))
                })
                .value(),
        );
        if created {
            debug!(room = name, "room created");
            self.inner.record_room_gauge();
        }
        room
    }

    /// Look up a room without creating it.
    pub fn get(&self, name: &str) -> Option<Arc<Room>> {
        self.inner.rooms.get(name).map(|r| Arc::clone(r.value()))
    }

    /// Join `session` to the room named by [`Session::room`].
    ///
    /// Retries when the looked-up room was evicted between lookup and join.
    /// A refused join leaves no empty room behind.
    pub fn join(&self, session: &Arc<Session>) -> (Arc<Room>, JoinOutcome) {
        loop {
            let room = self.get_or_create(session.room());
            match room.join(session) {
                JoinOutcome::Retired => continue,
                outcome @ (JoinOutcome::Joined | JoinOutcome::AlreadyJoined) => {
                    return (room, outcome);
                }
                refused => {
                    let _ = self.inner.remove_if_empty(room.name(), Some(&*room));
                    return (room, refused);
                }
            }
        }
    }

    /// Drop the entry for `name` if its room is empty right now.
    ///
    /// Returns whether an entry was removed. A non-empty or missing room is
    /// left alone, so repeated or late notifications are harmless.
    pub fn notify_empty(&self, name: &str) -> bool {
        self.inner.remove_if_empty(name, None)
    }

    /// Number of sessions joined to `name`; zero for unknown rooms.
    /// Never creates a room.
    pub fn count(&self, name: &str) -> usize {
        self.inner
            .rooms
            .get(name)
            .map_or(0, |room| room.member_count())
    }

    /// Whether a room object currently exists for `name`.
    pub fn contains_room(&self, name: &str) -> bool {
        self.inner.rooms.contains_key(name)
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.inner.rooms.len()
    }

    /// Number of joined sessions across all rooms.
    pub fn session_count(&self) -> usize {
        self.inner
            .rooms
            .iter()
            .map(|entry| entry.value().member_count())
            .sum()
    }

    /// Names of all live rooms, in no particular order.
    pub fn room_names(&self) -> Vec<String> {
        self.inner.rooms.iter().map(|e| e.key().clone()).collect()
    }

    /// Ask every session in every room to close. Returns how many were asked.
    ///
    /// Rooms empty out, and are evicted, as each session tears down.
    pub fn close_all(&self) -> usize {
        let rooms: Vec<Arc<Room>> =
            self.inner.rooms.iter().map(|e| Arc::clone(e.value())).collect();
        rooms.iter().map(|room| room.close_all()).sum()
    }
}

impl std::fmt::Debug for RoomRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomRegistry")
            .field("rooms", &self.room_count())
            .finish()
    }
}
