//! Presence query: how many sessions a room holds right now.

use huddle_hub::RoomRegistry;
use serde::{Deserialize, Serialize};

/// Body of `GET /rooms/{room_name}/info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    /// Room asked about.
    pub room_name: String,
    /// Sessions currently joined; `0` for rooms that do not exist.
    pub active_connections: usize,
}

/// Read a room's live count without creating it.
pub fn room_info(registry: &RoomRegistry, room_name: &str) -> RoomInfo {
    RoomInfo {
        room_name: room_name.to_owned(),
        active_connections: registry.count(room_name),
    }
}
