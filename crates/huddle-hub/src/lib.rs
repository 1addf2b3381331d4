//! # huddle-hub
//!
//! Transport-agnostic room broadcast hub.
//!
//! - [`Session`]: one connection's membership handle, outbound queue, and
//!   lifecycle state (`Connecting -> Joined -> Closing -> Closed`)
//! - [`Room`]: a named fan-out group; join, leave, broadcast
//! - [`RoomRegistry`]: name to room directory with lazy creation and
//!   eviction when a room empties
//!
//! Backpressure: broadcast never waits. A recipient whose bounded queue is
//! full is evicted from its room and its connection is asked to close.

#![deny(unsafe_code)]

pub mod registry;
pub mod room;
pub mod session;

pub use registry::RoomRegistry;
pub use room::{BroadcastReport, JoinOutcome, LeaveOutcome, Room};
pub use session::{Delivery, Frame, Session, SessionState};
