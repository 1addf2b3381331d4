//! WebSocket front door, per-connection session loop and heartbeat.

pub mod heartbeat;
pub mod session;
pub mod upgrade;
