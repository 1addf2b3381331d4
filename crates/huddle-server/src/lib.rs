//! # huddle-server
//!
//! Axum HTTP + WebSocket front door for the room hub.
//!
//! - `GET /ws/{room_name}`: join a room over WebSocket
//! - `GET /rooms/{room_name}/info`: live member count
//! - `GET /healthz`, `GET /readyz`: liveness and readiness
//! - `GET /metrics`: Prometheus exposition

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod presence;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use server::{AppState, HuddleServer};
