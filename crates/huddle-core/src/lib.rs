//! # huddle-core
//!
//! Foundation types shared by every huddle crate.
//!
//! - **Branded IDs**: [`SessionId`] newtype for live connections
//! - **Wire frames**: [`ChatMessage`] and strict frame decoding
//! - **Errors**: [`FrameError`] for payloads that fail validation
//! - **Constants**: package name/version and metric names
//! - **Logging**: `tracing` subscriber initialization

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod message;

pub use errors::FrameError;
pub use ids::SessionId;
pub use logging::{LogFormat, init_subscriber};
pub use message::ChatMessage;
