//! Chat frame carried over the room WebSocket.
//!
//! Inbound and outbound frames share one shape:
//!
//! ```json
//! {"message": "hi", "phone_number": "111", "avatar": "a.png"}
//! ```
//!
//! All three fields are required strings. `phone_number` and `avatar` are
//! claims made by the sender and are passed through untouched.

use serde::{Deserialize, Serialize};

use crate::errors::FrameError;

/// One chat message, alive only for the duration of a broadcast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message body.
    #[serde(rename = "message")]
    pub text: String,
    /// Display handle of the sender (unverified).
    #[serde(rename = "phone_number")]
    pub sender_handle: String,
    /// Avatar reference of the sender (unverified).
    pub avatar: String,
}

impl ChatMessage {
    /// Build a message from its parts.
    pub fn new(
        text: impl Into<String>,
        sender_handle: impl Into<String>,
        avatar: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            sender_handle: sender_handle.into(),
            avatar: avatar.into(),
        }
    }

    /// Decode a text frame.
    pub fn decode(frame: &str) -> Result<Self, FrameError> {
        if frame.trim().is_empty() {
            return Err(FrameError::Empty);
        }
        Ok(serde_json::from_str(frame)?)
    }

    /// Decode a binary frame holding UTF-8 JSON.
    pub fn decode_bytes(frame: &[u8]) -> Result<Self, FrameError> {
        let text =
            std::str::from_utf8(frame).map_err(|_| FrameError::NotUtf8 { len: frame.len() })?;
        Self::decode(text)
    }

    /// Encode to the wire representation.
    pub fn encode(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }
}
