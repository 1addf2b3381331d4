//! Frame validation errors.

use thiserror::Error;

/// Why an inbound frame could not be turned into a chat message.
///
/// These never close a connection; the offending frame is dropped.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The frame was empty or whitespace only.
    #[error("empty frame")]
    Empty,
    /// A binary frame did not contain UTF-8 text.
    #[error("binary frame of {len} bytes is not valid UTF-8")]
    NotUtf8 {
        /// Length of the rejected frame in bytes.
        len: usize,
    },
    /// JSON was invalid, a field was missing, or a field had the wrong type.
    #[error("malformed chat frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl FrameError {
    /// Short stable label, used as a metric dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::NotUtf8 { .. } => "not_utf8",
            Self::Malformed(_) => "malformed",
        }
    }
}
