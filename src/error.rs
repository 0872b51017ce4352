//! Failures delivered to the error handler.
//!
//! Nothing in this crate returns these to the caller; they travel through
//! [`crate::Connection::on_error`]. The display strings are fixed so callers
//! matching on text keep working.

use std::sync::Arc;

pub const INVALID_MESSAGE_FORMAT: &str = "Invalid message format";
pub const CONNECTION_ERROR: &str = "WebSocket connection error";
pub const NOT_CONNECTED: &str = "WebSocket not connected";

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    /// An inbound payload was not parseable. The frame was dropped.
    #[error("Invalid message format")]
    Decode {
        #[source]
        source: Arc<frames::CodecError>,
    },
    /// The transport reported a failure; a close usually follows.
    #[error("WebSocket connection error")]
    Transport { detail: String },
    /// `send` was called outside the open state. Nothing was written.
    #[error("WebSocket not connected")]
    NotConnected,
}

impl ConnectionError {
    /// Short machine-readable tag for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "decode",
            Self::Transport { .. } => "transport",
            Self::NotConnected => "not_connected",
        }
    }
}

impl From<frames::CodecError> for ConnectionError {
    fn from(source: frames::CodecError) -> Self {
        Self::Decode { source: Arc::new(source) }
    }
}
