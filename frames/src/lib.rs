//! Shared frame model and JSON codec for the realtime chat transport.
//!
//! This crate owns the wire representation exchanged with the dashboard chat
//! backend. Outbound traffic has exactly one shape ([`OutboundFrame`]);
//! inbound text is classified into step-progress notices or chat updates.
//!
//! Chat updates are kept as the parsed JSON value so that fields the client
//! does not know about survive untouched. Typed views over the value are
//! provided on demand and never make decoding itself fail.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Discriminant value of `"type"` marking a step-progress frame.
pub const STEP_FRAME_TYPE: &str = "step";

/// Error returned by the inbound codec.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The raw text could not be parsed as JSON.
    #[error("malformed frame payload: {0}")]
    Malformed(#[source] serde_json::Error),
    /// The `history` field of a chat update does not match the entry shape.
    #[error("invalid chat history: {0}")]
    History(#[source] serde_json::Error),
}

// =============================================================================
// OUTBOUND
// =============================================================================

/// The only payload shape a caller may send.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundFrame {
    pub message: String,
}

impl OutboundFrame {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Encode an outbound frame as JSON text.
#[must_use]
pub fn encode_outbound(frame: &OutboundFrame) -> String {
    // Serializing a struct with a single string field cannot fail.
    serde_json::to_string(frame).unwrap_or_default()
}

// =============================================================================
// INBOUND
// =============================================================================

/// A classified inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundFrame {
    /// Progress notice for a multi-step server operation.
    Step(StepProgress),
    /// Anything that is not a step notice.
    Chat(ChatUpdate),
}

/// Progress of a multi-step server operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepProgress {
    pub step_index: u64,
    pub description: String,
}

/// A chat update, passed through exactly as received.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatUpdate(Value);

impl ChatUpdate {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Conversation the update belongs to, if present.
    #[must_use]
    pub fn conversation_id(&self) -> Option<&str> {
        self.0.get("conversation_id").and_then(Value::as_str)
    }

    /// Server-side error string carried alongside the history, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.0.get("error").and_then(Value::as_str)
    }

    /// Typed view of the ordered conversation history.
    ///
    /// A missing `history` field yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::History`] when an entry lacks `role` or
    /// `content` or a known field has the wrong type.
    pub fn history(&self) -> Result<Vec<HistoryEntry>, CodecError> {
        match self.0.get("history") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(history) => {
                Vec::<HistoryEntry>::deserialize(history).map_err(CodecError::History)
            }
        }
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }
}

/// One entry of a conversation history.
///
/// Only `role` and `content` are required. Unknown fields are kept in
/// `extra` so protocol additions do not break decoding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Number of agent steps that produced this entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Decode and classify one inbound text payload.
///
/// Only unparsable text is an error. A parsed value of any other shape is a
/// chat update; checking its fields is left to the consumer.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] when `text` is not valid JSON.
pub fn decode_inbound(text: &str) -> Result<InboundFrame, CodecError> {
    let value: Value = serde_json::from_str(text).map_err(CodecError::Malformed)?;
    Ok(classify(value))
}

fn classify(value: Value) -> InboundFrame {
    if value.get("type").and_then(Value::as_str) == Some(STEP_FRAME_TYPE) {
        return InboundFrame::Step(StepProgress {
            step_index: value.get("step").map_or(0, step_number),
            description: value
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
        });
    }
    InboundFrame::Chat(ChatUpdate(value))
}

/// Coerce the `step` field to an index; anything unusable is step 0.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn step_number(value: &Value) -> u64 {
    if let Some(n) = value.as_u64() {
        return n;
    }
    match value.as_f64() {
        Some(f) if f.is_finite() && f >= 1.0 => f as u64,
        _ => 0,
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
