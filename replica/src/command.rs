//! Ephemeral command messages.
//!
//! DESIGN
//! ======
//! Commands are the non-persisted side channel: "object locked", "group
//! created", cursor signals — anything peers must see immediately but
//! that must never enter the replicated document. They share the
//! document's connection as JSON text frames and exist only for the
//! duration of one broadcast fan-out.
//!
//! The server stamps `senderId` and `timestamp` on every command it
//! relays; client-supplied values for those fields are overwritten.

#[cfg(test)]
#[path = "command_test.rs"]
mod command_test;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// The `type` tag every command message carries.
pub const COMMAND_TYPE: &str = "command";

/// Error returned when parsing an inbound command frame.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("invalid command JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected message type: {0:?}")]
    WrongType(String),
    #[error("command payload must be a JSON object")]
    PayloadNotObject,
}

/// A single ephemeral command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandMessage {
    /// Always `"command"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Command name, e.g. `"lock"` or `"group-created"`.
    pub command: String,
    /// Command-specific payload object.
    pub payload: serde_json::Value,
    /// Authoritative sender id, stamped by the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    /// Authoritative send time in milliseconds since the Unix epoch,
    /// stamped by the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Current time as milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl CommandMessage {
    /// Create an unstamped command for sending.
    pub fn new(command: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: COMMAND_TYPE.to_owned(),
            command: command.into(),
            payload,
            sender_id: None,
            timestamp: None,
        }
    }

    /// Parse an inbound text frame as a command. Rejects frames whose
    /// `type` tag is not `"command"` and payloads that are not objects.
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let msg: Self = serde_json::from_str(text)?;
        if msg.kind != COMMAND_TYPE {
            return Err(CommandError::WrongType(msg.kind));
        }
        if !msg.payload.is_object() {
            return Err(CommandError::PayloadNotObject);
        }
        Ok(msg)
    }

    /// Stamp sender id and timestamp, overwriting anything the client
    /// supplied. Server-added values are authoritative.
    #[must_use]
    pub fn stamped(mut self, sender_id: impl Into<String>, timestamp: i64) -> Self {
        self.sender_id = Some(sender_id.into());
        self.timestamp = Some(timestamp);
        self
    }

    /// Encode for the wire.
    ///
    /// # Panics
    ///
    /// Never panics in practice: the message contains only
    /// JSON-representable data by construction.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("command serializes to JSON")
    }
}
