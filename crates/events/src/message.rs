//! Realtime wire frame.
//!
//! ```json
//! { "action": "join" | "leave" | "update" | "error",
//!   "roomID": "...", "clientID": "...", "data": <count or any JSON> }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::ident::{ClientId, RoomId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Join,
    Leave,
    Update,
    /// Sent by the server to a single connection whose frame could not be handled.
    Error,
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("failed to encode message: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomMessage {
    pub action: Action,
    #[serde(rename = "roomID", default)]
    pub room_id: String,
    #[serde(rename = "clientID", default)]
    pub client_id: String,
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub data: JsonValue,
}

impl RoomMessage {
    pub fn new(action: Action, room_id: &RoomId, client_id: &ClientId, data: JsonValue) -> Self {
        Self {
            action,
            room_id: room_id.to_string(),
            client_id: client_id.to_string(),
            data,
        }
    }

    /// Membership change carrying the room's current headcount.
    pub fn headcount(action: Action, room_id: &RoomId, client_id: &ClientId, count: usize) -> Self {
        Self::new(action, room_id, client_id, JsonValue::from(count))
    }

    pub fn error(room_id: Option<&RoomId>, client_id: &ClientId, reason: impl Into<String>) -> Self {
        Self {
            action: Action::Error,
            room_id: room_id.map(ToString::to_string).unwrap_or_default(),
            client_id: client_id.to_string(),
            data: JsonValue::String(reason.into()),
        }
    }

    pub fn decode(frame: &str) -> Result<Self, MessageError> {
        serde_json::from_str(frame).map_err(|e| MessageError::Malformed(e.to_string()))
    }

    pub fn encode(&self) -> Result<String, MessageError> {
        serde_json::to_string(self).map_err(|e| MessageError::Encode(e.to_string()))
    }

    /// Member count for `join`/`leave` frames.
    pub fn count(&self) -> Option<u64> {
        self.data.as_u64()
    }
}
