//! Outbound events.
//!
//! Frame layout: `{ "v": 1, "event": <name>, "data": { ... } }`.

use serde::{Deserialize, Serialize};

use crate::error::{HuddleError, Result};
use crate::ids::{ConnectionId, RoomId, UserId};
use crate::model::MessageRecord;
use crate::protocol::text::PROTOCOL_VERSION;

/// `reason` carried by `UserLeft` when the sweeper evicts a connection.
pub const IDLE_REASON: &str = "idle";

/// Human-readable text sent with idle evictions.
pub const IDLE_KICK_MESSAGE: &str = "Kicked for inactivity";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Sent once to a fresh connection.
    #[serde(rename_all = "camelCase")]
    Connected {
        connection_id: ConnectionId,
        user_id: UserId,
        display_name: String,
    },
    #[serde(rename_all = "camelCase")]
    UserJoined {
        room_id: RoomId,
        user_id: UserId,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    UserLeft {
        room_id: RoomId,
        user_id: UserId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        message: String,
    },
    ReceiveMessage(MessageRecord),
    /// Reply to a history request; caller only.
    #[serde(rename_all = "camelCase")]
    ChatHistory {
        room_id: RoomId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        messages: Vec<MessageRecord>,
    },
    Error {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },
    Kicked {
        reason: String,
    },
    ForceDisconnect {},
}

impl ServerEvent {
    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "Connected",
            ServerEvent::UserJoined { .. } => "UserJoined",
            ServerEvent::UserLeft { .. } => "UserLeft",
            ServerEvent::ReceiveMessage(_) => "ReceiveMessage",
            ServerEvent::ChatHistory { .. } => "ChatHistory",
            ServerEvent::Error { .. } => "Error",
            ServerEvent::Kicked { .. } => "Kicked",
            ServerEvent::ForceDisconnect {} => "ForceDisconnect",
        }
    }

    /// Caller-only error event built from a `HuddleError`.
    pub fn error(err: &HuddleError, seq: Option<u64>) -> Self {
        ServerEvent::Error {
            code: err.client_code().as_str().to_string(),
            message: err.client_message(),
            seq,
        }
    }

    /// Serialize into a versioned text frame.
    pub fn to_json(&self) -> Result<String> {
        let mut value = serde_json::to_value(self)
            .map_err(|e| HuddleError::Internal(format!("event encode failed: {e}")))?;
        let obj = value
            .as_object_mut()
            .ok_or_else(|| HuddleError::Internal("event did not encode as an object".into()))?;
        obj.insert("v".to_string(), PROTOCOL_VERSION.into());
        Ok(value.to_string())
    }

    /// Decode a text frame produced by `to_json`.
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s)
            .map_err(|e| HuddleError::BadRequest(format!("invalid event json: {e}")))
    }
}
