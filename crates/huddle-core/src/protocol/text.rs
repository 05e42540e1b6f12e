//! Inbound envelope (JSON text frame).
//!
//! `data` is kept as `RawValue` so only the owning service pays for parsing it.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::value::RawValue;

use crate::error::{HuddleError, Result};
use crate::ids::RoomId;

/// Only protocol version understood by this build.
pub const PROTOCOL_VERSION: u32 = 1;

/// Inbound command envelope.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    /// Protocol version.
    pub v: u32,
    /// Service name (`chat`, `sys`).
    pub svc: String,
    /// Command within the service (field name is `type` in JSON).
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Client correlation id, echoed on replies and errors.
    #[serde(default)]
    pub seq: Option<u64>,
    /// Target room for room-scoped commands.
    #[serde(default)]
    pub room: Option<RoomId>,
    /// Optional payload, stored as raw JSON (lazy parsing).
    #[serde(default)]
    pub data: Option<Box<RawValue>>,
}

impl Envelope {
    /// Decode and version-check one text frame.
    pub fn parse(s: &str) -> Result<Self> {
        let env: Envelope = serde_json::from_str(s)
            .map_err(|e| HuddleError::BadRequest(format!("invalid envelope json: {e}")))?;
        if env.v != PROTOCOL_VERSION {
            return Err(HuddleError::UnsupportedVersion);
        }
        Ok(env)
    }

    /// Room id, or a `BadRequest` naming the command that needed it.
    pub fn require_room(&self) -> Result<RoomId> {
        self.room.clone().ok_or_else(|| {
            HuddleError::BadRequest(format!("{}.{} requires room", self.svc, self.msg_type))
        })
    }

    /// Parse `data` into `T`. Missing data is a `BadRequest`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T> {
        let raw = self.data.as_ref().ok_or_else(|| {
            HuddleError::BadRequest(format!("{}.{} requires data", self.svc, self.msg_type))
        })?;
        serde_json::from_str(raw.get()).map_err(|e| {
            HuddleError::BadRequest(format!("{}.{} invalid data: {e}", self.svc, self.msg_type))
        })
    }

    /// Like `data_as`, but absent data yields `T::default()`.
    pub fn data_or_default<T: DeserializeOwned + Default>(&self) -> Result<T> {
        match self.data {
            Some(_) => self.data_as(),
            None => Ok(T::default()),
        }
    }
}
