use axum::extract::ws::Message;

use huddle_core::error::Result;
use huddle_core::protocol::ServerEvent;

/// Quality-of-Service strategy for outgoing delivery.
#[derive(Debug, Clone, Copy, Default)]
pub enum QoS {
    /// Presence-style events: do not await; if a member's queue is full, drop.
    #[default]
    Lossy,
    /// Chat payloads: await queue space per member, bounded by `timeout_ms` (0 = unbounded).
    Reliable { timeout_ms: u64 },
}

/// Application-level outgoing event.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub qos: QoS,
    pub event: ServerEvent,
}

impl Outgoing {
    pub fn lossy(event: ServerEvent) -> Self {
        Self { qos: QoS::Lossy, event }
    }

    pub fn reliable(event: ServerEvent, timeout_ms: u64) -> Self {
        Self {
            qos: QoS::Reliable { timeout_ms },
            event,
        }
    }
}

/// Event frame encoded once and fanned out N times.
#[derive(Debug, Clone)]
pub struct PreparedMsg {
    name: &'static str,
    text: String,
}

impl PreparedMsg {
    pub fn prepare(event: &ServerEvent) -> Result<Self> {
        Ok(Self {
            name: event.name(),
            text: event.to_json()?,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn to_ws_message(&self) -> Message {
        Message::Text(self.text.clone())
    }
}
