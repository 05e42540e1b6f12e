//! Realtime runtime for the gateway.
//!
//! PresenceRegistry (who is connected, when they were last active, which rooms
//! they joined) + RoomGroups/RealtimeCore (fan-out) + QoS-based publish helpers.

pub mod core;
pub mod types;

pub use core::{Connection, PresenceRegistry, RealtimeCore, RoomGroups, Session};
pub use types::{Outgoing, PreparedMsg, QoS};
