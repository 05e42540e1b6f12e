//! Realtime core components for the gateway runtime.
//!
//! Presence registry, broadcast groups, and the egress engine shared by the
//! room gateway and the idle sweeper.

mod groups;
mod realtime;
mod registry;

pub use groups::RoomGroups;
pub use realtime::{Connection, RealtimeCore, FORCED_CLOSE_CODE};
pub use registry::{PresenceRegistry, Session};
