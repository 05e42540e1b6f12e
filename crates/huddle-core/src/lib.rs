//! huddle core: transport-agnostic identifiers, wire types, and errors.
//!
//! This crate defines the inbound envelope, the outbound event set, and the
//! error surface shared by the gateway and its tests. It carries no transport
//! or runtime dependencies.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here.
//! All fallible paths surface as `HuddleError`/`Result` so a malformed frame
//! from one client can never take the process down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod ids;
pub mod model;
pub mod protocol;

/// Shared result type.
pub use error::{ClientCode, HuddleError, Result};
pub use ids::{ConnectionId, RoomId, UserId};
pub use model::{Identity, MessageRecord};
