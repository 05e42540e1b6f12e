//! Wire formats.
//!
//! - `text`: inbound JSON envelopes with a lazily parsed `data` payload.
//! - `event`: outbound events, serialized once per broadcast.
//!
//! Parsers are panic-free: malformed input is reported as `HuddleError`
//! instead of panicking, so one hostile client cannot disturb the others.

pub mod event;
pub mod text;

pub use event::{ServerEvent, IDLE_KICK_MESSAGE, IDLE_REASON};
pub use text::Envelope;
