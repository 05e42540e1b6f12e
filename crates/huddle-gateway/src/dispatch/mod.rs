//! Dispatcher module exports.
//!
//! Re-exports the dispatcher and the service trait so the transport can depend
//! on this module directly.

pub mod dispatcher;

pub use dispatcher::{Dispatcher, TextService};
