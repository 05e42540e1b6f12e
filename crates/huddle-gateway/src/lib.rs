//! Huddle gateway library entry.
//!
//! Wires transport, dispatcher, presence registry, room gateway and idle
//! sweeper into one coordinator. Consumed by the binary (`main.rs`) and by
//! integration tests.

pub mod app_state;
pub mod collab;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod obs;
pub mod ops;
pub mod realtime;
pub mod router;
pub mod services;
pub mod sweeper;
pub mod transport;
