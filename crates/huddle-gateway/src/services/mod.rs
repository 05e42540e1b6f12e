//! Built-in command services.
//!
//! - `chat`: join / leave / send / history
//! - `sys`: ping

pub mod chat;
pub mod sys;

pub use chat::ChatService;
pub use sys::SysService;
