//! External collaborators consumed by the gateway.
//!
//! - `identity`: credential -> verified user (once per connection).
//! - `store`: rooms, membership, and message persistence.
//!
//! Both are async traits so a networked implementation can replace the
//! in-memory ones without touching the gateway.

pub mod identity;
pub mod store;

pub use identity::{IdentityProvider, StaticIdentityProvider};
pub use store::{ChatStore, InMemoryChatStore};
