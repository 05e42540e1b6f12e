//! Opaque identifier newtypes.
//!
//! All three are plain strings on the wire (`#[serde(transparent)]`); the
//! newtypes only keep a room id from being passed where a user id is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// One physical connection. Assigned by the transport, never reused.
    ConnectionId
);
string_id!(
    /// Authenticated principal.
    UserId
);
string_id!(
    /// Broadcast group / chat room.
    RoomId
);

impl ConnectionId {
    /// Fresh random connection id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_connection_ids_are_unique() {
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn ids_serialize_as_bare_strings() {
        let room = RoomId::from("lobby");
        assert_eq!(serde_json::to_string(&room).ok().as_deref(), Some("\"lobby\""));
    }
}
