use async_trait::async_trait;
use dashmap::DashMap;

use huddle_core::error::{HuddleError, Result};
use huddle_core::{Identity, UserId};

use crate::config::IdentityConfig;

/// Resolves a transport credential to a verified identity.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<Identity>;
}

/// Token table loaded from config.
#[derive(Default)]
pub struct StaticIdentityProvider {
    tokens: DashMap<String, Identity>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self {
            tokens: DashMap::new(),
        }
    }

    pub fn from_config(entries: &[IdentityConfig]) -> Self {
        let this = Self::new();
        for e in entries {
            this.insert(e.token.as_str(), e.user_id.as_str(), e.display_name.as_str());
        }
        this
    }

    pub fn insert(
        &self,
        token: impl Into<String>,
        user_id: impl Into<String>,
        display_name: impl Into<String>,
    ) {
        self.tokens.insert(
            token.into(),
            Identity {
                user_id: UserId::from(user_id.into()),
                display_name: display_name.into(),
            },
        );
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn verify(&self, credential: &str) -> Result<Identity> {
        if credential.is_empty() {
            return Err(HuddleError::Unauthorized);
        }
        self.tokens
            .get(credential)
            .map(|e| e.value().clone())
            .ok_or(HuddleError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_token_resolves_unknown_is_unauthorized() {
        let idp = StaticIdentityProvider::new();
        idp.insert("t-alice", "alice", "Alice");

        let id = idp.verify("t-alice").await.unwrap();
        assert_eq!(id.user_id, UserId::from("alice"));
        assert_eq!(id.display_name, "Alice");

        assert!(matches!(idp.verify("nope").await, Err(HuddleError::Unauthorized)));
        assert!(matches!(idp.verify("").await, Err(HuddleError::Unauthorized)));
    }
}
