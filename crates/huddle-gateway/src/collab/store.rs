use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use huddle_core::error::{HuddleError, Result};
use huddle_core::{MessageRecord, RoomId, UserId};

use crate::config::GatewayConfig;

/// Persistence collaborator: rooms, membership, messages.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Append a message. Fails with `NotFound` for an unknown room and
    /// `NotAMember` if the sender is not on the room's member list.
    async fn append_message(&self, room: &RoomId, sender: &UserId, text: &str)
        -> Result<MessageRecord>;

    /// Most recent `limit` messages, oldest first.
    async fn fetch_history(&self, room: &RoomId, limit: u32) -> Result<Vec<MessageRecord>>;

    /// Remove `user` from the room's member list. `None` if the room or the
    /// membership was already gone, otherwise the user's display name.
    async fn remove_member(&self, room: &RoomId, user: &UserId) -> Result<Option<String>>;

    /// Add `user` to the room's member list.
    async fn add_member(&self, room: &RoomId, user: &UserId) -> Result<()>;

    /// Create a room; the creator is always a member.
    async fn create_room(
        &self,
        id: Option<RoomId>,
        title: Option<String>,
        creator: &UserId,
        members: &[UserId],
    ) -> Result<RoomId>;

    async fn room_members(&self, room: &RoomId) -> Result<Vec<UserId>>;
}

struct RoomRecord {
    members: HashSet<UserId>,
    messages: Vec<MessageRecord>,
}

/// DashMap-backed store. Each room is one map entry, so every operation is
/// atomic per room.
#[derive(Default)]
pub struct InMemoryChatStore {
    users: DashMap<UserId, String>,
    rooms: DashMap<RoomId, RoomRecord>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    /// Users from `identities`, rooms from `rooms`.
    pub fn from_config(cfg: &GatewayConfig) -> Self {
        let this = Self::new();
        for id in &cfg.identities {
            this.register_user(id.user_id.as_str(), id.display_name.as_str());
        }
        for room in &cfg.rooms {
            let members: HashSet<UserId> =
                room.members.iter().map(|m| UserId::from(m.as_str())).collect();
            tracing::debug!(
                room = %room.id,
                title = room.title.as_deref().unwrap_or(""),
                members = members.len(),
                "seeded chat room"
            );
            this.rooms.insert(
                RoomId::from(room.id.as_str()),
                RoomRecord {
                    members,
                    messages: Vec::new(),
                },
            );
        }
        this
    }

    pub fn register_user(&self, user_id: impl Into<String>, display_name: impl Into<String>) {
        self.users
            .insert(UserId::from(user_id.into()), display_name.into());
    }

    fn display_name(&self, user: &UserId) -> Result<String> {
        self.users
            .get(user)
            .map(|n| n.value().clone())
            .ok_or_else(|| HuddleError::NotFound(format!("user {user}")))
    }
}

fn room_not_found(room: &RoomId) -> HuddleError {
    HuddleError::NotFound(format!("chat room {room}"))
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn append_message(
        &self,
        room: &RoomId,
        sender: &UserId,
        text: &str,
    ) -> Result<MessageRecord> {
        let sender_username = self.display_name(sender)?;
        let mut entry = self.rooms.get_mut(room).ok_or_else(|| room_not_found(room))?;
        if !entry.members.contains(sender) {
            return Err(HuddleError::NotAMember);
        }
        let record = MessageRecord {
            id: Uuid::new_v4(),
            chat_room_id: room.clone(),
            sender_id: sender.clone(),
            sender_username,
            text: text.to_string(),
            created_at: Utc::now(),
        };
        entry.messages.push(record.clone());
        Ok(record)
    }

    async fn fetch_history(&self, room: &RoomId, limit: u32) -> Result<Vec<MessageRecord>> {
        let entry = self.rooms.get(room).ok_or_else(|| room_not_found(room))?;
        let start = entry.messages.len().saturating_sub(limit as usize);
        Ok(entry.messages[start..].to_vec())
    }

    async fn remove_member(&self, room: &RoomId, user: &UserId) -> Result<Option<String>> {
        let Some(mut entry) = self.rooms.get_mut(room) else {
            return Ok(None);
        };
        if !entry.members.remove(user) {
            return Ok(None);
        }
        drop(entry);
        Ok(self.users.get(user).map(|n| n.value().clone()))
    }

    async fn add_member(&self, room: &RoomId, user: &UserId) -> Result<()> {
        self.display_name(user)?;
        let mut entry = self.rooms.get_mut(room).ok_or_else(|| room_not_found(room))?;
        if !entry.members.insert(user.clone()) {
            return Err(HuddleError::Validation(format!(
                "user {user} is already a member of this chat room"
            )));
        }
        Ok(())
    }

    async fn create_room(
        &self,
        id: Option<RoomId>,
        title: Option<String>,
        creator: &UserId,
        members: &[UserId],
    ) -> Result<RoomId> {
        self.display_name(creator)?;
        let id = id.unwrap_or_else(|| RoomId::from(Uuid::new_v4().to_string()));

        let mut set: HashSet<UserId> = HashSet::with_capacity(members.len() + 1);
        set.insert(creator.clone());
        set.extend(members.iter().cloned());

        match self.rooms.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(HuddleError::Validation(format!(
                "chat room {id} already exists"
            ))),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(RoomRecord {
                    members: set,
                    messages: Vec::new(),
                });
                tracing::info!(
                    room = %id,
                    title = title.as_deref().unwrap_or(""),
                    creator = %creator,
                    "chat room created"
                );
                Ok(id)
            }
        }
    }

    async fn room_members(&self, room: &RoomId) -> Result<Vec<UserId>> {
        let entry = self.rooms.get(room).ok_or_else(|| room_not_found(room))?;
        Ok(entry.members.iter().cloned().collect())
    }
}
