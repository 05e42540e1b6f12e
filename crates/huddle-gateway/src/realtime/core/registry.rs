use std::collections::HashSet;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use huddle_core::{ConnectionId, RoomId, UserId};

/// Per-connection presence state.
#[derive(Debug, Clone)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub last_activity: Instant,
    pub joined_rooms: HashSet<RoomId>,
}

impl Session {
    fn new(connection_id: ConnectionId, user_id: UserId) -> Self {
        Self {
            connection_id,
            user_id,
            last_activity: Instant::now(),
            joined_rooms: HashSet::new(),
        }
    }

    /// Time since the last inbound command, as seen at `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }
}

/// Presence registry: `connection_id -> Session`.
///
/// Every mutation locks a single DashMap shard for the duration of one
/// field update, never across an await point. Absent connections are always
/// treated as already gone, so no operation here can fail.
#[derive(Default)]
pub struct PresenceRegistry {
    sessions: DashMap<ConnectionId, Session>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn add(&self, connection_id: ConnectionId, user_id: UserId) {
        let session = Session::new(connection_id.clone(), user_id);
        if let Some(prev) = self.sessions.insert(connection_id, session) {
            tracing::warn!(
                conn = %prev.connection_id,
                user = %prev.user_id,
                "presence entry overwritten; connection id reused"
            );
        }
    }

    pub fn remove(&self, connection_id: &ConnectionId) -> Option<Session> {
        self.sessions.remove(connection_id).map(|(_, s)| s)
    }

    /// Refresh `last_activity`. Returns false if the connection is gone.
    pub fn touch(&self, connection_id: &ConnectionId) -> bool {
        match self.sessions.get_mut(connection_id) {
            Some(mut s) => {
                s.last_activity = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Returns false if the connection is gone.
    pub fn join_room(&self, connection_id: &ConnectionId, room: &RoomId) -> bool {
        match self.sessions.get_mut(connection_id) {
            Some(mut s) => {
                s.joined_rooms.insert(room.clone());
                true
            }
            None => false,
        }
    }

    /// Returns true only if the room was actually removed from the session.
    pub fn leave_room(&self, connection_id: &ConnectionId, room: &RoomId) -> bool {
        self.sessions
            .get_mut(connection_id)
            .map(|mut s| s.joined_rooms.remove(room))
            .unwrap_or(false)
    }

    pub fn get(&self, connection_id: &ConnectionId) -> Option<Session> {
        self.sessions.get(connection_id).map(|s| s.value().clone())
    }

    pub fn user_of(&self, connection_id: &ConnectionId) -> Option<UserId> {
        self.sessions
            .get(connection_id)
            .map(|s| s.value().user_id.clone())
    }

    pub fn is_joined(&self, connection_id: &ConnectionId, room: &RoomId) -> bool {
        self.sessions
            .get(connection_id)
            .map(|s| s.joined_rooms.contains(room))
            .unwrap_or(false)
    }

    /// Point-in-time copy of every session.
    ///
    /// Shards are read-locked one at a time while cloning, so writers on other
    /// shards proceed and no writer waits longer than one shard copy.
    pub fn snapshot(&self) -> Vec<Session> {
        self.sessions.iter().map(|r| r.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
