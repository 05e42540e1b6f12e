use dashmap::{DashMap, DashSet};

use huddle_core::{ConnectionId, RoomId};

/// Broadcast groups: room -> connections, connection -> rooms.
///
/// The forward index keeps a room broadcast proportional to the room's size;
/// the reverse index lets a disconnect drop every subscription at once.
#[derive(Default)]
pub struct RoomGroups {
    room_to_conns: DashMap<RoomId, DashSet<ConnectionId>>,
    conn_to_rooms: DashMap<ConnectionId, DashSet<RoomId>>,
}

impl RoomGroups {
    pub fn new() -> Self {
        Self {
            room_to_conns: DashMap::new(),
            conn_to_rooms: DashMap::new(),
        }
    }

    pub fn subscribe(&self, room: &RoomId, conn: &ConnectionId) {
        self.room_to_conns
            .entry(room.clone())
            .or_default()
            .insert(conn.clone());

        self.conn_to_rooms
            .entry(conn.clone())
            .or_default()
            .insert(room.clone());
    }

    /// Returns true if the connection was subscribed.
    pub fn unsubscribe(&self, room: &RoomId, conn: &ConnectionId) -> bool {
        let removed = match self.room_to_conns.get(room) {
            Some(set) => set.remove(conn).is_some(),
            None => false,
        };
        self.room_to_conns.remove_if(room, |_, set| set.is_empty());

        if let Some(set) = self.conn_to_rooms.get(conn) {
            set.remove(room);
        }
        self.conn_to_rooms.remove_if(conn, |_, set| set.is_empty());

        removed
    }

    pub fn members(&self, room: &RoomId) -> Vec<ConnectionId> {
        self.room_to_conns
            .get(room)
            .map(|set| set.iter().map(|c| c.key().clone()).collect())
            .unwrap_or_default()
    }

    pub fn rooms_of(&self, conn: &ConnectionId) -> Vec<RoomId> {
        self.conn_to_rooms
            .get(conn)
            .map(|set| set.iter().map(|r| r.key().clone()).collect())
            .unwrap_or_default()
    }

    pub fn is_subscribed(&self, room: &RoomId, conn: &ConnectionId) -> bool {
        self.room_to_conns
            .get(room)
            .map(|set| set.contains(conn))
            .unwrap_or(false)
    }

    /// Drop every subscription of `conn`. Returns the rooms it was in.
    pub fn cleanup_connection(&self, conn: &ConnectionId) -> Vec<RoomId> {
        let Some((_, rooms)) = self.conn_to_rooms.remove(conn) else {
            return Vec::new();
        };
        let rooms: Vec<RoomId> = rooms.into_iter().collect();
        for room in &rooms {
            if let Some(set) = self.room_to_conns.get(room) {
                set.remove(conn);
            }
            self.room_to_conns.remove_if(room, |_, set| set.is_empty());
        }
        rooms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn members_track_subscribe_and_unsubscribe() {
        let g = RoomGroups::new();
        let (r, a, b) = (RoomId::from("r"), ConnectionId::from("a"), ConnectionId::from("b"));
        g.subscribe(&r, &a);
        g.subscribe(&r, &b);

        let mut m = g.members(&r);
        m.sort();
        assert_eq!(m, vec![a.clone(), b.clone()]);

        assert!(g.unsubscribe(&r, &a));
        assert!(!g.unsubscribe(&r, &a));
        assert_eq!(g.members(&r), vec![b.clone()]);
        assert!(g.rooms_of(&a).is_empty());
    }

    #[test]
    fn cleanup_removes_connection_from_every_room() {
        let g = RoomGroups::new();
        let c = ConnectionId::from("c");
        g.subscribe(&"r1".into(), &c);
        g.subscribe(&"r2".into(), &c);

        let mut rooms = g.cleanup_connection(&c);
        rooms.sort();
        assert_eq!(rooms, vec![RoomId::from("r1"), RoomId::from("r2")]);
        assert!(g.members(&"r1".into()).is_empty());
        assert!(g.cleanup_connection(&c).is_empty());
    }
}
