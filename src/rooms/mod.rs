//! Named groups of connections with broadcast.
//!
//! A room exists exactly while it has at least one member: the first `join`
//! creates it and the last `leave` destroys it.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

use crate::broker::BrokerHooks;
use crate::connection_manager::{ConnectionId, ConnectionManager, RoomInfo};

pub struct RoomDirectory {
    /// room name -> member set
    rooms: DashMap<String, HashSet<ConnectionId>>,
    /// connection -> rooms in join order
    memberships: DashMap<ConnectionId, Vec<String>>,
    hooks: Arc<dyn BrokerHooks>,
}

impl RoomDirectory {
    pub fn new(hooks: Arc<dyn BrokerHooks>) -> Self {
        Self {
            rooms: DashMap::new(),
            memberships: DashMap::new(),
            hooks,
        }
    }

    /// Add a connection to a room. Idempotent.
    ///
    /// Returns true if the connection was not already a member. Once this
    /// returns, every later `broadcast` to the room reaches the connection.
    pub fn join(&self, connection_id: ConnectionId, room: &str) -> bool {
        let mut created = false;
        let joined = {
            let mut members = self.rooms.entry(room.to_string()).or_insert_with(|| {
                created = true;
                HashSet::new()
            });
            let joined = members.insert(connection_id);
            if joined {
                self.memberships
                    .entry(connection_id)
                    .or_default()
                    .push(room.to_string());
            }
            joined
        };

        if created {
            self.hooks.on_room_created(room);
        }
        if joined {
            tracing::debug!(connection_id = %connection_id, room = %room, "Joined room");
            self.hooks.on_room_joined(room, connection_id);
        }
        joined
    }

    /// Remove a connection from a room, destroying the room if it empties.
    ///
    /// Returns true if the connection was a member.
    pub fn leave(&self, connection_id: ConnectionId, room: &str) -> bool {
        let mut was_member = false;
        let destroyed = self
            .rooms
            .remove_if_mut(room, |_, members| {
                was_member = members.remove(&connection_id);
                members.is_empty()
            })
            .is_some();

        if was_member {
            if let Some(mut joined) = self.memberships.get_mut(&connection_id) {
                joined.retain(|r| r != room);
            }
            self.memberships
                .remove_if(&connection_id, |_, joined| joined.is_empty());

            tracing::debug!(connection_id = %connection_id, room = %room, "Left room");
            self.hooks.on_room_left(room, connection_id);
        }
        if destroyed {
            self.hooks.on_room_destroyed(room);
        }
        was_member
    }

    /// Leave every room the connection belongs to, returning the rooms left.
    pub fn leave_all(&self, connection_id: ConnectionId) -> Vec<String> {
        let rooms = self.rooms_of(connection_id);
        for room in &rooms {
            self.leave(connection_id, room);
        }
        rooms
    }

    /// Rooms the connection currently belongs to, in join order
    pub fn rooms_of(&self, connection_id: ConnectionId) -> Vec<String> {
        self.memberships
            .get(&connection_id)
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Snapshot of a room's members
    pub fn members(&self, room: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Snapshot of room names
    pub fn list_rooms(&self) -> Vec<String> {
        self.rooms.iter().map(|r| r.key().clone()).collect()
    }

    pub fn room_info(&self, room: &str) -> Option<RoomInfo> {
        self.rooms.get(room).map(|members| RoomInfo {
            name: room.to_string(),
            member_count: members.len(),
        })
    }

    pub fn list_room_info(&self) -> Vec<RoomInfo> {
        self.rooms
            .iter()
            .map(|r| RoomInfo {
                name: r.key().clone(),
                member_count: r.value().len(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Send a pre-serialized frame to every member with an open transport.
    ///
    /// Membership is snapshotted at call time. Members whose transport is not
    /// open are skipped. Returns the number of members reached.
    pub async fn broadcast(
        &self,
        connections: &ConnectionManager,
        room: &str,
        frame: Arc<str>,
    ) -> usize {
        let recipients = connections.resolve(self.members(room));
        let mut delivered = 0;

        for handle in recipients {
            if !handle.is_open() {
                continue;
            }
            match handle.send_frame(frame.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!(
                        connection_id = %handle.id,
                        room = %room,
                        error = %e,
                        "Skipping member during broadcast"
                    );
                }
            }
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::NoopHooks;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingHooks {
        events: Mutex<Vec<String>>,
    }

    impl RecordingHooks {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    impl BrokerHooks for RecordingHooks {
        fn on_room_created(&self, room: &str) {
            self.events.lock().unwrap().push(format!("created:{room}"));
        }
        fn on_room_joined(&self, room: &str, _connection_id: ConnectionId) {
            self.events.lock().unwrap().push(format!("joined:{room}"));
        }
        fn on_room_left(&self, room: &str, _connection_id: ConnectionId) {
            self.events.lock().unwrap().push(format!("left:{room}"));
        }
        fn on_room_destroyed(&self, room: &str) {
            self.events.lock().unwrap().push(format!("destroyed:{room}"));
        }
    }

    #[test]
    fn test_join_fires_created_once() {
        let hooks = Arc::new(RecordingHooks::default());
        let rooms = RoomDirectory::new(hooks.clone());
        let (a, b) = (ConnectionId::new(), ConnectionId::new());

        assert!(rooms.join(a, "lobby"));
        assert!(!rooms.join(a, "lobby"));
        assert!(rooms.join(b, "lobby"));

        assert_eq!(
            hooks.take(),
            vec!["created:lobby", "joined:lobby", "joined:lobby"]
        );
        assert_eq!(rooms.members("lobby").len(), 2);
    }

    #[test]
    fn test_last_leave_destroys_room() {
        let hooks = Arc::new(RecordingHooks::default());
        let rooms = RoomDirectory::new(hooks.clone());
        let (a, b) = (ConnectionId::new(), ConnectionId::new());
        rooms.join(a, "lobby");
        rooms.join(b, "lobby");
        hooks.take();

        assert!(rooms.leave(a, "lobby"));
        assert_eq!(rooms.list_rooms(), vec!["lobby".to_string()]);
        assert!(rooms.leave(b, "lobby"));
        assert!(rooms.list_rooms().is_empty());

        assert_eq!(hooks.take(), vec!["left:lobby", "left:lobby", "destroyed:lobby"]);
    }

    #[test]
    fn test_leave_non_member_is_silent() {
        let hooks = Arc::new(RecordingHooks::default());
        let rooms = RoomDirectory::new(hooks.clone());
        let a = ConnectionId::new();
        rooms.join(a, "lobby");
        hooks.take();

        assert!(!rooms.leave(ConnectionId::new(), "lobby"));
        assert!(!rooms.leave(a, "missing"));
        assert!(hooks.take().is_empty());
        assert_eq!(rooms.len(), 1);
    }

    #[test]
    fn test_leave_all_keeps_join_order() {
        let rooms = RoomDirectory::new(Arc::new(NoopHooks));
        let a = ConnectionId::new();
        rooms.join(a, "b");
        rooms.join(a, "a");
        rooms.join(a, "c");
        assert_eq!(rooms.rooms_of(a), vec!["b", "a", "c"]);

        let left = rooms.leave_all(a);
        assert_eq!(left, vec!["b", "a", "c"]);
        assert!(rooms.is_empty());
        assert!(rooms.rooms_of(a).is_empty());
    }

    #[test]
    fn test_room_exists_iff_non_empty() {
        let rooms = RoomDirectory::new(Arc::new(NoopHooks));
        let conns: Vec<_> = (0..3).map(|_| ConnectionId::new()).collect();
        let ops: &[(usize, &str, bool)] = &[
            (0, "x", true),
            (1, "x", true),
            (0, "y", true),
            (0, "x", false),
            (2, "y", true),
            (1, "x", false),
            (0, "y", false),
            (0, "y", false),
            (2, "y", false),
        ];

        for &(idx, room, join) in ops {
            if join {
                rooms.join(conns[idx], room);
            } else {
                rooms.leave(conns[idx], room);
            }
            for name in ["x", "y"] {
                let listed = rooms.list_rooms().iter().any(|r| r == name);
                assert_eq!(listed, !rooms.members(name).is_empty());
            }
        }
        assert!(rooms.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_skips_closed_members() {
        let connections = ConnectionManager::new();
        let rooms = RoomDirectory::new(Arc::new(NoopHooks));

        let (open_tx, mut open_rx) = mpsc::channel(4);
        let (closed_tx, mut closed_rx) = mpsc::channel(4);
        let open = connections.register(open_tx);
        let closed = connections.register(closed_tx);
        closed.mark_closed();

        rooms.join(open.id, "lobby");
        rooms.join(closed.id, "lobby");

        let delivered = rooms.broadcast(&connections, "lobby", Arc::from("hi")).await;
        assert_eq!(delivered, 1);
        assert_eq!(open_rx.recv().await.unwrap().as_frame(), Some("hi"));
        assert!(closed_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_to_missing_room() {
        let connections = ConnectionManager::new();
        let rooms = RoomDirectory::new(Arc::new(NoopHooks));
        assert_eq!(rooms.broadcast(&connections, "nowhere", Arc::from("x")).await, 0);
    }
}
