use dashmap::DashMap;
use serde::Serialize;

/// Last known rooms and tags of a durable identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub rooms: Vec<String>,
    pub tags: Vec<String>,
}

/// durable identity -> snapshot
pub struct SessionStore {
    sessions: DashMap<String, SessionSnapshot>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Snapshot for `id`, if one was ever recorded
    pub fn get(&self, id: &str) -> Option<SessionSnapshot> {
        self.sessions.get(id).map(|s| s.clone())
    }

    pub fn record_room(&self, id: &str, room: &str) {
        let mut snapshot = self.sessions.entry(id.to_string()).or_default();
        if !snapshot.rooms.iter().any(|r| r == room) {
            snapshot.rooms.push(room.to_string());
        }
    }

    pub fn forget_room(&self, id: &str, room: &str) {
        if let Some(mut snapshot) = self.sessions.get_mut(id) {
            snapshot.rooms.retain(|r| r != room);
        }
    }

    /// Replace the recorded tag set with `tags`
    pub fn record_tags(&self, id: &str, tags: &[String]) {
        let mut snapshot = self.sessions.entry(id.to_string()).or_default();
        snapshot.tags.clear();
        for tag in tags {
            if !snapshot.tags.contains(tag) {
                snapshot.tags.push(tag.clone());
            }
        }
    }

    /// Replace the snapshot with what the connection actually held
    pub fn capture(&self, id: &str, rooms: Vec<String>, tags: Vec<String>) {
        self.sessions
            .insert(id.to_string(), SessionSnapshot { rooms, tags });
    }

    pub fn clear(&self) {
        self.sessions.clear();
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incremental_recording() {
        let store = SessionStore::new();
        store.record_room("dev-1", "A");
        store.record_room("dev-1", "B");
        store.record_room("dev-1", "A");
        store.record_tags("dev-1", &["t1".to_string(), "t2".to_string(), "t1".to_string()]);

        let snapshot = store.get("dev-1").unwrap();
        assert_eq!(snapshot.rooms, vec!["A", "B"]);
        assert_eq!(snapshot.tags, vec!["t1", "t2"]);

        store.record_tags("dev-1", &["t3".to_string()]);
        assert_eq!(store.get("dev-1").unwrap().tags, vec!["t3"]);
        assert_eq!(store.get("dev-1").unwrap().rooms, vec!["A", "B"]);

        store.forget_room("dev-1", "A");
        assert_eq!(store.get("dev-1").unwrap().rooms, vec!["B"]);
    }

    #[test]
    fn test_capture_replaces_snapshot() {
        let store = SessionStore::new();
        store.record_room("dev-1", "stale");
        store.capture("dev-1", vec!["live".into()], vec![]);

        assert_eq!(
            store.get("dev-1"),
            Some(SessionSnapshot {
                rooms: vec!["live".into()],
                tags: vec![]
            })
        );
    }

    #[test]
    fn test_unknown_identity_and_clear() {
        let store = SessionStore::new();
        assert!(store.get("ghost").is_none());
        store.forget_room("ghost", "A");
        assert!(store.is_empty());

        store.record_room("dev-1", "A");
        store.clear();
        assert!(store.is_empty());
    }
}
