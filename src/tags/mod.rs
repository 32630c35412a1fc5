//! Free-form labels attached to connections for out-of-band addressing.

use dashmap::DashMap;
use smallvec::SmallVec;

use crate::connection_manager::ConnectionId;

/// Most connections carry a handful of tags
type TagSet = SmallVec<[String; 4]>;

pub struct TagIndex {
    tags: DashMap<ConnectionId, TagSet>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self {
            tags: DashMap::new(),
        }
    }

    /// Union `tags` into the connection's tag set.
    pub fn add<I, S>(&self, connection_id: ConnectionId, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut current = self.tags.entry(connection_id).or_default();
        for tag in tags {
            let tag = tag.into();
            if !current.contains(&tag) {
                current.push(tag);
            }
        }
    }

    pub fn has(&self, connection_id: ConnectionId, tag: &str) -> bool {
        self.tags
            .get(&connection_id)
            .map(|set| set.iter().any(|t| t == tag))
            .unwrap_or(false)
    }

    /// Every tracked connection carrying `tag`.
    ///
    /// Linear in the number of tracked connections.
    pub fn find(&self, tag: &str) -> Vec<ConnectionId> {
        self.tags
            .iter()
            .filter(|entry| entry.value().iter().any(|t| t == tag))
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn get_all(&self, connection_id: ConnectionId) -> Vec<String> {
        self.tags
            .get(&connection_id)
            .map(|set| set.to_vec())
            .unwrap_or_default()
    }

    pub fn cleanup(&self, connection_id: ConnectionId) {
        self.tags.remove(&connection_id);
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl Default for TagIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_add_is_idempotent_union() {
        let index = TagIndex::new();
        let conn = ConnectionId::new();

        index.add(conn, ["vip", "beta"]);
        index.add(conn, ["beta", "eu"]);

        let all: HashSet<_> = index.get_all(conn).into_iter().collect();
        let expected: HashSet<_> = ["vip", "beta", "eu"].iter().map(|s| s.to_string()).collect();
        assert_eq!(all, expected);
        assert!(index.has(conn, "eu"));
        assert!(!index.has(conn, "us"));
    }

    #[test]
    fn test_find_reflects_latest_adds() {
        let index = TagIndex::new();
        let (a, b, c) = (ConnectionId::new(), ConnectionId::new(), ConnectionId::new());

        index.add(a, ["vip"]);
        index.add(b, ["free"]);
        assert_eq!(index.find("vip"), vec![a]);

        index.add(b, ["vip"]);
        index.add(c, Vec::<String>::new());

        let found: HashSet<_> = index.find("vip").into_iter().collect();
        assert_eq!(found, HashSet::from([a, b]));
    }

    #[test]
    fn test_cleanup_forgets_connection() {
        let index = TagIndex::new();
        let conn = ConnectionId::new();
        index.add(conn, ["vip"]);

        index.cleanup(conn);
        assert!(index.find("vip").is_empty());
        assert!(index.get_all(conn).is_empty());
        assert!(index.is_empty());
    }
}
