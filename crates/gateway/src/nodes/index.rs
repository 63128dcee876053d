//! Routing table from tool name to the node currently serving it.
//!
//! Owned by [`NodeRegistry`](super::registry::NodeRegistry) and mutated only
//! under the registry's lock.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct ToolIndex {
    owners: HashMap<String, String>,
}

impl ToolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, tool_name: &str) -> Option<&str> {
        self.owners.get(tool_name).map(String::as_str)
    }

    /// Point `tool_name` at `node_id`, returning the previous owner if any.
    pub fn set(&mut self, tool_name: &str, node_id: &str) -> Option<String> {
        self.owners.insert(tool_name.to_string(), node_id.to_string())
    }

    pub fn remove(&mut self, tool_name: &str) -> Option<String> {
        self.owners.remove(tool_name)
    }

    /// Remove the entry only if `node_id` still owns it.
    pub fn remove_owned_by(&mut self, tool_name: &str, node_id: &str) -> bool {
        if self.resolve(tool_name) == Some(node_id) {
            self.owners.remove(tool_name);
            true
        } else {
            false
        }
    }

    /// Drop every entry owned by `node_id`. Returns how many were removed.
    pub fn remove_node(&mut self, node_id: &str) -> usize {
        let before = self.owners.len();
        self.owners.retain(|_, owner| owner != node_id);
        before - self.owners.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.owners.iter().map(|(t, n)| (t.as_str(), n.as_str()))
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_returns_previous_owner() {
        let mut idx = ToolIndex::new();
        assert_eq!(idx.set("translate", "a"), None);
        assert_eq!(idx.set("translate", "b"), Some("a".to_string()));
        assert_eq!(idx.resolve("translate"), Some("b"));
    }

    #[test]
    fn remove_owned_by_respects_takeover() {
        let mut idx = ToolIndex::new();
        idx.set("translate", "a");
        idx.set("translate", "b");
        // "a" lost ownership, so its cleanup must not touch b's entry.
        assert!(!idx.remove_owned_by("translate", "a"));
        assert_eq!(idx.resolve("translate"), Some("b"));
        assert!(idx.remove_owned_by("translate", "b"));
        assert!(idx.is_empty());
    }

    #[test]
    fn remove_node_drops_only_its_entries() {
        let mut idx = ToolIndex::new();
        idx.set("t1", "a");
        idx.set("t2", "a");
        idx.set("t3", "b");
        assert_eq!(idx.remove_node("a"), 2);
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.resolve("t3"), Some("b"));
        assert_eq!(idx.remove("t3"), Some("b".to_string()));
    }
}
