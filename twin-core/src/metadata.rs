//! Per-leaf last-updated timestamps.
//!
//! Metadata mirrors the shape of a property store. It is maintained from
//! merge diffs rather than during the merge itself: every key in a diff is
//! stamped, then nodes whose keys no longer exist in the store are pruned.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use twin_types::{PropertyTree, TwinValue};

/// Key under which a node's timestamp is encoded.
pub const LAST_UPDATED_KEY: &str = "$lastUpdated";

/// One node of the metadata mirror.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataNode {
    last_updated: Option<String>,
    children: BTreeMap<String, MetadataNode>,
}

impl MetadataNode {
    /// Create an empty node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Timestamp of the last change at or below this node.
    pub fn last_updated(&self) -> Option<&str> {
        self.last_updated.as_deref()
    }

    /// Child node for `key`.
    pub fn child(&self, key: &str) -> Option<&MetadataNode> {
        self.children.get(key)
    }

    /// Node at `path`; the empty path is this node.
    pub fn get_path(&self, path: &[&str]) -> Option<&MetadataNode> {
        path.iter().try_fold(self, |node, key| node.child(key))
    }

    /// Stamp this node and every key present in `diff`.
    pub fn stamp(&mut self, diff: &PropertyTree, at: &str) {
        self.last_updated = Some(at.to_string());
        for (key, value) in diff {
            let node = self.children.entry(key.clone()).or_default();
            match value {
                TwinValue::Tree(child) => node.stamp(child, at),
                _ => {
                    node.children.clear();
                    node.last_updated = Some(at.to_string());
                }
            }
        }
    }

    /// Drop nodes whose keys are gone from `tree`, and the children of nodes
    /// that became leaves.
    pub fn prune(&mut self, tree: &PropertyTree) {
        self.children.retain(|key, node| match tree.get(key) {
            Some(TwinValue::Tree(child)) => {
                node.prune(child);
                true
            }
            Some(_) => {
                node.children.clear();
                true
            }
            None => false,
        });
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.last_updated = None;
        self.children.clear();
    }

    /// Encode as `{"$lastUpdated": ts, child: {...}}`.
    pub fn to_json_value(&self) -> Value {
        let mut map = Map::new();
        if let Some(at) = &self.last_updated {
            map.insert(LAST_UPDATED_KEY.to_string(), Value::String(at.clone()));
        }
        for (key, node) in &self.children {
            map.insert(key.clone(), node.to_json_value());
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stamp_marks_diff_keys_and_root() {
        let mut meta = MetadataNode::new();
        let diff = PropertyTree::new()
            .with("a", 1)
            .with("b", PropertyTree::new().with("c", 2));
        meta.stamp(&diff, "T1");

        assert_eq!(meta.last_updated(), Some("T1"));
        assert_eq!(meta.get_path(&["b", "c"]).and_then(|n| n.last_updated()), Some("T1"));
        assert_eq!(
            meta.to_json_value(),
            json!({
                "$lastUpdated": "T1",
                "a": {"$lastUpdated": "T1"},
                "b": {"$lastUpdated": "T1", "c": {"$lastUpdated": "T1"}}
            })
        );
    }

    #[test]
    fn later_stamp_leaves_untouched_siblings() {
        let mut meta = MetadataNode::new();
        meta.stamp(&PropertyTree::new().with("a", 1).with("b", 1), "T1");
        meta.stamp(&PropertyTree::new().with("b", 2), "T2");

        assert_eq!(meta.get_path(&["a"]).and_then(|n| n.last_updated()), Some("T1"));
        assert_eq!(meta.get_path(&["b"]).and_then(|n| n.last_updated()), Some("T2"));
    }

    #[test]
    fn prune_follows_store_shape() {
        let mut meta = MetadataNode::new();
        meta.stamp(
            &PropertyTree::new()
                .with("gone", 1)
                .with("flat", PropertyTree::new().with("x", 1)),
            "T1",
        );

        let store = PropertyTree::new().with("flat", 5);
        meta.prune(&store);

        assert!(meta.child("gone").is_none());
        assert!(meta.get_path(&["flat", "x"]).is_none());
        assert!(meta.child("flat").is_some());
    }
}
