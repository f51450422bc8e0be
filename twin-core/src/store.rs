//! Mutable property bags with merge, diff, and reset.
//!
//! A [`PropertyStore`] holds one nested tree (the desired bag, the reported
//! bag, or tags). Its canonical state never contains a tombstone. Nulls in
//! an update delete, and a branch whose last leaf is deleted by a merge goes
//! with it; [`PropertyStore::reset`] keeps empty branches exactly as given.
//!
//! Merging walks the update depth-first and builds the diff as it goes:
//!
//! ```text
//! update            store before        diff            store after
//! {a: 1}            {}                  {a: 1}          {a: 1}
//! {a: 1}            {a: 1}              (none)          {a: 1}
//! {a: null}         {a: 1}              (none)          {}
//! {b: {c: 2}}       {b: {c: 1, d: 1}}   {b: {c: 2}}     {b: {c: 2, d: 1}}
//! ```

use chrono::{DateTime, Utc};
use serde_json::Value;
use twin_types::{PropertyTree, TwinValue};

use crate::clock::{format_timestamp, system_clock, Clock};
use crate::metadata::MetadataNode;

/// Key under which a bag's version is encoded.
pub const VERSION_KEY: &str = "$version";

/// Key under which a bag's metadata is encoded.
pub const METADATA_KEY: &str = "$metadata";

/// One property bag plus its version and optional metadata.
#[derive(Debug, Clone)]
pub struct PropertyStore {
    tree: PropertyTree,
    version: Option<i64>,
    metadata: Option<MetadataNode>,
    clock: Clock,
}

impl PropertyStore {
    /// Create an empty store without metadata.
    pub fn new() -> Self {
        Self {
            tree: PropertyTree::new(),
            version: None,
            metadata: None,
            clock: system_clock,
        }
    }

    /// Use `clock` for metadata timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the clock in place.
    pub fn set_clock(&mut self, clock: Clock) {
        self.clock = clock;
    }

    /// Start recording per-leaf timestamps. Existing leaves have none until
    /// they next change.
    pub fn enable_metadata(&mut self) {
        if self.metadata.is_none() {
            self.metadata = Some(MetadataNode::new());
        }
    }

    /// Whether per-leaf timestamps are recorded.
    pub fn metadata_enabled(&self) -> bool {
        self.metadata.is_some()
    }

    /// The current tree.
    pub fn tree(&self) -> &PropertyTree {
        &self.tree
    }

    /// Version last supplied by the service.
    pub fn version(&self) -> Option<i64> {
        self.version
    }

    /// Record the service-assigned version.
    pub fn set_version(&mut self, version: i64) {
        self.version = Some(version);
    }

    /// Timestamp of the last change at `path`, when metadata is enabled.
    pub fn last_updated(&self, path: &[&str]) -> Option<&str> {
        self.metadata
            .as_ref()?
            .get_path(path)
            .and_then(MetadataNode::last_updated)
    }

    /// Merge `incoming` into the store.
    ///
    /// Returns the subtree of values that actually changed, or `None` when
    /// nothing changed at any depth. Tombstones delete but never appear in
    /// the diff.
    pub fn apply(&mut self, incoming: &PropertyTree) -> Option<PropertyTree> {
        let diff = merge_level(&mut self.tree, incoming, 1);
        self.refresh_metadata(&diff);
        tracing::trace!(changed = diff.len(), "merged property bag");
        (!diff.is_empty()).then_some(diff)
    }

    /// Replace all content with `incoming` and return the resulting tree.
    ///
    /// Tombstones are dropped; empty branches are kept as given. An empty or
    /// all-tombstone input still resets to an explicit empty tree.
    pub fn reset(&mut self, incoming: &PropertyTree) -> PropertyTree {
        self.tree = incoming.without_tombstones();
        if let Some(meta) = self.metadata.as_mut() {
            meta.clear();
        }
        let written = self.tree.clone();
        self.refresh_metadata(&written);
        tracing::trace!(keys = written.len(), "reset property bag");
        written
    }

    /// Drop all content. Version and metadata setting are kept.
    pub fn clear(&mut self) {
        self.tree = PropertyTree::new();
        if let Some(meta) = self.metadata.as_mut() {
            meta.clear();
        }
    }

    /// Encode the bag with its `$version` and `$metadata` when present.
    pub fn to_json_value(&self) -> Value {
        let mut map = self.tree.to_json_map();
        if let Some(version) = self.version {
            map.insert(VERSION_KEY.to_string(), Value::from(version));
        }
        if let Some(meta) = &self.metadata {
            map.insert(METADATA_KEY.to_string(), meta.to_json_value());
        }
        Value::Object(map)
    }

    fn refresh_metadata(&mut self, diff: &PropertyTree) {
        let Some(meta) = self.metadata.as_mut() else {
            return;
        };
        if !diff.is_empty() {
            let now: DateTime<Utc> = (self.clock)();
            meta.stamp(diff, &format_timestamp(now));
        }
        meta.prune(&self.tree);
    }
}

impl Default for PropertyStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge one level of `incoming` into `store`, returning that level's diff.
///
/// `depth` is the level of `store` below the bag root (root = 1).
fn merge_level(store: &mut PropertyTree, incoming: &PropertyTree, depth: usize) -> PropertyTree {
    let mut diff = PropertyTree::new();

    for (key, value) in incoming {
        match value {
            TwinValue::Null => {
                if store.remove(key).is_some() {
                    tracing::trace!(depth, key = %key, "deleted");
                }
            }
            TwinValue::Tree(child) => {
                let (mut branch, displaced, was_empty) = match store.remove(key) {
                    Some(TwinValue::Tree(existing)) => {
                        let was_empty = existing.is_empty();
                        (existing, None, was_empty)
                    }
                    other => (PropertyTree::new(), other, false),
                };
                let child_diff = merge_level(&mut branch, child, depth + 1);

                if !child_diff.is_empty() {
                    store.insert(key.clone(), branch);
                    diff.insert(key.clone(), child_diff);
                } else if let Some(leaf) = displaced {
                    store.insert(key.clone(), leaf);
                } else if !branch.is_empty() || was_empty {
                    // Drop only branches emptied by deletions below.
                    store.insert(key.clone(), branch);
                }
            }
            leaf => {
                if store.get(key) != Some(leaf) {
                    store.insert(key.clone(), leaf.clone());
                    diff.insert(key.clone(), leaf.clone());
                }
            }
        }
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::epoch_clock;
    use serde_json::json;

    fn tree(value: Value) -> PropertyTree {
        PropertyTree::try_from(value).unwrap()
    }

    #[test]
    fn apply_to_empty_store_returns_input() {
        let mut store = PropertyStore::new();
        let diff = store.apply(&tree(json!({"a": 1, "b": {"c": "x"}})));

        assert_eq!(diff, Some(tree(json!({"a": 1, "b": {"c": "x"}}))));
        assert_eq!(store.tree(), &tree(json!({"a": 1, "b": {"c": "x"}})));
    }

    #[test]
    fn applying_twice_yields_no_diff() {
        let mut store = PropertyStore::new();
        let update = tree(json!({"a": 1, "b": {"c": "x"}}));
        assert!(store.apply(&update).is_some());
        assert!(store.apply(&update).is_none());
    }

    #[test]
    fn diff_contains_only_changed_leaves() {
        let mut store = PropertyStore::new();
        store.apply(&tree(json!({"a": 1, "b": {"c": 1, "d": 1}})));

        let diff = store.apply(&tree(json!({"a": 1, "b": {"c": 2, "d": 1}})));
        assert_eq!(diff, Some(tree(json!({"b": {"c": 2}}))));
        assert_eq!(store.tree(), &tree(json!({"a": 1, "b": {"c": 2, "d": 1}})));
    }

    #[test]
    fn tombstone_deletes_and_is_not_in_diff() {
        let mut store = PropertyStore::new();
        store.apply(&tree(json!({"a": 1, "b": 2})));

        let diff = store.apply(&tree(json!({"a": null})));
        assert!(diff.is_none());
        assert_eq!(store.tree(), &tree(json!({"b": 2})));
    }

    #[test]
    fn tombstone_for_missing_key_is_noop() {
        let mut store = PropertyStore::new();
        assert!(store.apply(&tree(json!({"a": null}))).is_none());
        assert!(store.tree().is_empty());
    }

    #[test]
    fn emptied_branch_is_removed() {
        let mut store = PropertyStore::new();
        store.apply(&tree(json!({"b": {"c": 1}, "k": 1})));
        store.apply(&tree(json!({"b": {"c": null}})));
        assert_eq!(store.tree(), &tree(json!({"k": 1})));
    }

    #[test]
    fn mixed_tombstone_and_change_in_branch() {
        let mut store = PropertyStore::new();
        store.apply(&tree(json!({"b": {"c": 1, "d": 1}})));

        let diff = store.apply(&tree(json!({"b": {"c": null, "d": 5}})));
        assert_eq!(diff, Some(tree(json!({"b": {"d": 5}}))));
        assert_eq!(store.tree(), &tree(json!({"b": {"d": 5}})));
    }

    #[test]
    fn leaf_replaced_by_tree_and_back() {
        let mut store = PropertyStore::new();
        store.apply(&tree(json!({"a": 1})));

        let diff = store.apply(&tree(json!({"a": {"x": 1}})));
        assert_eq!(diff, Some(tree(json!({"a": {"x": 1}}))));

        let diff = store.apply(&tree(json!({"a": "flat"})));
        assert_eq!(diff, Some(tree(json!({"a": "flat"}))));
        assert_eq!(store.tree(), &tree(json!({"a": "flat"})));
    }

    #[test]
    fn empty_update_tree_leaves_leaf_alone() {
        let mut store = PropertyStore::new();
        store.apply(&tree(json!({"a": 1})));
        assert!(store.apply(&tree(json!({"a": {}}))).is_none());
        assert!(store.apply(&tree(json!({"a": {"x": null}}))).is_none());
        assert_eq!(store.tree(), &tree(json!({"a": 1})));
    }

    #[test]
    fn comparisons_are_case_and_type_sensitive() {
        let mut store = PropertyStore::new();
        store.apply(&tree(json!({"Mode": "eco"})));

        let diff = store.apply(&tree(json!({"mode": "eco", "Mode": "Eco"})));
        assert_eq!(diff, Some(tree(json!({"mode": "eco", "Mode": "Eco"}))));

        let diff = store.apply(&tree(json!({"mode": 1})));
        assert_eq!(diff, Some(tree(json!({"mode": 1}))));
        let diff = store.apply(&tree(json!({"mode": "1"})));
        assert_eq!(diff, Some(tree(json!({"mode": "1"}))));
    }

    #[test]
    fn reset_discards_prior_content() {
        let mut store = PropertyStore::new();
        store.apply(&tree(json!({"old": 1})));

        let result = store.reset(&tree(json!({"new": {"x": 1, "gone": null}})));
        assert_eq!(result, tree(json!({"new": {"x": 1}})));
        assert_eq!(store.tree(), &tree(json!({"new": {"x": 1}})));
    }

    #[test]
    fn reset_keeps_empty_branches() {
        let mut store = PropertyStore::new();
        store.apply(&tree(json!({"old": 1})));

        let result = store.reset(&tree(json!({"a": {}, "b": 1, "c": {"d": null}})));
        let expected = tree(json!({"a": {}, "b": 1, "c": {}}));
        assert_eq!(result, expected);
        assert_eq!(store.tree(), &expected);

        assert!(store.apply(&tree(json!({"a": {}}))).is_none());
        assert_eq!(store.tree(), &expected);
    }

    #[test]
    fn reset_stamps_metadata_for_every_written_key() {
        let mut store = PropertyStore::new().with_clock(epoch_clock);
        store.enable_metadata();
        store.apply(&tree(json!({"old": 1})));

        store.reset(&tree(json!({"a": {}, "b": {"c": 1}})));
        let epoch = "1970-01-01T00:00:00.000000Z";
        assert_eq!(store.last_updated(&["a"]), Some(epoch));
        assert_eq!(store.last_updated(&["b", "c"]), Some(epoch));
        assert_eq!(store.last_updated(&["old"]), None);
    }

    #[test]
    fn reset_with_empty_input_gives_empty_tree() {
        let mut store = PropertyStore::new();
        store.apply(&tree(json!({"old": 1})));
        let result = store.reset(&PropertyTree::new());
        assert!(result.is_empty());
        assert!(store.tree().is_empty());
    }

    #[test]
    fn version_is_encoded() {
        let mut store = PropertyStore::new();
        store.apply(&tree(json!({"a": 1})));
        store.set_version(7);
        assert_eq!(store.version(), Some(7));
        assert_eq!(store.to_json_value(), json!({"a": 1, "$version": 7}));
    }

    #[test]
    fn metadata_tracks_changed_leaves() {
        let mut store = PropertyStore::new().with_clock(epoch_clock);
        store.enable_metadata();
        store.apply(&tree(json!({"a": 1, "b": {"c": 2}})));

        let epoch = "1970-01-01T00:00:00.000000Z";
        assert_eq!(store.last_updated(&["a"]), Some(epoch));
        assert_eq!(store.last_updated(&["b", "c"]), Some(epoch));
        assert_eq!(store.last_updated(&[]), Some(epoch));

        store.apply(&tree(json!({"a": null})));
        assert_eq!(store.last_updated(&["a"]), None);

        let encoded = store.to_json_value();
        assert_eq!(
            encoded[METADATA_KEY]["b"]["c"]["$lastUpdated"],
            json!(epoch)
        );
        assert!(encoded[METADATA_KEY].get("a").is_none());
    }

    #[test]
    fn metadata_disabled_by_default() {
        let mut store = PropertyStore::new();
        store.apply(&tree(json!({"a": 1})));
        assert!(!store.metadata_enabled());
        assert_eq!(store.last_updated(&["a"]), None);
        assert!(store.to_json_value().get(METADATA_KEY).is_none());
    }
}
