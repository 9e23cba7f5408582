#![forbid(unsafe_code)]

//! Row metadata store: the ordered visible-row list and the node index.
//!
//! # Design
//!
//! [`RowMap`] keeps three views of the projection that must stay
//! consistent:
//!
//! - `records`: node id → [`RowRecord`], the node index. O(1) lookup.
//! - `rows`: ids in display order (pre-order over expanded subtrees).
//! - `positions`: node id → row index, rebuilt by an explicit remap
//!   step after each committed structural change, so position lookups
//!   are O(1) and always reflect the latest committed mutation.
//!
//! # Invariants
//!
//! 1. The id set of `rows` equals the key set of `records` (visible
//!    nodes are exactly the materialized ones; collapsing a subtree
//!    drops its descendants from the index).
//! 2. `rows` is a valid pre-order traversal: a child's level is exactly
//!    its parent's level + 1, and every non-level-0 row's parent is the
//!    nearest preceding row one level up, with the child listed in that
//!    parent's `children`.
//! 3. `positions[id] == i` iff `rows[i] == id`.
//!
//! Mutators here are primitive (splice, drain, drop-subtree); the
//! projection algorithms that compose them live in
//! [`projector`](crate::projector).

use std::collections::HashMap;

use crate::inspector::{TreeNode, WatchGuard};

/// Metadata for one materialized tree node.
pub struct RowRecord<N: TreeNode> {
    pub(crate) node: N,
    pub(crate) level: usize,
    /// Tri-state children capability, populated lazily from the
    /// inspector. `None` means not asked yet.
    pub(crate) can_have_children: Option<bool>,
    /// Child ids in display order, present iff the node is expanded.
    /// `Some(vec![])` (expanded, no children) is distinct from `None`
    /// (collapsed or never expanded).
    pub(crate) children: Option<Vec<N::Id>>,
    /// Child-change registration, held while the node is expanded.
    pub(crate) watch: Option<WatchGuard>,
}

impl<N: TreeNode> RowRecord<N> {
    pub(crate) fn new(node: N, level: usize) -> Self {
        Self {
            node,
            level,
            can_have_children: None,
            children: None,
            watch: None,
        }
    }

    /// The domain object this row represents.
    pub fn node(&self) -> &N {
        &self.node
    }

    /// Indentation depth; root's direct children are 0.
    #[must_use]
    pub fn level(&self) -> usize {
        self.level
    }

    /// Whether the node is currently expanded.
    #[must_use]
    pub fn is_expanded(&self) -> bool {
        self.children.is_some()
    }

    /// Cached children capability, `None` when not yet probed.
    #[must_use]
    pub fn can_have_children(&self) -> Option<bool> {
        self.can_have_children
    }
}

impl<N: TreeNode> std::fmt::Debug for RowRecord<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowRecord")
            .field("id", &self.node.id())
            .field("level", &self.level)
            .field("can_have_children", &self.can_have_children)
            .field("expanded", &self.children.is_some())
            .finish()
    }
}

/// Ordered visible-row list plus node index.
pub struct RowMap<N: TreeNode> {
    records: HashMap<N::Id, RowRecord<N>>,
    rows: Vec<N::Id>,
    positions: HashMap<N::Id, usize>,
}

impl<N: TreeNode> Default for RowMap<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: TreeNode> std::fmt::Debug for RowMap<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowMap")
            .field("rows", &self.rows)
            .finish_non_exhaustive()
    }
}

impl<N: TreeNode> RowMap<N> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            rows: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Number of visible rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Ids in display order.
    pub fn rows(&self) -> &[N::Id] {
        &self.rows
    }

    pub fn record(&self, id: &N::Id) -> Option<&RowRecord<N>> {
        self.records.get(id)
    }

    pub(crate) fn record_mut(&mut self, id: &N::Id) -> Option<&mut RowRecord<N>> {
        self.records.get_mut(id)
    }

    #[must_use]
    pub fn contains(&self, id: &N::Id) -> bool {
        self.records.contains_key(id)
    }

    /// Node at `row`, `None` when out of range.
    pub fn node_at(&self, row: usize) -> Option<&N> {
        self.rows
            .get(row)
            .and_then(|id| self.records.get(id))
            .map(|record| &record.node)
    }

    /// Row index of `id`, `None` when not visible.
    #[must_use]
    pub fn position_of(&self, id: &N::Id) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// Register a record in the node index. Does not touch the row list.
    pub(crate) fn insert_record(&mut self, record: RowRecord<N>) {
        self.records.insert(record.node.id(), record);
    }

    /// Splice `ids` into the row list at `at` and remap positions.
    pub(crate) fn insert_rows(&mut self, at: usize, ids: Vec<N::Id>) {
        self.rows.splice(at..at, ids);
        self.remap(at);
    }

    /// Remove `count` rows starting at `at` and remap positions.
    pub(crate) fn remove_rows(&mut self, at: usize, count: usize) {
        for id in self.rows.drain(at..at + count) {
            self.positions.remove(&id);
        }
        self.remap(at);
    }

    /// Replace the entire row list (root rebuild) and remap positions.
    pub(crate) fn set_rows(&mut self, ids: Vec<N::Id>) {
        self.rows = ids;
        self.positions.clear();
        self.remap(0);
    }

    /// Number of rows after `pos` that belong to the subtree rooted at
    /// `rows[pos]` (contiguous run of deeper levels, by invariant 2).
    #[must_use]
    pub(crate) fn descendant_span(&self, pos: usize) -> usize {
        let Some(level) = self
            .rows
            .get(pos)
            .and_then(|id| self.records.get(id))
            .map(RowRecord::level)
        else {
            return 0;
        };
        self.rows[pos + 1..]
            .iter()
            .take_while(|id| self.records.get(id).is_some_and(|r| r.level > level))
            .count()
    }

    /// Drop every descendant record of `id` from the index, disposing
    /// each watch before its record leaves the index, and clear the
    /// node's own `children` and watch. The row list is not touched;
    /// callers remove the corresponding span separately.
    pub(crate) fn drop_descendants(&mut self, id: &N::Id) {
        let children = match self.records.get_mut(id) {
            Some(record) => {
                drop(record.watch.take());
                record.children.take()
            }
            None => return,
        };
        for child in children.into_iter().flatten() {
            self.drop_record_tree(&child);
        }
    }

    fn drop_record_tree(&mut self, id: &N::Id) {
        let children = match self.records.get_mut(id) {
            Some(record) => {
                drop(record.watch.take());
                record.children.take()
            }
            None => return,
        };
        for child in children.into_iter().flatten() {
            self.drop_record_tree(&child);
        }
        self.records.remove(id);
    }

    /// Tear down the whole projection: watches first, then both maps.
    pub(crate) fn clear(&mut self) {
        for record in self.records.values_mut() {
            drop(record.watch.take());
        }
        self.records.clear();
        self.rows.clear();
        self.positions.clear();
    }

    /// Rebuild `positions` for rows at `from` and after.
    fn remap(&mut self, from: usize) {
        for (offset, id) in self.rows[from..].iter().enumerate() {
            self.positions.insert(id.clone(), from + offset);
        }
    }

    /// Check the structural invariants, for tests.
    #[cfg(test)]
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.rows.len() != self.records.len() {
            return Err(format!(
                "{} rows but {} records",
                self.rows.len(),
                self.records.len()
            ));
        }
        if self.positions.len() != self.rows.len() {
            return Err("duplicate ids in row list".into());
        }
        let mut stack: Vec<N::Id> = Vec::new();
        for (pos, id) in self.rows.iter().enumerate() {
            let record = self
                .records
                .get(id)
                .ok_or_else(|| format!("row {pos} ({id:?}) missing from index"))?;
            if self.positions.get(id) != Some(&pos) {
                return Err(format!("stale position for {id:?}"));
            }
            if record.level > stack.len() {
                return Err(format!(
                    "row {pos} ({id:?}) jumps from depth {} to {}",
                    stack.len(),
                    record.level
                ));
            }
            stack.truncate(record.level);
            if let Some(parent) = stack.last() {
                let listed = self
                    .records
                    .get(parent)
                    .and_then(|p| p.children.as_ref())
                    .is_some_and(|c| c.contains(id));
                if !listed {
                    return Err(format!("row {pos} ({id:?}) not a child of {parent:?}"));
                }
            }
            stack.push(id.clone());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, level: usize) -> RowRecord<String> {
        RowRecord::new(id.to_string(), level)
    }

    fn simple_map() -> RowMap<String> {
        // a (expanded: b, c), d — a/d level 0, b/c level 1.
        let mut map = RowMap::new();
        let mut a = record("a", 0);
        a.children = Some(vec!["b".into(), "c".into()]);
        map.insert_record(a);
        map.insert_record(record("b", 1));
        map.insert_record(record("c", 1));
        map.insert_record(record("d", 0));
        map.set_rows(vec!["a".into(), "b".into(), "c".into(), "d".into()]);
        map
    }

    #[test]
    fn positions_follow_rows() {
        let map = simple_map();
        map.validate().unwrap();
        assert_eq!(map.position_of(&"a".into()), Some(0));
        assert_eq!(map.position_of(&"d".into()), Some(3));
        assert_eq!(map.node_at(1), Some(&"b".to_string()));
        assert_eq!(map.node_at(9), None);
    }

    #[test]
    fn insert_rows_remaps_tail() {
        let mut map = simple_map();
        map.insert_record(record("x", 1));
        // "x" becomes a's third child.
        map.record_mut(&"a".into())
            .unwrap()
            .children
            .as_mut()
            .unwrap()
            .push("x".into());
        map.insert_rows(3, vec!["x".into()]);
        map.validate().unwrap();
        assert_eq!(map.position_of(&"x".into()), Some(3));
        assert_eq!(map.position_of(&"d".into()), Some(4));
    }

    #[test]
    fn descendant_span_covers_subtree_only() {
        let map = simple_map();
        assert_eq!(map.descendant_span(0), 2);
        assert_eq!(map.descendant_span(1), 0);
        assert_eq!(map.descendant_span(3), 0);
        assert_eq!(map.descendant_span(42), 0);
    }

    #[test]
    fn drop_descendants_prunes_index() {
        let mut map = simple_map();
        map.drop_descendants(&"a".into());
        map.remove_rows(1, 2);
        map.validate().unwrap();
        assert_eq!(map.len(), 2);
        assert!(!map.contains(&"b".into()));
        assert!(!map.contains(&"c".into()));
        assert!(!map.record(&"a".into()).unwrap().is_expanded());
        assert_eq!(map.position_of(&"d".into()), Some(1));
    }

    #[test]
    fn clear_empties_everything() {
        let mut map = simple_map();
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.node_at(0), None);
        map.validate().unwrap();
    }
}
