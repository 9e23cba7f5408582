#![forbid(unsafe_code)]

//! In-memory object-graph backend.
//!
//! [`MemoryTree`] serves `String`-identified nodes from a mutable
//! in-process graph and reports child-set changes to registered
//! watchers. It is the reference [`NodeInspector`] implementation, used
//! throughout the tests and doctests; fetches yield once before
//! resolving so they genuinely suspend like a remote backend would.
//!
//! Watchers fire from [`MemoryTree::insert`] and [`MemoryTree::remove`].
//! When a projection is watching, those calls must happen inside a
//! [`LocalSet`](tokio::task::LocalSet) context, because the
//! projection's callback spawns its refresh task there.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use futures::FutureExt;

use crate::inspector::{
    ChildChangeFn, ChildrenFuture, NodeInspector, ParentFuture, WatchGuard,
};

struct Entry {
    parent: Option<String>,
    children: Vec<String>,
    container: bool,
    watchers: Vec<Weak<dyn Fn(&String)>>,
}

#[derive(Default)]
struct Graph {
    entries: HashMap<String, Entry>,
}

/// Mutable in-memory tree keyed by string ids.
///
/// Cloning creates a new handle to the **same** graph.
#[derive(Default)]
pub struct MemoryTree {
    inner: Rc<RefCell<Graph>>,
}

impl Clone for MemoryTree {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for MemoryTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTree")
            .field("nodes", &self.inner.borrow().entries.len())
            .finish()
    }
}

impl MemoryTree {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node under `parent` (`None` for a topmost node).
    /// `container` marks whether the node can ever have children.
    /// Watchers of `parent` are notified.
    ///
    /// Returns `false` without changing anything when `id` already
    /// exists or `parent` is unknown.
    pub fn insert(&self, parent: Option<&str>, id: &str, container: bool) -> bool {
        {
            let mut graph = self.inner.borrow_mut();
            if graph.entries.contains_key(id) {
                return false;
            }
            if let Some(parent) = parent {
                let Some(entry) = graph.entries.get_mut(parent) else {
                    return false;
                };
                entry.children.push(id.to_string());
            }
            graph.entries.insert(
                id.to_string(),
                Entry {
                    parent: parent.map(str::to_string),
                    children: Vec::new(),
                    container,
                    watchers: Vec::new(),
                },
            );
        }
        if let Some(parent) = parent {
            self.notify(parent);
        }
        true
    }

    /// Remove a node and its whole subtree, notifying watchers of the
    /// removed node's parent. Returns `false` when `id` is unknown.
    pub fn remove(&self, id: &str) -> bool {
        let parent = {
            let mut graph = self.inner.borrow_mut();
            let Some(entry) = graph.entries.get(id) else {
                return false;
            };
            let parent = entry.parent.clone();
            if let Some(parent) = &parent {
                if let Some(entry) = graph.entries.get_mut(parent) {
                    entry.children.retain(|child| child != id);
                }
            }
            remove_subtree(&mut graph, id);
            parent
        };
        if let Some(parent) = parent {
            self.notify(&parent);
        }
        true
    }

    /// Children of `id` in insertion order, empty for unknown nodes.
    #[must_use]
    pub fn children(&self, id: &str) -> Vec<String> {
        self.inner
            .borrow()
            .entries
            .get(id)
            .map(|entry| entry.children.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.inner.borrow().entries.contains_key(id)
    }

    /// Invoke live watchers of `id`, pruning dead ones. Callbacks run
    /// outside the graph borrow, so they may freely query or mutate the
    /// graph.
    fn notify(&self, id: &str) {
        let live: Vec<Rc<dyn Fn(&String)>> = {
            let mut graph = self.inner.borrow_mut();
            let Some(entry) = graph.entries.get_mut(id) else {
                return;
            };
            entry.watchers.retain(|w| w.strong_count() > 0);
            entry.watchers.iter().filter_map(Weak::upgrade).collect()
        };
        let id = id.to_string();
        for watcher in &live {
            watcher(&id);
        }
    }
}

fn remove_subtree(graph: &mut Graph, id: &str) {
    if let Some(entry) = graph.entries.remove(id) {
        for child in &entry.children {
            remove_subtree(graph, child);
        }
    }
}

impl NodeInspector<String> for MemoryTree {
    fn can_have_children(&self, node: &String) -> bool {
        self.inner
            .borrow()
            .entries
            .get(node)
            .is_some_and(|entry| entry.container)
    }

    fn children_of<'a>(&'a self, node: &'a String) -> ChildrenFuture<'a, String> {
        let children = self
            .inner
            .borrow()
            .entries
            .get(node)
            .map(|entry| entry.children.clone());
        async move {
            tokio::task::yield_now().await;
            children.ok_or_else(|| format!("unknown node {node}").into())
        }
        .boxed_local()
    }

    fn parent_of<'a>(&'a self, node: &'a String) -> ParentFuture<'a, String> {
        let entry = self
            .inner
            .borrow()
            .entries
            .get(node)
            .map(|entry| entry.parent.clone());
        async move {
            tokio::task::yield_now().await;
            entry.ok_or_else(|| format!("unknown node {node}").into())
        }
        .boxed_local()
    }

    fn watch_children(&self, node: &String, on_changed: ChildChangeFn<String>) -> WatchGuard {
        let mut graph = self.inner.borrow_mut();
        let Some(entry) = graph.entries.get_mut(node) else {
            return WatchGuard::noop();
        };
        entry.watchers.push(Rc::downgrade(&on_changed));
        WatchGuard::new(on_changed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
