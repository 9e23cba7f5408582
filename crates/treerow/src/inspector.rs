#![forbid(unsafe_code)]

//! Backend interface: node identity, children access, and change
//! notification.
//!
//! The projection is agnostic to the concrete shape of a node. It
//! requires two things: a stable, hashable identity ([`TreeNode`]) and
//! a per-node capability object ([`NodeInspector`]) that knows how to
//! fetch children, resolve parents, and report child-set changes for
//! whatever backs the node (remote API, in-memory graph, ...).
//!
//! Inspectors are looked up per node through an [`InspectorFactory`],
//! so a single projection can span nodes served by different backends.
//! For the common one-backend case, [`UniformInspectors`] adapts a
//! single inspector into a factory.

use std::hash::Hash;
use std::rc::Rc;

use futures::future::LocalBoxFuture;

use crate::error::InspectorError;

/// Identity for domain objects placed in the tree.
///
/// The id is the explicit identity function used consistently for the
/// node index; two nodes with equal ids are the same node as far as the
/// projection is concerned.
pub trait TreeNode: Clone + 'static {
    /// Stable key type used in the node index.
    type Id: Eq + Hash + Clone + std::fmt::Debug + 'static;

    /// Extract this node's identity.
    fn id(&self) -> Self::Id;
}

/// Self-identifying string nodes, handy for tests and simple backends.
impl TreeNode for String {
    type Id = String;

    fn id(&self) -> String {
        self.clone()
    }
}

/// Self-identifying numeric nodes.
impl TreeNode for u64 {
    type Id = u64;

    fn id(&self) -> u64 {
        *self
    }
}

/// Future returned by [`NodeInspector::children_of`].
pub type ChildrenFuture<'a, N> = LocalBoxFuture<'a, Result<Vec<N>, InspectorError>>;

/// Future returned by [`NodeInspector::parent_of`].
pub type ParentFuture<'a, N> = LocalBoxFuture<'a, Result<Option<N>, InspectorError>>;

/// Callback invoked by a backend when a node's child set changes.
pub type ChildChangeFn<N> = Rc<dyn Fn(&N)>;

/// Per-node capability object for one backing data source.
///
/// Fetch methods are async and may fail; capability probing is
/// synchronous and infallible (a backend that cannot answer cheaply
/// should report `true` and return an empty child list on fetch).
pub trait NodeInspector<N: TreeNode> {
    /// Whether `node` can have children at all. `false` marks a leaf
    /// that will never be expandable.
    fn can_have_children(&self, node: &N) -> bool;

    /// Fetch `node`'s children, in display order.
    fn children_of<'a>(&'a self, node: &'a N) -> ChildrenFuture<'a, N>;

    /// Resolve `node`'s parent, `None` for a topmost node.
    fn parent_of<'a>(&'a self, node: &'a N) -> ParentFuture<'a, N>;

    /// Register `on_changed` to fire when `node`'s child set changes.
    ///
    /// The backend must hold the callback weakly and stop invoking it
    /// once the returned [`WatchGuard`] is dropped. The projection keeps
    /// exactly one active watch per expanded node.
    fn watch_children(&self, node: &N, on_changed: ChildChangeFn<N>) -> WatchGuard;
}

/// Factory resolving the inspector responsible for a given node.
pub trait InspectorFactory<N: TreeNode> {
    /// Inspector serving `node`.
    fn inspector_for(&self, node: &N) -> Rc<dyn NodeInspector<N>>;
}

/// Adapts a single inspector into an [`InspectorFactory`] that serves
/// every node.
pub struct UniformInspectors<N: TreeNode> {
    inspector: Rc<dyn NodeInspector<N>>,
}

impl<N: TreeNode> UniformInspectors<N> {
    /// Wrap one inspector for all nodes.
    pub fn new(inspector: Rc<dyn NodeInspector<N>>) -> Self {
        Self { inspector }
    }
}

impl<N: TreeNode> InspectorFactory<N> for UniformInspectors<N> {
    fn inspector_for(&self, _node: &N) -> Rc<dyn NodeInspector<N>> {
        Rc::clone(&self.inspector)
    }
}

/// RAII handle for a child-change registration.
///
/// Owns whatever keeps the registration alive (typically the strong
/// callback reference); dropping the guard ends the registration. The
/// projection disposes a guard before removing its record from the node
/// index, so a late notification can never observe a stale row.
pub struct WatchGuard {
    _keepalive: Box<dyn std::any::Any>,
}

impl WatchGuard {
    /// Build a guard owning `keepalive`.
    pub fn new(keepalive: impl std::any::Any) -> Self {
        Self {
            _keepalive: Box::new(keepalive),
        }
    }

    /// A guard with nothing to release, for backends without change
    /// notification.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(())
    }
}

impl std::fmt::Debug for WatchGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchGuard").finish_non_exhaustive()
    }
}
