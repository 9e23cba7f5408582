#![forbid(unsafe_code)]

//! Projection algorithms: expand, collapse, refresh, reveal.
//!
//! # Design
//!
//! [`TreeProjector`] owns the [`RowMap`] and mutates it exclusively from
//! tasks run on its [`TaskQueue`], so at most one structural change is
//! in flight at any time and queued operations always observe the fully
//! settled state left by the previous task. Public operations enqueue;
//! the `*_inner` helpers never re-enter the queue (an internal enqueue
//! from inside a running task would deadlock).
//!
//! Interior state lives in a `RefCell` and borrows are never held
//! across an await: each operation fetches from the backend first and
//! commits the splice synchronously afterwards, which is also what
//! keeps a failed fetch from leaving a partial splice behind.
//!
//! Child-change notifications from the backend are fire-and-forget:
//! the watch callback spawns a refresh task onto the current
//! [`LocalSet`](tokio::task::LocalSet) and a failure there is logged
//! rather than propagated, since no caller is waiting on it.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::error::TreeError;
use crate::inspector::{
    ChildChangeFn, InspectorFactory, NodeInspector, TreeNode, UniformInspectors, WatchGuard,
};
use crate::notify::{Emitter, Subscription};
use crate::queue::TaskQueue;
use crate::row::{RowMap, RowRecord};
use crate::source::{ExpandState, NodeState, Size};

struct ProjectorState<N: TreeNode> {
    root: Option<N>,
    /// Root's own child-change registration. The root has no
    /// [`RowRecord`] (it is conceptually level −1 and always expanded),
    /// so its watch is owned here.
    root_watch: Option<WatchGuard>,
    map: RowMap<N>,
}

struct ProjectorInner<N: TreeNode> {
    queue: TaskQueue,
    factory: Box<dyn InspectorFactory<N>>,
    state: RefCell<ProjectorState<N>>,
    size_changed: Emitter<Size>,
}

/// Maintains the flat row projection of a lazily-loaded tree.
///
/// Cloning creates a new handle to the **same** projection. The type is
/// single-threaded (`!Send`); drive it from a current-thread runtime.
pub struct TreeProjector<N: TreeNode> {
    inner: Rc<ProjectorInner<N>>,
}

impl<N: TreeNode> Clone for TreeProjector<N> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<N: TreeNode> std::fmt::Debug for TreeProjector<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeProjector")
            .field("rows", &self.inner.state.borrow().map.len())
            .field("queue", &self.inner.queue)
            .finish()
    }
}

impl<N: TreeNode> TreeProjector<N> {
    /// Create a projection whose nodes are served by `factory`.
    pub fn new(factory: impl InspectorFactory<N> + 'static) -> Self {
        Self {
            inner: Rc::new(ProjectorInner {
                queue: TaskQueue::new(),
                factory: Box::new(factory),
                state: RefCell::new(ProjectorState {
                    root: None,
                    root_watch: None,
                    map: RowMap::new(),
                }),
                size_changed: Emitter::new(),
            }),
        }
    }

    /// Create a projection served by a single inspector for all nodes.
    pub fn with_inspector(inspector: impl NodeInspector<N> + 'static) -> Self {
        Self::new(UniformInspectors::new(Rc::new(inspector)))
    }

    /// The queue serializing structural mutations.
    pub fn queue(&self) -> &TaskQueue {
        &self.inner.queue
    }

    /// The current root, if any.
    pub fn root(&self) -> Option<N> {
        self.inner.state.borrow().root.clone()
    }

    /// Current projection size: visible row count, single column.
    #[must_use]
    pub fn size(&self) -> Size {
        Size {
            rows: self.inner.state.borrow().map.len(),
            cols: 1,
        }
    }

    /// Register a callback fired with the new [`Size`] after every
    /// structural mutation.
    pub fn on_size_changed(&self, callback: impl Fn(&Size) + 'static) -> Subscription {
        self.inner.size_changed.subscribe(callback)
    }

    /// Read access to the committed row state.
    pub(crate) fn with_rows<R>(&self, f: impl FnOnce(&RowMap<N>) -> R) -> R {
        f(&self.inner.state.borrow().map)
    }

    /// Level and expansion state of `node`, `None` when the node is not
    /// materialized. Probes (and caches) the children capability on
    /// first ask.
    pub fn node_state_for(&self, node: &N) -> Option<NodeState> {
        let id = node.id();
        let (level, expanded, cached) = {
            let state = self.inner.state.borrow();
            let record = state.map.record(&id)?;
            (record.level(), record.is_expanded(), record.can_have_children())
        };
        if expanded {
            return Some(NodeState {
                level,
                state: ExpandState::Open,
            });
        }
        let can = match cached {
            Some(can) => can,
            None => {
                let can = self.inner.factory.inspector_for(node).can_have_children(node);
                if let Some(record) = self.inner.state.borrow_mut().map.record_mut(&id) {
                    record.can_have_children = Some(can);
                }
                can
            }
        };
        Some(NodeState {
            level,
            state: if can {
                ExpandState::Closed
            } else {
                ExpandState::None
            },
        })
    }

    // -- Queued operations --------------------------------------------------

    /// Replace the root. The entire current projection is torn down
    /// (watches disposed) before the new root's children are loaded as
    /// level-0 rows. Fails with [`TreeError::RootNotExpandable`] when
    /// the new root cannot have children, leaving the projection empty.
    /// A size-change is reported in every case, `None` root included.
    pub async fn set_root(&self, root: Option<N>) -> Result<(), TreeError> {
        self.inner.queue.run(self.set_root_inner(root)).await
    }

    /// Make `node`'s children visible. No-op when already expanded or
    /// known to be a leaf; [`TreeError::NodeNotFound`] when `node` is
    /// not materialized. The splice is committed only after the child
    /// fetch succeeds.
    pub async fn expand(&self, node: &N) -> Result<(), TreeError> {
        self.inner.queue.run(self.expand_inner(node)).await
    }

    /// Hide `node`'s subtree. No-op when not expanded;
    /// [`TreeError::NodeNotFound`] when `node` is not materialized.
    pub async fn collapse(&self, node: &N) -> Result<(), TreeError> {
        self.inner
            .queue
            .run(async { self.collapse_inner(node) })
            .await
    }

    /// Collapse then re-expand `node` within a single queued task.
    /// Previously expanded descendants are not restored. Refreshing the
    /// root reloads the level-0 rows.
    pub async fn refresh_children(&self, node: &N) -> Result<(), TreeError> {
        self.inner.queue.run(self.refresh_inner(node)).await
    }

    /// Make `node` visible by expanding its ancestors, topmost first.
    /// Fails with [`TreeError::NodeNotFound`] when the parent chain
    /// does not reach the current root.
    pub async fn reveal(&self, node: &N) -> Result<(), TreeError> {
        self.inner.queue.run(self.reveal_inner(node)).await
    }

    /// Reload the whole projection from the root. No-op without a root.
    pub async fn update_all(&self) -> Result<(), TreeError> {
        self.inner.queue.run(self.refresh_root_inner()).await
    }

    // -- Task bodies (run inside the queue, never re-enqueue) ---------------

    async fn set_root_inner(&self, root: Option<N>) -> Result<(), TreeError> {
        {
            let mut state = self.inner.state.borrow_mut();
            state.map.clear();
            drop(state.root_watch.take());
            state.root = None;
        }
        let Some(root) = root else {
            tracing::debug!("root cleared");
            self.emit_size();
            return Ok(());
        };
        tracing::debug!(root = ?root.id(), "root assigned");

        let inspector = self.inner.factory.inspector_for(&root);
        if !inspector.can_have_children(&root) {
            self.emit_size();
            return Err(TreeError::RootNotExpandable);
        }
        let watch = inspector.watch_children(&root, self.change_callback());
        {
            let mut state = self.inner.state.borrow_mut();
            state.root = Some(root.clone());
            state.root_watch = Some(watch);
        }

        let loaded = self.load_root_children(&root, inspector.as_ref()).await;
        self.emit_size();
        loaded
    }

    async fn expand_inner(&self, node: &N) -> Result<(), TreeError> {
        let id = node.id();
        let (node, level, cached) = {
            let state = self.inner.state.borrow();
            let record = state.map.record(&id).ok_or_else(|| TreeError::not_found(&id))?;
            if record.is_expanded() {
                return Ok(());
            }
            (record.node().clone(), record.level(), record.can_have_children())
        };

        let inspector = self.inner.factory.inspector_for(&node);
        let can = match cached {
            Some(can) => can,
            None => {
                let can = inspector.can_have_children(&node);
                if let Some(record) = self.inner.state.borrow_mut().map.record_mut(&id) {
                    record.can_have_children = Some(can);
                }
                can
            }
        };
        if !can {
            return Ok(());
        }

        let children = inspector
            .children_of(&node)
            .await
            .map_err(TreeError::Inspector)?;
        let watch = inspector.watch_children(&node, self.change_callback());

        let inserted = {
            let mut state = self.inner.state.borrow_mut();
            let pos = state
                .map
                .position_of(&id)
                .ok_or_else(|| TreeError::not_found(&id))?;
            let ids = Self::build_records(&mut state.map, children, level + 1);
            let count = ids.len();
            if let Some(record) = state.map.record_mut(&id) {
                record.children = Some(ids.clone());
                record.watch = Some(watch);
                record.can_have_children = Some(true);
            }
            state.map.insert_rows(pos + 1, ids);
            count
        };
        tracing::debug!(node = ?id, children = inserted, "expanded");
        self.emit_size();
        Ok(())
    }

    fn collapse_inner(&self, node: &N) -> Result<(), TreeError> {
        let id = node.id();
        let removed = {
            let mut state = self.inner.state.borrow_mut();
            let record = state.map.record(&id).ok_or_else(|| TreeError::not_found(&id))?;
            if !record.is_expanded() {
                return Ok(());
            }
            let pos = state
                .map
                .position_of(&id)
                .ok_or_else(|| TreeError::not_found(&id))?;
            let span = state.map.descendant_span(pos);
            state.map.drop_descendants(&id);
            state.map.remove_rows(pos + 1, span);
            span
        };
        tracing::debug!(node = ?id, removed, "collapsed");
        self.emit_size();
        Ok(())
    }

    async fn refresh_inner(&self, node: &N) -> Result<(), TreeError> {
        let is_root = {
            let state = self.inner.state.borrow();
            state.root.as_ref().map(TreeNode::id) == Some(node.id())
        };
        if is_root {
            return self.refresh_root_inner().await;
        }
        self.collapse_inner(node)?;
        self.expand_inner(node).await
    }

    async fn refresh_root_inner(&self) -> Result<(), TreeError> {
        let Some(root) = self.inner.state.borrow().root.clone() else {
            return Ok(());
        };
        tracing::debug!(root = ?root.id(), "reloading from root");
        self.inner.state.borrow_mut().map.clear();
        self.emit_size();

        let inspector = self.inner.factory.inspector_for(&root);
        let loaded = self.load_root_children(&root, inspector.as_ref()).await;
        self.emit_size();
        loaded
    }

    async fn reveal_inner(&self, node: &N) -> Result<(), TreeError> {
        let target = node.id();
        let Some(root_id) = self.inner.state.borrow().root.as_ref().map(TreeNode::id) else {
            return Err(TreeError::not_found(&target));
        };
        if target == root_id {
            // The root is always "expanded" and never occupies a row.
            return Ok(());
        }

        // Walk up to (excluding) the root. A chain that ends before the
        // root means the node is disconnected from this projection; a
        // revisited id means the backend reported a parent cycle.
        let mut chain: Vec<N> = Vec::new();
        let mut seen: HashSet<N::Id> = HashSet::from([target.clone()]);
        let mut cursor = node.clone();
        loop {
            let inspector = self.inner.factory.inspector_for(&cursor);
            let parent = inspector
                .parent_of(&cursor)
                .await
                .map_err(TreeError::Inspector)?;
            match parent {
                None => return Err(TreeError::not_found(&target)),
                Some(parent) if parent.id() == root_id => break,
                Some(parent) => {
                    if !seen.insert(parent.id()) {
                        return Err(TreeError::not_found(&target));
                    }
                    chain.push(parent.clone());
                    cursor = parent;
                }
            }
        }

        for ancestor in chain.iter().rev() {
            self.expand_inner(ancestor).await?;
        }
        if self.inner.state.borrow().map.contains(&target) {
            tracing::trace!(node = ?target, "revealed");
            Ok(())
        } else {
            Err(TreeError::not_found(&target))
        }
    }

    // -- Shared helpers -----------------------------------------------------

    /// Fetch `root`'s children and install them as the level-0 rows.
    async fn load_root_children(
        &self,
        root: &N,
        inspector: &dyn NodeInspector<N>,
    ) -> Result<(), TreeError> {
        let children = inspector
            .children_of(root)
            .await
            .map_err(TreeError::Inspector)?;
        let mut state = self.inner.state.borrow_mut();
        state.map.clear();
        let ids = Self::build_records(&mut state.map, children, 0);
        state.map.set_rows(ids);
        Ok(())
    }

    /// Materialize records for `children` at `level`, returning their
    /// ids in display order. A child whose id is already materialized
    /// is dropped (duplicate ids would corrupt the position index).
    fn build_records(map: &mut RowMap<N>, children: Vec<N>, level: usize) -> Vec<N::Id> {
        let mut ids = Vec::with_capacity(children.len());
        for child in children {
            let id = child.id();
            if map.contains(&id) {
                tracing::warn!(node = ?id, "duplicate child id dropped");
                continue;
            }
            map.insert_record(RowRecord::new(child, level));
            ids.push(id);
        }
        ids
    }

    /// Callback handed to backends: schedules a refresh of the changed
    /// node. Holds the projection weakly so a dangling backend cannot
    /// keep it alive.
    fn change_callback(&self) -> ChildChangeFn<N> {
        let weak = Rc::downgrade(&self.inner);
        Rc::new(move |node: &N| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let projector = TreeProjector { inner };
            let node = node.clone();
            tokio::task::spawn_local(async move {
                if let Err(error) = projector.refresh_children(&node).await {
                    tracing::warn!(%error, node = ?node.id(), "child-change refresh failed");
                }
            });
        })
    }

    fn emit_size(&self) {
        let size = self.size();
        self.inner.size_changed.emit(&size);
    }
}
