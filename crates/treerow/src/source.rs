#![forbid(unsafe_code)]

//! Grid-facing facade over the projection.
//!
//! A virtualized grid widget talks to [`TreeDataSource`] alone: it asks
//! for the current [`Size`], reads rows by position, resolves node
//! positions and states for twistie rendering, and subscribes to
//! size-change notifications to know when to re-request visible ranges.
//!
//! Read methods are synchronous, never block, and never panic on
//! out-of-range input; they report the latest committed state. A caller
//! that needs the queue settled before reading a range awaits
//! [`TreeDataSource::make_available`] first.

use std::ops::Range;

use crate::error::TreeError;
use crate::inspector::TreeNode;
use crate::notify::Subscription;
use crate::projector::TreeProjector;

/// Projection size as seen by the grid.
///
/// `cols` is fixed at 1: the tree projection is single-column, and any
/// further columns belong to the surrounding grid model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    /// Visible row count.
    pub rows: usize,
    /// Always 1.
    pub cols: usize,
}

/// Expansion state of one visible node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandState {
    /// Expanded: children are visible.
    Open,
    /// Collapsible but currently collapsed.
    Closed,
    /// Leaf, or capability unknown.
    None,
}

impl std::fmt::Display for ExpandState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::None => "none",
        })
    }
}

/// Indentation level and expansion state for twistie rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeState {
    /// Indentation depth; root's direct children are 0.
    pub level: usize,
    /// Expansion state.
    pub state: ExpandState,
}

/// Row-oriented data source backed by a [`TreeProjector`].
pub struct TreeDataSource<N: TreeNode> {
    projector: TreeProjector<N>,
}

impl<N: TreeNode> Clone for TreeDataSource<N> {
    fn clone(&self) -> Self {
        Self {
            projector: self.projector.clone(),
        }
    }
}

impl<N: TreeNode> std::fmt::Debug for TreeDataSource<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeDataSource")
            .field("size", &self.size())
            .finish()
    }
}

impl<N: TreeNode> TreeDataSource<N> {
    /// Wrap a projector.
    pub fn new(projector: TreeProjector<N>) -> Self {
        Self { projector }
    }

    /// The underlying projector.
    pub fn projector(&self) -> &TreeProjector<N> {
        &self.projector
    }

    /// Current `{rows, cols}` size.
    #[must_use]
    pub fn size(&self) -> Size {
        self.projector.size()
    }

    /// Node at `position`, `None` when out of range. Never panics.
    pub fn model_for_position(&self, position: usize) -> Option<N> {
        self.projector.with_rows(|map| map.node_at(position).cloned())
    }

    /// Alias of [`Self::model_for_position`] under the grid's row
    /// naming.
    pub fn node_at(&self, row: usize) -> Option<N> {
        self.model_for_position(row)
    }

    /// Row index of `node`, `None` when it is not currently visible.
    pub fn position_of_model(&self, node: &N) -> Option<usize> {
        self.projector.with_rows(|map| map.position_of(&node.id()))
    }

    /// Level and expansion state of `node`, `None` when it is not
    /// materialized.
    pub fn node_state_for(&self, node: &N) -> Option<NodeState> {
        self.projector.node_state_for(node)
    }

    /// Wait until all pending structural mutations are applied, so rows
    /// in `range` can be read settled. The guarantee is queue-wide (the
    /// range only documents intent). External callers only: awaiting
    /// this from inside a queued task deadlocks.
    pub async fn make_available(&self, _range: Range<usize>) {
        self.projector.queue().drain().await;
    }

    /// Best-effort, non-blocking probe: whether no structural mutation
    /// is pending or running right now.
    #[must_use]
    pub fn is_available(&self, _range: Range<usize>) -> bool {
        self.projector.queue().is_empty()
    }

    /// Register a callback fired with the new [`Size`] after every
    /// structural mutation.
    pub fn on_size_changed(&self, callback: impl Fn(&Size) + 'static) -> Subscription {
        self.projector.on_size_changed(callback)
    }

    // -- Structural operations, delegated to the projector ------------------

    /// See [`TreeProjector::set_root`].
    pub async fn set_root(&self, root: Option<N>) -> Result<(), TreeError> {
        self.projector.set_root(root).await
    }

    /// See [`TreeProjector::expand`].
    pub async fn expand_node(&self, node: &N) -> Result<(), TreeError> {
        self.projector.expand(node).await
    }

    /// See [`TreeProjector::collapse`].
    pub async fn collapse_node(&self, node: &N) -> Result<(), TreeError> {
        self.projector.collapse(node).await
    }

    /// See [`TreeProjector::refresh_children`].
    pub async fn refresh_node(&self, node: &N) -> Result<(), TreeError> {
        self.projector.refresh_children(node).await
    }

    /// See [`TreeProjector::reveal`].
    pub async fn reveal_node(&self, node: &N) -> Result<(), TreeError> {
        self.projector.reveal(node).await
    }

    /// See [`TreeProjector::update_all`].
    pub async fn update_all(&self) -> Result<(), TreeError> {
        self.projector.update_all().await
    }
}
