#![forbid(unsafe_code)]

//! Lazy tree-to-flat-row projection for virtualized grid rendering.
//!
//! `treerow` maintains an index-addressable, ordered list of visible
//! rows over an arbitrary, externally-mutable tree, materializing data
//! only for expanded subtrees. It is the headless core a grid widget
//! sits on top of: the widget asks for rows by position and re-reads
//! visible ranges whenever a size-change notification fires.
//!
//! # Architecture
//!
//! - [`TaskQueue`] — single-flight sequential runner; every structural
//!   mutation executes as exactly one queued task, so overlapping async
//!   child fetches can never interleave partial splices.
//! - [`NodeInspector`] / [`InspectorFactory`] — backend interface:
//!   children access, parent resolution, change notification.
//! - [`RowMap`] / [`RowRecord`] — the visible-row list, the node index,
//!   and the O(1) position index remapped after each committed change.
//! - [`TreeProjector`] — expand / collapse / refresh / reveal
//!   algorithms.
//! - [`TreeDataSource`] — the facade a grid widget consumes.
//! - [`MemoryTree`] — reference in-memory backend.
//!
//! The engine is single-threaded and `!Send`: drive it from a
//! current-thread runtime inside a [`LocalSet`](tokio::task::LocalSet)
//! (required for backend change notifications to schedule refreshes).
//!
//! # Example
//!
//! ```
//! use treerow::{MemoryTree, TreeDataSource, TreeProjector};
//!
//! let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! let local = tokio::task::LocalSet::new();
//! local.block_on(&rt, async {
//!     let tree = MemoryTree::new();
//!     tree.insert(None, "connections", true);
//!     tree.insert(Some("connections"), "server-a", true);
//!     tree.insert(Some("server-a"), "db-1", false);
//!     tree.insert(Some("connections"), "server-b", false);
//!
//!     let source = TreeDataSource::new(TreeProjector::with_inspector(tree));
//!     source.set_root(Some("connections".to_string())).await.unwrap();
//!     assert_eq!(source.size().rows, 2);
//!
//!     source.expand_node(&"server-a".to_string()).await.unwrap();
//!     assert_eq!(source.size().rows, 3);
//!     assert_eq!(source.model_for_position(1), Some("db-1".to_string()));
//! });
//! ```

pub mod error;
pub mod inspector;
pub mod memory;
pub mod notify;
pub mod projector;
pub mod queue;
pub mod row;
pub mod source;

pub use error::{InspectorError, TreeError};
pub use inspector::{
    ChildChangeFn, ChildrenFuture, InspectorFactory, NodeInspector, ParentFuture, TreeNode,
    UniformInspectors, WatchGuard,
};
pub use memory::MemoryTree;
pub use notify::{Emitter, Subscription};
pub use projector::TreeProjector;
pub use queue::TaskQueue;
pub use row::{RowMap, RowRecord};
pub use source::{ExpandState, NodeState, Size, TreeDataSource};
