#![forbid(unsafe_code)]

//! Error taxonomy for projection operations.
//!
//! Nothing here is retried or swallowed: every failure surfaces to the
//! caller that submitted the operation. Backend fetch failures pass
//! through unchanged as [`TreeError::Inspector`].

use thiserror::Error;

/// Error type produced by [`NodeInspector`](crate::inspector::NodeInspector)
/// implementations. The engine treats it as opaque.
pub type InspectorError = Box<dyn std::error::Error>;

/// Failures of structural operations on the projection.
#[derive(Debug, Error)]
pub enum TreeError {
    /// The operation referenced a node that is not part of the current
    /// projection (absent from the node index, or unreachable from the
    /// root when resolving a reveal path).
    #[error("node {0} is not part of the current projection")]
    NodeNotFound(String),

    /// A root was assigned whose inspector reports it cannot have
    /// children. The projection is left empty.
    #[error("root node must be able to have children")]
    RootNotExpandable,

    /// A backend fetch failed. The queued operation that issued the
    /// fetch fails; the projection keeps its pre-operation state and
    /// the queue continues with the next task.
    #[error("inspector error: {0}")]
    Inspector(InspectorError),
}

impl TreeError {
    /// Wrap a backend error.
    pub fn inspector(err: impl Into<InspectorError>) -> Self {
        Self::Inspector(err.into())
    }

    /// Build a `NodeNotFound` from a node id.
    pub(crate) fn not_found(id: &impl std::fmt::Debug) -> Self {
        Self::NodeNotFound(format!("{id:?}"))
    }
}
