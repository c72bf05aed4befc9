//! Error types for the wormtrack-core crate.

use thiserror::Error;

/// Errors produced by [`LineageGraph`](crate::graph::LineageGraph) edits.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The graph has been frozen and no longer accepts edits.
    ///
    /// Take a deep copy with [`unlock`](crate::graph::LineageGraph::unlock)
    /// to obtain an editable graph.
    #[error("lineage graph is frozen; unlock() a copy to edit it")]
    Frozen,

    /// Entity id `0` is the "no entity" sentinel and is never a real node.
    #[error("entity id 0 is the no-entity sentinel and cannot be a graph node")]
    SentinelNode,
}
