//! # wormtrack-core
//!
//! Shared building blocks for the wormtrack crates:
//!
//! - **Identifiers and rows**: [`EntityId`], the [`NO_ENTITY`] sentinel, and
//!   the [`EntitySummary`] index row describing where one tracked entity's
//!   trace lives and when it was alive.
//!
//! - **Frame-time table**: [`FrameTimes`], the dense 1-based mapping from
//!   frame number to wall-clock seconds built while parsing the event log.
//!
//! - **Lineage graph**: [`LineageGraph`], the directed fission/fusion graph
//!   over entity ids. The graph is frozen once built; consumers that need to
//!   edit it take an explicit deep copy via [`LineageGraph::unlock`].
//!
//! ## Example
//!
//! ```rust
//! use wormtrack_core::LineageGraph;
//!
//! let mut graph = LineageGraph::new();
//! graph.add_edge(10, 11).unwrap();
//! graph.freeze();
//!
//! // The frozen graph rejects edits; an unlocked copy accepts them.
//! assert!(graph.add_edge(11, 12).is_err());
//! let mut copy = graph.unlock();
//! copy.add_edge(11, 12).unwrap();
//! assert_eq!(graph.edge_count(), 1);
//! assert_eq!(copy.edge_count(), 2);
//! ```

pub mod error;
pub mod graph;
pub mod types;

pub use error::GraphError;
pub use graph::LineageGraph;
pub use types::{EntityId, EntitySummary, FrameTimes, NO_ENTITY};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
