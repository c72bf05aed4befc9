//! # wormtrack-stitch
//!
//! Entity-resolution layer over [`wormtrack_ingest`]: re-links tracks the
//! tracker spuriously broke into the continuous paths they really were.
//!
//! - **Candidate search**: [`candidates`] finds every admissible
//!   `(end, start)` pair inside a time/distance cone.
//!
//! - **Scoring**: [`scoring`] defines the [`GapScorer`] contract and a
//!   histogram-density implementation fitted from observed displacements.
//!
//! - **Consolidation**: [`segments`] reduces scored candidates to edges
//!   with strict fan-in/fan-out invariants and chains them into
//!   [`Segment`]s.
//!
//! - **Read-back**: [`reader`] streams a chain as one continuous trace,
//!   synthesizing placeholder lines across small gaps.
//!
//! - **Pipeline**: [`pipeline::TrackStitcher`] drives the whole sequence
//!   under a [`StitchConfig`].

pub mod candidates;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod reader;
pub mod scoring;
pub mod segments;

pub use candidates::{find_candidates, CandidateTable, ConeParams, GapCandidate, Terminus};
pub use config::StitchConfig;
pub use error::{ConfigError, StitchError, StitchResult};
pub use pipeline::TrackStitcher;
pub use reader::{ChainLines, MultiEntityReader};
pub use scoring::{absolute_displacement, DisplacementScorer, GapScorer};
pub use segments::{
    join_segments, partition_segments, ScoredCandidate, ScoredTable, Segment,
    SegmentGraphBuilder, SegmentSet,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
