//! Error types for the wormtrack-stitch crate.
//!
//! ## Hierarchy
//!
//! ```text
//! StitchError (top-level)
//! ├── ConfigError      (configuration validation / file loading)
//! ├── IngestError      (propagated from the ingest layer)
//! ├── scorer domain    (OutOfDomain, InsufficientTraces)
//! ├── graph invariants (MultipleParents, MultipleChildren, CyclicSegment,
//! │                     ForeignNode, PartitionMismatch)
//! └── chain errors     (NonConsecutiveChain, UnknownFrame)
//! ```
//!
//! Like the ingest layer, nothing here is transient: every error is a
//! data- or invariant-integrity problem and retrying cannot succeed.

use std::path::PathBuf;

use thiserror::Error;
use wormtrack_core::EntityId;
use wormtrack_ingest::IngestError;

/// Convenient `Result` alias used throughout the stitch crate.
pub type StitchResult<T> = Result<T, StitchError>;

// ---------------------------------------------------------------------------
// StitchError — top-level aggregator
// ---------------------------------------------------------------------------

/// Top-level error type for candidate matching, scoring, and segment
/// consolidation.
#[derive(Debug, Error)]
pub enum StitchError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An error from the underlying trace store.
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// A scorer was queried outside the range it was trained on.
    #[error(
        "scorer query (frame gap {frame_gap}, distance {distance_gap}) is outside \
         the trained domain (gaps {gap_domain:?}, distances {distance_domain:?})"
    )]
    OutOfDomain {
        /// Queried frame gap.
        frame_gap: f64,
        /// Queried distance gap.
        distance_gap: f64,
        /// Trained frame-gap domain.
        gap_domain: (f64, f64),
        /// Trained distance domain.
        distance_domain: (f64, f64),
    },

    /// A scorer cannot be fitted from fewer than two displacement traces.
    #[error("cannot fit a scorer from {count} displacement trace(s); need at least 2")]
    InsufficientTraces {
        /// Number of traces supplied.
        count: usize,
    },

    /// A node appears as the child of more than one edge.
    #[error("entity {id} has more than one parent edge")]
    MultipleParents {
        /// The over-parented node.
        id: EntityId,
    },

    /// A node appears as the parent of more than one edge.
    #[error("entity {id} has more than one child edge")]
    MultipleChildren {
        /// The over-childed node.
        id: EntityId,
    },

    /// The surviving edges contain a cycle, so no chain head exists.
    #[error("segment edges form a cycle through entity {id}")]
    CyclicSegment {
        /// A node on the cycle.
        id: EntityId,
    },

    /// An edge endpoint is not in the supplied node set.
    #[error("edge endpoint {id} is not in the entity set being partitioned")]
    ForeignNode {
        /// The unknown endpoint.
        id: EntityId,
    },

    /// Patched and unpatched segments failed to exactly partition the
    /// input ids — an internal invariant violation, reported rather than
    /// papered over.
    #[error("segment partition lost {missing} entity id(s)")]
    PartitionMismatch {
        /// Ids in neither partition.
        missing: usize,
    },

    /// Consecutive chain members overlap or run backwards in time.
    #[error(
        "entities {prev_id} (ends frame {end_frame}) and {next_id} (starts frame \
         {start_frame}) overlap or are not consecutive"
    )]
    NonConsecutiveChain {
        /// Earlier chain member.
        prev_id: EntityId,
        /// Last frame of the earlier member.
        end_frame: u32,
        /// Later chain member.
        next_id: EntityId,
        /// First frame of the later member.
        start_frame: u32,
    },

    /// A synthesized gap frame has no entry in the frame-time table.
    #[error("frame {frame} has no recorded wall-clock time")]
    UnknownFrame {
        /// The frame without a time.
        frame: u32,
    },

    /// A pipeline stage was invoked before the stage it depends on.
    #[error("pipeline stage order violated: {message}")]
    StageOrder {
        /// Which prerequisite is missing.
        message: String,
    },
}

impl StitchError {
    /// Construct a [`StitchError::StageOrder`].
    pub fn stage_order<S: Into<String>>(message: S) -> Self {
        StitchError::StageOrder {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors produced when loading or validating a
/// [`StitchConfig`](crate::config::StitchConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field has an invalid value.
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// A configuration file could not be read from disk.
    #[error("cannot read config file `{path}`: {source}")]
    FileRead {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file contains malformed JSON.
    #[error("cannot parse config file `{path}`: {source}")]
    ParseError {
        /// Path that was being parsed.
        path: PathBuf,
        /// Underlying JSON parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Construct a [`ConfigError::InvalidValue`].
    pub fn invalid_value<S: Into<String>>(field: &'static str, reason: S) -> Self {
        ConfigError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}
