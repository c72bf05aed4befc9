//! Error types for the wormtrack-ingest crate.
//!
//! This module is the single source of truth for every error the ingest
//! layer can produce. Each subsystem has its own enum and the crate-level
//! [`IngestError`] aggregates them via [`From`].
//!
//! ## Hierarchy
//!
//! ```text
//! IngestError (top-level)
//! ├── DiscoveryError   (locating the summary and blob data files)
//! ├── SummaryError     (structural problems in the event log)
//! ├── RecordError      (per-entity trace retrieval and parsing)
//! ├── OutlineError     (contour decoding)
//! └── GraphError       (lineage graph edits, re-exported from core)
//! ```
//!
//! Every variant carries enough context (line number, entity id, file path)
//! to locate the offending input without re-scanning it. None of these are
//! transient: they signal data-integrity problems, not resource contention,
//! and retrying the same call cannot succeed.

use std::path::PathBuf;

use thiserror::Error;
use wormtrack_core::{EntityId, GraphError};

/// Convenient `Result` alias used throughout the ingest crate.
pub type IngestResult<T> = Result<T, IngestError>;

// ---------------------------------------------------------------------------
// IngestError — top-level aggregator
// ---------------------------------------------------------------------------

/// Top-level error type for summary parsing, discovery, and trace access.
#[derive(Debug, Error)]
pub enum IngestError {
    /// A file-discovery error.
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// A structural error in the summary event log.
    #[error("summary error: {0}")]
    Summary(#[from] SummaryError),

    /// An error retrieving or parsing one entity's trace.
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// An error decoding a bit-packed contour.
    #[error("outline error: {0}")]
    Outline(#[from] OutlineError),

    /// A lineage-graph edit was rejected.
    #[error("lineage graph error: {0}")]
    Graph(#[from] GraphError),

    /// The entity id is not present in the (filtered) summary index.
    #[error("entity {id} is not in the summary index")]
    UnknownEntity {
        /// The id that was requested.
        id: EntityId,
    },

    /// An accessor was called before `load_summary()`.
    #[error("summary not loaded; call load_summary() first")]
    SummaryNotLoaded,
}

// ---------------------------------------------------------------------------
// DiscoveryError
// ---------------------------------------------------------------------------

/// Errors while locating the experiment's files on disk.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// No `*.summary` file exists in the experiment directory.
    #[error("no summary file found in `{dir}`")]
    SummaryNotFound {
        /// Directory that was searched.
        dir: PathBuf,
    },

    /// More than one `*.summary` file exists; the layout is ambiguous.
    #[error("{count} summary files found in `{dir}`; expected exactly one")]
    AmbiguousSummary {
        /// Directory that was searched.
        dir: PathBuf,
        /// Number of summary files found.
        count: usize,
    },

    /// The numbered blob data files are not consecutive from zero.
    #[error("experiment data missing a consecutive blobs file (`{expected}`)")]
    MissingDataFile {
        /// File name that was expected but not found.
        expected: String,
    },

    /// The summary references more blob files than exist on disk.
    #[error("summary refers to missing blobs files ({found} out of {referenced} found)")]
    DataFileCount {
        /// Highest file count the summary references.
        referenced: usize,
        /// Number of blob files actually present.
        found: usize,
    },

    /// A directory listing failed.
    #[error("cannot read directory `{dir}`: {source}")]
    DirRead {
        /// Directory being listed.
        dir: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// SummaryError
// ---------------------------------------------------------------------------

/// Structural errors in the summary event log. All abort the parse; the
/// caller gets no partial results.
#[derive(Debug, Error)]
pub enum SummaryError {
    /// A line's frame number differs from its 1-based ordinal.
    #[error("summary line {line} has unexpected frame number {frame}")]
    FrameSequence {
        /// 1-based line number.
        line: usize,
        /// Frame number the line claimed.
        frame: u32,
    },

    /// A line could not be tokenized as expected.
    #[error("malformed summary line {line}: {reason}")]
    MalformedLine {
        /// 1-based line number.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// The summary produced no entities at all.
    #[error("summary file contains no entities")]
    NoEntities,

    /// Entities exist but none has a blob file offset, so no trace can be
    /// retrieved. Usually means the blob files were lost or never written.
    #[error("no entity in the summary has a retrievable trace (no offsets recorded)")]
    NoRetrievableData,

    /// A low-level read of the summary file failed.
    #[error("I/O error reading summary `{path}`: {source}")]
    Io {
        /// The summary file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl SummaryError {
    /// Construct a [`SummaryError::MalformedLine`].
    pub fn malformed<S: Into<String>>(line: usize, reason: S) -> Self {
        SummaryError::MalformedLine {
            line,
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordError
// ---------------------------------------------------------------------------

/// Errors retrieving or parsing one entity's per-frame trace. During lazy
/// iteration these abort only the entity in question; the iteration itself
/// continues.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The bytes at the recorded offset do not start with this entity's
    /// header line. The summary and blob files disagree — data corruption.
    #[error("file number/offset ({file_no}/{offset}) for entity {id} was incorrect")]
    OffsetMismatch {
        /// Entity whose trace was requested.
        id: EntityId,
        /// Blob file number from the summary.
        file_no: u16,
        /// Byte offset from the summary.
        offset: u64,
    },

    /// A trace line could not be parsed.
    #[error("malformed record line {line}: {reason}")]
    Malformed {
        /// 1-based line ordinal within the entity's trace.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// The trace contained no data lines.
    #[error("entity {id} has an empty trace")]
    Empty {
        /// The entity in question.
        id: EntityId,
    },

    /// A low-level read of a blob data file failed.
    #[error("I/O error reading trace of entity {id}: {source}")]
    Io {
        /// Entity whose trace was being read.
        id: EntityId,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl RecordError {
    /// Construct a [`RecordError::Malformed`].
    pub fn malformed<S: Into<String>>(line: usize, reason: S) -> Self {
        RecordError::Malformed {
            line,
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// OutlineError
// ---------------------------------------------------------------------------

/// Errors decoding a bit-packed contour string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OutlineError {
    /// A character falls outside the 6-bit encoding alphabet.
    #[error("character `{character}` is not in the outline encoding range")]
    InvalidCharacter {
        /// The offending character.
        character: char,
    },

    /// The declared point count is zero or negative.
    #[error("outline has a declared length of {declared}; nothing to decode")]
    EmptyOutline {
        /// The declared point count.
        declared: i32,
    },

    /// The encoded string ran out before yielding the declared point count.
    #[error("encoded outline ended after {decoded} of {expected} points")]
    Truncated {
        /// Points the header promised.
        expected: i32,
        /// Points actually decoded.
        decoded: i32,
    },
}
