//! # wormtrack-ingest
//!
//! Ingestion layer for multi-organism tracker output: a `.summary` event
//! log describing, frame by frame, which tracked entities were born, died,
//! split, or merged, plus numbered `.blobs` companion files holding each
//! entity's full per-frame trace at recorded byte offsets.
//!
//! - **Discovery + parsing**: [`summary`] locates and streams the event
//!   log into the entity index, the frame-time table, and the lineage
//!   graph.
//!
//! - **Random access**: [`store::TraceStore`] owns the file set and serves
//!   per-entity traces by seeking to the indexed offset, plus lazy,
//!   filtered iteration over every entity.
//!
//! - **Record decoding**: [`record`] parses one entity's raw lines into
//!   typed per-frame arrays; [`outline`] unpacks the bit-packed contour
//!   encoding.
//!
//! - **Filters**: [`filters`] provides the stock summary- and record-level
//!   predicates.
//!
//! - **Images**: [`images`] indexes the experiment's snapshot images by
//!   capture time.
//!
//! Errors are fail-fast and carry the offending line, entity id, or path;
//! see [`error`] for the full taxonomy.

pub mod error;
pub mod filters;
pub mod images;
pub mod outline;
pub mod record;
pub mod store;
pub mod summary;

pub use error::{
    DiscoveryError, IngestError, IngestResult, OutlineError, RecordError, SummaryError,
};
pub use images::ImageIndex;
pub use outline::decode_outline;
pub use record::{parse_record, BlobRecord, ContourData};
pub use store::{RawTrace, Records, TraceStore};
pub use summary::{find_summary, parse_summary, SummaryData};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
