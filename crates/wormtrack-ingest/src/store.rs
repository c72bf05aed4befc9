//! Random-access store over one experiment directory.
//!
//! A [`TraceStore`] owns the discovered file set (the summary, the numbered
//! blob data files, the optional images) and, once the summary is loaded,
//! the entity index built from it. Traces are never cached: every access
//! reopens the indicated blob file, seeks to the recorded offset, and
//! streams that entity's lines, so iteration over a multi-gigabyte
//! experiment holds at most one entity in memory at a time.
//!
//! ## Two-tier filtering
//!
//! Summary filters run against index rows at load time, before any trace
//! bytes are touched — cheap, and they shrink everything downstream. Record
//! filters run against fully parsed records during iteration — expensive,
//! but they can see per-frame data. Register both before
//! [`load_summary`](TraceStore::load_summary).

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use wormtrack_core::{EntityId, EntitySummary, FrameTimes, LineageGraph};

use crate::error::{DiscoveryError, IngestError, IngestResult, RecordError};
use crate::images::{find_images, ImageIndex};
use crate::record::{parse_record, BlobRecord};
use crate::summary::{find_summary, parse_summary};

/// Predicate over index rows, applied at load time.
pub type SummaryFilter = Box<dyn Fn(&EntitySummary) -> bool + Send + Sync>;

/// Predicate over parsed records, applied during iteration.
pub type RecordFilter = Box<dyn Fn(&BlobRecord) -> bool + Send + Sync>;

// ---------------------------------------------------------------------------
// TraceStore
// ---------------------------------------------------------------------------

/// Access to one experiment's summary index and blob trace data.
pub struct TraceStore {
    directory: PathBuf,
    summary_path: PathBuf,
    basename: String,
    blob_files: Vec<PathBuf>,
    images: ImageIndex,
    summary_filters: Vec<SummaryFilter>,
    record_filters: Vec<RecordFilter>,
    loaded: Option<Loaded>,
}

/// Everything that exists only after `load_summary()`.
struct Loaded {
    /// Filtered index rows, ascending by id.
    index: Vec<EntitySummary>,
    /// id -> row position in `index`.
    row_of: HashMap<EntityId, usize>,
    frame_times: FrameTimes,
    lineage: LineageGraph,
}

impl TraceStore {
    /// Discover the experiment files in `directory`.
    ///
    /// Locates the single `*.summary` file, the strictly consecutive
    /// `{basename}_{NNNNN}k.blobs` set, and any `{basename}{ms}.png`
    /// images. No parsing happens yet.
    ///
    /// # Errors
    ///
    /// [`DiscoveryError`] variants for a missing or ambiguous summary and
    /// for gaps in the blob file numbering.
    pub fn open(directory: impl Into<PathBuf>) -> IngestResult<Self> {
        let directory = directory.into();
        let (summary_path, basename) = find_summary(&directory)?;
        let blob_files = find_blob_files(&directory, &basename)?;
        let images = find_images(&directory, &basename)?;

        info!(
            dir = %directory.display(),
            basename = %basename,
            blob_files = blob_files.len(),
            images = images.len(),
            "experiment discovered"
        );

        Ok(Self {
            directory,
            summary_path,
            basename,
            blob_files,
            images,
            summary_filters: Vec::new(),
            record_filters: Vec::new(),
            loaded: None,
        })
    }

    /// Register a summary-level filter. Takes effect at `load_summary()`.
    pub fn add_summary_filter<F>(&mut self, filter: F)
    where
        F: Fn(&EntitySummary) -> bool + Send + Sync + 'static,
    {
        self.summary_filters.push(Box::new(filter));
    }

    /// Register a record-level filter, applied by [`good_records`](Self::good_records).
    pub fn add_record_filter<F>(&mut self, filter: F)
    where
        F: Fn(&BlobRecord) -> bool + Send + Sync + 'static,
    {
        self.record_filters.push(Box::new(filter));
    }

    /// Parse the summary and build the entity index.
    ///
    /// Verifies that every blob file the summary references actually
    /// exists, then applies the registered summary filters to the table.
    ///
    /// # Errors
    ///
    /// Any [`SummaryError`](crate::error::SummaryError) from the parse, or
    /// [`DiscoveryError::DataFileCount`] when the summary references more
    /// blob files than were found.
    pub fn load_summary(&mut self) -> IngestResult<()> {
        let data = parse_summary(&self.summary_path)?;

        let referenced = data
            .table
            .iter()
            .map(|e| e.file_no as usize + 1)
            .max()
            .unwrap_or(0);
        if referenced > self.blob_files.len() {
            return Err(DiscoveryError::DataFileCount {
                referenced,
                found: self.blob_files.len(),
            }
            .into());
        }

        let total = data.table.len();
        let index: Vec<EntitySummary> = data
            .table
            .into_iter()
            .filter(|row| self.summary_filters.iter().all(|f| f(row)))
            .collect();
        let row_of = index.iter().enumerate().map(|(i, e)| (e.id, i)).collect();

        info!(
            kept = index.len(),
            dropped = total - index.len(),
            "summary index loaded"
        );

        self.loaded = Some(Loaded {
            index,
            row_of,
            frame_times: data.frame_times,
            lineage: data.lineage,
        });
        Ok(())
    }

    // -----------------------------------------------------------------
    // Index accessors
    // -----------------------------------------------------------------

    /// Summary row for `id`. O(1).
    ///
    /// # Errors
    ///
    /// [`IngestError::UnknownEntity`] when `id` is absent from the
    /// (filtered) index.
    pub fn summary_for(&self, id: EntityId) -> IngestResult<&EntitySummary> {
        let loaded = self.loaded()?;
        let row = *loaded
            .row_of
            .get(&id)
            .ok_or(IngestError::UnknownEntity { id })?;
        Ok(&loaded.index[row])
    }

    /// Ids of entities alive on `frame`, ascending.
    pub fn ids_in_frame(&self, frame: u32) -> IngestResult<impl Iterator<Item = EntityId> + '_> {
        let loaded = self.loaded()?;
        Ok(loaded
            .index
            .iter()
            .filter(move |e| e.alive_at_frame(frame))
            .map(|e| e.id))
    }

    /// Number of entities in the (filtered) index.
    pub fn entity_count(&self) -> IngestResult<usize> {
        Ok(self.loaded()?.index.len())
    }

    /// Wall-clock time of every frame.
    pub fn frame_times(&self) -> IngestResult<&FrameTimes> {
        Ok(&self.loaded()?.frame_times)
    }

    /// The frozen lineage graph.
    pub fn lineage(&self) -> IngestResult<&LineageGraph> {
        Ok(&self.loaded()?.lineage)
    }

    /// Experiment basename shared by all data files.
    #[must_use]
    pub fn basename(&self) -> &str {
        &self.basename
    }

    /// Experiment directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The numbered blob data files, in order.
    #[must_use]
    pub fn blob_files(&self) -> &[PathBuf] {
        &self.blob_files
    }

    // -----------------------------------------------------------------
    // Trace access
    // -----------------------------------------------------------------

    /// Lazily stream the raw trace lines of entity `id`.
    ///
    /// Opens the blob file recorded in the index, seeks to the entity's
    /// byte offset, and checks that the bytes there really are this
    /// entity's `"% {id}"` header before yielding body lines up to the
    /// next header or EOF.
    ///
    /// # Errors
    ///
    /// [`RecordError::OffsetMismatch`] when the header check fails — the
    /// summary and the blob file disagree, which signals corruption.
    pub fn trace_for(&self, id: EntityId) -> IngestResult<RawTrace> {
        let row = self.summary_for(id)?;
        let path = self.blob_files.get(row.file_no as usize).ok_or({
            // load_summary() verified the file count; reaching this means
            // the index was built against a different file set.
            DiscoveryError::DataFileCount {
                referenced: row.file_no as usize + 1,
                found: self.blob_files.len(),
            }
        })?;

        let io_err = |source| RecordError::Io { id, source };
        let mut file = File::open(path).map_err(io_err)?;
        file.seek(SeekFrom::Start(row.offset)).map_err(io_err)?;
        let mut lines = BufReader::new(file).lines();

        let header = lines.next().transpose().map_err(io_err)?.unwrap_or_default();
        if header.trim_end() != format!("% {id}") {
            return Err(RecordError::OffsetMismatch {
                id,
                file_no: row.file_no,
                offset: row.offset,
            }
            .into());
        }

        Ok(RawTrace {
            id,
            lines,
            done: false,
        })
    }

    /// Parse entity `id`'s trace into a [`BlobRecord`].
    ///
    /// # Errors
    ///
    /// Everything [`trace_for`](Self::trace_for) can produce, any
    /// [`RecordError::Malformed`] from the line parser, and
    /// [`RecordError::Empty`] when the trace has no data lines.
    pub fn parse_record(&self, id: EntityId) -> IngestResult<BlobRecord> {
        let record = parse_record(self.trace_for(id)?)?;
        if record.is_empty() {
            return Err(RecordError::Empty { id }.into());
        }
        Ok(record)
    }

    /// Lazily parse every entity in the index, in ascending-id order.
    ///
    /// Each item is yielded as soon as it is parsed and nothing is
    /// retained; a per-entity failure is yielded as an `Err` item so the
    /// caller can skip it and keep iterating. Restartable: each call
    /// produces a fresh pass.
    pub fn records(&self) -> IngestResult<Records<'_>> {
        let loaded = self.loaded()?;
        Ok(Records {
            store: self,
            rows: loaded.index.iter(),
            filtered: false,
            parsed: 0,
        })
    }

    /// Like [`records`](Self::records), but entities failing any
    /// registered record filter are silently skipped.
    pub fn good_records(&self) -> IngestResult<Records<'_>> {
        let mut records = self.records()?;
        records.filtered = true;
        Ok(records)
    }

    // -----------------------------------------------------------------
    // Images
    // -----------------------------------------------------------------

    /// The image index discovered at open time.
    #[must_use]
    pub fn images(&self) -> &ImageIndex {
        &self.images
    }

    /// The image nearest to `frame`, via the frame-time table.
    ///
    /// `Ok(None)` when the frame is outside the recording or no images
    /// exist.
    pub fn nearest_image_to_frame(&self, frame: u32) -> IngestResult<Option<(&Path, f64)>> {
        let Some(time) = self.frame_times()?.get(frame) else {
            return Ok(None);
        };
        Ok(self.images.nearest(time))
    }

    /// Images spanning the frame range `[first, last]`.
    pub fn images_spanning_frames(&self, first: u32, last: u32) -> IngestResult<Vec<&Path>> {
        let frame_times = self.frame_times()?;
        let (Some(t0), Some(t1)) = (frame_times.get(first), frame_times.get(last)) else {
            return Ok(Vec::new());
        };
        Ok(self.images.spanning(t0, t1))
    }

    fn loaded(&self) -> IngestResult<&Loaded> {
        self.loaded.as_ref().ok_or(IngestError::SummaryNotLoaded)
    }
}

// ---------------------------------------------------------------------------
// RawTrace
// ---------------------------------------------------------------------------

/// Lazy line stream over one entity's trace. Ends at the next `%` header
/// or EOF; dropping it mid-stream just closes the file handle.
pub struct RawTrace {
    id: EntityId,
    lines: Lines<BufReader<File>>,
    done: bool,
}

impl Iterator for RawTrace {
    type Item = IngestResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.lines.next() {
            None => {
                self.done = true;
                None
            }
            Some(Err(source)) => {
                self.done = true;
                Some(Err(RecordError::Io {
                    id: self.id,
                    source,
                }
                .into()))
            }
            Some(Ok(line)) => {
                if line.starts_with('%') {
                    self.done = true;
                    None
                } else {
                    Some(Ok(line))
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Single-pass lazy iterator over parsed entities in index order.
pub struct Records<'a> {
    store: &'a TraceStore,
    rows: std::slice::Iter<'a, EntitySummary>,
    filtered: bool,
    parsed: usize,
}

impl Records<'_> {
    /// Entities parsed so far, including ones a record filter dropped.
    #[must_use]
    pub fn parsed(&self) -> usize {
        self.parsed
    }
}

impl Iterator for Records<'_> {
    type Item = IngestResult<(EntityId, BlobRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let row = self.rows.next()?;
            self.parsed += 1;
            match self.store.parse_record(row.id) {
                Err(err) => return Some(Err(err)),
                Ok(record) => {
                    if self.filtered
                        && !self.store.record_filters.iter().all(|f| f(&record))
                    {
                        debug!(id = row.id, "record filtered out");
                        continue;
                    }
                    return Some(Ok((row.id, record)));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Blob file discovery
// ---------------------------------------------------------------------------

/// Expected file name of blob file `i`.
fn blob_file_name(basename: &str, i: usize) -> String {
    format!("{basename}_{i:05}k.blobs")
}

/// Find `{basename}_{NNNNN}k.blobs` files and verify they are strictly
/// consecutive from zero.
fn find_blob_files(dir: &Path, basename: &str) -> IngestResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|source| DiscoveryError::DirRead {
        dir: dir.to_path_buf(),
        source,
    })?;

    // `{basename}_` + exactly five digits + `k.blobs`.
    let prefix = format!("{basename}_");
    let matches = |name: &str| {
        name.strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix("k.blobs"))
            .is_some_and(|digits| digits.len() == 5 && digits.bytes().all(|b| b.is_ascii_digit()))
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.file_name().and_then(|n| n.to_str()).is_some_and(matches))
        .collect();
    files.sort();

    for (i, path) in files.iter().enumerate() {
        let expected = blob_file_name(basename, i);
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name != expected {
            return Err(DiscoveryError::MissingDataFile { expected }.into());
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_file_names_are_zero_padded() {
        assert_eq!(blob_file_name("exp", 0), "exp_00000k.blobs");
        assert_eq!(blob_file_name("exp", 12), "exp_00012k.blobs");
    }

    #[test]
    fn consecutive_blob_files_found_in_order() {
        let dir = tempfile::tempdir().unwrap();
        for i in [1usize, 0, 2] {
            std::fs::write(dir.path().join(blob_file_name("exp", i)), "").unwrap();
        }
        // A different basename must not be picked up.
        std::fs::write(dir.path().join("other_00000k.blobs"), "").unwrap();

        let files = find_blob_files(dir.path(), "exp").unwrap();
        assert_eq!(files.len(), 3);
        assert!(files[0].ends_with("exp_00000k.blobs"));
        assert!(files[2].ends_with("exp_00002k.blobs"));
    }

    #[test]
    fn gap_in_numbering_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(blob_file_name("exp", 0)), "").unwrap();
        std::fs::write(dir.path().join(blob_file_name("exp", 2)), "").unwrap();

        let err = find_blob_files(dir.path(), "exp").unwrap_err();
        assert!(
            matches!(
                err,
                IngestError::Discovery(DiscoveryError::MissingDataFile { ref expected })
                    if expected == "exp_00001k.blobs"
            ),
            "got: {err:?}"
        );
    }
}
