//! Reads a chain of entities back as one continuous trace.
//!
//! Downstream consumers expect a record's per-frame arrays to be
//! contiguous, so when a chain jumps from one entity's last frame to the
//! next entity's first frame with frames missing in between, this reader
//! synthesizes a placeholder ("void") line per skipped frame. Void lines
//! carry the real wall-clock time for their frame from the frame-time
//! table and `-1`/`0` sentinels everywhere else, mirroring what the
//! tracker itself writes for unresolvable frames.

use std::collections::VecDeque;

use tracing::debug;
use wormtrack_core::EntityId;
use wormtrack_ingest::record::BlobRecord;
use wormtrack_ingest::store::{RawTrace, TraceStore};
use wormtrack_ingest::{parse_record, IngestResult, RecordError};

use crate::error::{StitchError, StitchResult};
use crate::segments::Segment;

// ---------------------------------------------------------------------------
// MultiEntityReader
// ---------------------------------------------------------------------------

/// Stitches the traces of a [`Segment`]'s members into one line stream.
pub struct MultiEntityReader<'s> {
    store: &'s TraceStore,
}

impl<'s> MultiEntityReader<'s> {
    /// Create a reader over `store`.
    #[must_use]
    pub fn new(store: &'s TraceStore) -> Self {
        Self { store }
    }

    /// Lazily stream the chain's raw lines, gap frames included.
    ///
    /// # Errors
    ///
    /// Fails immediately when the store has no summary loaded. Chain-order
    /// violations surface as [`StitchError::NonConsecutiveChain`] items
    /// during iteration, at the member where they are discovered.
    pub fn lines(&self, segment: &Segment) -> StitchResult<ChainLines<'s>> {
        self.store.frame_times()?;
        Ok(ChainLines {
            store: self.store,
            pending: segment.ids().iter().copied().collect(),
            current: None,
            current_id: 0,
            held_first: None,
            last: None,
            void_frames: VecDeque::new(),
        })
    }

    /// Parse the whole chain into a single [`BlobRecord`].
    ///
    /// # Errors
    ///
    /// Everything [`lines`](Self::lines) can yield, plus any record-parse
    /// error on the stitched stream.
    pub fn parse(&self, segment: &Segment) -> StitchResult<BlobRecord> {
        let mut chain_error: Option<StitchError> = None;
        let adapter = CaptureChainError {
            inner: self.lines(segment)?,
            slot: &mut chain_error,
        };
        let record = parse_record(adapter);
        if let Some(err) = chain_error {
            return Err(err);
        }
        Ok(record?)
    }
}

/// Feeds [`ChainLines`] into the record parser. Ingest-level errors pass
/// through; chain-level errors stop the stream and are stashed so the
/// caller gets them back untyped-erased.
struct CaptureChainError<'a, 's> {
    inner: ChainLines<'s>,
    slot: &'a mut Option<StitchError>,
}

impl Iterator for CaptureChainError<'_, '_> {
    type Item = IngestResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next()? {
            Ok(line) => Some(Ok(line)),
            Err(StitchError::Ingest(err)) => Some(Err(err)),
            Err(other) => {
                *self.slot = Some(other);
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ChainLines
// ---------------------------------------------------------------------------

/// Lazy line stream over a chain of entities.
pub struct ChainLines<'s> {
    store: &'s TraceStore,
    pending: VecDeque<EntityId>,
    current: Option<RawTrace>,
    current_id: EntityId,
    /// First line of a freshly opened member, held back while the gap
    /// frames before it drain out.
    held_first: Option<String>,
    /// `(id, frame)` of the last real line yielded or held.
    last: Option<(EntityId, u32)>,
    /// Gap frames still owed before `held_first`.
    void_frames: VecDeque<u32>,
}

impl ChainLines<'_> {
    /// Placeholder line for a frame no chain member covered.
    ///
    /// The irregular spacing matches the tracker's own output.
    fn void_line(&self, frame: u32) -> StitchResult<String> {
        let time = self
            .store
            .frame_times()?
            .get(frame)
            .ok_or(StitchError::UnknownFrame { frame })?;
        Ok(format!("{frame} {time}  -1 -1  -1  0 0  0  -1 -1"))
    }

    /// First whitespace-separated token of a trace line, as a frame number.
    fn frame_of(line: &str) -> StitchResult<u32> {
        line.split_whitespace()
            .next()
            .and_then(|token| token.parse().ok())
            .ok_or_else(|| {
                StitchError::Ingest(
                    RecordError::malformed(1, format!("cannot read frame number from `{line}`"))
                        .into(),
                )
            })
    }

    /// Open the next member: verify chain order against the previous
    /// member's final frame and queue any gap frames.
    fn open_member(&mut self, id: EntityId) -> StitchResult<()> {
        let mut trace = self.store.trace_for(id)?;
        let first_line = match trace.next() {
            Some(line) => line?,
            None => return Err(StitchError::Ingest(RecordError::Empty { id }.into())),
        };
        let first_frame = Self::frame_of(&first_line)?;

        if let Some((prev_id, end_frame)) = self.last {
            if first_frame <= end_frame {
                return Err(StitchError::NonConsecutiveChain {
                    prev_id,
                    end_frame,
                    next_id: id,
                    start_frame: first_frame,
                });
            }
            if first_frame > end_frame + 1 {
                debug!(
                    prev = prev_id,
                    next = id,
                    gap = first_frame - end_frame - 1,
                    "synthesizing void frames"
                );
                self.void_frames.extend(end_frame + 1..first_frame);
            }
        }

        self.current = Some(trace);
        self.current_id = id;
        self.held_first = Some(first_line);
        self.last = Some((id, first_frame));
        Ok(())
    }
}

impl Iterator for ChainLines<'_> {
    type Item = StitchResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            // Owed gap frames go out first.
            if let Some(frame) = self.void_frames.pop_front() {
                return Some(self.void_line(frame));
            }
            if let Some(line) = self.held_first.take() {
                return Some(Ok(line));
            }

            // Continue the current member.
            if let Some(trace) = &mut self.current {
                match trace.next() {
                    Some(Ok(line)) => {
                        match Self::frame_of(&line) {
                            Ok(frame) => self.last = Some((self.current_id, frame)),
                            Err(err) => return Some(Err(err)),
                        }
                        return Some(Ok(line));
                    }
                    Some(Err(err)) => return Some(Err(err.into())),
                    None => self.current = None,
                }
                continue;
            }

            // Open the next member, if any.
            let id = self.pending.pop_front()?;
            if let Err(err) = self.open_member(id) {
                return Some(Err(err));
            }
        }
    }
}
