//! End-to-end stitching pipeline over one experiment.
//!
//! Orchestrates the full sequence: load and filter the experiment's
//! entities, condense each surviving track to its termini and a
//! displacement trace, fit the scorer, search the admissibility cone,
//! score every candidate join, consolidate the winners into segments, and
//! read the result back as contiguous records.
//!
//! Per update step:
//! 1. [`load`](TrackStitcher::load) — parse, filter, condense, fit scorer
//! 2. [`find_candidates`](TrackStitcher::find_candidates) — cone search
//! 3. [`score_candidates`](TrackStitcher::score_candidates) — plausibility
//! 4. [`judge`](TrackStitcher::judge) — select edges, build segments
//!
//! or [`run`](TrackStitcher::run) to do all four.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};
use wormtrack_core::EntityId;
use wormtrack_ingest::record::BlobRecord;
use wormtrack_ingest::{filters, TraceStore};

use crate::candidates::{find_candidates, CandidateTable, Terminus};
use crate::config::StitchConfig;
use crate::error::{StitchError, StitchResult};
use crate::reader::MultiEntityReader;
use crate::scoring::{absolute_displacement, DisplacementScorer, GapScorer};
use crate::segments::{ScoredCandidate, ScoredTable, SegmentGraphBuilder, SegmentSet};

// ---------------------------------------------------------------------------
// CondensedTracks
// ---------------------------------------------------------------------------

/// The only statistics the matcher and scorer need from each track: where
/// and when it was lost and found, and its displacement over the horizon.
#[derive(Default)]
struct CondensedTracks {
    starts: Vec<Terminus>,
    ends: Vec<Terminus>,
    ids: BTreeSet<EntityId>,
    displacements: Vec<Vec<f64>>,
}

impl CondensedTracks {
    fn push(&mut self, id: EntityId, record: &BlobRecord, horizon_frames: usize) {
        let (Some(born_frame), Some(died_frame)) = (record.first_frame(), record.last_frame())
        else {
            return;
        };

        self.starts.push(Terminus {
            id,
            loc: record.centroids[0],
            frame: born_frame,
        });
        self.ends.push(Terminus {
            id,
            loc: record.centroids[record.len() - 1],
            frame: died_frame,
        });
        let window = &record.centroids[..record.len().min(horizon_frames)];
        self.displacements.push(absolute_displacement(window));
        self.ids.insert(id);
    }
}

// ---------------------------------------------------------------------------
// TrackStitcher
// ---------------------------------------------------------------------------

/// Re-links tracks the tracker spuriously broke.
pub struct TrackStitcher {
    store: TraceStore,
    config: StitchConfig,
    /// Where each surviving track was lost.
    ends: Vec<Terminus>,
    /// Where each surviving track was found.
    starts: Vec<Terminus>,
    /// Ids of every surviving track; the segment partition domain.
    loaded_ids: BTreeSet<EntityId>,
    scorer: Option<DisplacementScorer>,
    candidates: Option<CandidateTable>,
    scored: Option<ScoredTable>,
}

impl TrackStitcher {
    /// Wrap a freshly opened (not yet loaded) store.
    ///
    /// Registers the minimum-lifetime summary filter and the
    /// minimum-relative-move record filter from `config`.
    ///
    /// # Errors
    ///
    /// Any configuration validation failure.
    pub fn new(mut store: TraceStore, config: StitchConfig) -> StitchResult<Self> {
        config.validate()?;
        store.add_summary_filter(filters::lifetime_minimum(config.min_time));
        store.add_record_filter(filters::relative_move_minimum(config.min_move));
        Ok(Self {
            store,
            config,
            ends: Vec::new(),
            starts: Vec::new(),
            loaded_ids: BTreeSet::new(),
            scorer: None,
            candidates: None,
            scored: None,
        })
    }

    /// Parse and filter the experiment, condense every good track, and fit
    /// the displacement scorer.
    ///
    /// Entities whose trace fails to parse are skipped with a warning —
    /// one bad trace should not abort a whole plate.
    ///
    /// # Errors
    ///
    /// Load/parse errors from the store, or
    /// [`StitchError::InsufficientTraces`] when fewer than two tracks
    /// survive the filters.
    pub fn load(&mut self) -> StitchResult<()> {
        self.store.load_summary()?;

        let horizon_frames = self.config.horizon_frames();
        let mut condensed = CondensedTracks::default();
        for outcome in self.store.good_records()? {
            match outcome {
                Ok((id, record)) => condensed.push(id, &record, horizon_frames),
                Err(err) => warn!(%err, "skipping unreadable entity"),
            }
        }

        info!(
            tracks = condensed.ids.len(),
            "tracks condensed; fitting scorer"
        );
        self.scorer = Some(DisplacementScorer::fit(&condensed.displacements)?);
        self.starts = condensed.starts;
        self.ends = condensed.ends;
        self.loaded_ids = condensed.ids;
        Ok(())
    }

    /// Cone search between every track end and every later track start.
    ///
    /// # Errors
    ///
    /// [`StitchError::StageOrder`] before [`load`](Self::load).
    pub fn find_candidates(&mut self) -> StitchResult<&CandidateTable> {
        if self.scorer.is_none() {
            return Err(StitchError::stage_order("find_candidates() requires load()"));
        }
        let table = find_candidates(&self.ends, &self.starts, &self.config.cone);
        let pairs: usize = table.values().map(Vec::len).sum();
        info!(ends = table.len(), pairs, "admissible candidates found");
        self.candidates = Some(table);
        Ok(self.candidates.as_ref().expect("just set"))
    }

    /// Score every admissible candidate.
    ///
    /// Candidates the scorer rejects as out of its trained domain are
    /// dropped — the cone is deliberately more liberal than the fitted
    /// model, so rejections here are expected, not fatal.
    ///
    /// # Errors
    ///
    /// [`StitchError::StageOrder`] before
    /// [`find_candidates`](Self::find_candidates).
    pub fn score_candidates(&mut self) -> StitchResult<&ScoredTable> {
        let (Some(scorer), Some(candidates)) = (&self.scorer, &self.candidates) else {
            return Err(StitchError::stage_order(
                "score_candidates() requires find_candidates()",
            ));
        };

        let mut scored = ScoredTable::new();
        for (&end, group) in candidates {
            let mut row = Vec::with_capacity(group.len());
            for &candidate in group {
                match scorer.score(f64::from(candidate.frame_gap), candidate.distance_gap) {
                    Ok(score) => {
                        let entry = ScoredCandidate::new(candidate, score.log10());
                        debug!(
                            end,
                            start = entry.start,
                            frame_gap = entry.frame_gap,
                            distance_gap = entry.distance_gap,
                            log_score = entry.log_score,
                            "candidate scored"
                        );
                        row.push(entry);
                    }
                    Err(StitchError::OutOfDomain { .. }) => {
                        debug!(
                            end,
                            start = candidate.start,
                            "candidate outside scorer domain; dropped"
                        );
                    }
                    Err(other) => return Err(other),
                }
            }
            scored.insert(end, row);
        }

        self.scored = Some(scored);
        Ok(self.scored.as_ref().expect("just set"))
    }

    /// Select the winning joins and consolidate them into segments.
    ///
    /// # Errors
    ///
    /// [`StitchError::StageOrder`] before
    /// [`score_candidates`](Self::score_candidates), or any consolidation
    /// invariant violation.
    pub fn judge(&self) -> StitchResult<SegmentSet> {
        let Some(scored) = &self.scored else {
            return Err(StitchError::stage_order("judge() requires score_candidates()"));
        };
        SegmentGraphBuilder::new(self.config.log_threshold).build(scored, &self.loaded_ids)
    }

    /// The whole pipeline in one call.
    ///
    /// # Errors
    ///
    /// Anything the individual stages produce.
    pub fn run(&mut self) -> StitchResult<SegmentSet> {
        self.load()?;
        self.find_candidates()?;
        self.score_candidates()?;
        self.judge()
    }

    /// Lazily read every segment back as one contiguous record.
    ///
    /// Patched chains come first, then unpatched singletons ascending. A
    /// per-segment failure is yielded as an `Err` item so the caller can
    /// skip it and continue.
    pub fn stitched_records<'a>(
        &'a self,
        segments: &'a SegmentSet,
    ) -> impl Iterator<Item = StitchResult<(crate::segments::Segment, BlobRecord)>> + 'a {
        let reader = MultiEntityReader::new(&self.store);
        segments.iter().map(move |segment| {
            let record = reader.parse(&segment)?;
            Ok((segment, record))
        })
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &TraceStore {
        &self.store
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &StitchConfig {
        &self.config
    }

    /// Track ends condensed by [`load`](Self::load).
    #[must_use]
    pub fn ends(&self) -> &[Terminus] {
        &self.ends
    }

    /// Track starts condensed by [`load`](Self::load).
    #[must_use]
    pub fn starts(&self) -> &[Terminus] {
        &self.starts
    }

    /// The fitted scorer, once [`load`](Self::load) has run.
    #[must_use]
    pub fn scorer(&self) -> Option<&DisplacementScorer> {
        self.scorer.as_ref()
    }
}
