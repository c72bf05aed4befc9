//! Geometric/temporal admissibility search between track endpoints.
//!
//! When the tracker loses an organism and later re-acquires it, the lost
//! track's end and the new track's start lie close in both time and space.
//! The search accepts a pair whenever the distance between the two
//! endpoints fits inside a "cone" projected forward through time: a base
//! of `position_error` pixels widening by `max_speed` pixels per frame of
//! gap. The default parameters are deliberately liberal — recall over
//! precision — because the scorer downstream exists to sort the real joins
//! from the accidental ones.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use wormtrack_core::EntityId;

/// Recording rate of the tracker, frames per second.
pub const FRAME_RATE: f64 = 14.0;

/// Maximum gap to consider, in frames.
pub const MAX_FRAME_GAP: u32 = 500;

/// Fastest plausible crawl speed, pixels per frame.
pub const MAX_CRAWL_SPEED: f64 = 1.37;

/// Assume observed organisms move at only this fraction of the theoretical
/// maximum, inflating the admissible speed accordingly.
pub const OBSERVED_SPEED_FRACTION: f64 = 0.90;

/// Pixels of slack at all gap lengths, absorbing tracker jitter.
pub const POSITION_ERROR: f64 = 10.0;

// ---------------------------------------------------------------------------
// Terminus
// ---------------------------------------------------------------------------

/// One endpoint of a track: where and when it started or ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Terminus {
    /// The entity whose track terminates or originates here.
    pub id: EntityId,
    /// Centroid at the endpoint.
    pub loc: (f64, f64),
    /// Frame of the endpoint.
    pub frame: u32,
}

// ---------------------------------------------------------------------------
// ConeParams
// ---------------------------------------------------------------------------

/// Admissibility cone parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConeParams {
    /// Height of the cone: largest accepted frame gap.
    pub max_frame_gap: u32,
    /// Slope of the cone, pixels per frame.
    pub max_speed: f64,
    /// Base of the cone: accepted deviation at zero gap, pixels.
    pub position_error: f64,
}

impl Default for ConeParams {
    fn default() -> Self {
        Self {
            max_frame_gap: MAX_FRAME_GAP,
            max_speed: MAX_CRAWL_SPEED / OBSERVED_SPEED_FRACTION,
            position_error: POSITION_ERROR,
        }
    }
}

// ---------------------------------------------------------------------------
// find_candidates
// ---------------------------------------------------------------------------

/// One admissible join from a track end to a later track start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapCandidate {
    /// The entity whose track starts.
    pub start: EntityId,
    /// Frames between the end and the start; always positive.
    pub frame_gap: u32,
    /// Euclidean distance between the two endpoints, pixels.
    pub distance_gap: f64,
}

/// Candidates grouped by the id of the ending track. Every end id appears,
/// even with no admissible starts.
pub type CandidateTable = BTreeMap<EntityId, Vec<GapCandidate>>;

/// Euclidean distance between two points.
#[must_use]
pub fn euclid(a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - b.0).hypot(a.1 - b.1)
}

/// Find every admissible `(end, start)` pair inside the cone.
///
/// Pure function of its inputs. A start is admissible for an end when it
/// begins strictly after the end's frame (causality), within
/// `max_frame_gap` frames, and within `position_error + frame_gap *
/// max_speed` pixels. Each end's candidates come back sorted ascending by
/// start id, so downstream tie-breaking is deterministic.
///
/// # Example
///
/// ```rust
/// use wormtrack_stitch::candidates::{find_candidates, ConeParams, Terminus};
///
/// let ends = [Terminus { id: 1, loc: (100.0, 100.0), frame: 10 }];
/// let starts = [Terminus { id: 2, loc: (100.0, 100.0), frame: 20 }];
/// let table = find_candidates(&ends, &starts, &ConeParams::default());
///
/// let joins = &table[&1];
/// assert_eq!(joins.len(), 1);
/// assert_eq!((joins[0].start, joins[0].frame_gap), (2, 10));
/// assert_eq!(joins[0].distance_gap, 0.0);
/// ```
#[must_use]
pub fn find_candidates(
    ends: &[Terminus],
    starts: &[Terminus],
    params: &ConeParams,
) -> CandidateTable {
    let mut table = CandidateTable::new();

    for end in ends {
        let candidates = table.entry(end.id).or_default();
        for start in starts {
            if start.frame <= end.frame {
                continue;
            }
            let frame_gap = start.frame - end.frame;
            if frame_gap > params.max_frame_gap {
                continue;
            }
            let distance_gap = euclid(end.loc, start.loc);
            if distance_gap <= params.position_error + frame_gap as f64 * params.max_speed {
                candidates.push(GapCandidate {
                    start: start.id,
                    frame_gap,
                    distance_gap,
                });
            }
        }
        candidates.sort_by_key(|c| c.start);
    }

    table
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn t(id: EntityId, x: f64, y: f64, frame: u32) -> Terminus {
        Terminus {
            id,
            loc: (x, y),
            frame,
        }
    }

    /// A tight cone for boundary testing: no slack, one pixel per frame.
    fn tight() -> ConeParams {
        ConeParams {
            max_frame_gap: 1000,
            max_speed: 1.0,
            position_error: 0.0,
        }
    }

    #[test]
    fn basic_join_with_defaults() {
        let table = find_candidates(
            &[t(1, 100.0, 100.0, 10)],
            &[t(2, 100.0, 100.0, 20)],
            &ConeParams::default(),
        );
        assert_eq!(table.len(), 1);
        assert_eq!(
            table[&1],
            vec![GapCandidate {
                start: 2,
                frame_gap: 10,
                distance_gap: 0.0
            }]
        );
    }

    #[test]
    fn causality_rejects_simultaneous_and_earlier_starts() {
        let ends = [t(1, 100.0, 100.0, 100)];
        for start in [
            t(2, 100.0, 100.0, 100),
            t(2, 100.0, 100.0, 99),
            t(2, 200.0, 100.0, 100),
        ] {
            let table = find_candidates(&ends, &[start], &ConeParams::default());
            assert!(table[&1].is_empty(), "start {start:?} should be rejected");
        }
    }

    #[test]
    fn cone_boundary() {
        let ends = [t(1, 100.0, 100.0, 100)];

        // Inside (or exactly on) the cone.
        for start in [
            t(2, 100.0, 100.0, 101),
            t(3, 100.0, 100.0, 101),
            t(4, 200.0, 100.0, 200),
        ] {
            let table = find_candidates(&ends, &[start], &tight());
            assert_eq!(table[&1].len(), 1, "start {start:?} should be admitted");
        }

        // Outside: too fast, too far, too late.
        for start in [
            t(2, 200.0, 100.0, 199),
            t(3, 400.0, 500.0, 599),
            t(4, 100.0, 100.0, 1101),
        ] {
            let table = find_candidates(&ends, &[start], &tight());
            assert!(table[&1].is_empty(), "start {start:?} should be rejected");
        }
    }

    #[test]
    fn multiple_ends_and_starts() {
        let ends = [t(1, 100.0, 100.0, 100), t(2, 100.0, 500.0, 200)];
        let starts = [t(10, 400.0, 500.0, 500), t(20, 400.0, 100.0, 1000)];
        let table = find_candidates(&ends, &starts, &tight());

        // 1 -> 10 is too fast (500 px in 400 frames at 1 px/frame).
        assert_eq!(
            table[&1],
            vec![GapCandidate {
                start: 20,
                frame_gap: 900,
                distance_gap: 300.0
            }]
        );
        assert_eq!(
            table[&2],
            vec![
                GapCandidate {
                    start: 10,
                    frame_gap: 300,
                    distance_gap: 300.0
                },
                GapCandidate {
                    start: 20,
                    frame_gap: 800,
                    distance_gap: 500.0
                },
            ]
        );
    }

    #[test]
    fn ends_without_candidates_still_appear() {
        let table = find_candidates(
            &[t(1, 0.0, 0.0, 10), t(2, 1000.0, 1000.0, 10)],
            &[t(3, 0.0, 0.0, 12)],
            &tight(),
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table[&1].len(), 1);
        assert!(table[&2].is_empty());
    }
}
