//! Consolidation of scored candidate joins into reconnected chains.
//!
//! Scored candidates come in as a fan-out (each track end may have several
//! plausible continuations). This module reduces them to a set of directed
//! edges in which every node has at most one parent and one child, then
//! chains the edges into maximal linear paths ("segments"). Entities
//! touched by no surviving edge remain as singleton segments; together the
//! two groups exactly partition the input id set.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};
use wormtrack_core::EntityId;

use crate::candidates::GapCandidate;
use crate::error::{StitchError, StitchResult};

// ---------------------------------------------------------------------------
// ScoredCandidate
// ---------------------------------------------------------------------------

/// A [`GapCandidate`] with its plausibility attached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    /// The entity whose track starts.
    pub start: EntityId,
    /// Frames between the end and the start.
    pub frame_gap: u32,
    /// Euclidean distance between the endpoints, pixels.
    pub distance_gap: f64,
    /// log10 of the scorer's plausibility.
    pub log_score: f64,
}

impl ScoredCandidate {
    /// Attach a log-score to a candidate.
    #[must_use]
    pub fn new(candidate: GapCandidate, log_score: f64) -> Self {
        Self {
            start: candidate.start,
            frame_gap: candidate.frame_gap,
            distance_gap: candidate.distance_gap,
            log_score,
        }
    }
}

/// Scored candidates grouped by the id of the ending track.
pub type ScoredTable = BTreeMap<EntityId, Vec<ScoredCandidate>>;

// ---------------------------------------------------------------------------
// Segment / SegmentSet
// ---------------------------------------------------------------------------

/// An ordered chain of entity ids reconstructing one continuous track.
///
/// Immutable once built; ids strictly increase in time along the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment(Vec<EntityId>);

impl Segment {
    /// A singleton segment for an entity no edge touched.
    #[must_use]
    pub fn singleton(id: EntityId) -> Self {
        Self(vec![id])
    }

    /// The chain members in order.
    #[must_use]
    pub fn ids(&self) -> &[EntityId] {
        &self.0
    }

    /// Number of chain members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the segment is empty (never true for built segments).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this segment was patched together from several entities.
    #[must_use]
    pub fn is_patched(&self) -> bool {
        self.0.len() > 1
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for id in &self.0 {
            if !first {
                write!(f, " -> ")?;
            }
            write!(f, "{id}")?;
            first = false;
        }
        Ok(())
    }
}

/// The outcome of consolidation: patched chains plus untouched singletons.
///
/// `patched` and `unpatched` together contain every input id exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSet {
    patched: Vec<Segment>,
    unpatched: BTreeSet<EntityId>,
}

impl SegmentSet {
    /// Chains of two or more entities.
    #[must_use]
    pub fn patched(&self) -> &[Segment] {
        &self.patched
    }

    /// Entities no surviving edge touched.
    #[must_use]
    pub fn unpatched(&self) -> &BTreeSet<EntityId> {
        &self.unpatched
    }

    /// Every segment — patched chains first, then singletons ascending.
    pub fn iter(&self) -> impl Iterator<Item = Segment> + '_ {
        self.patched
            .iter()
            .cloned()
            .chain(self.unpatched.iter().map(|&id| Segment::singleton(id)))
    }

    /// Total number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patched.len() + self.unpatched.len()
    }

    /// Whether there are no segments at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patched.is_empty() && self.unpatched.is_empty()
    }
}

// ---------------------------------------------------------------------------
// join_segments
// ---------------------------------------------------------------------------

/// Chain directed edges into maximal linear paths.
///
/// # Errors
///
/// - [`StitchError::MultipleChildren`] / [`StitchError::MultipleParents`]
///   when a node has two outgoing or two incoming edges — the caller must
///   resolve fan-in/fan-out before chaining, and silently picking one here
///   would hide a real conflict.
/// - [`StitchError::CyclicSegment`] when edges close a loop: every chain
///   must start at a head with zero in-degree.
///
/// # Example
///
/// ```rust
/// use wormtrack_stitch::segments::join_segments;
///
/// let chains = join_segments(&[(1, 2), (2, 3), (4, 5)]).unwrap();
/// assert_eq!(chains[0].ids(), &[1, 2, 3]);
/// assert_eq!(chains[1].ids(), &[4, 5]);
/// ```
pub fn join_segments(edges: &[(EntityId, EntityId)]) -> StitchResult<Vec<Segment>> {
    let mut child_of: BTreeMap<EntityId, EntityId> = BTreeMap::new();
    let mut parent_of: BTreeMap<EntityId, EntityId> = BTreeMap::new();

    for &(parent, child) in edges {
        if child_of.insert(parent, child).is_some() {
            return Err(StitchError::MultipleChildren { id: parent });
        }
        if parent_of.insert(child, parent).is_some() {
            return Err(StitchError::MultipleParents { id: child });
        }
    }

    // Walk forward from every head (a parent that is nobody's child).
    let mut chains = Vec::new();
    let mut consumed = 0usize;
    for &head in child_of.keys() {
        if parent_of.contains_key(&head) {
            continue;
        }
        let mut chain = vec![head];
        let mut current = head;
        while let Some(&next) = child_of.get(&current) {
            chain.push(next);
            consumed += 1;
            current = next;
        }
        chains.push(Segment(chain));
    }

    // Edges not reachable from any head can only sit on a cycle.
    if consumed < edges.len() {
        let on_cycle = child_of
            .keys()
            .find(|id| parent_of.contains_key(*id) && !chains.iter().any(|c| c.ids().contains(id)))
            .copied()
            .unwrap_or_default();
        return Err(StitchError::CyclicSegment { id: on_cycle });
    }

    Ok(chains)
}

/// Chain edges and partition `ids` into patched chains and untouched
/// singletons.
///
/// # Errors
///
/// Everything [`join_segments`] produces, plus
/// [`StitchError::ForeignNode`] when an edge endpoint is not in `ids` and
/// [`StitchError::PartitionMismatch`] if the two groups fail to cover the
/// input exactly.
pub fn partition_segments(
    edges: &[(EntityId, EntityId)],
    ids: &BTreeSet<EntityId>,
) -> StitchResult<SegmentSet> {
    for &(parent, child) in edges {
        for endpoint in [parent, child] {
            if !ids.contains(&endpoint) {
                return Err(StitchError::ForeignNode { id: endpoint });
            }
        }
    }

    let patched = join_segments(edges)?;

    let mut unpatched = ids.clone();
    for segment in &patched {
        for id in segment.ids() {
            unpatched.remove(id);
        }
    }

    let chained: usize = patched.iter().map(Segment::len).sum();
    if chained + unpatched.len() != ids.len() {
        return Err(StitchError::PartitionMismatch {
            missing: ids.len().saturating_sub(chained + unpatched.len()),
        });
    }

    Ok(SegmentSet { patched, unpatched })
}

// ---------------------------------------------------------------------------
// SegmentGraphBuilder
// ---------------------------------------------------------------------------

/// Selects the best admissible edges and consolidates them into segments.
#[derive(Debug, Clone, Copy)]
pub struct SegmentGraphBuilder {
    /// Proposals scoring below this log10 threshold are discarded.
    log_threshold: f64,
}

impl SegmentGraphBuilder {
    /// Create a builder with the given log10 score threshold.
    #[must_use]
    pub fn new(log_threshold: f64) -> Self {
        Self { log_threshold }
    }

    /// Reduce scored candidates to segments over the id set `ids`.
    ///
    /// Selection is deterministic: ends are visited in ascending order,
    /// each end proposes its highest-scoring start (first wins on a tie,
    /// and candidates arrive sorted ascending by start id), proposals
    /// below the threshold are dropped, and fan-in onto one start keeps
    /// only the strongest proposal.
    ///
    /// # Errors
    ///
    /// See [`partition_segments`].
    pub fn build(&self, scored: &ScoredTable, ids: &BTreeSet<EntityId>) -> StitchResult<SegmentSet> {
        // end -> winning proposal for that end.
        let mut winners: BTreeMap<EntityId, ScoredCandidate> = BTreeMap::new();
        for (&end, candidates) in scored {
            let mut best: Option<ScoredCandidate> = None;
            for &candidate in candidates {
                if best.map_or(true, |b| candidate.log_score > b.log_score) {
                    best = Some(candidate);
                }
            }
            let Some(best) = best else { continue };
            if best.log_score < self.log_threshold {
                debug!(
                    end,
                    start = best.start,
                    log_score = best.log_score,
                    "best proposal below threshold; dropped"
                );
                continue;
            }
            winners.insert(end, best);
        }

        // Fan-in resolution: one edge per start, strongest proposal wins.
        let mut edge_to: BTreeMap<EntityId, (EntityId, f64)> = BTreeMap::new();
        for (&end, proposal) in &winners {
            let stronger = edge_to
                .get(&proposal.start)
                .map_or(true, |&(_, score)| proposal.log_score > score);
            if stronger {
                edge_to.insert(proposal.start, (end, proposal.log_score));
            }
        }

        let edges: Vec<(EntityId, EntityId)> = edge_to
            .iter()
            .map(|(&start, &(end, _))| (end, start))
            .collect();

        let set = partition_segments(&edges, ids)?;
        info!(
            patched = set.patched().len(),
            unpatched = set.unpatched().len(),
            "segments consolidated"
        );
        for segment in set.patched() {
            debug!(%segment, "patched chain");
        }
        Ok(set)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(range: std::ops::RangeInclusive<EntityId>) -> BTreeSet<EntityId> {
        range.collect()
    }

    fn chain_vecs(chains: &[Segment]) -> Vec<Vec<EntityId>> {
        chains.iter().map(|c| c.ids().to_vec()).collect()
    }

    #[test]
    fn basic_chains() {
        let chains = join_segments(&[(1, 2), (2, 3), (4, 5), (6, 7)]).unwrap();
        assert_eq!(chain_vecs(&chains), vec![vec![1, 2, 3], vec![4, 5], vec![6, 7]]);
    }

    #[test]
    fn merge_rejected() {
        let err = join_segments(&[(1, 3), (2, 3), (3, 4)]).unwrap_err();
        assert!(matches!(err, StitchError::MultipleParents { id: 3 }), "got: {err:?}");
    }

    #[test]
    fn fork_rejected() {
        let err = join_segments(&[(1, 2), (2, 3), (2, 4)]).unwrap_err();
        assert!(matches!(err, StitchError::MultipleChildren { id: 2 }), "got: {err:?}");
    }

    #[test]
    fn cycle_rejected() {
        let err = join_segments(&[(1, 2), (2, 3), (3, 1)]).unwrap_err();
        assert!(matches!(err, StitchError::CyclicSegment { .. }), "got: {err:?}");
    }

    #[test]
    fn edge_order_does_not_matter() {
        for edges in [
            vec![(2, 3), (1, 2)],
            vec![(3, 4), (2, 3), (1, 2)],
            vec![(3, 4), (1, 2), (2, 3)],
            vec![(1, 2), (3, 4), (2, 3)],
        ] {
            let chains = join_segments(&edges).unwrap();
            assert_eq!(chains.len(), 1, "edges {edges:?}");
            let expected: Vec<EntityId> = (1..=edges.len() as EntityId + 1).collect();
            assert_eq!(chains[0].ids(), &expected[..], "edges {edges:?}");
        }
    }

    #[test]
    fn partition_collects_untouched_ids() {
        let edges = [(1, 2), (2, 3), (4, 5)];

        let set = partition_segments(&edges, &ids(1..=5)).unwrap();
        assert!(set.unpatched().is_empty());
        assert_eq!(set.len(), 2);

        let set = partition_segments(&edges, &ids(1..=7)).unwrap();
        assert_eq!(set.unpatched().iter().copied().collect::<Vec<_>>(), vec![6, 7]);
        assert_eq!(set.iter().count(), 4);
    }

    #[test]
    fn foreign_edge_node_rejected() {
        let err = partition_segments(&[(1, 2), (2, 3), (4, 50)], &ids(1..=4)).unwrap_err();
        assert!(matches!(err, StitchError::ForeignNode { id: 50 }), "got: {err:?}");
    }

    fn scored(entries: &[(EntityId, &[(EntityId, f64)])]) -> ScoredTable {
        entries
            .iter()
            .map(|&(end, starts)| {
                let candidates = starts
                    .iter()
                    .map(|&(start, log_score)| ScoredCandidate {
                        start,
                        frame_gap: 1,
                        distance_gap: 0.0,
                        log_score,
                    })
                    .collect();
                (end, candidates)
            })
            .collect()
    }

    #[test]
    fn builder_picks_best_start_per_end() {
        let table = scored(&[(1, &[(2, -3.0), (3, -0.5)][..]), (5, &[(6, -0.2)][..])]);
        let set = SegmentGraphBuilder::new(-2.0)
            .build(&table, &ids(1..=6))
            .unwrap();
        assert_eq!(chain_vecs(set.patched()), vec![vec![1, 3], vec![5, 6]]);
        assert_eq!(set.unpatched().iter().copied().collect::<Vec<_>>(), vec![2, 4]);
    }

    #[test]
    fn builder_applies_threshold() {
        let table = scored(&[(1, &[(2, -2.5)][..])]);
        let set = SegmentGraphBuilder::new(-2.0)
            .build(&table, &ids(1..=2))
            .unwrap();
        assert!(set.patched().is_empty());
        assert_eq!(set.unpatched().len(), 2);
    }

    #[test]
    fn builder_resolves_fan_in_by_score() {
        // Ends 1 and 2 both want start 3; 2's proposal is stronger.
        let table = scored(&[(1, &[(3, -1.0)][..]), (2, &[(3, -0.1)][..])]);
        let set = SegmentGraphBuilder::new(-2.0)
            .build(&table, &ids(1..=3))
            .unwrap();
        assert_eq!(chain_vecs(set.patched()), vec![vec![2, 3]]);
        assert_eq!(set.unpatched().iter().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn builder_ties_keep_first_candidate() {
        // Equal scores: the lower start id (sorted first) must win, and on
        // fan-in the earlier end keeps the start.
        let table = scored(&[(1, &[(3, -1.0), (4, -1.0)][..]), (2, &[(3, -1.0)][..])]);
        let set = SegmentGraphBuilder::new(-2.0)
            .build(&table, &ids(1..=4))
            .unwrap();
        assert_eq!(chain_vecs(set.patched()), vec![vec![1, 3]]);
    }

    #[test]
    fn builder_chains_transitively() {
        let table = scored(&[(1, &[(2, -0.5)][..]), (2, &[(3, -0.4)][..])]);
        let set = SegmentGraphBuilder::new(-2.0)
            .build(&table, &ids(1..=3))
            .unwrap();
        assert_eq!(chain_vecs(set.patched()), vec![vec![1, 2, 3]]);
        assert!(set.unpatched().is_empty());
    }
}
