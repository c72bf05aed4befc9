//! Plausibility scoring of candidate joins.
//!
//! Given a pool of genuine displacement-over-time traces, a scorer answers
//! "how plausible is it that an organism covered this distance in this many
//! frames?". The exact density-estimation method is deliberately left open;
//! any monotone-consistent estimate over the trained domain satisfies the
//! [`GapScorer`] contract. The implementation here is a smoothed fixed-bin
//! histogram per frame gap with bilinear interpolation between cells.
//!
//! Scorers are trained models: queries outside the frame-gap and distance
//! ranges seen during fitting are rejected rather than extrapolated, except
//! exactly at the boundary (within a small tolerance), which succeeds.

use ndarray::Array2;
use tracing::debug;

use crate::error::{StitchError, StitchResult};

/// Distance bins per frame-gap row of the density grid.
const DENSITY_BINS: usize = 32;

/// Pseudocount added to every bin so unobserved cells score low instead of
/// impossibly.
const SMOOTHING: f64 = 0.5;

/// Scores are clipped into this range, keeping logarithms finite.
const SCORE_FLOOR: f64 = 1e-100;
const SCORE_CEIL: f64 = 1e100;

/// Absolute slack accepted at the exact domain boundary.
const BOUNDARY_TOLERANCE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// GapScorer
// ---------------------------------------------------------------------------

/// Plausibility function over `(frame_gap, distance_gap)`.
///
/// Implementations must be pure: a query has no side effects and always
/// returns the same strictly positive, finite score for the same inputs.
pub trait GapScorer {
    /// Score a candidate gap.
    ///
    /// # Errors
    ///
    /// [`StitchError::OutOfDomain`] for queries beyond the trained ranges.
    fn score(&self, frame_gap: f64, distance_gap: f64) -> StitchResult<f64>;
}

// ---------------------------------------------------------------------------
// absolute_displacement
// ---------------------------------------------------------------------------

/// Distance of every point from the first point of the track.
///
/// The first element is always `0.0`.
#[must_use]
pub fn absolute_displacement(centroids: &[(f64, f64)]) -> Vec<f64> {
    let Some(&(x0, y0)) = centroids.first() else {
        return Vec::new();
    };
    centroids
        .iter()
        .map(|&(x, y)| (x - x0).hypot(y - y0))
        .collect()
}

// ---------------------------------------------------------------------------
// DisplacementScorer
// ---------------------------------------------------------------------------

/// Histogram-density scorer fitted from observed displacement traces.
#[derive(Debug, Clone)]
pub struct DisplacementScorer {
    /// Inclusive frame-gap domain `(1, longest_trace - 1)`.
    gap_domain: (f64, f64),
    /// Inclusive distance domain `(0, max_observed)`.
    distance_domain: (f64, f64),
    /// Densities, `[frame_gap - 1, bin]`.
    grid: Array2<f64>,
    bin_width: f64,
}

impl DisplacementScorer {
    /// Fit a scorer from displacement traces (one per entity, each starting
    /// at zero, as produced by [`absolute_displacement`]).
    ///
    /// Traces may have different lengths; each frame gap `g` is estimated
    /// from the traces that extend past it.
    ///
    /// # Errors
    ///
    /// [`StitchError::InsufficientTraces`] when fewer than two traces carry
    /// any displacement data — a single-trace model is degenerate and has
    /// caused silently broken fits before, so it is rejected outright.
    pub fn fit(traces: &[Vec<f64>]) -> StitchResult<Self> {
        let usable: Vec<&Vec<f64>> = traces.iter().filter(|t| t.len() >= 2).collect();
        if usable.len() < 2 {
            return Err(StitchError::InsufficientTraces {
                count: usable.len(),
            });
        }

        let longest = usable.iter().map(|t| t.len()).max().expect("non-empty");
        let max_gap = longest - 1;
        let max_distance = usable
            .iter()
            .flat_map(|t| t.iter().copied())
            .fold(0.0_f64, f64::max);
        let bin_width = if max_distance > 0.0 {
            max_distance / DENSITY_BINS as f64
        } else {
            1.0
        };

        let mut grid = Array2::zeros((max_gap, DENSITY_BINS));
        for gap in 1..=max_gap {
            let samples: Vec<f64> = usable
                .iter()
                .filter(|t| t.len() > gap)
                .map(|t| t[gap])
                .collect();

            let mut counts = [0.0_f64; DENSITY_BINS];
            for &distance in &samples {
                counts[bin_of(distance, bin_width)] += 1.0;
            }
            let total = samples.len() as f64 + SMOOTHING * DENSITY_BINS as f64;
            for (bin, &count) in counts.iter().enumerate() {
                let density = (count + SMOOTHING) / (total * bin_width);
                grid[[gap - 1, bin]] = density.clamp(SCORE_FLOOR, SCORE_CEIL);
            }
        }

        debug!(
            traces = usable.len(),
            max_gap, max_distance, "displacement scorer fitted"
        );

        Ok(Self {
            gap_domain: (1.0, max_gap as f64),
            distance_domain: (0.0, max_distance),
            grid,
            bin_width,
        })
    }

    /// Inclusive frame-gap domain the scorer was trained on.
    #[must_use]
    pub fn frame_gap_domain(&self) -> (f64, f64) {
        self.gap_domain
    }

    /// Inclusive distance domain the scorer was trained on.
    #[must_use]
    pub fn distance_domain(&self) -> (f64, f64) {
        self.distance_domain
    }

    /// Density at a real-valued grid position via bilinear interpolation.
    fn interpolate(&self, gap: f64, distance: f64) -> f64 {
        let max_gap_row = self.grid.nrows() - 1;

        // Frame-gap axis: rows are integer gaps starting at 1.
        let g = gap - 1.0;
        let g0 = (g.floor() as usize).min(max_gap_row);
        let g1 = (g0 + 1).min(max_gap_row);
        let gw = (g - g0 as f64).clamp(0.0, 1.0);

        // Distance axis: interpolate between bin centres.
        let p = distance / self.bin_width - 0.5;
        let b0 = (p.floor().max(0.0) as usize).min(DENSITY_BINS - 1);
        let b1 = (b0 + 1).min(DENSITY_BINS - 1);
        let bw = (p - b0 as f64).clamp(0.0, 1.0);

        let low = self.grid[[g0, b0]] * (1.0 - bw) + self.grid[[g0, b1]] * bw;
        let high = self.grid[[g1, b0]] * (1.0 - bw) + self.grid[[g1, b1]] * bw;
        low * (1.0 - gw) + high * gw
    }
}

impl GapScorer for DisplacementScorer {
    fn score(&self, frame_gap: f64, distance_gap: f64) -> StitchResult<f64> {
        let (g_min, g_max) = self.gap_domain;
        let (d_min, d_max) = self.distance_domain;
        if frame_gap < g_min - BOUNDARY_TOLERANCE
            || frame_gap > g_max + BOUNDARY_TOLERANCE
            || distance_gap < d_min - BOUNDARY_TOLERANCE
            || distance_gap > d_max + BOUNDARY_TOLERANCE
        {
            return Err(StitchError::OutOfDomain {
                frame_gap,
                distance_gap,
                gap_domain: self.gap_domain,
                distance_domain: self.distance_domain,
            });
        }

        let gap = frame_gap.clamp(g_min, g_max);
        let distance = distance_gap.clamp(d_min, d_max);
        Ok(self.interpolate(gap, distance).clamp(SCORE_FLOOR, SCORE_CEIL))
    }
}

/// Bin index of `distance`, clamping the top edge into the last bin.
fn bin_of(distance: f64, bin_width: f64) -> usize {
    ((distance / bin_width) as usize).min(DENSITY_BINS - 1)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic stand-in for real displacement data: 20 traces of 30
    /// frames, each a steady crawl at a slightly different speed.
    fn crawl_traces() -> Vec<Vec<f64>> {
        (0..20)
            .map(|i| {
                let speed = 0.9 + 0.02 * i as f64;
                (0..30).map(|j| speed * j as f64).collect()
            })
            .collect()
    }

    fn fitted() -> DisplacementScorer {
        DisplacementScorer::fit(&crawl_traces()).unwrap()
    }

    #[test]
    fn domains_match_training_data() {
        let scorer = fitted();
        assert_eq!(scorer.frame_gap_domain(), (1.0, 29.0));
        // Fastest trace: 1.28 px/frame for 29 frames.
        let (d_min, d_max) = scorer.distance_domain();
        assert_eq!(d_min, 0.0);
        assert!((d_max - 1.28 * 29.0).abs() < 1e-9);
    }

    #[test]
    fn in_domain_queries_are_positive_and_finite() {
        let scorer = fitted();
        let (g_min, g_max) = scorer.frame_gap_domain();
        let (d_min, d_max) = scorer.distance_domain();
        let g_mid = (g_min + g_max) / 2.0;
        let d_mid = (d_min + d_max) / 2.0;

        // Corners, edges, middle.
        for (g, d) in [
            (g_min, d_min),
            (g_max, d_min),
            (g_min, d_max),
            (g_max, d_max),
            (g_mid, d_min),
            (g_mid, d_max),
            (g_min, d_mid),
            (g_max, d_mid),
            (g_mid, d_mid),
        ] {
            let score = scorer.score(g, d).unwrap();
            assert!(score >= SCORE_FLOOR, "score({g}, {d}) = {score}");
            assert!(score.is_finite());
        }
    }

    #[test]
    fn likely_gaps_outscore_unlikely_ones() {
        let scorer = fitted();
        // After 10 frames the traces sit around 9-12.8 px; 1 px is not a
        // place any trace visits at that gap.
        let likely = scorer.score(10.0, 11.0).unwrap();
        let unlikely = scorer.score(10.0, 1.0).unwrap();
        assert!(likely > unlikely);
    }

    #[test]
    fn queries_beyond_the_boundary_fail() {
        let scorer = fitted();
        let (g_min, g_max) = scorer.frame_gap_domain();
        let (d_min, d_max) = scorer.distance_domain();
        let g_mid = (g_min + g_max) / 2.0;
        let d_mid = (d_min + d_max) / 2.0;

        for (g, d) in [
            (g_max + 0.1, d_mid),
            (g_min - 0.1, d_mid),
            (g_mid, d_max + 0.1),
            (g_mid, d_min - 0.1),
        ] {
            assert!(
                matches!(scorer.score(g, d), Err(StitchError::OutOfDomain { .. })),
                "score({g}, {d}) should be out of domain"
            );
        }
    }

    #[test]
    fn exact_boundary_succeeds() {
        let scorer = fitted();
        let (g_min, g_max) = scorer.frame_gap_domain();
        let (_, d_max) = scorer.distance_domain();
        assert!(scorer.score(g_min, 0.0).is_ok());
        assert!(scorer.score(g_max, d_max).is_ok());
        // Floating fuzz right at the edge is tolerated.
        assert!(scorer.score(g_max + 1e-12, d_max + 1e-12).is_ok());
    }

    #[test]
    fn queries_are_idempotent() {
        let scorer = fitted();
        let a = scorer.score(7.0, 6.5).unwrap();
        let b = scorer.score(7.0, 6.5).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn single_trace_is_rejected() {
        let one = vec![(0..30).map(|j| 1.1 * j as f64).collect::<Vec<f64>>()];
        assert!(matches!(
            DisplacementScorer::fit(&one),
            Err(StitchError::InsufficientTraces { count: 1 })
        ));
    }

    #[test]
    fn traces_without_gaps_are_rejected() {
        let stubs = vec![vec![0.0], vec![0.0], vec![]];
        assert!(matches!(
            DisplacementScorer::fit(&stubs),
            Err(StitchError::InsufficientTraces { count: 0 })
        ));
    }

    #[test]
    fn absolute_displacement_measures_from_first_point() {
        let track = [(2.0, 1.0), (2.0, 1.0), (5.0, 5.0), (2.0, 4.0)];
        let disp = absolute_displacement(&track);
        assert_eq!(disp, vec![0.0, 0.0, 5.0, 3.0]);
        assert!(absolute_displacement(&[]).is_empty());
    }
}
