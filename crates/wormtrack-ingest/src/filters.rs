//! Ready-made filters for paring down an experiment's entities.
//!
//! Two distinct shapes, matching the store's two filter tiers: summary
//! filters see an index row and run before any trace is read; record
//! filters see the fully parsed per-frame data. Each constructor returns a
//! plain closure suitable for
//! [`TraceStore::add_summary_filter`](crate::store::TraceStore::add_summary_filter)
//! or
//! [`TraceStore::add_record_filter`](crate::store::TraceStore::add_record_filter).

use wormtrack_core::EntitySummary;

use crate::record::BlobRecord;

// ---------------------------------------------------------------------------
// Summary-level filters
// ---------------------------------------------------------------------------

/// Keep entities that lived at least `threshold` seconds.
pub fn lifetime_minimum(threshold: f64) -> impl Fn(&EntitySummary) -> bool + Send + Sync {
    move |row| row.lifetime() >= threshold
}

/// Keep entities alive on `frame`.
pub fn exists_in_frame(frame: u32) -> impl Fn(&EntitySummary) -> bool + Send + Sync {
    move |row| row.alive_at_frame(frame)
}

/// Keep entities alive at wall-clock `time`.
pub fn exists_at_time(time: f64) -> impl Fn(&EntitySummary) -> bool + Send + Sync {
    move |row| row.alive_at_time(time)
}

// ---------------------------------------------------------------------------
// Record-level filters
// ---------------------------------------------------------------------------

/// Keep entities whose centroid bounding box travels at least `threshold`
/// body lengths.
///
/// The bounding box size is width plus height of the centroid track; the
/// body length is the mean midline path length over the whole record
/// (frames without a midline count toward the mean as zero, as a crude
/// penalty for sparsely resolved entities).
pub fn relative_move_minimum(threshold: f64) -> impl Fn(&BlobRecord) -> bool + Send + Sync {
    move |record| {
        if record.is_empty() {
            return false;
        }

        let mut min_x = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for &(x, y) in &record.centroids {
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
        let move_px = (max_x - min_x) + (max_y - min_y);

        let size_px = record
            .midlines
            .iter()
            .flatten()
            .map(|points| midline_length(points))
            .sum::<f64>()
            / record.midlines.len() as f64;

        move_px >= size_px * threshold
    }
}

/// Length of the path connecting `points`.
fn midline_length(points: &[(i32, i32)]) -> f64 {
    points
        .windows(2)
        .map(|pair| {
            let dx = f64::from(pair[1].0 - pair[0].0);
            let dy = f64::from(pair[1].1 - pair[0].1);
            dx.hypot(dy)
        })
        .sum()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MIDLINE_POINTS;
    use wormtrack_core::EntitySummary;

    fn row(born_time: f64, died_time: f64) -> EntitySummary {
        EntitySummary {
            id: 1,
            file_no: 0,
            offset: 0,
            born_frame: 1,
            born_time,
            died_frame: 100,
            died_time,
        }
    }

    #[test]
    fn lifetime_filter_is_inclusive() {
        let keep = lifetime_minimum(10.0);
        assert!(keep(&row(0.0, 10.0)));
        assert!(keep(&row(0.0, 11.0)));
        assert!(!keep(&row(0.0, 9.9)));
    }

    #[test]
    fn existence_filters() {
        let s = row(1.0, 5.0);
        assert!(exists_in_frame(100)(&s));
        assert!(!exists_in_frame(101)(&s));
        assert!(exists_at_time(5.0)(&s));
        assert!(!exists_at_time(5.1)(&s));
    }

    #[test]
    fn midline_length_of_a_straight_line() {
        let points: Vec<(i32, i32)> = (0..4).map(|i| (i, 0)).collect();
        assert!((midline_length(&points) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn relative_move_compares_travel_to_body_length() {
        // A straight horizontal midline of length 10.
        let mut midline = [(0i32, 0i32); MIDLINE_POINTS];
        for (i, p) in midline.iter_mut().enumerate() {
            *p = (i as i32, 0);
        }

        let mut record = BlobRecord::default();
        for (i, x) in [0.0f64, 12.0].iter().enumerate() {
            record.frames.push(i as u32 + 1);
            record.times.push(i as f64);
            record.centroids.push((*x, 0.0));
            record.areas.push(10);
            record.std_vectors.push((0.0, 0.0));
            record.std_orthos.push(0.0);
            record.sizes.push((1.0, 1.0));
            record.midlines.push(Some(midline));
            record.contours.push(None);
        }

        // Travelled 12 px with a 10 px body: passes 1x, fails 2x.
        assert!(relative_move_minimum(1.0)(&record));
        assert!(!relative_move_minimum(2.0)(&record));
    }
}
