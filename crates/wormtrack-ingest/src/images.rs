//! Index of the experiment's snapshot images.
//!
//! The tracker periodically writes `{basename}{ms}.png` where `ms` is the
//! capture time in milliseconds since the experiment start. The index keys
//! every image by that time in seconds and answers nearest/spanning
//! queries for callers that want a picture of the plate around a given
//! frame.

use std::path::{Path, PathBuf};

use crate::error::{DiscoveryError, IngestResult};

// ---------------------------------------------------------------------------
// ImageIndex
// ---------------------------------------------------------------------------

/// Snapshot images sorted by capture time in seconds.
#[derive(Debug, Clone, Default)]
pub struct ImageIndex {
    /// `(seconds, path)`, ascending by time.
    entries: Vec<(f64, PathBuf)>,
}

impl ImageIndex {
    /// Number of indexed images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the experiment has no images.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(seconds, path)` in time order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, &Path)> + '_ {
        self.entries.iter().map(|(t, p)| (*t, p.as_path()))
    }

    /// The image closest in time to `time`, with its actual capture time.
    ///
    /// `None` only when the index is empty.
    #[must_use]
    pub fn nearest(&self, time: f64) -> Option<(&Path, f64)> {
        self.entries
            .iter()
            .min_by(|(a, _), (b, _)| {
                (a - time)
                    .abs()
                    .partial_cmp(&(b - time).abs())
                    .expect("capture times are finite")
            })
            .map(|(t, p)| (p.as_path(), *t))
    }

    /// All images captured within `[t0, t1]`.
    ///
    /// When no image falls inside the range, the nearest image to the
    /// range midpoint is returned instead, so the result is non-empty
    /// whenever the index is.
    #[must_use]
    pub fn spanning(&self, t0: f64, t1: f64) -> Vec<&Path> {
        let (lo, hi) = if t0 <= t1 { (t0, t1) } else { (t1, t0) };
        let inside: Vec<&Path> = self
            .entries
            .iter()
            .filter(|(t, _)| lo <= *t && *t <= hi)
            .map(|(_, p)| p.as_path())
            .collect();
        if !inside.is_empty() {
            return inside;
        }
        self.nearest((lo + hi) / 2.0)
            .map(|(p, _)| vec![p])
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Index every `{basename}{ms}.png` in `dir`.
///
/// The digit run between the basename and the extension is the capture
/// time in milliseconds; an empty run means time zero. Files whose suffix
/// is not purely numeric are ignored.
pub fn find_images(dir: &Path, basename: &str) -> IngestResult<ImageIndex> {
    let entries = std::fs::read_dir(dir).map_err(|source| DiscoveryError::DirRead {
        dir: dir.to_path_buf(),
        source,
    })?;

    let mut images: Vec<(f64, PathBuf)> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?;
            let millis = name
                .strip_prefix(basename)?
                .strip_suffix(".png")?;
            if !millis.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let millis: u64 = if millis.is_empty() {
                0
            } else {
                millis.parse().ok()?
            };
            Some((millis as f64 / 1000.0, path))
        })
        .collect();

    images.sort_by(|(a, _), (b, _)| a.partial_cmp(b).expect("capture times are finite"));
    Ok(ImageIndex { entries: images })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
