//! Parser for one entity's raw per-frame trace lines.
//!
//! Each line starts with a block of 10 whitespace-separated telemetry
//! fields. Lines that additionally carry geometry split on `%` into exactly
//! four blocks: the telemetry, an 11-point midline, an unused section, and
//! the encoded contour. Frames without geometry contribute `None`
//! placeholders so every per-field array stays the same length.

use crate::error::{IngestResult, RecordError};
use crate::outline::decode_outline;

/// Number of coordinate pairs in a midline.
pub const MIDLINE_POINTS: usize = 11;

// ---------------------------------------------------------------------------
// ContourData
// ---------------------------------------------------------------------------

/// The still-encoded contour of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContourData {
    /// Absolute coordinate of the first contour point.
    pub start: (i32, i32),
    /// Number of encoded steps. Required because the final character of
    /// `encoded` is ambiguous as to how many steps it actually carries.
    pub point_count: i32,
    /// The bit-packed step string.
    pub encoded: String,
}

impl ContourData {
    /// Decode into `point_count + 1` absolute points.
    pub fn decode(&self) -> IngestResult<Vec<(i32, i32)>> {
        decode_outline(self.start, self.point_count, &self.encoded)
    }
}

// ---------------------------------------------------------------------------
// BlobRecord
// ---------------------------------------------------------------------------

/// One entity's trace as parallel per-frame arrays.
///
/// All vectors have identical length. `midlines` and `contours` hold `None`
/// on frames whose line carried no geometry blocks — expected, not an
/// error. `areas` is signed because synthesized gap-filler lines carry `-1`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlobRecord {
    /// Frame numbers.
    pub frames: Vec<u32>,
    /// Wall-clock seconds since experiment start.
    pub times: Vec<f64>,
    /// Centre of mass.
    pub centroids: Vec<(f64, f64)>,
    /// Pixel area.
    pub areas: Vec<i32>,
    /// Vector along the long axis, scaled to the pixel standard deviation.
    pub std_vectors: Vec<(f64, f64)>,
    /// Pixel standard deviation orthogonal to `std_vectors`.
    pub std_orthos: Vec<f64>,
    /// Rectangular size as reported by the tracker.
    pub sizes: Vec<(f64, f64)>,
    /// Midline guess: 11 coordinates relative to the centroid.
    pub midlines: Vec<Option<[(i32, i32); MIDLINE_POINTS]>>,
    /// Encoded contour, if present on the frame.
    pub contours: Vec<Option<ContourData>>,
}

impl BlobRecord {
    /// Number of frames in the record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the record holds no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// First frame of the record.
    #[must_use]
    pub fn first_frame(&self) -> Option<u32> {
        self.frames.first().copied()
    }

    /// Last frame of the record.
    #[must_use]
    pub fn last_frame(&self) -> Option<u32> {
        self.frames.last().copied()
    }

    /// Decode the contour at `index`, if that frame has one.
    pub fn decode_contour(&self, index: usize) -> Option<IngestResult<Vec<(i32, i32)>>> {
        self.contours.get(index)?.as_ref().map(ContourData::decode)
    }

    fn assert_aligned(&self) {
        let n = self.frames.len();
        assert!(
            self.times.len() == n
                && self.centroids.len() == n
                && self.areas.len() == n
                && self.std_vectors.len() == n
                && self.std_orthos.len() == n
                && self.sizes.len() == n
                && self.midlines.len() == n
                && self.contours.len() == n,
            "per-frame arrays of a BlobRecord must stay aligned"
        );
    }
}

// ---------------------------------------------------------------------------
// parse_record
// ---------------------------------------------------------------------------

/// Parse the raw trace lines of one entity into a [`BlobRecord`].
///
/// `lines` is a fallible line source (as produced by
/// [`TraceStore::trace_for`](crate::store::TraceStore::trace_for)); an I/O
/// error from it aborts the parse.
///
/// # Errors
///
/// [`RecordError::Malformed`] (with the 1-based line ordinal inside the
/// trace) on any field that fails to parse, and any error propagated from
/// the line source. An entirely empty trace parses into an empty record;
/// the store layer maps that to [`RecordError::Empty`] where the entity id
/// is known.
pub fn parse_record<I>(lines: I) -> IngestResult<BlobRecord>
where
    I: IntoIterator<Item = IngestResult<String>>,
{
    let mut record = BlobRecord::default();

    for (ordinal, line) in lines.into_iter().enumerate() {
        let line = line?;
        let line_no = ordinal + 1;
        let blocks: Vec<&str> = line.split('%').collect();

        parse_telemetry(&mut record, blocks[0], line_no)?;

        if blocks.len() == 4 {
            record.midlines.push(Some(parse_midline(blocks[1], line_no)?));
            record.contours.push(Some(parse_contour(blocks[3], line_no)?));
        } else {
            record.midlines.push(None);
            record.contours.push(None);
        }
    }

    record.assert_aligned();
    Ok(record)
}

fn parse_telemetry(record: &mut BlobRecord, block: &str, line_no: usize) -> IngestResult<()> {
    let fields: Vec<&str> = block.split_whitespace().collect();
    if fields.len() != 10 {
        return Err(RecordError::malformed(
            line_no,
            format!("expected 10 telemetry fields, found {}", fields.len()),
        )
        .into());
    }

    record.frames.push(field(fields[0], line_no, "frame")?);
    record.times.push(field(fields[1], line_no, "time")?);
    record.centroids.push((
        field(fields[2], line_no, "centroid x")?,
        field(fields[3], line_no, "centroid y")?,
    ));
    record.areas.push(field(fields[4], line_no, "area")?);
    record.std_vectors.push((
        field(fields[5], line_no, "std vector x")?,
        field(fields[6], line_no, "std vector y")?,
    ));
    record
        .std_orthos
        .push(field(fields[7], line_no, "std ortho")?);
    record.sizes.push((
        field(fields[8], line_no, "size w")?,
        field(fields[9], line_no, "size h")?,
    ));
    Ok(())
}

fn parse_midline(block: &str, line_no: usize) -> IngestResult<[(i32, i32); MIDLINE_POINTS]> {
    let values: Vec<&str> = block.split_whitespace().collect();
    if values.len() != 2 * MIDLINE_POINTS {
        return Err(RecordError::malformed(
            line_no,
            format!(
                "expected {} midline values, found {}",
                2 * MIDLINE_POINTS,
                values.len()
            ),
        )
        .into());
    }

    let mut midline = [(0i32, 0i32); MIDLINE_POINTS];
    for (i, pair) in values.chunks_exact(2).enumerate() {
        midline[i] = (
            field(pair[0], line_no, "midline x")?,
            field(pair[1], line_no, "midline y")?,
        );
    }
    Ok(midline)
}

fn parse_contour(block: &str, line_no: usize) -> IngestResult<ContourData> {
    let fields: Vec<&str> = block.split_whitespace().collect();
    if fields.len() != 4 {
        return Err(RecordError::malformed(
            line_no,
            format!("expected 4 contour fields, found {}", fields.len()),
        )
        .into());
    }
    Ok(ContourData {
        start: (
            field(fields[0], line_no, "contour start x")?,
            field(fields[1], line_no, "contour start y")?,
        ),
        point_count: field(fields[2], line_no, "contour point count")?,
        encoded: fields[3].to_owned(),
    })
}

fn field<T: std::str::FromStr>(token: &str, line_no: usize, name: &str) -> IngestResult<T> {
    token.parse().map_err(|_| {
        RecordError::malformed(line_no, format!("cannot parse {name} from `{token}`")).into()
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
