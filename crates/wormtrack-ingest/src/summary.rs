//! Streaming parser for the experiment's summary event log.
//!
//! The summary has one line per video frame. Each line starts with 15
//! whitespace-separated numeric fields (frame number, wall time, and 13
//! further telemetry values this layer ignores) optionally followed by up
//! to three sections introduced by literal sentinel tokens:
//!
//! - `%` — per-frame events (ignored here),
//! - `%%` — "lost and found": alternating `(lost_id, found_id)` pairs,
//! - `%%%` — offsets: alternating `(entity_id, "file.offset")` pairs.
//!
//! A single pass over the log yields the entity index table, the
//! frame-time table, and the lineage graph.
//!
//! ## Pairing caveat
//!
//! The lost-and-found pairing is positional: the first lost id pairs with
//! the first found id on the line, and so on, in file order. When several
//! births and deaths land on the same frame, the tracker does not say which
//! death actually caused which birth; position is a stand-in for causality
//! and is preserved here as-is. Lineage edges inherit this approximation.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use wormtrack_core::{EntityId, EntitySummary, FrameTimes, LineageGraph, NO_ENTITY};

use crate::error::{DiscoveryError, IngestResult, SummaryError};

/// Fixed telemetry fields at the start of each line.
const HEADER_FIELDS: usize = 15;

// ---------------------------------------------------------------------------
// SummaryData
// ---------------------------------------------------------------------------

/// Everything one parse of the summary produces.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryData {
    /// Index rows sorted ascending by entity id. Only entities with a
    /// recorded blob file offset and a complete lifetime appear.
    pub table: Vec<EntitySummary>,
    /// Wall-clock time of every frame; one entry per summary line.
    pub frame_times: FrameTimes,
    /// The fission/fusion graph, frozen.
    pub lineage: LineageGraph,
}

// ---------------------------------------------------------------------------
// find_summary
// ---------------------------------------------------------------------------

/// Locate the single `*.summary` file in `dir`.
///
/// Returns the path and the experiment basename (file stem).
///
/// # Errors
///
/// [`DiscoveryError::SummaryNotFound`] when none exists,
/// [`DiscoveryError::AmbiguousSummary`] when more than one does.
pub fn find_summary(dir: &Path) -> IngestResult<(PathBuf, String)> {
    let entries = std::fs::read_dir(dir).map_err(|source| DiscoveryError::DirRead {
        dir: dir.to_path_buf(),
        source,
    })?;

    let mut summaries: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "summary"))
        .collect();
    summaries.sort();

    match summaries.len() {
        0 => Err(DiscoveryError::SummaryNotFound {
            dir: dir.to_path_buf(),
        }
        .into()),
        1 => {
            let path = summaries.pop().expect("length checked");
            let basename = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok((path, basename))
        }
        count => Err(DiscoveryError::AmbiguousSummary {
            dir: dir.to_path_buf(),
            count,
        }
        .into()),
    }
}

// ---------------------------------------------------------------------------
// parse_summary
// ---------------------------------------------------------------------------

/// Accumulates one entity's fields as lines mention it.
#[derive(Debug, Default, Clone)]
struct PartialEntity {
    location: Option<(u16, u64)>,
    born: Option<(u32, f64)>,
    died: Option<(u32, f64)>,
}

/// Sections a summary line can carry after its fixed fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Events,
    LostFound,
    Offsets,
}

/// Parse the summary file at `path` in a single streaming pass.
///
/// # Errors
///
/// All failure modes abort the whole parse; no partial results:
///
/// - [`SummaryError::FrameSequence`] when a line's frame number is not its
///   1-based ordinal,
/// - [`SummaryError::MalformedLine`] on short or untokenizable lines,
/// - [`SummaryError::NoEntities`] when the log defines no entities,
/// - [`SummaryError::NoRetrievableData`] when entities exist but none has a
///   blob file offset.
pub fn parse_summary(path: &Path) -> IngestResult<SummaryData> {
    let file = File::open(path).map_err(|source| SummaryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    let mut entities: BTreeMap<EntityId, PartialEntity> = BTreeMap::new();
    let mut active: BTreeSet<EntityId> = BTreeSet::new();
    let mut frame_times = FrameTimes::new();
    let mut lineage = LineageGraph::new();
    let mut last: Option<(u32, f64)> = None;

    for (ordinal, line) in reader.lines().enumerate() {
        let line_no = ordinal + 1;
        let line = line.map_err(|source| SummaryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let tokens: Vec<&str> = line.split_whitespace().collect();

        if tokens.len() < 2 {
            return Err(SummaryError::malformed(line_no, "missing frame/time fields").into());
        }
        let frame: u32 = tokens[0].parse().map_err(|_| {
            SummaryError::malformed(line_no, format!("cannot parse frame `{}`", tokens[0]))
        })?;
        let time: f64 = tokens[1].parse().map_err(|_| {
            SummaryError::malformed(line_no, format!("cannot parse time `{}`", tokens[1]))
        })?;

        if frame as usize != line_no {
            return Err(SummaryError::FrameSequence {
                line: line_no,
                frame,
            }
            .into());
        }

        // One entry per line, even when the line carries no event data.
        frame_times.push(time);
        last = Some((frame, time));

        if tokens.len() == HEADER_FIELDS {
            continue;
        }
        if tokens.len() < HEADER_FIELDS {
            return Err(SummaryError::malformed(
                line_no,
                format!(
                    "line has {} fields; at least {HEADER_FIELDS} required",
                    tokens.len()
                ),
            )
            .into());
        }

        let mut events: Vec<&str> = Vec::new();
        let mut lost_found: Vec<&str> = Vec::new();
        let mut offsets: Vec<&str> = Vec::new();
        let mut section = Section::None;
        for token in &tokens[HEADER_FIELDS..] {
            match *token {
                "%" => section = Section::Events,
                "%%" => section = Section::LostFound,
                "%%%" => section = Section::Offsets,
                value => match section {
                    Section::None => {
                        return Err(SummaryError::malformed(
                            line_no,
                            format!("data token `{value}` before any section sentinel"),
                        )
                        .into())
                    }
                    Section::Events => events.push(value),
                    Section::LostFound => lost_found.push(value),
                    Section::Offsets => offsets.push(value),
                },
            }
        }
        // The events section is consumed by other tools; nothing here.
        let _ = events;

        record_offsets(&mut entities, &offsets, line_no)?;
        record_lost_found(
            &mut entities,
            &mut active,
            &mut lineage,
            &frame_times,
            &lost_found,
            frame,
            time,
            line_no,
        )?;
    }

    // Close out entities still alive at the end of the recording.
    if let Some((frame, time)) = last {
        for id in std::mem::take(&mut active) {
            if let Some(entity) = entities.get_mut(&id) {
                entity.died = Some((frame, time));
            }
        }
    }

    finish(entities, frame_times, lineage)
}

/// Record `(entity_id, "file.offset")` pairs from an offsets section.
fn record_offsets(
    entities: &mut BTreeMap<EntityId, PartialEntity>,
    offsets: &[&str],
    line_no: usize,
) -> IngestResult<()> {
    for pair in offsets.chunks(2) {
        if pair.len() != 2 {
            return Err(
                SummaryError::malformed(line_no, "offsets section has an unpaired value").into(),
            );
        }
        let id: EntityId = pair[0].parse().map_err(|_| {
            SummaryError::malformed(line_no, format!("cannot parse entity id `{}`", pair[0]))
        })?;
        let (file_no, offset) = pair[1].split_once('.').ok_or_else(|| {
            SummaryError::malformed(line_no, format!("offset `{}` is not `file.offset`", pair[1]))
        })?;
        let file_no: u16 = file_no.parse().map_err(|_| {
            SummaryError::malformed(line_no, format!("cannot parse file number `{file_no}`"))
        })?;
        let offset: u64 = offset.parse().map_err(|_| {
            SummaryError::malformed(line_no, format!("cannot parse byte offset `{offset}`"))
        })?;
        entities.entry(id).or_default().location = Some((file_no, offset));
    }
    Ok(())
}

/// Apply one line's lost-and-found section: births, deaths, lineage edges.
#[allow(clippy::too_many_arguments)]
fn record_lost_found(
    entities: &mut BTreeMap<EntityId, PartialEntity>,
    active: &mut BTreeSet<EntityId>,
    lineage: &mut LineageGraph,
    frame_times: &FrameTimes,
    lost_found: &[&str],
    frame: u32,
    time: f64,
    line_no: usize,
) -> IngestResult<()> {
    let ids: Vec<EntityId> = lost_found
        .iter()
        .map(|t| {
            t.parse().map_err(|_| {
                SummaryError::malformed(line_no, format!("cannot parse entity id `{t}`"))
            })
        })
        .collect::<Result<_, _>>()?;

    // Evens are lost, odds are found; pairing is positional (see module
    // docs). An odd count leaves a trailing lost id with no partner.
    let lost = ids.iter().step_by(2).copied();
    let found = ids.iter().skip(1).step_by(2).copied();

    for id in found.clone() {
        if id == NO_ENTITY {
            continue;
        }
        entities.entry(id).or_default().born = Some((frame, time));
        active.insert(id);
        lineage.add_node(id)?;
    }

    for id in lost.clone() {
        if id == NO_ENTITY {
            continue;
        }
        // Death is recorded as of the prior frame — the entity's last live
        // frame, not the frame it was reported lost on. Clamped so the
        // lifetime invariant survives a same-frame birth and loss.
        let (mut died_frame, mut died_time) = if frame > 1 {
            let prior = frame - 1;
            (
                prior,
                frame_times.get(prior).expect("prior frame already recorded"),
            )
        } else {
            (frame, time)
        };
        let entity = entities.entry(id).or_default();
        if let Some((born_frame, born_time)) = entity.born {
            if died_frame < born_frame {
                warn!(id, frame, "entity lost on its birth frame; clamping death");
                died_frame = born_frame;
                died_time = born_time;
            }
        }
        entity.died = Some((died_frame, died_time));
        active.remove(&id);
        lineage.add_node(id)?;
    }

    // Nothing existed before frame 1, so its losses pair with nothing.
    if frame > 1 {
        for (lost_id, found_id) in lost.zip(found) {
            if lost_id != NO_ENTITY && found_id != NO_ENTITY {
                lineage.add_edge(lost_id, found_id)?;
            }
        }
    }

    Ok(())
}

/// Post-pass: drop unusable rows, build the sorted table, freeze the graph.
fn finish(
    mut entities: BTreeMap<EntityId, PartialEntity>,
    frame_times: FrameTimes,
    mut lineage: LineageGraph,
) -> IngestResult<SummaryData> {
    entities.remove(&NO_ENTITY);
    if entities.is_empty() {
        return Err(SummaryError::NoEntities.into());
    }
    if entities.values().all(|e| e.location.is_none()) {
        return Err(SummaryError::NoRetrievableData.into());
    }

    let mut table = Vec::with_capacity(entities.len());
    for (id, entity) in entities {
        let (Some((file_no, offset)), Some((born_frame, born_time)), Some((died_frame, died_time))) =
            (entity.location, entity.born, entity.died)
        else {
            // Referenced only via offsets, or half a lifetime on malformed
            // data: nothing retrievable, and no place in the lineage either.
            debug!(id, "dropping entity with incomplete summary data");
            lineage.remove_node(id)?;
            continue;
        };
        table.push(EntitySummary {
            id,
            file_no,
            offset,
            born_frame,
            born_time,
            died_frame,
            died_time,
        });
    }

    lineage.freeze();
    debug!(
        entities = table.len(),
        frames = frame_times.len(),
        edges = lineage.edge_count(),
        "summary parsed"
    );

    Ok(SummaryData {
        table,
        frame_times,
        lineage,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Pad a line's header out to 15 fields the way the tracker does.
    fn header(frame: u32, time: f64) -> String {
        format!("{frame} {time}  0 0 0 0 0 0 0 0 0 0 0 0 0")
    }

    fn write_summary(lines: &[String]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".summary")
            .tempfile()
            .unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn parse_lines(lines: &[String]) -> IngestResult<SummaryData> {
        let file = write_summary(lines);
        parse_summary(file.path())
    }

    fn basic_log() -> Vec<String> {
        vec![
            format!("{} %% 0 10 0 11 %%% 10 0.0 11 0.120", header(1, 0.1)),
            header(2, 0.2),
            format!("{} %% 10 12 %%% 12 0.240", header(3, 0.3)),
            header(4, 0.4),
        ]
    }

    #[test]
    fn frame_time_table_has_one_entry_per_line() {
        let data = parse_lines(&basic_log()).unwrap();
        assert_eq!(data.frame_times.len(), 4);
        assert_eq!(data.frame_times.get(3), Some(0.3));
    }

    #[test]
    fn births_deaths_and_eof_closeout() {
        let data = parse_lines(&basic_log()).unwrap();
        let by_id: std::collections::HashMap<_, _> =
            data.table.iter().map(|e| (e.id, e)).collect();

        // 10 born on frame 1, reported lost on frame 3 -> died frame 2.
        let e10 = by_id[&10];
        assert_eq!((e10.born_frame, e10.died_frame), (1, 2));
        assert!((e10.born_time - 0.1).abs() < 1e-12);
        assert!((e10.died_time - 0.2).abs() < 1e-12);

        // 11 born frame 1 and never lost -> closed out at EOF (frame 4).
        let e11 = by_id[&11];
        assert_eq!((e11.born_frame, e11.died_frame), (1, 4));
        assert!((e11.died_time - 0.4).abs() < 1e-12);

        // 12 born frame 3, closed out at EOF.
        let e12 = by_id[&12];
        assert_eq!((e12.born_frame, e12.died_frame), (3, 4));
    }

    #[test]
    fn lineage_edge_recorded_for_positional_pair() {
        let data = parse_lines(&basic_log()).unwrap();
        assert_eq!(data.lineage.children(10), &[12]);
        assert_eq!(data.lineage.parents(12), &[10]);
        // Frame 1 sentinel pairs produced no edges.
        assert_eq!(data.lineage.parents(10), &[] as &[EntityId]);
        assert_eq!(data.lineage.parents(11), &[] as &[EntityId]);
        assert!(data.lineage.is_frozen());
    }

    #[test]
    fn positional_pairing_of_simultaneous_events() {
        // Two deaths and two births on one frame: pairing is by position,
        // not by any causal relationship.
        let lines = vec![
            format!("{} %% 0 1 0 2 %%% 1 0.0 2 0.50 3 0.100 4 0.150", header(1, 0.1)),
            format!("{} %% 1 3 2 4", header(2, 0.2)),
            header(3, 0.3),
        ];
        let data = parse_lines(&lines).unwrap();
        assert_eq!(data.lineage.children(1), &[3]);
        assert_eq!(data.lineage.children(2), &[4]);
    }

    #[test]
    fn odd_lost_found_count_still_kills_trailing_id() {
        let lines = vec![
            format!("{} %% 0 1 %%% 1 0.0", header(1, 0.1)),
            format!("{} %% 1", header(2, 0.2)),
            header(3, 0.3),
        ];
        let data = parse_lines(&lines).unwrap();
        assert_eq!(data.table.len(), 1);
        assert_eq!(data.table[0].died_frame, 1);
        assert_eq!(data.lineage.edge_count(), 0);
    }

    #[test]
    fn frame_sequence_violation_rejected() {
        let lines = vec![header(1, 0.1), header(3, 0.3)];
        let err = parse_lines(&lines).unwrap_err();
        assert!(
            matches!(
                err,
                crate::error::IngestError::Summary(SummaryError::FrameSequence {
                    line: 2,
                    frame: 3
                })
            ),
            "got: {err:?}"
        );
    }

    #[test]
    fn short_line_rejected() {
        let lines = vec!["1 0.1 0 0".to_owned()];
        let err = parse_lines(&lines).unwrap_err();
        assert!(err.to_string().contains("15"), "got: {err}");
    }

    #[test]
    fn no_entities_rejected() {
        let lines = vec![header(1, 0.1), header(2, 0.2)];
        let err = parse_lines(&lines).unwrap_err();
        assert!(
            matches!(
                err,
                crate::error::IngestError::Summary(SummaryError::NoEntities)
            ),
            "got: {err:?}"
        );
    }

    #[test]
    fn no_offsets_rejected() {
        let lines = vec![format!("{} %% 0 10", header(1, 0.1)), header(2, 0.2)];
        let err = parse_lines(&lines).unwrap_err();
        assert!(
            matches!(
                err,
                crate::error::IngestError::Summary(SummaryError::NoRetrievableData)
            ),
            "got: {err:?}"
        );
    }

    #[test]
    fn offsetless_entity_dropped_from_table() {
        let lines = vec![
            format!("{} %% 0 10 0 11 %%% 10 0.0", header(1, 0.1)),
            header(2, 0.2),
        ];
        let data = parse_lines(&lines).unwrap();
        assert_eq!(data.table.len(), 1);
        assert_eq!(data.table[0].id, 10);
    }

    #[test]
    fn offsets_only_entity_dropped_and_pruned_from_graph() {
        let lines = vec![
            format!("{} %% 0 10 %%% 10 0.0 99 0.900", header(1, 0.1)),
            header(2, 0.2),
        ];
        let data = parse_lines(&lines).unwrap();
        assert_eq!(data.table.len(), 1);
        assert!(!data.lineage.contains(99));
    }

    #[test]
    fn parse_is_idempotent() {
        let file = write_summary(&basic_log());
        let first = parse_summary(file.path()).unwrap();
        let second = parse_summary(file.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn find_summary_requires_exactly_one() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            find_summary(dir.path()).unwrap_err(),
            crate::error::IngestError::Discovery(DiscoveryError::SummaryNotFound { .. })
        ));

        std::fs::write(dir.path().join("a.summary"), "").unwrap();
        let (path, basename) = find_summary(dir.path()).unwrap();
        assert_eq!(basename, "a");
        assert!(path.ends_with("a.summary"));

        std::fs::write(dir.path().join("b.summary"), "").unwrap();
        assert!(matches!(
            find_summary(dir.path()).unwrap_err(),
            crate::error::IngestError::Discovery(DiscoveryError::AmbiguousSummary {
                count: 2,
                ..
            })
        ));
    }
}
