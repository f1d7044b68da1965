//! Heuristic scene header discovery.
//!
//! Nothing in the dump says where scenes live, so every header end marker
//! is treated as a candidate and the commands before it are inspected. A
//! hit claims its rooms by zeroing them, which keeps room headers (which use
//! the same end marker) from being reported as scenes later in the pass.

use std::fmt::Write as _;
use std::ops::Range;

use log::{debug, info};
use serde::Serialize;

use crate::segment::{Owner, Segment, read_u32};
use crate::stream::{Flow, HeaderCommand, RECORD_SIZE, StreamEnd, StreamError, read_record, walk};

/// A complete end-of-header command.
pub const END_MARKER: [u8; RECORD_SIZE] = [0x14, 0, 0, 0, 0, 0, 0, 0];
/// Records inspected before an end marker, the marker included.
pub const WINDOW: usize = 32;
/// Scene headers always start on this boundary.
pub const ALIGNMENT: usize = 16;

/// Absolute byte range of a room inside the dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoomRange {
    pub start: usize,
    pub end: usize,
}

impl RoomRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Why an end marker was not accepted as the end of a scene header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    NoStartCommand,
    Misaligned { start: usize },
    EmptyRoomList { start: usize },
    BadRoomList { start: usize, address: u32 },
}

/// Where room list validation stopped for an accepted header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "fault", rename_all = "snake_case")]
pub enum RoomListFault {
    Truncated { index: usize },
    InvalidRange { index: usize, start: u32, end: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SceneHit {
    pub offset: usize,
    pub marker: usize,
    pub rooms: Vec<RoomRange>,
    pub fault: Option<RoomListFault>,
    /// Whether the header bytes were zeroed (only after a clean room list).
    pub header_zeroed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Candidate {
    Accepted(SceneHit),
    Rejected { marker: usize, rejection: Rejection },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub candidates: Vec<Candidate>,
}

impl ScanReport {
    pub fn accepted(&self) -> impl Iterator<Item = &SceneHit> {
        self.candidates.iter().filter_map(|candidate| match candidate {
            Candidate::Accepted(hit) => Some(hit),
            Candidate::Rejected { .. } => None,
        })
    }

    pub fn rejected(&self) -> impl Iterator<Item = (usize, Rejection)> + '_ {
        self.candidates.iter().filter_map(|candidate| match candidate {
            Candidate::Rejected { marker, rejection } => Some((*marker, *rejection)),
            Candidate::Accepted(_) => None,
        })
    }

    /// One line per header, then one indented line per room (or an error
    /// marker where the room list went bad).
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for hit in self.accepted() {
            let _ = writeln!(out, "{:08X}", hit.offset);
            for room in &hit.rooms {
                let _ = writeln!(out, " -> {:08X}", room.start);
            }
            if hit.fault.is_some() {
                out.push_str(" -> ERROR\n");
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy)]
struct HeaderGuess {
    start: usize,
    room_count: usize,
    room_list: usize,
}

/// Scan `blob` for scene headers, zeroing every room (and cleanly
/// validated scene header) that gets claimed along the way.
pub fn find_scene_headers(blob: &mut [u8]) -> ScanReport {
    let mut report = ScanReport::default();
    let mut marker = 0usize;

    while marker + RECORD_SIZE <= blob.len() {
        if blob[marker..marker + RECORD_SIZE] == END_MARKER {
            match classify(blob, marker) {
                Ok(guess) => {
                    let hit = claim(blob, marker, guess);
                    info!(
                        "scene header at {:#010x} with {} room(s){}",
                        hit.offset,
                        hit.rooms.len(),
                        if hit.fault.is_some() { ", room list invalid" } else { "" }
                    );
                    report.candidates.push(Candidate::Accepted(hit));
                }
                Err(rejection) => {
                    debug!("end marker at {marker:#010x} rejected: {rejection:?}");
                    report
                        .candidates
                        .push(Candidate::Rejected { marker, rejection });
                }
            }
        }
        marker += RECORD_SIZE;
    }

    report
}

/// Decide whether the commands before `marker` look like a scene header.
fn classify(blob: &[u8], marker: usize) -> Result<HeaderGuess, Rejection> {
    let floor = marker.saturating_sub((WINDOW - 1) * RECORD_SIZE);
    let mut start = None;
    let mut room_list_field = None;
    let mut room_count = 0usize;

    // The lowest qualifying command wins, so keep overwriting while walking
    // towards lower addresses.
    for offset in (floor..=marker).rev().step_by(RECORD_SIZE) {
        let Some(record) = read_record(blob, offset) else {
            continue;
        };
        match record.command() {
            HeaderCommand::RoomList => {
                room_list_field = Some(offset + 4);
                room_count = usize::from(record.count());
                start = Some(offset);
            }
            HeaderCommand::SoundSettings | HeaderCommand::AlternateHeaders => {
                start = Some(offset);
            }
            _ => {}
        }
    }

    let start = start.ok_or(Rejection::NoStartCommand)?;
    if start % ALIGNMENT != 0 {
        return Err(Rejection::Misaligned { start });
    }
    if room_count == 0 {
        return Err(Rejection::EmptyRoomList { start });
    }

    // room_count > 0 implies a room list command was seen
    let field = room_list_field.unwrap_or(start + 4);
    let address = read_u32(blob, field).unwrap_or_default();
    let room_list = Owner::new(start, blob.len())
        .resolve_at(blob, Segment::Scene, field)
        .ok_or(Rejection::BadRoomList { start, address })?;

    Ok(HeaderGuess {
        start,
        room_count,
        room_list,
    })
}

/// Validate and zero the rooms of an accepted header.
fn claim(blob: &mut [u8], marker: usize, guess: HeaderGuess) -> SceneHit {
    let len = blob.len();
    let mut entries = Vec::with_capacity(guess.room_count);
    let listed = walk(blob, guess.room_list, StreamEnd::Count(guess.room_count), |record| {
        let bytes = record.bytes();
        entries.push((
            read_u32(bytes, 0).unwrap_or_default(),
            read_u32(bytes, 4).unwrap_or_default(),
        ));
        Flow::Continue
    });

    let mut hit = SceneHit {
        offset: guess.start,
        marker,
        rooms: Vec::with_capacity(entries.len()),
        fault: match listed {
            Err(StreamError::Truncated { index, .. }) => Some(RoomListFault::Truncated { index }),
            _ => None,
        },
        header_zeroed: false,
    };

    for (index, (start, end)) in entries.into_iter().enumerate() {
        let (begin, finish) = (start as usize, end as usize);
        if begin > finish || begin >= len || finish >= len {
            hit.fault = Some(RoomListFault::InvalidRange { index, start, end });
            break;
        }
        blob[begin..finish].fill(0);
        hit.rooms.push(RoomRange {
            start: begin,
            end: finish,
        });
    }

    // Scenes are packed directly in front of their first room.
    if hit.fault.is_none() {
        if let Some(first) = hit.rooms.first() {
            if first.start > hit.offset {
                blob[hit.offset..first.start].fill(0);
                hit.header_zeroed = true;
            }
        }
    }

    hit
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE: usize = 0x40;

    fn put(blob: &mut [u8], at: usize, bytes: &[u8]) {
        blob[at..at + bytes.len()].copy_from_slice(bytes);
    }

    /// Scene header at 0x40: sound settings, room list (2 rooms, list at
    /// scene + 0x30), end marker. Rooms at 0x100..0x180 and 0x180..0x200.
    fn synthetic_blob() -> Vec<u8> {
        let mut blob = vec![0xaa; 0x240];
        put(&mut blob, SCENE, &[0x15, 0, 0, 0, 0, 0, 0x13, 0x02]);
        put(&mut blob, SCENE + 0x08, &[0x04, 0x02, 0, 0, 0x02, 0, 0, 0x30]);
        put(&mut blob, SCENE + 0x10, &END_MARKER);
        put(&mut blob, SCENE + 0x30, &[0, 0, 0x01, 0x00, 0, 0, 0x01, 0x80]);
        put(&mut blob, SCENE + 0x38, &[0, 0, 0x01, 0x80, 0, 0, 0x02, 0x00]);
        // room headers end with the same marker
        put(&mut blob, 0x108, &END_MARKER);
        put(&mut blob, 0x188, &END_MARKER);
        blob
    }

    #[test]
    fn reports_single_well_formed_header() {
        let mut blob = synthetic_blob();
        let report = find_scene_headers(&mut blob);

        let hits: Vec<_> = report.accepted().collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].offset, SCENE);
        assert_eq!(
            hits[0].rooms,
            vec![
                RoomRange { start: 0x100, end: 0x180 },
                RoomRange { start: 0x180, end: 0x200 },
            ]
        );
        assert!(hits[0].fault.is_none());
        assert!(hits[0].header_zeroed);

        assert!(blob[SCENE..0x200].iter().all(|&b| b == 0));
        assert!(blob[0x200..].iter().all(|&b| b == 0xaa));
        assert_eq!(report.render_text(), "00000040\n -> 00000100\n -> 00000180\n");
    }

    #[test]
    fn lowest_qualifying_command_starts_the_header() {
        let mut blob = synthetic_blob();
        // alternate header list two records before the sound settings
        put(&mut blob, SCENE - 0x10, &[0x18, 0, 0, 0, 0x02, 0, 0, 0x00]);
        put(&mut blob, SCENE - 0x08, &[0x11, 0, 0, 0, 0, 0, 0, 0]);
        let report = find_scene_headers(&mut blob);
        let hit = report.accepted().next().unwrap();
        // the room list pointer is now relative to 0x30
        assert_eq!(hit.offset, SCENE - 0x10);
        assert_eq!(hit.rooms.len(), 0);
        assert!(matches!(hit.fault, Some(RoomListFault::InvalidRange { index: 0, .. })));
    }

    #[test]
    fn header_at_start_of_blob_is_considered() {
        let mut blob = vec![0u8; 0x100];
        put(&mut blob, 0, &[0x04, 0x01, 0, 0, 0x02, 0, 0, 0x10]);
        put(&mut blob, 0x08, &END_MARKER);
        put(&mut blob, 0x10, &[0, 0, 0, 0x40, 0, 0, 0, 0x80]);
        let report = find_scene_headers(&mut blob);
        assert_eq!(report.render_text(), "00000000\n -> 00000040\n");
    }

    #[test]
    fn rejects_misaligned_headers() {
        let mut blob = synthetic_blob();
        put(&mut blob, SCENE, &[0u8; 8]);
        put(&mut blob, SCENE + 0x08, &[0x04, 0x02, 0, 0, 0x02, 0, 0, 0x28]);
        let report = find_scene_headers(&mut blob);
        assert_eq!(report.accepted().count(), 0);
        assert!(report
            .rejected()
            .any(|(marker, rejection)| marker == SCENE + 0x10
                && rejection == Rejection::Misaligned { start: SCENE + 0x08 }));
    }

    #[test]
    fn rejects_empty_room_lists() {
        let mut blob = synthetic_blob();
        put(&mut blob, SCENE + 0x08, &[0x04, 0x00, 0, 0, 0x02, 0, 0, 0x30]);
        let report = find_scene_headers(&mut blob);
        assert_eq!(report.accepted().count(), 0);
        assert!(report
            .rejected()
            .any(|(_, rejection)| rejection == Rejection::EmptyRoomList { start: SCENE }));
        assert_eq!(report.render_text(), "");
    }

    #[test]
    fn rejects_room_lists_outside_the_blob_or_segment() {
        for pointer in [[0x02, 0x00, 0x10, 0x00], [0x03, 0x00, 0x00, 0x30], [0, 0, 0, 0]] {
            let mut blob = synthetic_blob();
            let mut command = [0x04, 0x02, 0, 0, 0, 0, 0, 0];
            command[4..].copy_from_slice(&pointer);
            put(&mut blob, SCENE + 0x08, &command);
            let report = find_scene_headers(&mut blob);
            assert_eq!(report.accepted().count(), 0, "{pointer:02x?}");
            assert!(report.rejected().any(|(_, rejection)| matches!(
                rejection,
                Rejection::BadRoomList { start: SCENE, .. }
            )));
        }
    }

    #[test]
    fn bad_room_entry_keeps_header_but_stops_claiming() {
        let mut blob = synthetic_blob();
        // second room ends past the blob
        put(&mut blob, SCENE + 0x38, &[0, 0, 0x01, 0x80, 0, 0, 0x10, 0x00]);
        let report = find_scene_headers(&mut blob);
        let hit = report.accepted().next().unwrap();
        assert_eq!(hit.rooms, vec![RoomRange { start: 0x100, end: 0x180 }]);
        assert_eq!(
            hit.fault,
            Some(RoomListFault::InvalidRange {
                index: 1,
                start: 0x180,
                end: 0x1000
            })
        );
        assert!(!hit.header_zeroed);
        assert_eq!(blob[SCENE], 0x15);
        assert!(blob[0x100..0x180].iter().all(|&b| b == 0));
        assert_eq!(blob[0x180], 0xaa);
        assert_eq!(report.render_text(), "00000040\n -> 00000100\n -> ERROR\n");
    }

    #[test]
    fn room_list_running_off_the_blob_is_truncated() {
        let mut blob = vec![0xaa; 0x60];
        // two entries announced, only one fits before the end
        put(&mut blob, 0, &[0x04, 0x02, 0, 0, 0x02, 0, 0, 0x58]);
        put(&mut blob, 0x08, &END_MARKER);
        put(&mut blob, 0x58, &[0, 0, 0, 0x20, 0, 0, 0, 0x30]);
        let report = find_scene_headers(&mut blob);
        let hit = report.accepted().next().unwrap();
        assert_eq!(hit.offset, 0);
        assert_eq!(hit.rooms, vec![RoomRange { start: 0x20, end: 0x30 }]);
        assert_eq!(hit.fault, Some(RoomListFault::Truncated { index: 1 }));
        assert!(!hit.header_zeroed);
        assert_eq!(blob[0], 0x04);
        assert_eq!(blob[0x10], 0xaa);
        assert!(blob[0x20..0x30].iter().all(|&b| b == 0));
        assert_eq!(blob[0x30], 0xaa);
        assert_eq!(report.render_text(), "00000000\n -> 00000020\n -> ERROR\n");
    }

    #[test]
    fn markers_without_start_commands_are_recorded() {
        let mut blob = vec![0u8; 0x40];
        put(&mut blob, 0x20, &END_MARKER);
        let report = find_scene_headers(&mut blob);
        assert_eq!(
            report.candidates,
            vec![Candidate::Rejected {
                marker: 0x20,
                rejection: Rejection::NoStartCommand
            }]
        );
    }
}
