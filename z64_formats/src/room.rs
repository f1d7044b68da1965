//! Room conversion.
//!
//! A room header is a command stream ending in `0x14`. Its mesh command
//! points at one of three mesh header layouts, each of which lists the
//! display lists that draw the room.

use log::{debug, info};
use serde::Serialize;

use crate::display_list::DisplayListPatcher;
use crate::error::StructureError;
use crate::microcode::MicrocodeTransform;
use crate::segment::{Owner, Segment, SegmentAddress, write_u32};
use crate::stream::{Flow, HeaderCommand, StreamEnd, StreamError, find_command, walk_mut};

const END: StreamEnd = StreamEnd::Terminator(0x14);

/// Mesh header layouts, tagged by their first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MeshHeader {
    /// 8-byte entries between a start and end pointer, lists at +0 and +4.
    Simple,
    /// 4-byte entries from a start pointer until an entry starting with 0.
    Image,
    /// 16-byte entries between a start and end pointer, lists at +8 and +12.
    Culled,
}

impl MeshHeader {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x00 => Some(Self::Simple),
            0x01 => Some(Self::Image),
            0x02 => Some(Self::Culled),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Self::Simple => 0x00,
            Self::Image => 0x01,
            Self::Culled => 0x02,
        }
    }

    pub fn entry_size(self) -> usize {
        match self {
            Self::Simple => 8,
            Self::Image => 4,
            Self::Culled => 16,
        }
    }

    fn display_list_fields(self) -> &'static [usize] {
        match self {
            Self::Simple => &[0, 4],
            Self::Image => &[0],
            Self::Culled => &[8, 12],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoomOptions {
    /// Zero the entry counts of actor and object lists.
    pub clear_actor_lists: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoomSummary {
    pub mesh: MeshHeader,
    pub entries: usize,
    pub display_lists: usize,
    pub disabled_commands: usize,
    pub cleared_lists: usize,
}

/// Switch off alternate headers and the room behavior command.
pub fn disable_unsupported_commands(room: &mut [u8]) -> Result<usize, StreamError> {
    let mut disabled = 0;
    walk_mut(room, 0, END, |mut record| {
        if matches!(
            record.command(),
            HeaderCommand::AlternateHeaders | HeaderCommand::RoomBehavior
        ) {
            record.set_opcode(HeaderCommand::Disabled.to_byte());
            disabled += 1;
        }
        Flow::Continue
    })?;
    Ok(disabled)
}

/// Empty every actor and object list in the room header.
pub fn clear_actor_lists(room: &mut [u8]) -> Result<usize, StreamError> {
    let mut cleared = 0;
    walk_mut(room, 0, END, |mut record| {
        if matches!(
            record.command(),
            HeaderCommand::ActorList | HeaderCommand::ObjectList
        ) {
            record.set_count(0);
            cleared += 1;
        }
        Flow::Continue
    })?;
    Ok(cleared)
}

/// Convert a room in place. On error `room` is left untouched.
pub fn convert_room(
    room: &mut [u8],
    transform: &dyn MicrocodeTransform,
    options: RoomOptions,
) -> Result<RoomSummary, StructureError> {
    let mut staged = room.to_vec();
    let summary = convert_staged(&mut staged, transform, options)?;
    room.copy_from_slice(&staged);
    info!(
        "converted {:?} room: {} entries, {} display lists",
        summary.mesh, summary.entries, summary.display_lists
    );
    Ok(summary)
}

fn convert_staged(
    room: &mut [u8],
    transform: &dyn MicrocodeTransform,
    options: RoomOptions,
) -> Result<RoomSummary, StructureError> {
    let disabled_commands = disable_unsupported_commands(room)?;
    let cleared_lists = if options.clear_actor_lists {
        clear_actor_lists(room)?
    } else {
        0
    };

    let mesh_record = find_command(room, 0, HeaderCommand::Mesh)?.ok_or(StructureError::MissingMesh)?;
    let raw = mesh_record.word();
    let owner = Owner::whole(room);
    let header = owner
        .resolve(Segment::Room, SegmentAddress(raw))
        .ok_or(StructureError::BadPointer {
            what: "mesh header",
            address: raw,
        })?;
    let tag = room[header];
    let mesh = MeshHeader::from_tag(tag).ok_or(StructureError::UnsupportedMesh {
        offset: header,
        tag,
    })?;
    debug!("mesh header {mesh:?} at {header:#x}");

    let mut patcher = DisplayListPatcher::new(transform);
    let entries = match mesh {
        MeshHeader::Image => patch_terminated_entries(room, owner, header, &mut patcher)?,
        MeshHeader::Simple | MeshHeader::Culled => {
            patch_ranged_entries(room, owner, mesh, header, raw, &mut patcher)?
        }
    };

    Ok(RoomSummary {
        mesh,
        entries,
        display_lists: patcher.patched(),
        disabled_commands,
        cleared_lists,
    })
}

fn patch_ranged_entries(
    room: &mut [u8],
    owner: Owner,
    mesh: MeshHeader,
    header: usize,
    raw: u32,
    patcher: &mut DisplayListPatcher<'_>,
) -> Result<usize, StructureError> {
    if header + 12 > room.len() {
        return Err(StructureError::Truncated {
            what: "mesh header",
            offset: header,
        });
    }

    let Some(start) = owner.resolve_at(room, Segment::Room, header + 4) else {
        return Ok(0);
    };
    // Some rooms ship without a usable end pointer; the entries then run up
    // to the mesh header, and the field is pointed there too.
    let end = match owner.resolve_at(room, Segment::Room, header + 8) {
        Some(end) if end >= start => end,
        _ => {
            debug!("mesh header at {header:#x} has no end pointer, using the header itself");
            write_u32(room, header + 8, raw).ok_or(StructureError::Truncated {
                what: "mesh header",
                offset: header,
            })?;
            header
        }
    };

    let stride = mesh.entry_size();
    let mut entries = 0;
    let mut entry = start;
    while entry < end {
        if entry + stride > room.len() {
            return Err(StructureError::Truncated {
                what: "mesh entry",
                offset: entry,
            });
        }
        for field in mesh.display_list_fields() {
            let list = owner.resolve_at(room, Segment::Room, entry + field);
            patcher.patch(room, list)?;
        }
        entries += 1;
        entry += stride;
    }
    Ok(entries)
}

fn patch_terminated_entries(
    room: &mut [u8],
    owner: Owner,
    header: usize,
    patcher: &mut DisplayListPatcher<'_>,
) -> Result<usize, StructureError> {
    let Some(mut entry) = owner.resolve_at(room, Segment::Room, header + 4) else {
        return Ok(0);
    };

    let mut entries = 0;
    while room[entry] != 0 {
        if entry + MeshHeader::Image.entry_size() > room.len() {
            return Err(StructureError::Truncated {
                what: "mesh entry",
                offset: entry,
            });
        }
        let list = owner.resolve_at(room, Segment::Room, entry);
        patcher.patch(room, list)?;
        entries += 1;
        entry += MeshHeader::Image.entry_size();
        if entry >= room.len() {
            return Err(StructureError::Truncated {
                what: "mesh entry list",
                offset: entry,
            });
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display_list::tests::EndMarkerSwap;
    use crate::microcode::{Dialect, TransformError};

    struct Broken;

    impl MicrocodeTransform for Broken {
        fn reencode(&self, _from: Dialect, _section: &[u8]) -> Result<Vec<u8>, TransformError> {
            Err(TransformError::Empty)
        }
    }

    fn put(room: &mut [u8], at: usize, bytes: &[u8]) {
        room[at..at + bytes.len()].copy_from_slice(bytes);
    }

    /// Header commands at 0, mesh header at 0x40, one display list at 0x60.
    fn room_with_mesh(mesh: &[u8]) -> Vec<u8> {
        let mut room = vec![0u8; 0x70];
        put(&mut room, 0x00, &[0x18, 0, 0, 0, 0x03, 0, 0, 0x28]);
        put(&mut room, 0x08, &[0x08, 0, 0, 0, 0, 0, 0x01, 0x01]);
        put(&mut room, 0x10, &[0x01, 0x03, 0, 0, 0x03, 0, 0, 0x30]);
        put(&mut room, 0x18, &[0x0a, 0, 0, 0, 0x03, 0, 0, 0x40]);
        put(&mut room, 0x20, &[0x14, 0, 0, 0, 0, 0, 0, 0]);
        put(&mut room, 0x40, mesh);
        put(&mut room, 0x60, &[0xbf, 0, 0, 0, 0, 0x02, 0x04, 0x06]);
        put(&mut room, 0x68, &[0xb8, 0, 0, 0, 0, 0, 0, 0]);
        room
    }

    fn simple_room() -> Vec<u8> {
        let mut room = room_with_mesh(&[0x00, 0x01, 0, 0, 0x03, 0, 0, 0x50, 0x03, 0, 0, 0x58]);
        put(&mut room, 0x50, &[0x03, 0, 0, 0x60, 0, 0, 0, 0]);
        room
    }

    #[test]
    fn converts_simple_mesh_rooms() {
        let mut room = simple_room();
        let summary = convert_room(&mut room, &EndMarkerSwap, RoomOptions::default()).unwrap();

        assert_eq!(
            summary,
            RoomSummary {
                mesh: MeshHeader::Simple,
                entries: 1,
                display_lists: 1,
                disabled_commands: 2,
                cleared_lists: 0,
            }
        );
        assert_eq!(room[0x00], 0x1f);
        assert_eq!(room[0x08], 0x1f);
        assert_eq!(room[0x11], 0x03);
        assert_eq!(&room[0x60..0x68], &[0xbf, 0x02, 0x04, 0x06, 0, 0, 0, 0]);
        assert_eq!(room[0x68], 0xdf);
    }

    #[test]
    fn actor_lists_are_cleared_on_request() {
        let mut room = simple_room();
        // move the end marker behind an object list
        put(&mut room, 0x20, &[0x0b, 0x02, 0, 0, 0x03, 0, 0, 0x38]);
        put(&mut room, 0x28, &[0x14, 0, 0, 0, 0, 0, 0, 0]);
        let options = RoomOptions {
            clear_actor_lists: true,
        };
        let summary = convert_room(&mut room, &EndMarkerSwap, options).unwrap();
        assert_eq!(summary.cleared_lists, 2);
        assert_eq!(room[0x11], 0);
        assert_eq!(room[0x21], 0);
    }

    #[test]
    fn missing_end_pointer_falls_back_to_the_mesh_header() {
        let mut room = room_with_mesh(&[0x00, 0x02, 0, 0, 0x03, 0, 0, 0x30, 0, 0, 0, 0]);
        put(&mut room, 0x30, &[0x03, 0, 0, 0x60, 0, 0, 0, 0]);
        let summary = convert_room(&mut room, &EndMarkerSwap, RoomOptions::default()).unwrap();
        assert_eq!(summary.entries, 2);
        assert_eq!(summary.display_lists, 1);
        assert_eq!(&room[0x48..0x4c], &[0x03, 0, 0, 0x40]);
    }

    #[test]
    fn image_mesh_entries_stop_at_a_zero_byte() {
        let mut room = room_with_mesh(&[0x01, 0x01, 0, 0, 0x03, 0, 0, 0x50]);
        put(&mut room, 0x50, &[0x03, 0, 0, 0x60, 0, 0, 0, 0]);
        let summary = convert_room(&mut room, &EndMarkerSwap, RoomOptions::default()).unwrap();
        assert_eq!(summary.mesh, MeshHeader::Image);
        assert_eq!(summary.entries, 1);
        assert_eq!(room[0x68], 0xdf);
    }

    #[test]
    fn culled_mesh_reads_lists_from_the_second_half() {
        let mut room = room_with_mesh(&[0x02, 0x01, 0, 0, 0x03, 0, 0, 0x50, 0x03, 0, 0, 0x60]);
        put(&mut room, 0x50, &[0x03, 0, 0, 0x60, 0, 0, 0, 0]);
        put(&mut room, 0x58, &[0, 0, 0, 0, 0x03, 0, 0, 0x60]);
        let summary = convert_room(&mut room, &EndMarkerSwap, RoomOptions::default()).unwrap();
        assert_eq!(summary.mesh, MeshHeader::Culled);
        assert_eq!(summary.entries, 1);
        assert_eq!(summary.display_lists, 1);
    }

    #[test]
    fn failures_leave_the_room_untouched() {
        let pristine = room_with_mesh(&[0x05, 0, 0, 0, 0, 0, 0, 0]);
        let mut room = pristine.clone();
        let err = convert_room(&mut room, &EndMarkerSwap, RoomOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            StructureError::UnsupportedMesh {
                offset: 0x40,
                tag: 0x05
            }
        ));
        assert_eq!(room, pristine);

        let pristine = simple_room();
        let mut room = pristine.clone();
        let err = convert_room(&mut room, &Broken, RoomOptions::default()).unwrap_err();
        assert!(matches!(err, StructureError::Reencode { offset: 0x60, .. }));
        assert_eq!(room, pristine);
    }

    #[test]
    fn mesh_command_must_exist_and_resolve() {
        let mut room = simple_room();
        put(&mut room, 0x18, &[0x15, 0, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(
            convert_room(&mut room, &EndMarkerSwap, RoomOptions::default()),
            Err(StructureError::MissingMesh)
        ));

        let mut room = simple_room();
        put(&mut room, 0x18, &[0x0a, 0, 0, 0, 0x02, 0, 0, 0x40]);
        assert!(matches!(
            convert_room(&mut room, &EndMarkerSwap, RoomOptions::default()),
            Err(StructureError::BadPointer {
                what: "mesh header",
                address: 0x0200_0040
            })
        ));
    }

    #[test]
    fn mesh_tags_round_trip() {
        for mesh in [MeshHeader::Simple, MeshHeader::Image, MeshHeader::Culled] {
            assert_eq!(MeshHeader::from_tag(mesh.tag()), Some(mesh));
        }
        assert_eq!(MeshHeader::from_tag(0x03), None);
    }
}
