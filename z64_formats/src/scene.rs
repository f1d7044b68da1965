//! Scene extraction.
//!
//! A scene is cut out of the dump together with its rooms, patched for the
//! target engine and only then removed from the dump. Rooms are addressed by
//! absolute ranges in the scene's room list, and the scene itself is assumed
//! to end where its first room begins.

use log::{debug, info};
use serde::Serialize;

use crate::error::StructureError;
use crate::microcode::MicrocodeTransform;
use crate::room::{RoomOptions, RoomSummary, clear_actor_lists, convert_room};
use crate::scanner::RoomRange;
use crate::segment::{Owner, Segment, SegmentAddress, read_u16, read_u32, write_u16, write_u32};
use crate::stream::{Flow, HeaderCommand, StreamEnd, walk, walk_mut};

/// Size of a door (transition actor) entry in the target format.
pub const DOOR_STRIDE: usize = 16;
/// Size of a spawn point entry.
pub const LINK_STRIDE: usize = 16;

const DOOR_ACTOR: u16 = 0x0009;
const COLLISION_CLEARED_FIELDS: [usize; 3] = [0x20, 0x24, 0x28];
const LINK_VARIABLE: usize = 14;
const BROKEN_LINK_VARIABLE: u16 = 0x00ff;
const FIXED_LINK_VARIABLE: u16 = 0x0fff;

const END: StreamEnd = StreamEnd::Terminator(0x14);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Width of a door entry in the source scene. Zero means [`DOOR_STRIDE`].
    pub door_stride: usize,
    pub patch_scene: bool,
    pub patch_rooms: bool,
    pub convert_rooms: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            door_stride: DOOR_STRIDE,
            patch_scene: true,
            patch_rooms: true,
            convert_rooms: true,
        }
    }
}

/// What the scene patches changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScenePatches {
    pub disabled_commands: usize,
    pub doors: usize,
    pub links_fixed: usize,
    pub collision_cleared: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRoom {
    pub index: usize,
    pub range: RoomRange,
    pub data: Vec<u8>,
    /// Present when the room went through display list conversion.
    pub summary: Option<RoomSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedScene {
    pub offset: usize,
    /// Bytes the scene occupied in the dump.
    pub original_size: usize,
    /// The scene file, including any door list appended during patching.
    pub data: Vec<u8>,
    pub rooms: Vec<ExtractedRoom>,
    pub patches: ScenePatches,
}

#[derive(Debug, Default)]
struct HeaderPointers {
    links: Option<(u32, usize)>,
    doors: Option<(usize, usize)>,
    collision: Option<u32>,
    room_list: Option<(u32, usize)>,
}

/// Extract the scene at `offset` and its rooms from `rom`.
///
/// Everything is prepared on copies; `rom` is only modified (the scene and
/// each room zeroed) once the whole scene has been processed.
pub fn extract_scene(
    rom: &mut [u8],
    offset: usize,
    options: &ExtractOptions,
    transform: &dyn MicrocodeTransform,
) -> Result<ExtractedScene, StructureError> {
    if offset >= rom.len() {
        return Err(StructureError::OutOfBounds {
            offset,
            len: rom.len(),
        });
    }

    let pointers = collect_header_pointers(rom, offset)?;
    let ranges = read_room_list(rom, offset, &pointers)?;

    let first_room = ranges[0].start;
    let original_size = first_room
        .checked_sub(offset)
        .filter(|size| *size > 0)
        .ok_or(StructureError::EmptyScene { offset, first_room })?;
    debug!(
        "scene {offset:#010x}: {} room(s), {original_size:#x} header bytes",
        ranges.len()
    );

    let mut scene = rom[offset..first_room].to_vec();
    let mut patches = ScenePatches::default();
    if options.patch_scene {
        patches.disabled_commands = disable_alternate_headers(&mut scene)?;
    }

    let mut rooms = Vec::with_capacity(ranges.len());
    for (index, range) in ranges.into_iter().enumerate() {
        let room = extract_room(rom, index, range, options, transform)
            .map_err(|source| StructureError::Room {
                index,
                source: Box::new(source),
            })?;
        rooms.push(room);
    }

    if options.patch_scene {
        if let Some(raw) = pointers.collision {
            patches.collision_cleared = clear_collision_extras(&mut scene, raw)?;
        }
        if let Some((raw, count)) = pointers.links {
            patches.links_fixed = fix_link_variables(&mut scene, raw, count)?;
        }
        if let Some((command, count)) = pointers.doors {
            patches.doors = normalize_doors(&mut scene, command, count, options.door_stride)?;
        }
    }

    for room in &rooms {
        rom[room.range.range()].fill(0);
    }
    rom[offset..offset + original_size].fill(0);

    info!(
        "extracted scene {offset:#010x}: {} bytes, {} room(s)",
        scene.len(),
        rooms.len()
    );

    Ok(ExtractedScene {
        offset,
        original_size,
        data: scene,
        rooms,
        patches,
    })
}

fn collect_header_pointers(rom: &[u8], offset: usize) -> Result<HeaderPointers, StructureError> {
    let mut pointers = HeaderPointers::default();
    walk(rom, offset, END, |record| {
        let count = usize::from(record.count());
        match record.command() {
            HeaderCommand::SpawnList => pointers.links = Some((record.word(), count)),
            HeaderCommand::TransitionActors => {
                pointers.doors = Some((record.offset - offset, count));
            }
            HeaderCommand::CollisionHeader => pointers.collision = Some(record.word()),
            HeaderCommand::RoomList if pointers.room_list.is_none() => {
                pointers.room_list = Some((record.word(), count));
            }
            _ => {}
        }
        Flow::Continue
    })?;
    Ok(pointers)
}

fn read_room_list(
    rom: &[u8],
    offset: usize,
    pointers: &HeaderPointers,
) -> Result<Vec<RoomRange>, StructureError> {
    let missing = StructureError::MissingRoomList { offset };
    let (raw, count) = match pointers.room_list {
        Some((raw, count)) if count > 0 => (raw, count),
        _ => return Err(missing),
    };
    let list = Owner::new(offset, rom.len())
        .resolve(Segment::Scene, SegmentAddress(raw))
        .ok_or(missing)?;

    let mut entries = Vec::with_capacity(count);
    walk(rom, list, StreamEnd::Count(count), |record| {
        let bytes = record.bytes();
        entries.push((
            read_u32(bytes, 0).unwrap_or_default() as usize,
            read_u32(bytes, 4).unwrap_or_default() as usize,
        ));
        Flow::Continue
    })?;

    entries
        .into_iter()
        .enumerate()
        .map(|(index, (start, end))| {
            if start > end || end > rom.len() {
                Err(StructureError::BadRoomRange { index, start, end })
            } else {
                Ok(RoomRange { start, end })
            }
        })
        .collect()
}

fn extract_room(
    rom: &[u8],
    index: usize,
    range: RoomRange,
    options: &ExtractOptions,
    transform: &dyn MicrocodeTransform,
) -> Result<ExtractedRoom, StructureError> {
    let mut data = rom[range.range()].to_vec();
    let summary = if options.convert_rooms {
        let room_options = RoomOptions {
            clear_actor_lists: options.patch_rooms,
        };
        Some(convert_room(&mut data, transform, room_options)?)
    } else {
        if options.patch_rooms {
            clear_actor_lists(&mut data)?;
        }
        None
    };
    Ok(ExtractedRoom {
        index,
        range,
        data,
        summary,
    })
}

fn disable_alternate_headers(scene: &mut [u8]) -> Result<usize, StructureError> {
    let mut disabled = 0;
    walk_mut(scene, 0, END, |mut record| {
        if record.command() == HeaderCommand::AlternateHeaders {
            record.set_opcode(HeaderCommand::Disabled.to_byte());
            disabled += 1;
        }
        Flow::Continue
    })?;
    Ok(disabled)
}

/// Zero the camera data and water box fields of the collision header.
fn clear_collision_extras(scene: &mut [u8], raw: u32) -> Result<bool, StructureError> {
    let Some(header) = Owner::whole(scene).resolve(Segment::Scene, SegmentAddress(raw)) else {
        return Ok(false);
    };
    for field in COLLISION_CLEARED_FIELDS {
        write_u32(scene, header + field, 0).ok_or(StructureError::Truncated {
            what: "collision header",
            offset: header,
        })?;
    }
    Ok(true)
}

fn fix_link_variables(scene: &mut [u8], raw: u32, count: usize) -> Result<usize, StructureError> {
    let Some(list) = Owner::whole(scene).resolve(Segment::Scene, SegmentAddress(raw)) else {
        return Ok(0);
    };
    let mut fixed = 0;
    for index in 0..count {
        let at = list + index * LINK_STRIDE + LINK_VARIABLE;
        let truncated = || StructureError::Truncated {
            what: "spawn list",
            offset: list,
        };
        if read_u16(scene, at).ok_or_else(truncated)? == BROKEN_LINK_VARIABLE {
            write_u16(scene, at, FIXED_LINK_VARIABLE).ok_or_else(truncated)?;
            fixed += 1;
        }
    }
    Ok(fixed)
}

/// Rewrite the door list referenced by the transition actor command at
/// `command` into 16-byte entries with the generic door actor.
///
/// Lists that already use 16-byte entries are rewritten in place; narrower
/// ones are appended to the end of the scene and the command is pointed at
/// the copy.
pub fn normalize_doors(
    scene: &mut Vec<u8>,
    command: usize,
    count: usize,
    stride: usize,
) -> Result<usize, StructureError> {
    let stride = if stride == 0 { DOOR_STRIDE } else { stride };
    if stride > DOOR_STRIDE {
        return Err(StructureError::DoorStride { stride });
    }
    if count == 0 {
        return Ok(0);
    }

    let field = command + 4;
    let raw = read_u32(scene, field).ok_or(StructureError::Truncated {
        what: "transition actor command",
        offset: command,
    })?;
    let list = Owner::whole(scene)
        .resolve(Segment::Scene, SegmentAddress(raw))
        .ok_or(StructureError::BadPointer {
            what: "door list",
            address: raw,
        })?;
    let old = scene
        .get(list..list + count * stride)
        .ok_or(StructureError::Truncated {
            what: "door list",
            offset: list,
        })?;

    let mut doors = Vec::with_capacity(count * DOOR_STRIDE);
    for (index, entry) in old.chunks_exact(stride).enumerate() {
        let mut door = [0u8; DOOR_STRIDE];
        door[..stride].copy_from_slice(entry);
        let truncated = || StructureError::Truncated {
            what: "door entry",
            offset: list + index * stride,
        };
        write_u16(&mut door, 4, DOOR_ACTOR).ok_or_else(truncated)?;
        write_u16(&mut door, 14, 0).ok_or_else(truncated)?;
        doors.extend_from_slice(&door);
    }

    if stride == DOOR_STRIDE {
        scene[list..list + doors.len()].copy_from_slice(&doors);
    } else {
        let appended = SegmentAddress::new(Segment::Scene, scene.len());
        write_u32(scene, field, appended.0).ok_or(StructureError::Truncated {
            what: "transition actor command",
            offset: command,
        })?;
        debug!("door list moved from {list:#x} to {:#x}", scene.len());
        scene.extend_from_slice(&doors);
    }
    Ok(count)
}
