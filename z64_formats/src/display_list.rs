//! Display list patching for room geometry.
//!
//! Rooms in the dump carry F3DEX display lists. Each list is fixed up in
//! three steps: `G_TRI1` operands are moved into the layout the F3DEX2
//! encoder expects, the triangle section is re-encoded through a
//! [`MicrocodeTransform`], and the re-encoded list is walked once more to
//! switch off animated texture calls, swap quads for triangle pairs and
//! descend into nested lists.

use std::collections::HashSet;

use log::{debug, trace};

use crate::error::StructureError;
use crate::microcode::{Dialect, MicrocodeTransform};
use crate::segment::{Owner, Segment};
use crate::stream::{Flow, RECORD_SIZE, StreamEnd, StreamError, read_record, walk_mut};

/// Deepest chain of nested display list calls that will be followed.
pub const MAX_DEPTH: usize = 64;

/// F3DEX opcodes that matter before re-encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum F3dex {
    Tri1,
    EndDisplayList,
    Other(u8),
}

impl F3dex {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0xbf => Self::Tri1,
            0xb8 => Self::EndDisplayList,
            other => Self::Other(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::Tri1 => 0xbf,
            Self::EndDisplayList => 0xb8,
            Self::Other(byte) => byte,
        }
    }
}

/// F3DEX2 opcodes that matter after re-encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum F3dex2 {
    NoOp,
    Tri2,
    Quad,
    DisplayList,
    EndDisplayList,
    Other(u8),
}

impl F3dex2 {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => Self::NoOp,
            0x06 => Self::Tri2,
            0x07 => Self::Quad,
            0xde => Self::DisplayList,
            0xdf => Self::EndDisplayList,
            other => Self::Other(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::NoOp => 0x00,
            Self::Tri2 => 0x06,
            Self::Quad => 0x07,
            Self::DisplayList => 0xde,
            Self::EndDisplayList => 0xdf,
            Self::Other(byte) => byte,
        }
    }
}

/// Move the vertex indices of a `G_TRI1` from bytes 5..8 to 1..4.
pub fn normalize_tri1(record: &mut [u8; RECORD_SIZE]) {
    record.copy_within(5..8, 1);
    record[5..8].fill(0);
}

/// Recursive patcher over the display lists of one room buffer.
///
/// Lists reached more than once are only patched the first time.
pub struct DisplayListPatcher<'t> {
    transform: &'t dyn MicrocodeTransform,
    visited: HashSet<usize>,
}

impl<'t> DisplayListPatcher<'t> {
    pub fn new(transform: &'t dyn MicrocodeTransform) -> Self {
        Self {
            transform,
            visited: HashSet::new(),
        }
    }

    /// Number of distinct display lists patched so far.
    pub fn patched(&self) -> usize {
        self.visited.len()
    }

    /// Patch the list at `start` (already resolved into `room`) and every
    /// list it calls. `None` is accepted and ignored.
    pub fn patch(&mut self, room: &mut [u8], start: Option<usize>) -> Result<(), StructureError> {
        self.patch_at(room, start, 0)
    }

    fn patch_at(
        &mut self,
        room: &mut [u8],
        start: Option<usize>,
        depth: usize,
    ) -> Result<(), StructureError> {
        let Some(start) = start else {
            return Ok(());
        };
        if depth > MAX_DEPTH {
            return Err(StructureError::TooDeep(MAX_DEPTH));
        }
        if !self.visited.insert(start) {
            debug!("display list {start:#x} already patched");
            return Ok(());
        }

        let section_end = normalize_triangles(room, start)?;
        self.reencode(room, start, section_end)?;

        let owner = Owner::whole(room);
        let mut offset = start;
        loop {
            let record =
                read_record(room, offset).ok_or(StreamError::Unterminated { base: start })?;
            let continuation = record.count() != 0;
            let address = record.address();

            match F3dex2::from_byte(record.opcode()) {
                F3dex2::EndDisplayList => break,
                F3dex2::DisplayList => {
                    if address.segment_id() != Segment::Room.id() && address.offset() == 0 {
                        trace!("disabling animated texture call at {offset:#x}");
                        room[offset] = if continuation {
                            F3dex2::EndDisplayList.to_byte()
                        } else {
                            F3dex2::NoOp.to_byte()
                        };
                    }

                    let nested = owner.resolve(Segment::Room, address);
                    self.patch_at(room, nested, depth + 1)?;

                    // A branch that does not return ends this list.
                    if continuation {
                        break;
                    }
                }
                F3dex2::Quad => room[offset] = F3dex2::Tri2.to_byte(),
                F3dex2::NoOp | F3dex2::Tri2 | F3dex2::Other(_) => {}
            }

            offset += RECORD_SIZE;
        }

        Ok(())
    }

    fn reencode(&self, room: &mut [u8], start: usize, end: usize) -> Result<(), StructureError> {
        let section = &room[start..end];
        let converted = self
            .transform
            .reencode(Dialect::F3dex, section)
            .map_err(|source| StructureError::Reencode {
                offset: start,
                source,
            })?;

        if converted.len() != section.len() {
            return Err(StructureError::LengthMismatch {
                offset: start,
                expected: section.len(),
                actual: converted.len(),
            });
        }

        room[start..end].copy_from_slice(&converted);
        Ok(())
    }
}

/// Rewrite every `G_TRI1` up to the F3DEX end marker and return the offset
/// just past that marker.
fn normalize_triangles(room: &mut [u8], start: usize) -> Result<usize, StreamError> {
    let walk = walk_mut(
        room,
        start,
        StreamEnd::Terminator(F3dex::EndDisplayList.to_byte()),
        |mut record| {
            if F3dex::from_byte(record.opcode()) == F3dex::Tri1 {
                normalize_tri1(record.bytes_mut());
            }
            Flow::Continue
        },
    )?;
    Ok(walk.end_offset + RECORD_SIZE)
}

/// Patch a single display list tree inside `room`.
pub fn patch_display_list(
    room: &mut [u8],
    start: usize,
    transform: &dyn MicrocodeTransform,
) -> Result<usize, StructureError> {
    let mut patcher = DisplayListPatcher::new(transform);
    patcher.patch(room, Some(start))?;
    Ok(patcher.patched())
}
