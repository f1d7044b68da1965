//! Fixed-stride command streams.
//!
//! Scene and room headers, room lists and display lists are all sequences of
//! 8-byte records. A stream ends either at a terminator opcode or after a
//! known number of records.

use thiserror::Error;

use crate::segment::{SegmentAddress, read_u32};

/// Size of every header command and display list instruction.
pub const RECORD_SIZE: usize = 8;

/// Opcodes of the scene/room header command language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderCommand {
    SpawnList,
    ActorList,
    CollisionHeader,
    RoomList,
    RoomBehavior,
    Mesh,
    ObjectList,
    TransitionActors,
    End,
    SoundSettings,
    AlternateHeaders,
    /// Opcode the engine skips; used to switch records off in place.
    Disabled,
    Other(u8),
}

impl HeaderCommand {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => Self::SpawnList,
            0x01 => Self::ActorList,
            0x03 => Self::CollisionHeader,
            0x04 => Self::RoomList,
            0x08 => Self::RoomBehavior,
            0x0a => Self::Mesh,
            0x0b => Self::ObjectList,
            0x0e => Self::TransitionActors,
            0x14 => Self::End,
            0x15 => Self::SoundSettings,
            0x18 => Self::AlternateHeaders,
            0x1f => Self::Disabled,
            other => Self::Other(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::SpawnList => 0x00,
            Self::ActorList => 0x01,
            Self::CollisionHeader => 0x03,
            Self::RoomList => 0x04,
            Self::RoomBehavior => 0x08,
            Self::Mesh => 0x0a,
            Self::ObjectList => 0x0b,
            Self::TransitionActors => 0x0e,
            Self::End => 0x14,
            Self::SoundSettings => 0x15,
            Self::AlternateHeaders => 0x18,
            Self::Disabled => 0x1f,
            Self::Other(byte) => byte,
        }
    }
}

/// How a stream is bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Stop before the first record carrying this opcode.
    Terminator(u8),
    /// Visit exactly this many records.
    Count(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Summary of a finished walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Walk {
    pub visited: usize,
    /// Offset of the terminator record, or of the first record after the
    /// last one visited when the walk was stopped or count-bounded.
    pub end_offset: usize,
    pub terminated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("command stream at {base:#x} runs off the end of the buffer without a terminator")]
    Unterminated { base: usize },
    #[error("command stream at {base:#x} is truncated at record {index}")]
    Truncated { base: usize, index: usize },
}

/// Read-only view of one record.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    pub offset: usize,
    bytes: &'a [u8; RECORD_SIZE],
}

impl<'a> Record<'a> {
    pub fn opcode(&self) -> u8 {
        self.bytes[0]
    }

    pub fn command(&self) -> HeaderCommand {
        HeaderCommand::from_byte(self.bytes[0])
    }

    /// Byte 1, used as an entry count by most header commands.
    pub fn count(&self) -> u8 {
        self.bytes[1]
    }

    pub fn word(&self) -> u32 {
        read_u32(&self.bytes[..], 4).unwrap_or_default()
    }

    pub fn address(&self) -> SegmentAddress {
        SegmentAddress(self.word())
    }

    pub fn bytes(&self) -> &'a [u8; RECORD_SIZE] {
        self.bytes
    }
}

/// Mutable view of the record currently being visited.
#[derive(Debug)]
pub struct RecordMut<'a> {
    pub offset: usize,
    bytes: &'a mut [u8; RECORD_SIZE],
}

impl RecordMut<'_> {
    pub fn opcode(&self) -> u8 {
        self.bytes[0]
    }

    pub fn command(&self) -> HeaderCommand {
        HeaderCommand::from_byte(self.bytes[0])
    }

    pub fn count(&self) -> u8 {
        self.bytes[1]
    }

    pub fn address(&self) -> SegmentAddress {
        SegmentAddress(read_u32(&self.bytes[..], 4).unwrap_or_default())
    }

    pub fn set_opcode(&mut self, opcode: u8) {
        self.bytes[0] = opcode;
    }

    pub fn set_count(&mut self, count: u8) {
        self.bytes[1] = count;
    }

    pub fn bytes_mut(&mut self) -> &mut [u8; RECORD_SIZE] {
        &mut *self.bytes
    }
}

pub fn read_record(buffer: &[u8], offset: usize) -> Option<Record<'_>> {
    let slice = buffer.get(offset..offset.checked_add(RECORD_SIZE)?)?;
    let bytes = <&[u8; RECORD_SIZE]>::try_from(slice).ok()?;
    Some(Record { offset, bytes })
}

fn read_record_mut(buffer: &mut [u8], offset: usize) -> Option<RecordMut<'_>> {
    let slice = buffer.get_mut(offset..offset.checked_add(RECORD_SIZE)?)?;
    let bytes = <&mut [u8; RECORD_SIZE]>::try_from(slice).ok()?;
    Some(RecordMut { offset, bytes })
}

/// Visit records from `base` until `end`, letting the callback stop early.
pub fn walk<F>(buffer: &[u8], base: usize, end: StreamEnd, mut visit: F) -> Result<Walk, StreamError>
where
    F: FnMut(Record<'_>) -> Flow,
{
    let mut index = 0usize;
    loop {
        let offset = base + index * RECORD_SIZE;
        if let StreamEnd::Count(count) = end {
            if index == count {
                return Ok(Walk {
                    visited: index,
                    end_offset: offset,
                    terminated: false,
                });
            }
        }

        let record = read_record(buffer, offset).ok_or(match end {
            StreamEnd::Terminator(_) => StreamError::Unterminated { base },
            StreamEnd::Count(_) => StreamError::Truncated { base, index },
        })?;

        if end == StreamEnd::Terminator(record.opcode()) {
            return Ok(Walk {
                visited: index,
                end_offset: offset,
                terminated: true,
            });
        }

        index += 1;
        if visit(record) == Flow::Stop {
            return Ok(Walk {
                visited: index,
                end_offset: offset + RECORD_SIZE,
                terminated: false,
            });
        }
    }
}

/// Like [`walk`], but the callback may rewrite the current record in place
/// before the walker moves past it.
pub fn walk_mut<F>(
    buffer: &mut [u8],
    base: usize,
    end: StreamEnd,
    mut visit: F,
) -> Result<Walk, StreamError>
where
    F: FnMut(RecordMut<'_>) -> Flow,
{
    let mut index = 0usize;
    loop {
        let offset = base + index * RECORD_SIZE;
        if let StreamEnd::Count(count) = end {
            if index == count {
                return Ok(Walk {
                    visited: index,
                    end_offset: offset,
                    terminated: false,
                });
            }
        }

        let record = read_record_mut(buffer, offset).ok_or(match end {
            StreamEnd::Terminator(_) => StreamError::Unterminated { base },
            StreamEnd::Count(_) => StreamError::Truncated { base, index },
        })?;

        if end == StreamEnd::Terminator(record.opcode()) {
            return Ok(Walk {
                visited: index,
                end_offset: offset,
                terminated: true,
            });
        }

        index += 1;
        if visit(record) == Flow::Stop {
            return Ok(Walk {
                visited: index,
                end_offset: offset + RECORD_SIZE,
                terminated: false,
            });
        }
    }
}

/// First header command with the given opcode before the end marker.
pub fn find_command(
    buffer: &[u8],
    base: usize,
    command: HeaderCommand,
) -> Result<Option<Record<'_>>, StreamError> {
    let mut found = None;
    walk(buffer, base, StreamEnd::Terminator(HeaderCommand::End.to_byte()), |record| {
        if record.command() == command {
            found = Some(record.offset);
            Flow::Stop
        } else {
            Flow::Continue
        }
    })?;
    Ok(found.and_then(|offset| read_record(buffer, offset)))
}
