use thiserror::Error;

use crate::microcode::TransformError;
use crate::stream::StreamError;

/// Reasons a single scene or room could not be rewritten. None of these
/// affect sibling structures.
#[derive(Debug, Error)]
pub enum StructureError {
    #[error("structure offset {offset:#010x} lies outside the {len:#x}-byte buffer")]
    OutOfBounds { offset: usize, len: usize },
    #[error("scene at {offset:#010x} has no usable room list")]
    MissingRoomList { offset: usize },
    #[error("scene at {offset:#010x} has no header bytes before its first room at {first_room:#x}")]
    EmptyScene { offset: usize, first_room: usize },
    #[error("room {index} has invalid range {start:#x}..{end:#x}")]
    BadRoomRange { index: usize, start: usize, end: usize },
    #[error("room has no mesh header command")]
    MissingMesh,
    #[error("{what} pointer {address:#010x} does not resolve")]
    BadPointer { what: &'static str, address: u32 },
    #[error("{what} at {offset:#x} extends past the end of its structure")]
    Truncated { what: &'static str, offset: usize },
    #[error("unsupported mesh header format {tag:#04x} at {offset:#x}")]
    UnsupportedMesh { offset: usize, tag: u8 },
    #[error("door stride {stride} is wider than a normalised door entry")]
    DoorStride { stride: usize },
    #[error("display lists nest deeper than {0} levels")]
    TooDeep(usize),
    #[error("re-encoding display list at {offset:#x} failed: {source}")]
    Reencode {
        offset: usize,
        #[source]
        source: TransformError,
    },
    #[error("re-encoded display list at {offset:#x} is {actual} bytes, expected {expected}")]
    LengthMismatch {
        offset: usize,
        expected: usize,
        actual: usize,
    },
    #[error("room {index}: {source}")]
    Room {
        index: usize,
        #[source]
        source: Box<StructureError>,
    },
    #[error(transparent)]
    Stream(#[from] StreamError),
}
