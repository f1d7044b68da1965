//! Segmented addressing.
//!
//! Every pointer stored inside a scene or room is a 32-bit big-endian word:
//! the top byte names a segment and the low 24 bits are an offset from the
//! base of whichever structure owns that segment. Only the scene (0x02) and
//! room (0x03) segments are meaningful here; anything else is ignored.

use byteorder::{BigEndian, ByteOrder};
use serde::Serialize;

/// Segments that a structure can own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum Segment {
    Scene = 0x02,
    Room = 0x03,
}

impl Segment {
    pub fn id(self) -> u8 {
        self as u8
    }
}

/// Raw segmented address as stored in the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentAddress(pub u32);

impl SegmentAddress {
    pub const NULL: SegmentAddress = SegmentAddress(0);

    pub fn new(segment: Segment, offset: usize) -> Self {
        SegmentAddress((u32::from(segment.id()) << 24) | (offset as u32 & 0x00ff_ffff))
    }

    pub fn read(bytes: &[u8], at: usize) -> Option<Self> {
        read_u32(bytes, at).map(SegmentAddress)
    }

    pub fn segment_id(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn offset(self) -> usize {
        (self.0 & 0x00ff_ffff) as usize
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Non-owning handle on the structure a segment is relative to.
///
/// `base` is where the structure starts inside its buffer and `limit` is the
/// first offset that may not be dereferenced (normally the buffer length).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub base: usize,
    pub limit: usize,
}

impl Owner {
    pub fn new(base: usize, limit: usize) -> Self {
        Self { base, limit }
    }

    /// Owner spanning a whole standalone buffer.
    pub fn whole(buffer: &[u8]) -> Self {
        Self {
            base: 0,
            limit: buffer.len(),
        }
    }

    pub fn resolve(&self, segment: Segment, address: SegmentAddress) -> Option<usize> {
        if address.is_null() || address.segment_id() != segment.id() {
            return None;
        }
        let target = self.base.checked_add(address.offset())?;
        (target < self.limit).then_some(target)
    }

    /// Resolve the address stored at `at` inside `buffer`.
    pub fn resolve_at(&self, buffer: &[u8], segment: Segment, at: usize) -> Option<usize> {
        SegmentAddress::read(buffer, at).and_then(|address| self.resolve(segment, address))
    }
}

/// Resolve `raw` against an optional owner. An unset owner, a null address,
/// a foreign segment or an out-of-bounds target all resolve to `None`.
pub fn resolve(owner: Option<Owner>, segment: Segment, raw: u32) -> Option<usize> {
    owner?.resolve(segment, SegmentAddress(raw))
}

pub fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    bytes.get(at..at.checked_add(2)?).map(BigEndian::read_u16)
}

pub fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    bytes.get(at..at.checked_add(4)?).map(BigEndian::read_u32)
}

pub fn write_u16(bytes: &mut [u8], at: usize, value: u16) -> Option<()> {
    let field = bytes.get_mut(at..at.checked_add(2)?)?;
    BigEndian::write_u16(field, value);
    Some(())
}

pub fn write_u32(bytes: &mut [u8], at: usize, value: u32) -> Option<()> {
    let field = bytes.get_mut(at..at.checked_add(4)?)?;
    BigEndian::write_u32(field, value);
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_in_domain_addresses_relative_to_owner() {
        let owner = Owner::new(0x40, 0x1000);
        assert_eq!(owner.resolve(Segment::Scene, SegmentAddress(0x0200_0120)), Some(0x160));
        assert_eq!(resolve(Some(owner), Segment::Scene, 0x0200_0000), Some(0x40));
    }

    #[test]
    fn foreign_segments_and_null_are_absent() {
        let owner = Owner::new(0, 0x1000);
        for raw in [0u32, 0x0300_0010, 0x0800_0000, 0x0100_0010, 0xff00_0010] {
            assert_eq!(resolve(Some(owner), Segment::Scene, raw), None, "{raw:#010x}");
        }
        assert_eq!(resolve(Some(owner), Segment::Room, 0x0200_0010), None);
        assert_eq!(resolve(None, Segment::Scene, 0x0200_0010), None);
    }

    #[test]
    fn out_of_bounds_targets_are_absent() {
        let owner = Owner::new(0xf00, 0x1000);
        assert_eq!(owner.resolve(Segment::Room, SegmentAddress(0x0300_00ff)), Some(0xfff));
        assert_eq!(owner.resolve(Segment::Room, SegmentAddress(0x0300_0100)), None);
        assert_eq!(owner.resolve(Segment::Room, SegmentAddress(0x03ff_ffff)), None);
    }

    #[test]
    fn every_in_bounds_offset_maps_to_base_plus_offset() {
        let owner = Owner::new(0x10, 0x210);
        for offset in (0..0x200).step_by(7) {
            let raw = 0x0200_0000 | offset as u32;
            assert_eq!(resolve(Some(owner), Segment::Scene, raw), Some(0x10 + offset));
        }
    }

    #[test]
    fn big_endian_helpers_refuse_short_reads() {
        let mut bytes = [0x12, 0x34, 0x56, 0x78, 0x9a];
        assert_eq!(read_u32(&bytes, 0), Some(0x1234_5678));
        assert_eq!(read_u32(&bytes, 2), None);
        assert_eq!(read_u16(&bytes, 3), Some(0x789a));
        assert_eq!(write_u16(&mut bytes, 4, 1), None);
        write_u32(&mut bytes, 1, 0xdead_beef).unwrap();
        assert_eq!(bytes, [0x12, 0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(SegmentAddress::new(Segment::Room, 0x1234).0, 0x0300_1234);
    }
}
