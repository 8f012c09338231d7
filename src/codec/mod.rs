//! # Compact Sequence Codecs
//!
//! This module holds the three codecs at the core of the crate:
//!
//! 1. [`NucleotideCodec`] - bit-packed nucleotide sequences with a gap
//!    side channel and random access by index.
//!
//! 2. [`RunLengthCodec`] - guard-byte run-length encoding for quality
//!    values and other byte streams with long plateaus.
//!
//! 3. [`DeltaCodec`] - k-th order differential encoding (levels 1-3) over
//!    byte/short/int lanes, byte-compatible with the ZTR trace format.
//!
//! Every encoded form starts with a fixed header carrying the decoded
//! length, so `decoded_length_of` never requires a full decode. All
//! multi-byte fields are big-endian, matching the trace formats the codecs
//! feed (ZTR, SFF, SCF).
//!
//! Encoding is deterministic: one input, one byte image. Encoded sequences
//! are therefore usable as hash/equality keys.

mod delta;
mod nucleotide;
mod runlength;

pub use delta::{DeltaCodec, Lane, Level};
pub use nucleotide::{EncodedNucleotides, NucleotideCodec};
pub use runlength::{RunLengthCodec, DEFAULT_GUARD};

use byteorder::{BigEndian, ByteOrder};

use crate::error::{CodecError, Result};

/// Storage width of one side-channel offset entry.
///
/// Offset lists are stored at the narrowest width that holds their largest
/// value, so short sequences spend one byte per gap while long ones can
/// still address any position.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum OffsetWidth {
    /// Offsets stored as `u8` (max offset 255).
    Byte = 1,
    /// Offsets stored as big-endian `u16` (max offset 65535).
    Short = 2,
    /// Offsets stored as big-endian `u32`.
    Int = 4,
}

impl OffsetWidth {
    /// Picks the narrowest width that can store `max_offset`.
    #[must_use]
    pub fn for_max_offset(max_offset: u32) -> Self {
        if max_offset <= u32::from(u8::MAX) {
            Self::Byte
        } else if max_offset <= u32::from(u16::MAX) {
            Self::Short
        } else {
            Self::Int
        }
    }

    /// Parses the width selector byte of an encoded header.
    pub fn from_selector(selector: u8) -> Result<Self> {
        match selector {
            1 => Ok(Self::Byte),
            2 => Ok(Self::Short),
            4 => Ok(Self::Int),
            _ => Err(CodecError::InvalidOffsetWidth(selector).into()),
        }
    }

    /// The width in bytes.
    #[must_use]
    pub const fn size(self) -> usize {
        self as usize
    }

    /// Reads the offset at list position `idx` from an offset section.
    #[must_use]
    pub fn read_offset(self, section: &[u8], idx: usize) -> u32 {
        let at = idx * self.size();
        match self {
            Self::Byte => u32::from(section[at]),
            Self::Short => u32::from(BigEndian::read_u16(&section[at..at + 2])),
            Self::Int => BigEndian::read_u32(&section[at..at + 4]),
        }
    }

    /// Appends one offset to an output buffer at this width.
    pub fn write_offset(self, out: &mut Vec<u8>, offset: u32) {
        match self {
            Self::Byte => out.push(offset as u8),
            Self::Short => {
                let mut buf = [0u8; 2];
                BigEndian::write_u16(&mut buf, offset as u16);
                out.extend_from_slice(&buf);
            }
            Self::Int => {
                let mut buf = [0u8; 4];
                BigEndian::write_u32(&mut buf, offset);
                out.extend_from_slice(&buf);
            }
        }
    }
}

#[cfg(test)]
mod testing {
    use super::*;

    #[test]
    fn width_promotion() {
        assert_eq!(OffsetWidth::for_max_offset(0), OffsetWidth::Byte);
        assert_eq!(OffsetWidth::for_max_offset(255), OffsetWidth::Byte);
        assert_eq!(OffsetWidth::for_max_offset(256), OffsetWidth::Short);
        assert_eq!(OffsetWidth::for_max_offset(65535), OffsetWidth::Short);
        assert_eq!(OffsetWidth::for_max_offset(65536), OffsetWidth::Int);
    }

    #[test]
    fn selector_round_trip() {
        for width in [OffsetWidth::Byte, OffsetWidth::Short, OffsetWidth::Int] {
            assert_eq!(OffsetWidth::from_selector(width as u8).unwrap(), width);
        }
        assert!(OffsetWidth::from_selector(0).is_err());
        assert!(OffsetWidth::from_selector(3).is_err());
    }

    #[test]
    fn offset_round_trip_at_each_width() {
        for (width, offset) in [
            (OffsetWidth::Byte, 200u32),
            (OffsetWidth::Short, 40_000),
            (OffsetWidth::Int, 70_000),
        ] {
            let mut out = Vec::new();
            width.write_offset(&mut out, 17);
            width.write_offset(&mut out, offset);
            assert_eq!(out.len(), 2 * width.size());
            assert_eq!(width.read_offset(&out, 0), 17);
            assert_eq!(width.read_offset(&out, 1), offset);
        }
    }
}
