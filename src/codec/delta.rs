//! # Delta/Differential Codec
//!
//! K-th order differential encoding over fixed-width integer lanes, byte
//! compatible with the ZTR trace format's delta chunks. Peak positions and
//! sample curves are smooth, so storing each value's distance from a
//! polynomial prediction of its predecessors concentrates the payload near
//! zero and sets it up for the run-length stage that usually follows.
//!
//! ```text
//! +------------+----------+-----------------+-------------------------+
//! | format u8  | level u8 | pad (int only)  | lane-width deltas (BE)  |
//! +------------+----------+-----------------+-------------------------+
//! ```
//!
//! The format byte is 64, 65, or 66 for byte, short, and int lanes. The int
//! lane carries two pad bytes so its payload starts on a 4-byte boundary
//! from the format byte; the pad holds no data but the historical format
//! requires it, so both sides reproduce it exactly.
//!
//! All arithmetic wraps at the lane width. Two's-complement wrapping makes
//! the signed and unsigned readings of a lane agree, so round-trips hold for
//! any input bytes, monotone or not.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{CodecError, Result};

/// Order of the finite-difference predictor.
///
/// The level selects how many prior decoded values feed the prediction:
///
/// - `One`: `delta = v[i-1]`
/// - `Two`: `delta = 2*v[i-1] - v[i-2]`
/// - `Three`: `delta = 3*v[i-1] - 3*v[i-2] + v[i-3]`
///
/// History is seeded with zeros, so sequences shorter than the level still
/// encode and decode.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Level {
    /// First-order differences.
    One = 1,
    /// Second-order differences.
    Two = 2,
    /// Third-order differences.
    Three = 3,
}

impl Level {
    /// Creates a level from its wire value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidDeltaLevel`] for anything outside 1-3.
    pub fn new(level: u8) -> Result<Self> {
        match level {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            3 => Ok(Self::Three),
            _ => Err(CodecError::InvalidDeltaLevel(level).into()),
        }
    }

    /// Predicts the next value from up to three predecessors, newest first.
    ///
    /// Wrapping arithmetic; the caller masks the result to its lane width.
    fn predict(self, history: &[u32; 3]) -> u32 {
        match self {
            Self::One => history[0],
            Self::Two => history[0].wrapping_mul(2).wrapping_sub(history[1]),
            Self::Three => history[0]
                .wrapping_sub(history[1])
                .wrapping_mul(3)
                .wrapping_add(history[2]),
        }
    }
}

/// The fixed integer width a delta payload is interpreted in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Lane {
    /// One byte per value, format tag 64.
    Byte,
    /// Big-endian `u16` values, format tag 65.
    Short,
    /// Big-endian `u32` values, format tag 66.
    Int,
}

impl Lane {
    /// Creates a lane from a delta format tag (64, 65, or 66).
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            64 => Ok(Self::Byte),
            65 => Ok(Self::Short),
            66 => Ok(Self::Int),
            _ => Err(CodecError::UnknownFormatTag(tag).into()),
        }
    }

    /// The wire format tag for this lane.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Byte => 64,
            Self::Short => 65,
            Self::Int => 66,
        }
    }

    /// Width of one value in bytes.
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Short => 2,
            Self::Int => 4,
        }
    }

    /// Pad bytes between the level byte and the payload.
    ///
    /// Only the int lane pads, bringing its payload to a 4-byte boundary
    /// from the format byte.
    const fn padding(self) -> usize {
        match self {
            Self::Int => 2,
            Self::Byte | Self::Short => 0,
        }
    }

    fn read(self, bytes: &[u8], at: usize) -> u32 {
        match self {
            Self::Byte => u32::from(bytes[at]),
            Self::Short => u32::from(BigEndian::read_u16(&bytes[at..at + 2])),
            Self::Int => BigEndian::read_u32(&bytes[at..at + 4]),
        }
    }

    fn write(self, out: &mut Vec<u8>, value: u32) {
        match self {
            Self::Byte => out.push(value as u8),
            Self::Short => out.extend_from_slice(&(value as u16).to_be_bytes()),
            Self::Int => out.extend_from_slice(&value.to_be_bytes()),
        }
    }

    /// Masks a wrapped intermediate down to this lane's width.
    const fn truncate(self, value: u32) -> u32 {
        match self {
            Self::Byte => value & 0xFF,
            Self::Short => value & 0xFFFF,
            Self::Int => value,
        }
    }
}

/// A delta codec configured with a predictor order and lane width.
///
/// Encoding needs the configuration; decoding reads both from the stream
/// header, so any instance (or [`DeltaCodec::decode`] directly) can decode
/// any stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeltaCodec {
    level: Level,
    lane: Lane,
}

impl DeltaCodec {
    /// Creates a codec for the given predictor order and lane width.
    #[must_use]
    pub const fn new(level: Level, lane: Lane) -> Self {
        Self { level, lane }
    }

    /// The configured predictor order.
    #[must_use]
    pub const fn level(self) -> Level {
        self.level
    }

    /// The configured lane width.
    #[must_use]
    pub const fn lane(self) -> Lane {
        self.lane
    }

    /// Encodes a raw byte buffer interpreted as big-endian lane values.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnalignedLane`] if the input length is not a
    /// multiple of the lane width.
    pub fn encode(self, data: &[u8]) -> Result<Vec<u8>> {
        let width = self.lane.width();
        if !data.len().is_multiple_of(width) {
            return Err(CodecError::UnalignedLane {
                len: data.len(),
                width,
            }
            .into());
        }

        let mut out = Vec::with_capacity(2 + self.lane.padding() + data.len());
        out.push(self.lane.tag());
        out.push(self.level as u8);
        out.resize(out.len() + self.lane.padding(), 0);

        let mut history = [0u32; 3];
        for at in (0..data.len()).step_by(width) {
            let value = self.lane.read(data, at);
            let predicted = self.level.predict(&history);
            self.lane
                .write(&mut out, self.lane.truncate(value.wrapping_sub(predicted)));
            history = [value, history[0], history[1]];
        }
        Ok(out)
    }

    /// Decodes a delta stream back into its raw lane-value bytes.
    ///
    /// The lane and level come from the stream header; the pad bytes of the
    /// int lane are skipped without inspection.
    pub fn decode(bytes: &[u8]) -> Result<Vec<u8>> {
        if bytes.len() < 2 {
            return Err(CodecError::TruncatedHeader {
                expected: 2,
                got: bytes.len(),
            }
            .into());
        }
        let lane = Lane::from_tag(bytes[0])?;
        let level = Level::new(bytes[1]).map_err(|_| CodecError::MalformedLevelByte(bytes[1]))?;

        let payload_start = 2 + lane.padding();
        if bytes.len() < payload_start {
            return Err(CodecError::TruncatedHeader {
                expected: payload_start,
                got: bytes.len(),
            }
            .into());
        }
        let payload = &bytes[payload_start..];
        let width = lane.width();
        if !payload.len().is_multiple_of(width) {
            return Err(CodecError::UnalignedLane {
                len: payload.len(),
                width,
            }
            .into());
        }

        let mut out = Vec::with_capacity(payload.len());
        let mut history = [0u32; 3];
        for at in (0..payload.len()).step_by(width) {
            let stored = lane.read(payload, at);
            let predicted = level.predict(&history);
            let value = lane.truncate(stored.wrapping_add(predicted));
            lane.write(&mut out, value);
            history = [value, history[0], history[1]];
        }
        Ok(out)
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::error::Error;
    use anyhow::Result;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn to_be_bytes_u16(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    fn to_be_bytes_u32(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    #[test]
    fn level_construction() {
        assert_eq!(Level::new(1).unwrap(), Level::One);
        assert_eq!(Level::new(3).unwrap(), Level::Three);
        for bad in [0u8, 4, 255] {
            assert!(matches!(
                Level::new(bad).unwrap_err(),
                Error::CodecError(CodecError::InvalidDeltaLevel(b)) if b == bad
            ));
        }
    }

    #[test]
    fn byte_lane_level_one_exact_bytes() -> Result<()> {
        let codec = DeltaCodec::new(Level::One, Lane::Byte);
        let bytes = codec.encode(&[10, 20, 15])?;
        // tag, level, then 10-0, 20-10, 15-20 wrapped.
        assert_eq!(bytes, vec![64, 1, 10, 10, 251]);
        assert_eq!(DeltaCodec::decode(&bytes)?, vec![10, 20, 15]);
        Ok(())
    }

    #[test]
    fn all_levels_reproduce_the_same_array() -> Result<()> {
        // Different encoded bytes, identical decode.
        let data = [10u8, 20, 10, 200, 190, 5];
        let mut images = Vec::new();
        for level in [Level::One, Level::Two, Level::Three] {
            let bytes = DeltaCodec::new(level, Lane::Byte).encode(&data)?;
            assert_eq!(DeltaCodec::decode(&bytes)?, data);
            images.push(bytes);
        }
        assert_ne!(images[0], images[1]);
        assert_ne!(images[1], images[2]);
        Ok(())
    }

    #[test]
    fn short_lane_round_trip() -> Result<()> {
        let data = to_be_bytes_u16(&[0, 1000, 3000, 2500, 65535, 4]);
        for level in [Level::One, Level::Two, Level::Three] {
            let bytes = DeltaCodec::new(level, Lane::Short).encode(&data)?;
            assert_eq!(bytes[0], 65);
            assert_eq!(bytes.len(), 2 + data.len());
            assert_eq!(DeltaCodec::decode(&bytes)?, data);
        }
        Ok(())
    }

    #[test]
    fn int_lane_pads_to_a_word_boundary() -> Result<()> {
        let data = to_be_bytes_u32(&[7, 1_000_000, 999_999]);
        let bytes = DeltaCodec::new(Level::Two, Lane::Int).encode(&data)?;
        assert_eq!(&bytes[..4], &[66, 2, 0, 0], "tag, level, two zero pads");
        assert_eq!(bytes.len(), 4 + data.len());
        assert_eq!(DeltaCodec::decode(&bytes)?, data);
        Ok(())
    }

    #[test]
    fn shorter_than_the_level_still_round_trips() -> Result<()> {
        // Zero-seeded history carries sequences shorter than the predictor.
        for level in [Level::One, Level::Two, Level::Three] {
            for len in 0..3 {
                let data = vec![200u8; len];
                let bytes = DeltaCodec::new(level, Lane::Byte).encode(&data)?;
                assert_eq!(DeltaCodec::decode(&bytes)?, data);
            }
        }
        Ok(())
    }

    #[test]
    fn wrapping_survives_steep_slopes() -> Result<()> {
        // Level 3 predictions overshoot the lane range on this input; the
        // stored residues wrap and must unwrap on decode.
        let data = [0u8, 255, 0, 255, 128, 1];
        let bytes = DeltaCodec::new(Level::Three, Lane::Byte).encode(&data)?;
        assert_eq!(DeltaCodec::decode(&bytes)?, data);
        Ok(())
    }

    #[test]
    fn randomized_round_trips_across_lanes() -> Result<()> {
        let mut rng = SmallRng::seed_from_u64(99);
        for _ in 0..40 {
            for lane in [Lane::Byte, Lane::Short, Lane::Int] {
                let values = lane.width() * rng.random_range(0..50);
                let data: Vec<u8> = (0..values).map(|_| rng.random()).collect();
                for level in [Level::One, Level::Two, Level::Three] {
                    let bytes = DeltaCodec::new(level, lane).encode(&data)?;
                    assert_eq!(DeltaCodec::decode(&bytes)?, data);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn unaligned_input_is_rejected() {
        let err = DeltaCodec::new(Level::One, Lane::Short)
            .encode(&[1, 2, 3])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::CodecError(CodecError::UnalignedLane { len: 3, width: 2 })
        ));
    }

    #[test]
    fn malformed_streams_are_rejected() {
        // Unknown format tag.
        assert!(matches!(
            DeltaCodec::decode(&[63, 1, 5]).unwrap_err(),
            Error::CodecError(CodecError::UnknownFormatTag(63))
        ));
        // Bad level byte.
        assert!(matches!(
            DeltaCodec::decode(&[64, 9, 5]).unwrap_err(),
            Error::CodecError(CodecError::MalformedLevelByte(9))
        ));
        // Int lane cut off inside its pad.
        assert!(matches!(
            DeltaCodec::decode(&[66, 1, 0]).unwrap_err(),
            Error::CodecError(CodecError::TruncatedHeader { .. })
        ));
        // Payload not a lane multiple.
        assert!(matches!(
            DeltaCodec::decode(&[65, 1, 5]).unwrap_err(),
            Error::CodecError(CodecError::UnalignedLane { len: 1, width: 2 })
        ));
        // Too short for any header.
        assert!(DeltaCodec::decode(&[64]).is_err());
    }
}
