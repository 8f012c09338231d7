//! # Bit-Packed Nucleotide Codec
//!
//! Packs nucleotide sequences at the narrowest fixed width that covers the
//! symbols actually present, with gap positions kept out of the packed
//! payload entirely. Gaps travel in a variable-width side channel ahead of
//! the payload, so a mostly-ungapped alignment pays one byte per gap instead
//! of one slot per position.
//!
//! Encoded layout (all integers big-endian):
//!
//! ```text
//! +-------------------+----------+-------------------+------------------+
//! | decoded length u32| width u8 | gap count u32     | gap offsets      |
//! +-------------------+----------+-------------------+------------------+
//! | (Acgtn only) n count u32 | n offsets | packed payload               |
//! +--------------------------------------------------------------------+
//! ```
//!
//! The `width` byte selects how offsets are stored (1, 2, or 4 bytes each).
//! The payload holds only non-sentinel symbols: the slot of a symbol is its
//! index with every sentinel at a smaller index removed. Random access by
//! gapped index is O(1) slot arithmetic after an O(sentinels-before-index)
//! adjustment, a deliberate trade of worst-case lookup cost for compactness.

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use super::OffsetWidth;
use crate::alphabet::Nucleotide;
use crate::error::{CodecError, Result};
use crate::offsets::GapOffsets;

/// Fixed header size: decoded length (4) + width selector (1) + gap count (4).
const SIZE_HEADER: usize = 9;

/// How a symbol is represented by a given scheme.
enum Slot {
    /// Packed into the payload with this code.
    Packed(u8),
    /// Recorded in the gap side channel.
    Gap,
    /// Recorded in the N side channel (Acgtn scheme only).
    N,
    /// Not representable by this scheme.
    Unsupported,
}

/// A bit-packing scheme for nucleotide sequences.
///
/// Pick a scheme directly, or let [`NucleotideCodec::narrowest_for`] choose
/// the cheapest one covering a sequence. All schemes share the header layout
/// above and differ only in payload width and which symbols they accept:
///
/// | scheme    | payload  | accepts                       |
/// |-----------|----------|-------------------------------|
/// | `TwoBit`  | 2 bits   | A, C, G, T, gap               |
/// | `Acgtn`   | 2 bits   | A, C, G, T, N, gap            |
/// | `FourBit` | 4 bits   | full IUPAC alphabet, gap      |
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NucleotideCodec {
    /// 2-bit packing of the four canonical bases.
    TwoBit,
    /// 2-bit packing with `N` positions in a second sentinel list.
    Acgtn,
    /// 4-bit packing of the full ambiguity alphabet.
    FourBit,
}

impl NucleotideCodec {
    /// Returns the cheapest scheme that covers every symbol in `seq`.
    ///
    /// Sequences over {A, C, G, T, gap} pack at 2 bits; adding `N` selects
    /// the sentinel variant; any other ambiguity code forces 4-bit slots.
    #[must_use]
    pub fn narrowest_for(seq: &[Nucleotide]) -> Self {
        let mut has_n = false;
        for &n in seq {
            if n == Nucleotide::N {
                has_n = true;
            } else if n.is_ambiguity() {
                return Self::FourBit;
            }
        }
        if has_n {
            Self::Acgtn
        } else {
            Self::TwoBit
        }
    }

    /// Bits per packed payload slot.
    const fn bits(self) -> usize {
        match self {
            Self::TwoBit | Self::Acgtn => 2,
            Self::FourBit => 4,
        }
    }

    /// Short alphabet description for error messages.
    const fn alphabet(self) -> &'static str {
        match self {
            Self::TwoBit => "A/C/G/T and gap",
            Self::Acgtn => "A/C/G/T/N and gap",
            Self::FourBit => "IUPAC nucleotides and gap",
        }
    }

    fn classify(self, n: Nucleotide) -> Slot {
        if n.is_gap() {
            return Slot::Gap;
        }
        match self {
            Self::TwoBit => match n {
                Nucleotide::A | Nucleotide::C | Nucleotide::G | Nucleotide::T => {
                    Slot::Packed(n.ordinal())
                }
                _ => Slot::Unsupported,
            },
            Self::Acgtn => match n {
                Nucleotide::A | Nucleotide::C | Nucleotide::G | Nucleotide::T => {
                    Slot::Packed(n.ordinal())
                }
                Nucleotide::N => Slot::N,
                _ => Slot::Unsupported,
            },
            Self::FourBit => Slot::Packed(n.ordinal()),
        }
    }

    /// Encodes a symbol sequence.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnsupportedSymbol`] if the sequence contains a
    /// symbol outside this scheme's alphabet.
    pub fn encode(self, seq: &[Nucleotide]) -> Result<Vec<u8>> {
        let mut gaps: Vec<u32> = Vec::new();
        let mut ns: Vec<u32> = Vec::new();
        let mut slots = 0usize;
        for (i, &n) in seq.iter().enumerate() {
            match self.classify(n) {
                Slot::Packed(_) => slots += 1,
                Slot::Gap => gaps.push(i as u32),
                Slot::N => ns.push(i as u32),
                Slot::Unsupported => {
                    return Err(CodecError::UnsupportedSymbol {
                        symbol: n.to_char(),
                        alphabet: self.alphabet(),
                    }
                    .into())
                }
            }
        }

        // One selector covers both sentinel lists; both are increasing, so
        // the maximum is whichever list ends last.
        let max_offset = gaps.last().copied().unwrap_or(0).max(ns.last().copied().unwrap_or(0));
        let width = OffsetWidth::for_max_offset(max_offset);
        let payload_len = (slots * self.bits()).div_ceil(8);

        let mut size = SIZE_HEADER + width.size() * (gaps.len() + ns.len()) + payload_len;
        if self == Self::Acgtn {
            size += 4;
        }
        let mut out = Vec::with_capacity(size);
        out.write_u32::<BigEndian>(seq.len() as u32)?;
        out.push(width as u8);
        out.write_u32::<BigEndian>(gaps.len() as u32)?;
        for &g in &gaps {
            width.write_offset(&mut out, g);
        }
        if self == Self::Acgtn {
            out.write_u32::<BigEndian>(ns.len() as u32)?;
            for &n in &ns {
                width.write_offset(&mut out, n);
            }
        }

        let payload_start = out.len();
        out.resize(payload_start + payload_len, 0);
        let payload = &mut out[payload_start..];
        let mut slot = 0usize;
        let bits = self.bits();
        for &n in seq {
            if let Slot::Packed(code) = self.classify(n) {
                let shift = 8 - bits - (slot * bits) % 8;
                payload[slot * bits / 8] |= code << shift;
                slot += 1;
            }
        }
        Ok(out)
    }

    /// Decodes the full symbol sequence.
    pub fn decode(self, bytes: &[u8]) -> Result<Vec<Nucleotide>> {
        let layout = self.parse_layout(bytes)?;
        let payload = &bytes[layout.payload_start..];
        let mut out = Vec::with_capacity(layout.length);
        let (mut gi, mut ni, mut slot) = (0usize, 0usize, 0usize);
        for pos in 0..layout.length {
            if gi < layout.gaps.len() && layout.gaps[gi] as usize == pos {
                out.push(Nucleotide::Gap);
                gi += 1;
            } else if ni < layout.ns.len() && layout.ns[ni] as usize == pos {
                out.push(Nucleotide::N);
                ni += 1;
            } else {
                out.push(self.unpack(payload, slot)?);
                slot += 1;
            }
        }
        Ok(out)
    }

    /// Decodes the single symbol at a gapped index without decoding the rest.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IndexOutOfRange`] if `index` is at or beyond the
    /// decoded length.
    pub fn decode_at(self, bytes: &[u8], index: usize) -> Result<Nucleotide> {
        let layout = self.parse_layout(bytes)?;
        if index >= layout.length {
            return Err(CodecError::IndexOutOfRange {
                index,
                last_valid: layout.length.saturating_sub(1),
            }
            .into());
        }
        let index_u32 = index as u32;
        if layout.gaps.binary_search(&index_u32).is_ok() {
            return Ok(Nucleotide::Gap);
        }
        if layout.ns.binary_search(&index_u32).is_ok() {
            return Ok(Nucleotide::N);
        }
        let before = layout.gaps.partition_point(|&o| o < index_u32)
            + layout.ns.partition_point(|&o| o < index_u32);
        self.unpack(&bytes[layout.payload_start..], index - before)
    }

    /// Reads the decoded length from the header without touching the payload.
    pub fn decoded_length_of(self, bytes: &[u8]) -> Result<usize> {
        if bytes.len() < SIZE_HEADER {
            return Err(CodecError::TruncatedHeader {
                expected: SIZE_HEADER,
                got: bytes.len(),
            }
            .into());
        }
        Ok(BigEndian::read_u32(&bytes[0..4]) as usize)
    }

    /// Whether the symbol at a gapped index is a gap.
    pub fn is_gap(self, bytes: &[u8], index: usize) -> Result<bool> {
        let layout = self.parse_layout(bytes)?;
        if index >= layout.length {
            return Err(CodecError::IndexOutOfRange {
                index,
                last_valid: layout.length.saturating_sub(1),
            }
            .into());
        }
        Ok(layout.gaps.binary_search(&(index as u32)).is_ok())
    }

    /// Extracts the gap side channel as a coordinate translator.
    pub fn gap_offsets(self, bytes: &[u8]) -> Result<GapOffsets> {
        let layout = self.parse_layout(bytes)?;
        GapOffsets::new(layout.gaps)
    }

    fn unpack(self, payload: &[u8], slot: usize) -> Result<Nucleotide> {
        let bits = self.bits();
        let shift = 8 - bits - (slot * bits) % 8;
        let mask = (1u8 << bits) - 1;
        let code = (payload[slot * bits / 8] >> shift) & mask;
        match self {
            Self::TwoBit | Self::Acgtn => Ok(match code {
                0 => Nucleotide::A,
                1 => Nucleotide::C,
                2 => Nucleotide::G,
                _ => Nucleotide::T,
            }),
            Self::FourBit => match Nucleotide::from_ordinal(code) {
                Some(n) if !n.is_gap() => Ok(n),
                _ => Err(CodecError::InvalidPackedCode(code).into()),
            },
        }
    }

    /// Parses and validates everything ahead of the payload.
    fn parse_layout(self, bytes: &[u8]) -> Result<Layout> {
        if bytes.len() < SIZE_HEADER {
            return Err(CodecError::TruncatedHeader {
                expected: SIZE_HEADER,
                got: bytes.len(),
            }
            .into());
        }
        let length = BigEndian::read_u32(&bytes[0..4]) as usize;
        let width = OffsetWidth::from_selector(bytes[4])?;
        let gap_count = BigEndian::read_u32(&bytes[5..9]) as usize;

        let mut cursor = SIZE_HEADER;
        let gaps = read_sentinels(bytes, &mut cursor, width, gap_count, length)?;
        let ns = if self == Self::Acgtn {
            if bytes.len() < cursor + 4 {
                return Err(CodecError::TruncatedPayload(bytes.len()).into());
            }
            let n_count = BigEndian::read_u32(&bytes[cursor..cursor + 4]) as usize;
            cursor += 4;
            read_sentinels(bytes, &mut cursor, width, n_count, length)?
        } else {
            Vec::new()
        };

        let sentinels = gaps.len() + ns.len();
        if sentinels > length {
            return Err(CodecError::LengthMismatch {
                header: length,
                decoded: sentinels,
            }
            .into());
        }
        let expected = ((length - sentinels) * self.bits()).div_ceil(8);
        let got = bytes.len() - cursor;
        if got != expected {
            return Err(CodecError::UnexpectedPayloadLength { expected, got }.into());
        }

        Ok(Layout {
            length,
            gaps,
            ns,
            payload_start: cursor,
        })
    }
}

/// Parsed view of everything ahead of the packed payload.
struct Layout {
    length: usize,
    gaps: Vec<u32>,
    ns: Vec<u32>,
    payload_start: usize,
}

/// Reads one sentinel offset list, enforcing strict monotonicity and bounds.
fn read_sentinels(
    bytes: &[u8],
    cursor: &mut usize,
    width: OffsetWidth,
    count: usize,
    length: usize,
) -> Result<Vec<u32>> {
    let Some(section_len) = count.checked_mul(width.size()) else {
        return Err(CodecError::TruncatedPayload(bytes.len()).into());
    };
    if bytes.len() < *cursor + section_len {
        return Err(CodecError::TruncatedPayload(bytes.len()).into());
    }
    let section = &bytes[*cursor..*cursor + section_len];
    let mut offsets = Vec::with_capacity(count);
    for i in 0..count {
        let offset = width.read_offset(section, i);
        if let Some(&prev) = offsets.last() {
            if offset <= prev {
                return Err(CodecError::OffsetsOutOfOrder(i).into());
            }
        }
        if offset as usize >= length {
            return Err(CodecError::OffsetBeyondLength {
                offset,
                length: length as u32,
            }
            .into());
        }
        offsets.push(offset);
    }
    *cursor += section_len;
    Ok(offsets)
}

/// An encoded nucleotide sequence paired with the scheme that produced it.
///
/// Immutable once built. Encoding is deterministic, so two values are equal
/// exactly when their decoded sequences and schemes are, making this usable
/// as a hash or equality key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EncodedNucleotides {
    codec: NucleotideCodec,
    bytes: Vec<u8>,
    length: usize,
}

impl EncodedNucleotides {
    /// Encodes with the narrowest scheme covering the sequence.
    pub fn encode(seq: &[Nucleotide]) -> Result<Self> {
        Self::with_codec(NucleotideCodec::narrowest_for(seq), seq)
    }

    /// Encodes with an explicit scheme.
    pub fn with_codec(codec: NucleotideCodec, seq: &[Nucleotide]) -> Result<Self> {
        let bytes = codec.encode(seq)?;
        Ok(Self {
            codec,
            bytes,
            length: seq.len(),
        })
    }

    /// Wraps already-encoded bytes, validating their structure.
    pub fn from_parts(codec: NucleotideCodec, bytes: Vec<u8>) -> Result<Self> {
        let length = codec.parse_layout(&bytes)?.length;
        Ok(Self {
            codec,
            bytes,
            length,
        })
    }

    /// The scheme the bytes are encoded with.
    #[must_use]
    pub fn codec(&self) -> NucleotideCodec {
        self.codec
    }

    /// The encoded byte image.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the value, returning the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// The decoded length in symbols (gaps included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Whether the decoded sequence is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Decodes the full symbol sequence.
    pub fn decode(&self) -> Result<Vec<Nucleotide>> {
        self.codec.decode(&self.bytes)
    }

    /// Decodes the symbol at a gapped index.
    pub fn get(&self, index: usize) -> Result<Nucleotide> {
        self.codec.decode_at(&self.bytes, index)
    }

    /// Whether the symbol at a gapped index is a gap.
    pub fn is_gap(&self, index: usize) -> Result<bool> {
        self.codec.is_gap(&self.bytes, index)
    }

    /// Extracts the gap side channel as a coordinate translator.
    pub fn gap_offsets(&self) -> Result<GapOffsets> {
        self.codec.gap_offsets(&self.bytes)
    }
}
