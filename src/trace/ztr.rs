//! # ZTR Trace Decoder
//!
//! ZTR stores a chromatogram as independent chunks, each carrying its own
//! stack of encodings. File layout:
//!
//! ```text
//! +-------------------+-----------+-----------+---------+
//! | magic (8 bytes)   | major u8  | minor u8  | chunk*  |
//! +-------------------+-----------+-----------+---------+
//!
//! chunk: [type: 4 ASCII][meta len: u32][meta][data len: u32][data]
//! ```
//!
//! The first data byte is a format tag. Decoding is layered: apply the codec
//! the tag names, replace the buffer with its output, and repeat until the
//! tag is 0 (raw). Each stage's output is a complete next-stage buffer, tag
//! included, so a chunk can stack e.g. zlib over delta over raw.
//!
//! Chunks decode independently and in any order. Cross-chunk alignment
//! (peaks and confidences must match the basecalls by index) is enforced by
//! [`ChromatogramBuilder`], not here. Unknown chunk types are skipped with a
//! debug log; malformed chunks fail with the chunk type and file offset.

use byteorder::{BigEndian, ByteOrder};
use flate2::read::ZlibDecoder;
use std::io::Read;

use super::{Chromatogram, ChromatogramBuilder, TraceSamples};
use crate::alphabet::seq_from_bytes;
use crate::codec::{DeltaCodec, RunLengthCodec};
use crate::error::{CodecError, Error, Result, TraceError};
use crate::quality::scores_from_raw;

/// The 8-byte ZTR magic: `\xAEZTR\r\n\x1A\n`.
pub const MAGIC: [u8; 8] = [0xAE, b'Z', b'T', b'R', 0x0D, 0x0A, 0x1A, 0x0A];

/// Supported major version.
const VERSION_MAJOR: u8 = 1;

/// One chunk of a ZTR file, still in its encoded form.
#[derive(Clone, Debug)]
pub struct ZtrChunk {
    kind: [u8; 4],
    offset: usize,
    metadata: Vec<u8>,
    data: Vec<u8>,
}

impl ZtrChunk {
    /// The 4-character chunk type.
    #[must_use]
    pub fn kind(&self) -> &[u8; 4] {
        &self.kind
    }

    /// The chunk type as text, for dispatch and error reporting.
    #[must_use]
    pub fn kind_str(&self) -> String {
        String::from_utf8_lossy(&self.kind).into_owned()
    }

    /// Byte offset of this chunk within the file.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The chunk metadata, undecoded.
    #[must_use]
    pub fn metadata(&self) -> &[u8] {
        &self.metadata
    }

    /// The encoded chunk data; the first byte is the outermost format tag.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Peels encoding layers until the data is raw (tag 0).
    ///
    /// The returned buffer keeps its leading raw tag; per-type accessors
    /// skip it plus the type's alignment padding.
    pub fn expand(&self) -> Result<Vec<u8>> {
        let mut data = self.data.clone();
        loop {
            let Some(&tag) = data.first() else {
                return Err(TraceError::TruncatedChunk {
                    chunk: self.kind_str(),
                    offset: self.offset,
                }
                .into());
            };
            data = match tag {
                0 => return Ok(data),
                1 => RunLengthCodec::decode(&data[1..]).map_err(|e| self.decode_error(e))?,
                2 => self.inflate(&data[1..])?,
                64..=66 => DeltaCodec::decode(&data).map_err(|e| self.decode_error(e))?,
                70 => self.unshrink16(&data[1..])?,
                71 => self.unshrink32(&data[1..])?,
                72 => self.unfollow(&data)?,
                _ => {
                    return Err(TraceError::UnknownFormatTag {
                        tag,
                        chunk: self.kind_str(),
                        offset: self.offset,
                    }
                    .into())
                }
            };
        }
    }

    /// Rewraps a codec failure with this chunk's type and offset.
    fn decode_error(&self, err: Error) -> Error {
        match err {
            Error::CodecError(source) => TraceError::ChunkDecode {
                chunk: self.kind_str(),
                offset: self.offset,
                source,
            }
            .into(),
            other => other,
        }
    }

    /// Tag 2: `[uncompressed length: u32][zlib stream]`.
    fn inflate(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < 4 {
            return Err(self.decode_error(
                CodecError::TruncatedHeader {
                    expected: 4,
                    got: data.len(),
                }
                .into(),
            ));
        }
        let expected = BigEndian::read_u32(&data[0..4]) as usize;
        let mut out = Vec::with_capacity(expected);
        ZlibDecoder::new(&data[4..]).read_to_end(&mut out)?;
        if out.len() != expected {
            return Err(self.decode_error(
                CodecError::LengthMismatch {
                    header: expected,
                    decoded: out.len(),
                }
                .into(),
            ));
        }
        Ok(out)
    }

    /// Tag 70: bytes other than `0x80` are sign-extended i16; the `0x80`
    /// escape is followed by a big-endian i16 literal.
    fn unshrink16(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() * 2);
        let mut i = 0usize;
        while i < data.len() {
            let value = if data[i] == 0x80 {
                if data.len() < i + 3 {
                    return Err(self.decode_error(CodecError::TruncatedPayload(i).into()));
                }
                let literal = BigEndian::read_i16(&data[i + 1..i + 3]);
                i += 3;
                literal
            } else {
                let v = i16::from(data[i] as i8);
                i += 1;
                v
            };
            out.extend_from_slice(&value.to_be_bytes());
        }
        Ok(out)
    }

    /// Tag 71: like tag 70 with i32 values and 4-byte literals.
    fn unshrink32(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() * 4);
        let mut i = 0usize;
        while i < data.len() {
            let value = if data[i] == 0x80 {
                if data.len() < i + 5 {
                    return Err(self.decode_error(CodecError::TruncatedPayload(i).into()));
                }
                let literal = BigEndian::read_i32(&data[i + 1..i + 5]);
                i += 5;
                literal
            } else {
                let v = i32::from(data[i] as i8);
                i += 1;
                v
            };
            out.extend_from_slice(&value.to_be_bytes());
        }
        Ok(out)
    }

    /// Tag 72: a 256-entry predictor table, the first output byte as a
    /// literal, then differences from the table's prediction.
    fn unfollow(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < 258 {
            return Err(self.decode_error(CodecError::TruncatedPayload(data.len()).into()));
        }
        let follow = &data[1..257];
        let mut out = Vec::with_capacity(data.len() - 257);
        out.push(data[257]);
        for &d in &data[258..] {
            let prev = *out.last().unwrap_or(&0);
            out.push(follow[prev as usize].wrapping_add(d));
        }
        Ok(out)
    }
}

/// Validates the magic and version, then walks the chunk list.
pub fn read_chunks(bytes: &[u8]) -> Result<Vec<ZtrChunk>> {
    if bytes.len() < MAGIC.len() + 2 || bytes[..MAGIC.len()] != MAGIC {
        return Err(TraceError::InvalidMagicNumber {
            expected: &MAGIC,
            found: bytes[..bytes.len().min(MAGIC.len())].to_vec(),
        }
        .into());
    }
    let (major, minor) = (bytes[8], bytes[9]);
    if major != VERSION_MAJOR {
        return Err(TraceError::UnsupportedVersion(format!("{major}.{minor}")).into());
    }

    let mut chunks = Vec::new();
    let mut cursor = MAGIC.len() + 2;
    while cursor < bytes.len() {
        let offset = cursor;
        let truncated = |chunk: &[u8]| TraceError::TruncatedChunk {
            chunk: String::from_utf8_lossy(chunk).into_owned(),
            offset,
        };
        if bytes.len() < cursor + 8 {
            return Err(truncated(&bytes[cursor..]).into());
        }
        let kind: [u8; 4] = bytes[cursor..cursor + 4].try_into().unwrap_or_default();
        let meta_len = BigEndian::read_u32(&bytes[cursor + 4..cursor + 8]) as usize;
        cursor += 8;
        if bytes.len() < cursor + meta_len + 4 {
            return Err(truncated(&kind).into());
        }
        let metadata = bytes[cursor..cursor + meta_len].to_vec();
        cursor += meta_len;
        let data_len = BigEndian::read_u32(&bytes[cursor..cursor + 4]) as usize;
        cursor += 4;
        if bytes.len() < cursor + data_len {
            return Err(truncated(&kind).into());
        }
        let data = bytes[cursor..cursor + data_len].to_vec();
        cursor += data_len;
        chunks.push(ZtrChunk {
            kind,
            offset,
            metadata,
            data,
        });
    }
    Ok(chunks)
}

/// Decodes a complete ZTR file into a chromatogram.
///
/// Consumes `BASE`, `BPOS`, `CNF4`, `SMP4`, and `TEXT` chunks in any order;
/// other chunk types are skipped with a debug log. Section alignment is
/// checked once everything is gathered.
pub fn decode(bytes: &[u8]) -> Result<Chromatogram> {
    let mut builder = ChromatogramBuilder::new();
    for chunk in read_chunks(bytes)? {
        match chunk.kind() {
            b"BASE" => {
                let data = chunk.expand()?;
                let calls = seq_from_bytes(&data[1..]).map_err(|e| chunk.decode_error(e))?;
                builder = builder.basecalls(calls);
            }
            b"BPOS" => {
                // Raw tag plus three pad bytes align the u32 positions.
                let data = chunk.expand()?;
                let payload = aligned(&chunk, &data, 4)?;
                let peaks = payload
                    .chunks_exact(4)
                    .map(BigEndian::read_u32)
                    .collect::<Vec<_>>();
                builder = builder.peaks(peaks);
            }
            b"CNF4" => {
                // Called-base confidences first, then the three uncalled
                // channel planes; only the called plane is consumed.
                let data = chunk.expand()?;
                let payload = aligned(&chunk, &data, 1)?;
                if !payload.len().is_multiple_of(4) {
                    return Err(chunk.decode_error(
                        CodecError::UnexpectedPayloadLength {
                            expected: payload.len().next_multiple_of(4),
                            got: payload.len(),
                        }
                        .into(),
                    ));
                }
                let called = &payload[..payload.len() / 4];
                let scores = scores_from_raw(called).map_err(|e| chunk.decode_error(e))?;
                builder = builder.confidences(scores);
            }
            b"SMP4" => {
                // Raw tag plus one pad byte align the u16 samples; the four
                // channel planes follow in A, C, G, T order.
                let data = chunk.expand()?;
                let payload = aligned(&chunk, &data, 2)?;
                let values = payload
                    .chunks_exact(2)
                    .map(BigEndian::read_u16)
                    .collect::<Vec<_>>();
                if !values.len().is_multiple_of(4) {
                    return Err(chunk.decode_error(
                        CodecError::UnexpectedPayloadLength {
                            expected: values.len().next_multiple_of(4),
                            got: values.len(),
                        }
                        .into(),
                    ));
                }
                let n = values.len() / 4;
                builder = builder.samples(TraceSamples {
                    a: values[..n].to_vec(),
                    c: values[n..2 * n].to_vec(),
                    g: values[2 * n..3 * n].to_vec(),
                    t: values[3 * n..].to_vec(),
                });
            }
            b"TEXT" => {
                for (key, value) in parse_text(&chunk.expand()?[1..]) {
                    builder = builder.comment(key, value);
                }
            }
            _ => {
                log::debug!(
                    "skipping unknown ZTR chunk {} at offset {}",
                    chunk.kind_str(),
                    chunk.offset()
                );
            }
        }
    }
    builder.build()
}

/// Strips the raw tag and the per-type pad that aligns a multi-byte payload.
///
/// The remaining payload must be a whole number of lanes; trailing stray
/// bytes are an error, never dropped.
fn aligned<'a>(chunk: &ZtrChunk, data: &'a [u8], width: usize) -> Result<&'a [u8]> {
    if data.len() < width {
        return Err(TraceError::TruncatedChunk {
            chunk: chunk.kind_str(),
            offset: chunk.offset(),
        }
        .into());
    }
    let payload = &data[width..];
    if !payload.len().is_multiple_of(width) {
        return Err(chunk.decode_error(
            CodecError::UnexpectedPayloadLength {
                expected: payload.len().next_multiple_of(width),
                got: payload.len(),
            }
            .into(),
        ));
    }
    Ok(payload)
}

/// Splits a `TEXT` payload into key/value pairs.
///
/// NUL-terminated alternating keys and values; an empty key or the end of
/// the data terminates the list.
fn parse_text(data: &[u8]) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut fields = data.split(|&b| b == 0);
    while let Some(key) = fields.next() {
        if key.is_empty() {
            break;
        }
        let value = fields.next().unwrap_or(&[]);
        pairs.push((
            String::from_utf8_lossy(key).into_owned(),
            String::from_utf8_lossy(value).into_owned(),
        ));
    }
    pairs
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::alphabet::seq_to_string;
    use crate::codec::{Lane, Level};
    use anyhow::Result;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn push_chunk(file: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
        file.extend_from_slice(kind);
        file.extend_from_slice(&0u32.to_be_bytes());
        file.extend_from_slice(&(data.len() as u32).to_be_bytes());
        file.extend_from_slice(data);
    }

    fn file_with(chunks: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
        let mut file = MAGIC.to_vec();
        file.extend_from_slice(&[1, 2]);
        for (kind, data) in chunks {
            push_chunk(&mut file, kind, data);
        }
        file
    }

    /// Raw BPOS data block for the given peaks: tag, 3 pad bytes, u32s.
    fn raw_bpos(peaks: &[u32]) -> Vec<u8> {
        let mut data = vec![0, 0, 0, 0];
        for &p in peaks {
            data.extend_from_slice(&p.to_be_bytes());
        }
        data
    }

    /// Raw CNF4 block: tag, called plane, then three zeroed planes.
    fn raw_cnf4(called: &[u8]) -> Vec<u8> {
        let mut data = vec![0];
        data.extend_from_slice(called);
        data.extend(std::iter::repeat_n(0u8, called.len() * 3));
        data
    }

    /// Raw SMP4 block: tag, 1 pad byte, four u16 planes.
    fn raw_smp4(planes: &[&[u16]; 4]) -> Vec<u8> {
        let mut data = vec![0, 0];
        for plane in planes {
            for &v in *plane {
                data.extend_from_slice(&v.to_be_bytes());
            }
        }
        data
    }

    fn zlib_over(raw: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(raw).unwrap();
        let stream = enc.finish().unwrap();
        let mut data = vec![2];
        data.extend_from_slice(&(raw.len() as u32).to_be_bytes());
        data.extend_from_slice(&stream);
        data
    }

    fn rle_over(raw: &[u8], guard: u8) -> Vec<u8> {
        let mut data = vec![1];
        data.extend_from_slice(&RunLengthCodec::new(guard).encode(raw));
        data
    }

    #[test]
    fn raw_chunks_decode_to_a_chromatogram() -> Result<()> {
        let mut base = vec![0u8];
        base.extend_from_slice(b"ACGT");
        let file = file_with(&[
            (b"BASE", base),
            (b"BPOS", raw_bpos(&[5, 17, 30, 44])),
            (b"CNF4", raw_cnf4(&[20, 30, 30, 9])),
            (b"SMP4", raw_smp4(&[&[1, 2], &[3, 4], &[5, 6], &[7, 8]])),
        ]);
        let chroma = decode(&file)?;
        assert_eq!(seq_to_string(chroma.basecalls()), "ACGT");
        assert_eq!(chroma.peaks(), &[5, 17, 30, 44]);
        assert_eq!(chroma.confidences()[1].value(), 30);
        assert_eq!(chroma.samples().unwrap().g, vec![5, 6]);
        Ok(())
    }

    #[test]
    fn layered_zlib_over_delta() -> Result<()> {
        // BPOS compressed as zlib(delta(raw)); both layers must peel.
        let raw = raw_bpos(&[100, 102, 104, 110]);
        let delta = DeltaCodec::new(Level::One, Lane::Int).encode(&raw)?;
        let file = file_with(&[
            (b"BASE", {
                let mut b = vec![0u8];
                b.extend_from_slice(b"ACGT");
                b
            }),
            (b"BPOS", zlib_over(&delta)),
            (b"CNF4", raw_cnf4(&[40, 40, 40, 40])),
        ]);
        let chroma = decode(&file)?;
        assert_eq!(chroma.peaks(), &[100, 102, 104, 110]);
        Ok(())
    }

    #[test]
    fn run_length_layer() -> Result<()> {
        let raw = raw_cnf4(&[30, 30, 30, 30]);
        let file = file_with(&[
            (b"BASE", {
                let mut b = vec![0u8];
                b.extend_from_slice(b"ACGT");
                b
            }),
            (b"BPOS", raw_bpos(&[1, 2, 3, 4])),
            (b"CNF4", rle_over(&raw, 77)),
        ]);
        let chroma = decode(&file)?;
        assert!(chroma.confidences().iter().all(|q| q.value() == 30));
        Ok(())
    }

    #[test]
    fn shrink_and_follow_layers_expand() -> Result<()> {
        // Tag 70 over an SMP4 block: the leading [0][pad] bytes read as the
        // first i16, small deltas as single bytes, large ones escaped.
        let chunk = ZtrChunk {
            kind: *b"SMP4",
            offset: 10,
            metadata: Vec::new(),
            data: vec![70, 0, 5, 0x80, 0x01, 0x00, 0xFE],
        };
        let expanded = chunk.expand()?;
        assert_eq!(expanded, vec![0, 0, 0, 5, 1, 0, 255, 254]);

        // Tag 72: identity-free table where every byte predicts 1, so the
        // stored differences are value - 1.
        let mut data = vec![72u8];
        data.extend_from_slice(&[1u8; 256]);
        data.push(0);
        data.extend_from_slice(&[64, 2]);
        let chunk = ZtrChunk {
            kind: *b"BASE",
            offset: 0,
            metadata: Vec::new(),
            data,
        };
        assert_eq!(chunk.expand()?, vec![0, 65, 3]);
        Ok(())
    }

    #[test]
    fn text_chunk_surfaces_comments() -> Result<()> {
        let mut text = vec![0u8];
        text.extend_from_slice(b"MACH\0ABI3730\0NAME\0run7\0\0");
        let file = file_with(&[
            (b"BASE", {
                let mut b = vec![0u8];
                b.extend_from_slice(b"AC");
                b
            }),
            (b"BPOS", raw_bpos(&[1, 2])),
            (b"CNF4", raw_cnf4(&[9, 9])),
            (b"TEXT", text),
        ]);
        let chroma = decode(&file)?;
        assert_eq!(chroma.comment("MACH"), Some("ABI3730"));
        assert_eq!(chroma.comment("NAME"), Some("run7"));
        Ok(())
    }

    #[test]
    fn unknown_chunks_are_skipped() -> Result<()> {
        let file = file_with(&[
            (b"CLIP", vec![0, 1, 2, 3]),
            (b"BASE", {
                let mut b = vec![0u8];
                b.extend_from_slice(b"AC");
                b
            }),
            (b"BPOS", raw_bpos(&[1, 2])),
            (b"CNF4", raw_cnf4(&[9, 9])),
        ]);
        assert_eq!(decode(&file)?.len(), 2);
        Ok(())
    }

    #[test]
    fn bad_magic_and_version_are_rejected() {
        let err = decode(b"NOTAZTRFILE").unwrap_err();
        assert!(matches!(
            err,
            Error::TraceError(TraceError::InvalidMagicNumber { .. })
        ));

        let mut file = MAGIC.to_vec();
        file.extend_from_slice(&[2, 0]);
        assert!(matches!(
            decode(&file).unwrap_err(),
            Error::TraceError(TraceError::UnsupportedVersion(v)) if v == "2.0"
        ));
    }

    #[test]
    fn truncated_chunk_names_type_and_offset() {
        let mut file = MAGIC.to_vec();
        file.extend_from_slice(&[1, 2]);
        file.extend_from_slice(b"BPOS");
        file.extend_from_slice(&0u32.to_be_bytes());
        file.extend_from_slice(&100u32.to_be_bytes());
        file.extend_from_slice(&[0, 0]);
        let err = read_chunks(&file).unwrap_err();
        assert!(matches!(
            err,
            Error::TraceError(TraceError::TruncatedChunk { chunk, offset: 10 }) if chunk == "BPOS"
        ));
    }

    #[test]
    fn stray_trailing_lane_bytes_are_rejected() {
        // One peak plus two stray bytes: the remainder must fail, not vanish.
        let mut bpos = raw_bpos(&[7]);
        bpos.extend_from_slice(&[0xAB, 0xCD]);
        let file = file_with(&[
            (b"BASE", {
                let mut b = vec![0u8];
                b.extend_from_slice(b"A");
                b
            }),
            (b"BPOS", bpos),
            (b"CNF4", raw_cnf4(&[9])),
        ]);
        assert!(matches!(
            decode(&file).unwrap_err(),
            Error::TraceError(TraceError::ChunkDecode { chunk, .. }) if chunk == "BPOS"
        ));

        // Same rule for an SMP4 payload cut mid-sample.
        let mut smp4 = raw_smp4(&[&[1], &[2], &[3], &[4]]);
        smp4.pop();
        let file = file_with(&[
            (b"BASE", {
                let mut b = vec![0u8];
                b.extend_from_slice(b"A");
                b
            }),
            (b"BPOS", raw_bpos(&[7])),
            (b"CNF4", raw_cnf4(&[9])),
            (b"SMP4", smp4),
        ]);
        assert!(matches!(
            decode(&file).unwrap_err(),
            Error::TraceError(TraceError::ChunkDecode { chunk, .. }) if chunk == "SMP4"
        ));
    }

    #[test]
    fn chunk_decode_failures_carry_context() {
        // An RLE layer whose header promises more than the stream holds.
        let mut data = vec![1u8];
        data.extend_from_slice(&[0, 0, 0, 9, 63, 1, 2]);
        let chunk = ZtrChunk {
            kind: *b"CNF4",
            offset: 42,
            metadata: Vec::new(),
            data,
        };
        let err = chunk.expand().unwrap_err();
        assert!(matches!(
            err,
            Error::TraceError(TraceError::ChunkDecode { chunk, offset: 42, .. }) if chunk == "CNF4"
        ));

        // An unknown format tag names itself.
        let chunk = ZtrChunk {
            kind: *b"BASE",
            offset: 7,
            metadata: Vec::new(),
            data: vec![99, 1, 2],
        };
        assert!(matches!(
            chunk.expand().unwrap_err(),
            Error::TraceError(TraceError::UnknownFormatTag {
                tag: 99,
                offset: 7,
                ..
            })
        ));
    }

    #[test]
    fn misaligned_sections_fail_at_build() {
        let file = file_with(&[
            (b"BASE", {
                let mut b = vec![0u8];
                b.extend_from_slice(b"ACGT");
                b
            }),
            (b"BPOS", raw_bpos(&[1, 2])),
            (b"CNF4", raw_cnf4(&[9, 9, 9, 9])),
        ]);
        assert!(matches!(
            decode(&file).unwrap_err(),
            Error::TraceError(TraceError::SectionMisalignment { .. })
        ));
    }
}
