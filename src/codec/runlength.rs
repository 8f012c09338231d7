//! # Guarded Run-Length Codec
//!
//! Run-length encoding tuned for Phred quality strings: long plateaus of one
//! value, occasional singletons. One byte value is reserved as a *guard*; a
//! literal byte is anything except the guard, and the guard introduces a
//! three-field run token:
//!
//! ```text
//! +------------------+----------+--------------------------------------+
//! | decoded len u32  | guard u8 | token stream                         |
//! +------------------+----------+--------------------------------------+
//!
//! token stream:   value                  (singleton, value != guard)
//!                 [guard][run u16][value] (run of 2+, value != guard)
//!                 [guard][0x0000]         (one literal guard value)
//! ```
//!
//! A zero run length escapes the guard itself and always decodes as a single
//! value. Runs *of the guard value* are therefore escaped one occurrence at
//! a time, three bytes each; this is wasteful for long guard plateaus and is
//! kept that way for byte compatibility with the historical format. Runs
//! longer than 65535 split into successive maximal tokens.
//!
//! The encoder computes its exact output size up front and never grows the
//! buffer. Random access scans tokens from the start; lookups are O(tokens),
//! not O(1), which is the intended trade for plateau-heavy data.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{CodecError, Result};
use crate::quality::PhredQuality;

/// Guard value used by [`RunLengthCodec::default`].
pub const DEFAULT_GUARD: u8 = 63;

/// Header size: decoded length (4) + guard byte (1).
const SIZE_HEADER: usize = 5;

/// Longest run one token can carry.
const MAX_RUN: u32 = u16::MAX as u32;

/// A run-length codec configured with a guard byte.
///
/// The guard only parameterizes *encoding*; decoding always honors the guard
/// byte recorded in the stream header, so any instance can decode any
/// stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RunLengthCodec {
    guard: u8,
}

impl Default for RunLengthCodec {
    fn default() -> Self {
        Self::new(DEFAULT_GUARD)
    }
}

impl RunLengthCodec {
    /// Creates a codec that encodes with the given guard byte.
    #[must_use]
    pub const fn new(guard: u8) -> Self {
        Self { guard }
    }

    /// The guard byte used when encoding.
    #[must_use]
    pub const fn guard(self) -> u8 {
        self.guard
    }

    /// Returns the exact encoded size of `values`, header included.
    ///
    /// Guard occurrences cost 3 bytes each, non-guard singletons 1 byte, and
    /// non-guard runs 4 bytes per (split) token.
    #[must_use]
    pub fn encoded_size_of(self, values: &[u8]) -> usize {
        let mut size = SIZE_HEADER;
        for (value, count) in runs_of(values) {
            size += self.run_cost(value, count);
        }
        size
    }

    fn run_cost(self, value: u8, mut count: u32) -> usize {
        if value == self.guard {
            return 3 * count as usize;
        }
        let mut cost = 0;
        while count > 0 {
            let chunk = count.min(MAX_RUN);
            cost += if chunk == 1 { 1 } else { 4 };
            count -= chunk;
        }
        cost
    }

    /// Encodes a byte stream.
    ///
    /// The output buffer is allocated once at the size reported by
    /// [`encoded_size_of`](Self::encoded_size_of).
    #[must_use]
    pub fn encode(self, values: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_size_of(values));
        self.write_header(&mut out, values.len() as u32);
        for (value, count) in runs_of(values) {
            self.push_run(&mut out, value, count);
        }
        out
    }

    /// Encodes an explicit token list.
    ///
    /// Tokens are emitted as given (after splitting over-long runs), not
    /// re-merged with their neighbors. A zero-length run is only meaningful
    /// for the guard value, where it is the escape form and encodes one
    /// literal guard.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::ZeroLengthRun`] for a zero-length run of a
    /// non-guard value, and [`CodecError::RunTotalOverflow`] when the runs
    /// decode to more values than the length header can hold.
    pub fn encode_runs(self, runs: &[(u8, u32)]) -> Result<Vec<u8>> {
        for &(value, count) in runs {
            if count == 0 && value != self.guard {
                return Err(CodecError::ZeroLengthRun(value).into());
            }
        }
        // A zero-length guard run is the escape form and still decodes to
        // one value.
        let total = runs
            .iter()
            .map(|&(value, count)| {
                if value == self.guard && count == 0 {
                    1u64
                } else {
                    u64::from(count)
                }
            })
            .sum::<u64>();
        if total > u64::from(u32::MAX) {
            return Err(CodecError::RunTotalOverflow(total).into());
        }

        let size = SIZE_HEADER
            + runs
                .iter()
                .map(|&(value, count)| {
                    if value == self.guard && count == 0 {
                        3
                    } else {
                        self.run_cost(value, count)
                    }
                })
                .sum::<usize>();
        let mut out = Vec::with_capacity(size);
        self.write_header(&mut out, total as u32);
        for &(value, count) in runs {
            if value == self.guard && count == 0 {
                out.extend_from_slice(&[self.guard, 0, 0]);
            } else {
                self.push_run(&mut out, value, count);
            }
        }
        Ok(out)
    }

    fn write_header(self, out: &mut Vec<u8>, length: u32) {
        out.extend_from_slice(&length.to_be_bytes());
        out.push(self.guard);
    }

    fn push_run(self, out: &mut Vec<u8>, value: u8, mut count: u32) {
        if value == self.guard {
            for _ in 0..count {
                out.extend_from_slice(&[self.guard, 0, 0]);
            }
            return;
        }
        while count > 0 {
            let chunk = count.min(MAX_RUN);
            if chunk == 1 {
                out.push(value);
            } else {
                out.push(self.guard);
                out.extend_from_slice(&(chunk as u16).to_be_bytes());
                out.push(value);
            }
            count -= chunk;
        }
    }

    /// Decodes a full stream, honoring the guard byte in its header.
    ///
    /// Decoding needs no configuration; any stream produced by any guard
    /// choice decodes the same way.
    pub fn decode(bytes: &[u8]) -> Result<Vec<u8>> {
        let (length, guard) = read_header(bytes)?;
        let mut out = Vec::with_capacity(length);
        let mut cursor = SIZE_HEADER;
        while cursor < bytes.len() {
            let b = bytes[cursor];
            if b != guard {
                out.push(b);
                cursor += 1;
                continue;
            }
            let (value, count, next) = read_token(bytes, cursor, guard)?;
            for _ in 0..count {
                out.push(value);
            }
            cursor = next;
        }
        if out.len() != length {
            return Err(CodecError::LengthMismatch {
                header: length,
                decoded: out.len(),
            }
            .into());
        }
        Ok(out)
    }

    /// Decodes the value at `index` by scanning tokens from the start.
    ///
    /// Never decodes past the token containing `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IndexOutOfRange`] (reporting the last valid
    /// index) if `index` is at or beyond the decoded length.
    pub fn decode_at(bytes: &[u8], index: usize) -> Result<u8> {
        let (length, guard) = read_header(bytes)?;
        if index >= length {
            return Err(CodecError::IndexOutOfRange {
                index,
                last_valid: length.saturating_sub(1),
            }
            .into());
        }
        let mut decoded = 0usize;
        let mut cursor = SIZE_HEADER;
        while cursor < bytes.len() {
            let b = bytes[cursor];
            let (value, count, next) = if b == guard {
                read_token(bytes, cursor, guard)?
            } else {
                (b, 1, cursor + 1)
            };
            if index < decoded + count as usize {
                return Ok(value);
            }
            decoded += count as usize;
            cursor = next;
        }
        // The header promised more values than the stream holds.
        Err(CodecError::LengthMismatch {
            header: length,
            decoded,
        }
        .into())
    }

    /// Reads the decoded length from the header without scanning tokens.
    pub fn decoded_length_of(bytes: &[u8]) -> Result<usize> {
        read_header(bytes).map(|(length, _)| length)
    }

    /// Encodes a quality-score slice.
    #[must_use]
    pub fn encode_scores(self, scores: &[PhredQuality]) -> Vec<u8> {
        let raw: Vec<u8> = scores.iter().map(|q| q.value()).collect();
        self.encode(&raw)
    }

    /// Decodes a stream into quality scores, rejecting out-of-range values.
    pub fn decode_scores(bytes: &[u8]) -> Result<Vec<PhredQuality>> {
        Self::decode(bytes)?
            .into_iter()
            .map(PhredQuality::new)
            .collect()
    }
}

fn read_header(bytes: &[u8]) -> Result<(usize, u8)> {
    if bytes.len() < SIZE_HEADER {
        return Err(CodecError::TruncatedHeader {
            expected: SIZE_HEADER,
            got: bytes.len(),
        }
        .into());
    }
    let length = BigEndian::read_u32(&bytes[0..4]) as usize;
    Ok((length, bytes[4]))
}

/// Reads the token starting at `cursor` (which must sit on a guard byte).
/// Returns the decoded value, its run count, and the next cursor position.
fn read_token(bytes: &[u8], cursor: usize, guard: u8) -> Result<(u8, u32, usize)> {
    if bytes.len() < cursor + 3 {
        return Err(CodecError::TruncatedPayload(bytes.len()).into());
    }
    let count = u32::from(BigEndian::read_u16(&bytes[cursor + 1..cursor + 3]));
    if count == 0 {
        // Escape: a literal occurrence of the guard value.
        return Ok((guard, 1, cursor + 3));
    }
    if bytes.len() < cursor + 4 {
        return Err(CodecError::TruncatedPayload(bytes.len()).into());
    }
    Ok((bytes[cursor + 3], count, cursor + 4))
}

/// Iterates maximal runs of equal values.
fn runs_of(values: &[u8]) -> impl Iterator<Item = (u8, u32)> + '_ {
    let mut i = 0usize;
    std::iter::from_fn(move || {
        if i >= values.len() {
            return None;
        }
        let value = values[i];
        let start = i;
        while i < values.len() && values[i] == value {
            i += 1;
        }
        Some((value, (i - start) as u32))
    })
}
