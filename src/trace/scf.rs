//! # SCF v3 Chromatogram Reader
//!
//! SCF stores a trace as a fixed 128-byte header plus three sections the
//! header points at: the sample planes, the base section, and free-form
//! comments. Version 3 lays both data sections out structure-of-arrays and
//! double-delta encodes the samples: each channel plane stores second-order
//! differences, undone by two passes of cumulative summation wrapping at the
//! sample width.
//!
//! Only version 3 (`3.00`) is parsed; version 2 interleaves its sections
//! per-sample and is rejected with a version error.

use byteorder::{BigEndian, ByteOrder};

use super::{Chromatogram, ChromatogramBuilder, TraceSamples};
use crate::alphabet::seq_from_bytes;
use crate::error::{Result, TraceError};
use crate::quality::scores_from_raw;

/// The SCF magic, ASCII `.scf`.
pub const MAGIC: [u8; 4] = *b".scf";

/// Total header size.
const SIZE_HEADER: usize = 128;

/// Parsed SCF header fields the reader acts on.
struct Header {
    num_samples: usize,
    samples_offset: usize,
    num_bases: usize,
    bases_offset: usize,
    comments_size: usize,
    comments_offset: usize,
    sample_size: usize,
}

/// Decodes an SCF v3 file into a chromatogram.
///
/// Per-base confidences are the probability plane of each called base; the
/// four raw sample channels and any `KEY=value` comments are carried along.
pub fn decode(bytes: &[u8]) -> Result<Chromatogram> {
    let header = read_header(bytes)?;

    let mut builder = ChromatogramBuilder::new()
        .samples(read_samples(bytes, &header)?);
    builder = read_bases(bytes, &header, builder)?;
    for (key, value) in read_comments(bytes, &header)? {
        builder = builder.comment(key, value);
    }
    builder.build()
}

fn read_header(bytes: &[u8]) -> Result<Header> {
    if bytes.len() < SIZE_HEADER {
        return Err(TraceError::FileTruncation(bytes.len()).into());
    }
    if bytes[0..4] != MAGIC {
        return Err(TraceError::InvalidMagicNumber {
            expected: &MAGIC,
            found: bytes[0..4].to_vec(),
        }
        .into());
    }
    let version = &bytes[36..40];
    if version != b"3.00" {
        return Err(TraceError::UnsupportedVersion(
            String::from_utf8_lossy(version).into_owned(),
        )
        .into());
    }
    let sample_size = BigEndian::read_u32(&bytes[40..44]) as usize;
    if !(sample_size == 1 || sample_size == 2) {
        return Err(TraceError::MalformedRecord {
            format: "SCF header",
            offset: 40,
        }
        .into());
    }
    Ok(Header {
        num_samples: BigEndian::read_u32(&bytes[4..8]) as usize,
        samples_offset: BigEndian::read_u32(&bytes[8..12]) as usize,
        num_bases: BigEndian::read_u32(&bytes[12..16]) as usize,
        bases_offset: BigEndian::read_u32(&bytes[24..28]) as usize,
        comments_size: BigEndian::read_u32(&bytes[28..32]) as usize,
        comments_offset: BigEndian::read_u32(&bytes[32..36]) as usize,
        sample_size,
    })
}

/// Bounds-checks one header-addressed section.
fn section<'a>(bytes: &'a [u8], offset: usize, len: usize, name: &'static str) -> Result<&'a [u8]> {
    let end = offset.checked_add(len).filter(|&end| end <= bytes.len());
    match end {
        Some(end) => Ok(&bytes[offset..end]),
        None => Err(TraceError::TruncatedChunk {
            chunk: name.to_owned(),
            offset,
        }
        .into()),
    }
}

/// Undoes the double-delta encoding of one channel plane in place.
///
/// Two cumulative-sum passes, wrapping at the sample width.
fn unpack_plane(plane: &[u8], sample_size: usize) -> Vec<u16> {
    let mut values: Vec<u16> = if sample_size == 1 {
        plane.iter().map(|&b| u16::from(b)).collect()
    } else {
        plane.chunks_exact(2).map(BigEndian::read_u16).collect()
    };
    for _ in 0..2 {
        let mut acc = 0u16;
        for v in &mut values {
            acc = if sample_size == 1 {
                u16::from((acc as u8).wrapping_add(*v as u8))
            } else {
                acc.wrapping_add(*v)
            };
            *v = acc;
        }
    }
    values
}

fn read_samples(bytes: &[u8], header: &Header) -> Result<TraceSamples> {
    let plane_len = header.num_samples * header.sample_size;
    let data = section(bytes, header.samples_offset, plane_len * 4, "SCF samples")?;
    let mut planes = data
        .chunks_exact(plane_len.max(1))
        .map(|plane| unpack_plane(plane, header.sample_size));
    if plane_len == 0 {
        return Ok(TraceSamples::default());
    }
    Ok(TraceSamples {
        a: planes.next().unwrap_or_default(),
        c: planes.next().unwrap_or_default(),
        g: planes.next().unwrap_or_default(),
        t: planes.next().unwrap_or_default(),
    })
}

fn read_bases(
    bytes: &[u8],
    header: &Header,
    builder: ChromatogramBuilder,
) -> Result<ChromatogramBuilder> {
    let n = header.num_bases;
    // Structure-of-arrays: peaks, four probability planes, calls, 3n spare.
    let data = section(bytes, header.bases_offset, n * 12, "SCF bases")?;
    let peaks = data[..4 * n]
        .chunks_exact(4)
        .map(BigEndian::read_u32)
        .collect::<Vec<_>>();
    let probs = &data[4 * n..8 * n];
    let calls = &data[8 * n..9 * n];

    let basecalls = seq_from_bytes(calls)?;
    // Confidence of each call is its base's own probability plane entry.
    let mut confidence_raw = Vec::with_capacity(n);
    for (i, base) in basecalls.iter().enumerate() {
        let plane = match base.to_char() {
            'A' => 0,
            'C' => 1,
            'G' => 2,
            'T' => 3,
            _ => {
                confidence_raw.push(0);
                continue;
            }
        };
        confidence_raw.push(probs[plane * n + i]);
    }

    Ok(builder
        .basecalls(basecalls)
        .peaks(peaks)
        .confidences(scores_from_raw(&confidence_raw)?))
}

fn read_comments(bytes: &[u8], header: &Header) -> Result<Vec<(String, String)>> {
    let data = section(
        bytes,
        header.comments_offset,
        header.comments_size,
        "SCF comments",
    )?;
    let text = String::from_utf8_lossy(data);
    Ok(text
        .lines()
        .filter_map(|line| {
            let line = line.trim_end_matches('\0');
            line.split_once('=')
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
        })
        .collect())
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::alphabet::seq_to_string;
    use crate::error::Error;
    use anyhow::Result;

    /// Applies two passes of differencing, the inverse of `unpack_plane`.
    fn double_delta(values: &[u16]) -> Vec<u16> {
        let mut out = values.to_vec();
        for _ in 0..2 {
            let mut prev = 0u16;
            for v in &mut out {
                let current = *v;
                *v = current.wrapping_sub(prev);
                prev = current;
            }
        }
        out
    }

    /// Builds a v3 file with 2-byte samples from per-channel curves.
    fn file_with(
        planes: &[&[u16]; 4],
        peaks: &[u32],
        probs: &[&[u8]; 4],
        calls: &[u8],
        comments: &str,
    ) -> Vec<u8> {
        let num_samples = planes[0].len();
        let n = calls.len();
        let samples_offset = SIZE_HEADER;
        let bases_offset = samples_offset + num_samples * 2 * 4;
        let comments_offset = bases_offset + n * 12;

        let mut file = vec![0u8; SIZE_HEADER];
        file[0..4].copy_from_slice(&MAGIC);
        BigEndian::write_u32(&mut file[4..8], num_samples as u32);
        BigEndian::write_u32(&mut file[8..12], samples_offset as u32);
        BigEndian::write_u32(&mut file[12..16], n as u32);
        BigEndian::write_u32(&mut file[24..28], bases_offset as u32);
        BigEndian::write_u32(&mut file[28..32], comments.len() as u32);
        BigEndian::write_u32(&mut file[32..36], comments_offset as u32);
        file[36..40].copy_from_slice(b"3.00");
        BigEndian::write_u32(&mut file[40..44], 2);

        for plane in planes {
            for v in double_delta(plane) {
                file.extend_from_slice(&v.to_be_bytes());
            }
        }
        for &p in peaks {
            file.extend_from_slice(&p.to_be_bytes());
        }
        for plane in probs {
            file.extend_from_slice(plane);
        }
        file.extend_from_slice(calls);
        file.resize(file.len() + 3 * n, 0);
        file.extend_from_slice(comments.as_bytes());
        file
    }

    #[test]
    fn v3_file_round_trips_through_double_delta() -> Result<()> {
        let a = [0u16, 10, 50, 120, 60, 10];
        let c = [5u16, 5, 5, 5, 5, 5];
        let g = [0u16, 0, 30, 80, 30, 0];
        let t = [1u16, 2, 3, 4, 5, 6];
        let file = file_with(
            &[&a, &c, &g, &t],
            &[1, 4],
            &[&[40, 0], &[2, 0], &[3, 50], &[1, 0]],
            b"AG",
            "MACH=test\nNAME=sample\n",
        );
        let chroma = decode(&file)?;
        assert_eq!(seq_to_string(chroma.basecalls()), "AG");
        assert_eq!(chroma.peaks(), &[1, 4]);
        // A's confidence from the A plane, G's from the G plane.
        assert_eq!(chroma.confidences()[0].value(), 40);
        assert_eq!(chroma.confidences()[1].value(), 50);
        let samples = chroma.samples().unwrap();
        assert_eq!(samples.a, a);
        assert_eq!(samples.c, c);
        assert_eq!(samples.g, g);
        assert_eq!(samples.t, t);
        assert_eq!(chroma.comment("NAME"), Some("sample"));
        Ok(())
    }

    #[test]
    fn version_two_is_rejected() {
        let mut file = file_with(&[&[], &[], &[], &[]], &[], &[&[], &[], &[], &[]], b"", "");
        file[36..40].copy_from_slice(b"2.00");
        assert!(matches!(
            decode(&file).unwrap_err(),
            Error::TraceError(TraceError::UnsupportedVersion(v)) if v == "2.00"
        ));
    }

    #[test]
    fn bad_magic_and_truncation() {
        assert!(matches!(
            decode(b"....").unwrap_err(),
            Error::TraceError(TraceError::FileTruncation(4))
        ));

        let mut file = vec![0u8; SIZE_HEADER];
        file[0..4].copy_from_slice(b"nope");
        assert!(matches!(
            decode(&file).unwrap_err(),
            Error::TraceError(TraceError::InvalidMagicNumber { .. })
        ));

        // Sample section points past the end of the file.
        let file = file_with(
            &[&[1, 2], &[1, 2], &[1, 2], &[1, 2]],
            &[1],
            &[&[9], &[9], &[9], &[9]],
            b"A",
            "",
        );
        let mut short = file.clone();
        short.truncate(SIZE_HEADER + 3);
        assert!(matches!(
            decode(&short).unwrap_err(),
            Error::TraceError(TraceError::TruncatedChunk { chunk, .. }) if chunk == "SCF samples"
        ));
    }

    #[test]
    fn bad_sample_size_is_malformed() {
        let mut file = file_with(&[&[], &[], &[], &[]], &[], &[&[], &[], &[], &[]], b"", "");
        BigEndian::write_u32(&mut file[40..44], 3);
        assert!(matches!(
            decode(&file).unwrap_err(),
            Error::TraceError(TraceError::MalformedRecord {
                format: "SCF header",
                offset: 40
            })
        ));
    }
}
