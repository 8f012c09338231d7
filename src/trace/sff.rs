//! # SFF Flowgram Reader
//!
//! The 454/Ion Torrent flowgram container: a common header describing the
//! flow order, then one record per read carrying flowgram intensities, the
//! per-base flow index, basecalls, and qualities. Everything is big-endian
//! and every section pads to an 8-byte boundary.
//!
//! Two readers cover the two access patterns:
//!
//! 1. [`StreamReader`] - forward-only pull iterator over any [`Read`]
//!    source.
//! 2. [`MmapReader`] - memory-maps the file, scans the read boundaries once
//!    to build an offset index, then serves [`get`](MmapReader::get) and
//!    [`get_by_name`](MmapReader::get_by_name) random access. File
//!    regularity and truncation are validated up front, during the scan.
//!
//! Clip points are 1-based inclusive with 0 meaning "not set"; reads expose
//! the effective clean range as a 0-based half-open range.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use byteorder::{BigEndian, ReadBytesExt};
use memmap2::Mmap;

use crate::alphabet::{seq_from_bytes, Nucleotide};
use crate::error::{Result, TraceError};
use crate::quality::{scores_from_raw, PhredQuality};

/// The SFF magic number, ASCII `.sff`.
pub const MAGIC: u32 = 0x2E73_6666;

/// The only supported container version.
const VERSION: [u8; 4] = [0, 0, 0, 1];

/// The only defined flowgram value format: u16 values at 0.01 scale.
const FLOWGRAM_FORMAT: u8 = 1;

/// Rounds a section length up to the container's 8-byte alignment.
const fn padded(len: usize) -> usize {
    len.next_multiple_of(8)
}

/// The file-wide header of an SFF container.
#[derive(Clone, Debug)]
pub struct SffHeader {
    index_offset: u64,
    index_length: u32,
    num_reads: u32,
    num_flows: u16,
    flow_chars: Vec<u8>,
    key_sequence: Vec<u8>,
}

impl SffHeader {
    /// Number of reads the file declares.
    #[must_use]
    pub fn num_reads(&self) -> usize {
        self.num_reads as usize
    }

    /// Number of flows per read.
    #[must_use]
    pub fn num_flows(&self) -> usize {
        self.num_flows as usize
    }

    /// The nucleotide flowed at each flow cycle, as ASCII.
    #[must_use]
    pub fn flow_chars(&self) -> &[u8] {
        &self.flow_chars
    }

    /// The key sequence every read is expected to start with.
    #[must_use]
    pub fn key_sequence(&self) -> &[u8] {
        &self.key_sequence
    }

    /// Byte span of the optional in-file read index, when present.
    fn index_span(&self) -> Option<Range<usize>> {
        if self.index_length == 0 {
            None
        } else {
            let start = self.index_offset as usize;
            Some(start..start + padded(self.index_length as usize))
        }
    }
}

/// One read of an SFF file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SffRead {
    name: String,
    flowgram: Vec<u16>,
    flow_index: Vec<u8>,
    bases: Vec<u8>,
    qualities: Vec<PhredQuality>,
    clip_qual: (u16, u16),
    clip_adapter: (u16, u16),
}

impl SffRead {
    /// The read name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw flowgram values, one per flow, at 0.01 scale.
    #[must_use]
    pub fn flowgram(&self) -> &[u16] {
        &self.flowgram
    }

    /// The estimated homopolymer length of flow `i`.
    #[must_use]
    pub fn flow_value(&self, i: usize) -> f32 {
        f32::from(self.flowgram[i]) / 100.0
    }

    /// Per-base offset into the flowgram, cumulative from the prior base.
    #[must_use]
    pub fn flow_index(&self) -> &[u8] {
        &self.flow_index
    }

    /// The called bases, as ASCII.
    #[must_use]
    pub fn bases(&self) -> &[u8] {
        &self.bases
    }

    /// The called bases as alphabet symbols.
    pub fn nucleotides(&self) -> Result<Vec<Nucleotide>> {
        seq_from_bytes(&self.bases)
    }

    /// Per-base quality scores.
    #[must_use]
    pub fn qualities(&self) -> &[PhredQuality] {
        &self.qualities
    }

    /// Number of called bases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    /// Whether no bases were called.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    /// The quality clip points as stored: 1-based inclusive, 0 for unset.
    #[must_use]
    pub fn clip_qual(&self) -> (u16, u16) {
        self.clip_qual
    }

    /// The adapter clip points as stored: 1-based inclusive, 0 for unset.
    #[must_use]
    pub fn clip_adapter(&self) -> (u16, u16) {
        self.clip_adapter
    }

    /// The effective clean range, 0-based half-open.
    ///
    /// Left edge is the tighter of the two left clips (unset treated as 1),
    /// right edge the tighter of the set right clips (both unset falls back
    /// to the read length). Clip points come straight from the file, so both
    /// edges are clamped to the read length.
    #[must_use]
    pub fn clean_range(&self) -> Range<usize> {
        let len = self.bases.len();
        let first = (1.max(self.clip_qual.0.max(self.clip_adapter.0)) as usize - 1).min(len);
        let last = [self.clip_qual.1, self.clip_adapter.1]
            .iter()
            .filter(|&&c| c != 0)
            .map(|&c| c as usize)
            .min()
            .unwrap_or(len)
            .min(len);
        first..last.max(first)
    }

    /// The bases inside the clean range.
    #[must_use]
    pub fn clean_bases(&self) -> &[u8] {
        &self.bases[self.clean_range()]
    }
}

/// A [`Read`] wrapper tracking the byte position for error reporting.
struct Source<R> {
    inner: R,
    position: usize,
}

impl<R: Read> Source<R> {
    fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf)?;
        self.position += buf.len();
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8> {
        let v = self.inner.read_u8()?;
        self.position += 1;
        Ok(v)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let v = self.inner.read_u16::<BigEndian>()?;
        self.position += 2;
        Ok(v)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let v = self.inner.read_u32::<BigEndian>()?;
        self.position += 4;
        Ok(v)
    }

    fn read_u64(&mut self) -> Result<u64> {
        let v = self.inner.read_u64::<BigEndian>()?;
        self.position += 8;
        Ok(v)
    }

    fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        let copied = std::io::copy(
            &mut self.inner.by_ref().take(len as u64),
            &mut std::io::sink(),
        )?;
        if copied as usize != len {
            return Err(TraceError::FileTruncation(self.position + copied as usize).into());
        }
        self.position += len;
        Ok(())
    }
}

/// Parses the common header, leaving the source at the first read record.
fn read_header<R: Read>(src: &mut Source<R>) -> Result<SffHeader> {
    let magic = src.read_u32()?;
    if magic != MAGIC {
        return Err(TraceError::InvalidMagicNumber {
            expected: b".sff",
            found: magic.to_be_bytes().to_vec(),
        }
        .into());
    }
    let mut version = [0u8; 4];
    src.read_exact(&mut version)?;
    if version != VERSION {
        return Err(TraceError::UnsupportedVersion(format!("{version:?}")).into());
    }
    let index_offset = src.read_u64()?;
    let index_length = src.read_u32()?;
    let num_reads = src.read_u32()?;
    let header_length = src.read_u16()?;
    let key_length = src.read_u16()?;
    let num_flows = src.read_u16()?;
    let flowgram_format = src.read_u8()?;

    let fixed = 31 + num_flows as usize + key_length as usize;
    if flowgram_format != FLOWGRAM_FORMAT
        || !(header_length as usize).is_multiple_of(8)
        || (header_length as usize) < fixed
    {
        return Err(TraceError::MalformedRecord {
            format: "SFF common header",
            offset: 0,
        }
        .into());
    }

    let flow_chars = src.read_vec(num_flows as usize)?;
    let key_sequence = src.read_vec(key_length as usize)?;
    src.skip(header_length as usize - fixed)?;

    Ok(SffHeader {
        index_offset,
        index_length,
        num_reads,
        num_flows,
        flow_chars,
        key_sequence,
    })
}

/// Parses one read record, header and data section.
fn read_record<R: Read>(src: &mut Source<R>, num_flows: usize) -> Result<SffRead> {
    let start = src.position;
    let malformed = |offset| TraceError::MalformedRecord {
        format: "SFF read",
        offset,
    };

    let header_length = src.read_u16()? as usize;
    let name_length = src.read_u16()? as usize;
    let num_bases = src.read_u32()? as usize;
    let clip_qual = (src.read_u16()?, src.read_u16()?);
    let clip_adapter = (src.read_u16()?, src.read_u16()?);
    if header_length != padded(16 + name_length) {
        return Err(malformed(start).into());
    }
    let name_bytes = src.read_vec(name_length)?;
    let name = String::from_utf8(name_bytes).map_err(|_| malformed(start))?;
    src.skip(header_length - 16 - name_length)?;

    let flowgram = {
        let raw = src.read_vec(num_flows * 2)?;
        raw.chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>()
    };
    let flow_index = src.read_vec(num_bases)?;
    let bases = src.read_vec(num_bases)?;
    let qualities =
        scores_from_raw(&src.read_vec(num_bases)?).map_err(|_| malformed(start))?;
    let data_len = num_flows * 2 + num_bases * 3;
    src.skip(padded(data_len) - data_len)?;

    Ok(SffRead {
        name,
        flowgram,
        flow_index,
        bases,
        qualities,
        clip_qual,
        clip_adapter,
    })
}

/// A forward-only reader pulling SFF reads from any [`Read`] source.
pub struct StreamReader<R: Read> {
    src: Source<R>,
    header: SffHeader,
    reads_delivered: u32,
}

impl<R: Read> StreamReader<R> {
    /// Parses the common header and positions the reader at the first read.
    pub fn new(reader: R) -> Result<Self> {
        let mut src = Source::new(reader);
        let header = read_header(&mut src)?;
        Ok(Self {
            src,
            header,
            reads_delivered: 0,
        })
    }

    /// The common header.
    #[must_use]
    pub fn header(&self) -> &SffHeader {
        &self.header
    }

    /// Pulls the next read, or `None` once the declared count is delivered.
    pub fn next_read(&mut self) -> Option<Result<SffRead>> {
        if self.reads_delivered >= self.header.num_reads {
            return None;
        }
        // The optional read index can sit between records; hop over it.
        if let Some(span) = self.header.index_span() {
            if self.src.position == span.start {
                if let Err(e) = self.src.skip(span.len()) {
                    return Some(Err(e));
                }
            }
        }
        self.reads_delivered += 1;
        Some(read_record(&mut self.src, self.header.num_flows()))
    }
}

impl<R: Read> Iterator for StreamReader<R> {
    type Item = Result<SffRead>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_read()
    }
}

/// A memory-mapped SFF reader with random access by index or name.
///
/// The constructor scans every read boundary once, validating the file
/// against its own headers; lookups afterwards parse only the requested
/// record. Clones share the mapping through an [`Arc`].
#[derive(Clone)]
pub struct MmapReader {
    mmap: Arc<Mmap>,
    header: SffHeader,
    offsets: Vec<usize>,
    by_name: HashMap<String, usize>,
}

impl MmapReader {
    /// Maps the file and builds the read offset index.
    ///
    /// # Errors
    ///
    /// Fails if the path is not a regular file, the header is invalid, or
    /// the file ends before the read count it declares.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        if !file.metadata()?.is_file() {
            return Err(TraceError::IncompatibleFile.into());
        }
        // Safety: the file is open and won't be modified while mapped
        let mmap = unsafe { Mmap::map(&file)? };

        let mut src = Source::new(&mmap[..]);
        let header = read_header(&mut src)?;

        let mut offsets = Vec::with_capacity(header.num_reads());
        let mut by_name = HashMap::with_capacity(header.num_reads());
        for idx in 0..header.num_reads() {
            if let Some(span) = header.index_span() {
                if src.position == span.start {
                    src.skip(span.len())?;
                }
            }
            offsets.push(src.position);
            let read = read_record(&mut src, header.num_flows())
                .map_err(|_| TraceError::FileTruncation(src.position))?;
            by_name.insert(read.name.clone(), idx);
        }

        Ok(Self {
            mmap: Arc::new(mmap),
            header,
            offsets,
            by_name,
        })
    }

    /// The common header.
    #[must_use]
    pub fn header(&self) -> &SffHeader {
        &self.header
    }

    /// Number of reads in the file.
    #[must_use]
    pub fn num_reads(&self) -> usize {
        self.offsets.len()
    }

    /// Parses the read at `idx`.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::OutOfRange`] for an index beyond the read
    /// count.
    pub fn get(&self, idx: usize) -> Result<SffRead> {
        let Some(&offset) = self.offsets.get(idx) else {
            return Err(TraceError::OutOfRange(idx, self.offsets.len()).into());
        };
        let mut src = Source::new(&self.mmap[offset..]);
        src.position = offset;
        read_record(&mut src, self.header.num_flows())
    }

    /// Parses the read with the given name, if one exists.
    pub fn get_by_name(&self, name: &str) -> Option<Result<SffRead>> {
        self.by_name.get(name).map(|&idx| self.get(idx))
    }

    /// Whether a read with this name exists, without parsing it.
    #[must_use]
    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }
}
