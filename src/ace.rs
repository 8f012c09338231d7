//! # ACE Assembly Parser
//!
//! A pull iterator over the contigs of a Consed ACE file. Each contig block
//! carries a gapped consensus (`*` is the gap character), ungapped consensus
//! qualities, read placements, and the reads themselves with their `QA`
//! clipping ranges. Consensus sequences surface as encoded gapped sequences,
//! so the gap side channel and coordinate translation come along for free.
//!
//! A read whose `QA` valid range is negative is dropped with a warning and
//! counted, the rest of its contig survives. `WA`/`CT`/`RT` annotation
//! blocks are recognized and skipped. A contig filter predicate skips
//! uninteresting contigs without materializing their reads.

use std::io::BufRead;
use std::ops::Range;

use crate::alphabet::{seq_from_str, Nucleotide};
use crate::codec::EncodedNucleotides;
use crate::error::{ParseError, Result};
use crate::quality::PhredQuality;

/// The `AS` totals line of an ACE file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AceHeader {
    /// Number of contigs the file declares.
    pub num_contigs: usize,
    /// Number of reads the file declares, across all contigs.
    pub num_reads: usize,
}

/// Placement of one read within its contig (`AF` line).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadPlacement {
    /// The read name.
    pub id: String,
    /// Whether the read is reverse-complemented in the assembly.
    pub complemented: bool,
    /// 1-based gapped consensus offset of the read's first base.
    pub offset: i64,
}

/// One read of a contig (`RD` block plus its `QA` line).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AceRead {
    /// The read name.
    pub id: String,
    /// The gapped read bases.
    pub bases: Vec<Nucleotide>,
    /// Quality-clipped range, 0-based half-open over the gapped bases.
    pub qual_range: Range<usize>,
    /// Aligned range, 0-based half-open over the gapped bases.
    pub align_range: Range<usize>,
}

/// One contig of an ACE file.
#[derive(Clone, Debug)]
pub struct AceContig {
    /// The contig name.
    pub id: String,
    /// The gapped consensus, compactly encoded.
    pub consensus: EncodedNucleotides,
    /// Consensus qualities, one per ungapped consensus position.
    pub qualities: Vec<PhredQuality>,
    /// Whether the consensus is presented complemented.
    pub complemented: bool,
    /// Read placements, in file order.
    pub placements: Vec<ReadPlacement>,
    /// The surviving reads, in file order.
    pub reads: Vec<AceRead>,
}

/// A pull parser yielding ACE contigs.
pub struct Reader<R: BufRead> {
    reader: R,
    header: AceHeader,
    filter: Option<Box<dyn FnMut(&str) -> bool>>,
    pending: Option<String>,
    line: usize,
    contigs_seen: usize,
    reads_seen: usize,
    reads_dropped: usize,
}

impl<R: BufRead> Reader<R> {
    /// Parses the `AS` totals line and positions the reader at the first
    /// contig.
    pub fn new(reader: R) -> Result<Self> {
        let mut parser = Self {
            reader,
            header: AceHeader {
                num_contigs: 0,
                num_reads: 0,
            },
            filter: None,
            pending: None,
            line: 0,
            contigs_seen: 0,
            reads_seen: 0,
            reads_dropped: 0,
        };
        let first = loop {
            match parser.next_line()? {
                None => return Err(ParseError::UnexpectedEof(parser.line).into()),
                Some(line) if line.trim().is_empty() => {}
                Some(line) => break line,
            }
        };
        let mut fields = first.split_whitespace();
        if fields.next() != Some("AS") {
            return Err(ParseError::MissingPrefix {
                prefix: 'A',
                line: parser.line,
            }
            .into());
        }
        let line = parser.line;
        let malformed = || ParseError::MalformedRecord { record: "AS", line };
        parser.header = AceHeader {
            num_contigs: parse_field(fields.next(), malformed)?,
            num_reads: parse_field(fields.next(), malformed)?,
        };
        Ok(parser)
    }

    /// Installs a contig-id predicate; non-matching contigs are consumed
    /// without materializing consensus or reads.
    #[must_use]
    pub fn with_filter(mut self, filter: impl FnMut(&str) -> bool + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// The `AS` totals.
    #[must_use]
    pub fn header(&self) -> AceHeader {
        self.header
    }

    /// Number of contigs encountered so far, filtered ones included.
    #[must_use]
    pub fn contigs_seen(&self) -> usize {
        self.contigs_seen
    }

    /// Number of reads encountered so far in materialized contigs.
    #[must_use]
    pub fn reads_seen(&self) -> usize {
        self.reads_seen
    }

    /// Number of reads dropped for a negative `QA` valid range.
    #[must_use]
    pub fn reads_dropped(&self) -> usize {
        self.reads_dropped
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        let mut buf = String::new();
        if self.reader.read_line(&mut buf)? == 0 {
            return Ok(None);
        }
        self.line += 1;
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        Ok(Some(buf))
    }

    fn push_back(&mut self, line: String) {
        self.pending = Some(line);
    }

    /// Advances to the next `CO` line, skipping annotation blocks.
    fn next_contig_line(&mut self) -> Result<Option<String>> {
        while let Some(line) = self.next_line()? {
            if line.starts_with("CO ") {
                return Ok(Some(line));
            }
            if is_tag_block_open(&line) {
                self.skip_tag_block()?;
            }
        }
        Ok(None)
    }

    /// Consumes a `WA`/`CT`/`RT` block through its closing brace.
    fn skip_tag_block(&mut self) -> Result<()> {
        while let Some(line) = self.next_line()? {
            if line.trim() == "}" {
                return Ok(());
            }
        }
        Err(ParseError::UnexpectedEof(self.line).into())
    }

    /// Accumulates sequence lines until the blank line ending the block.
    ///
    /// Base lines can start with the same letters as section keywords, so
    /// only the blank delimiter ends the block.
    fn read_sequence_lines(&mut self) -> Result<String> {
        let mut body = String::new();
        while let Some(line) = self.next_line()? {
            if line.trim().is_empty() {
                break;
            }
            body.push_str(line.trim());
        }
        Ok(body)
    }

    /// Parses the `BQ` values (one per ungapped consensus position).
    fn read_base_qualities(&mut self, line_no: usize) -> Result<Vec<PhredQuality>> {
        let mut scores = Vec::new();
        while let Some(line) = self.next_line()? {
            if line.trim().is_empty() {
                break;
            }
            for field in line.split_whitespace() {
                let value: u8 = field.parse().map_err(|_| ParseError::MalformedRecord {
                    record: "BQ",
                    line: line_no,
                })?;
                scores.push(PhredQuality::new(value)?);
            }
        }
        Ok(scores)
    }

    /// Parses one `RD` block and its `QA` line. `Ok(None)` when the read is
    /// dropped for a negative valid range.
    fn read_read(&mut self, rd_line: &str) -> Result<Option<AceRead>> {
        let rd_line_no = self.line;
        let malformed = || ParseError::MalformedRecord {
            record: "RD",
            line: rd_line_no,
        };
        let mut fields = rd_line.split_whitespace().skip(1);
        let id: String = parse_field(fields.next(), malformed)?;
        let bases = seq_from_str(&self.read_sequence_lines()?)?;
        self.reads_seen += 1;

        // The QA line follows, possibly after annotation lines.
        let qa = loop {
            match self.next_line()? {
                None => return Err(ParseError::UnexpectedEof(self.line).into()),
                Some(line) if line.starts_with("QA ") => break line,
                Some(line) if line.trim().is_empty() || line.starts_with("DS ") => {}
                Some(line) => {
                    self.push_back(line);
                    return Err(ParseError::MalformedRecord {
                        record: "QA",
                        line: self.line,
                    }
                    .into());
                }
            }
        };
        let qa_line_no = self.line;
        let malformed_qa = || ParseError::MalformedRecord {
            record: "QA",
            line: qa_line_no,
        };
        let mut fields = qa.split_whitespace().skip(1);
        let qual_start: i64 = parse_field(fields.next(), malformed_qa)?;
        let qual_end: i64 = parse_field(fields.next(), malformed_qa)?;
        let align_start: i64 = parse_field(fields.next(), malformed_qa)?;
        let align_end: i64 = parse_field(fields.next(), malformed_qa)?;

        if qual_start < 1 || qual_end < 1 || qual_end < qual_start {
            log::warn!("dropping read {id}: negative QA valid range [{qual_start},{qual_end}]");
            self.reads_dropped += 1;
            return Ok(None);
        }
        let align_range = if align_start < 1 || align_end < align_start {
            0..0
        } else {
            (align_start - 1) as usize..align_end as usize
        };
        Ok(Some(AceRead {
            id,
            bases,
            qual_range: (qual_start - 1) as usize..qual_end as usize,
            align_range,
        }))
    }

    /// Consumes everything belonging to the current contig without building
    /// records, stopping ahead of the next `CO` line.
    fn skip_contig(&mut self) -> Result<()> {
        while let Some(line) = self.next_line()? {
            if line.starts_with("CO ") {
                self.push_back(line);
                return Ok(());
            }
            if is_tag_block_open(&line) {
                self.skip_tag_block()?;
            }
        }
        Ok(())
    }

    fn read_contig(&mut self) -> Result<Option<AceContig>> {
        loop {
            let Some(co) = self.next_contig_line()? else {
                return Ok(None);
            };
            self.contigs_seen += 1;

            let co_line = self.line;
            let malformed = || ParseError::MalformedRecord {
                record: "CO",
                line: co_line,
            };
            let mut fields = co.split_whitespace().skip(1);
            let id: String = parse_field(fields.next(), malformed)?;
            let gapped_length: usize = parse_field(fields.next(), malformed)?;
            let _num_reads: usize = parse_field(fields.next(), malformed)?;
            let _num_segments: usize = parse_field(fields.next(), malformed)?;
            let complemented = match fields.next() {
                Some("C") => true,
                Some("U") => false,
                _ => return Err(malformed().into()),
            };

            let wanted = match &mut self.filter {
                Some(filter) => filter(&id),
                None => true,
            };
            if !wanted {
                self.skip_contig()?;
                continue;
            }

            let consensus_text = self.read_sequence_lines()?;
            let consensus_seq = seq_from_str(&consensus_text)?;
            if consensus_seq.len() != gapped_length {
                return Err(ParseError::MalformedRecord {
                    record: "CO",
                    line: co_line,
                }
                .into());
            }
            let consensus = EncodedNucleotides::encode(&consensus_seq)?;

            let mut qualities = Vec::new();
            let mut placements = Vec::new();
            let mut reads = Vec::new();
            loop {
                let Some(line) = self.next_line()? else {
                    break;
                };
                if line.starts_with("CO ") {
                    self.push_back(line);
                    break;
                } else if line.trim().is_empty() {
                } else if line.trim() == "BQ" {
                    qualities = self.read_base_qualities(self.line)?;
                } else if line.starts_with("AF ") {
                    let af_line_no = self.line;
                    let malformed_af = || ParseError::MalformedRecord {
                        record: "AF",
                        line: af_line_no,
                    };
                    let mut fields = line.split_whitespace().skip(1);
                    let read_id: String = parse_field(fields.next(), malformed_af)?;
                    let complemented = match fields.next() {
                        Some("C") => true,
                        Some("U") => false,
                        _ => return Err(malformed_af().into()),
                    };
                    placements.push(ReadPlacement {
                        id: read_id,
                        complemented,
                        offset: parse_field(fields.next(), malformed_af)?,
                    });
                } else if line.starts_with("BS ") {
                    // Base segments are not consumed.
                } else if line.starts_with("RD ") {
                    if let Some(read) = self.read_read(&line)? {
                        reads.push(read);
                    }
                } else if is_tag_block_open(&line) {
                    self.skip_tag_block()?;
                }
            }

            // BQ covers ungapped positions only; the gap side channel of the
            // encoded consensus supplies the expected count.
            let ungapped = consensus
                .gap_offsets()?
                .ungapped_length(consensus.len());
            if !qualities.is_empty() && qualities.len() != ungapped {
                return Err(ParseError::MalformedRecord {
                    record: "BQ",
                    line: co_line,
                }
                .into());
            }

            return Ok(Some(AceContig {
                id,
                consensus,
                qualities,
                complemented,
                placements,
                reads,
            }));
        }
    }
}

impl<R: BufRead> Iterator for Reader<R> {
    type Item = Result<AceContig>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_contig().transpose()
    }
}

fn parse_field<T: std::str::FromStr>(
    field: Option<&str>,
    err: impl Fn() -> ParseError,
) -> Result<T> {
    field
        .and_then(|f| f.parse().ok())
        .ok_or_else(|| err().into())
}

/// Whether a line opens a brace-delimited annotation block.
fn is_tag_block_open(line: &str) -> bool {
    let line = line.trim();
    line.ends_with('{')
        && (line.starts_with("WA") || line.starts_with("CT") || line.starts_with("RT"))
}
