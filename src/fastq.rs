//! # FASTQ Pull Parser
//!
//! An iterator over the 4-line FASTQ form: `@id`, bases, `+` separator
//! (optionally repeating the id), and offset-33 quality characters. A
//! base/quality length mismatch is a record-level error; with
//! [`skip_malformed`](Reader::skip_malformed) such records are logged,
//! counted, and stepped over so the rest of the batch survives.

use std::io::BufRead;

use crate::error::{Error, ParseError, Result};
use crate::quality::{scores_from_fastq, PhredQuality};

/// One FASTQ record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FastqRecord {
    /// The identifier from the `@` line, up to the first whitespace.
    pub id: String,
    /// The called bases, as ASCII.
    pub bases: Vec<u8>,
    /// Per-base quality scores.
    pub qualities: Vec<PhredQuality>,
}

/// A pull parser over 4-line FASTQ records.
pub struct Reader<R: BufRead> {
    reader: R,
    skip_malformed: bool,
    line: usize,
    records_seen: usize,
    records_skipped: usize,
}

impl<R: BufRead> Reader<R> {
    /// Creates a reader over a buffered source.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            skip_malformed: false,
            line: 0,
            records_seen: 0,
            records_skipped: 0,
        }
    }

    /// Step over malformed records instead of failing the iteration.
    #[must_use]
    pub fn skip_malformed(mut self) -> Self {
        self.skip_malformed = true;
        self
    }

    /// Number of records encountered so far.
    #[must_use]
    pub fn records_seen(&self) -> usize {
        self.records_seen
    }

    /// Number of malformed records stepped over so far.
    #[must_use]
    pub fn records_skipped(&self) -> usize {
        self.records_skipped
    }

    fn next_line(&mut self) -> Result<Option<String>> {
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

    /// Parses one 4-line block. `Ok(None)` at a clean EOF.
    fn parse_block(&mut self) -> Result<Option<FastqRecord>> {
        let header = loop {
            match self.next_line()? {
                None => return Ok(None),
                Some(line) if line.is_empty() => {}
                Some(line) => break line,
            }
        };
        self.records_seen += 1;

        let Some(defline) = header.strip_prefix('@') else {
            return Err(ParseError::MissingPrefix {
                prefix: '@',
                line: self.line,
            }
            .into());
        };
        let id = defline
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_owned();

        let bases = self
            .next_line()?
            .ok_or(ParseError::UnexpectedEof(self.line))?
            .into_bytes();
        let separator = self
            .next_line()?
            .ok_or(ParseError::UnexpectedEof(self.line))?;
        // The separator may be bare or repeat the defline.
        if !separator.starts_with('+')
            || !(separator.len() == 1 || separator[1..] == *defline)
        {
            return Err(ParseError::MalformedRecord {
                record: "fastq separator",
                line: self.line,
            }
            .into());
        }
        let qual_line = self
            .next_line()?
            .ok_or(ParseError::UnexpectedEof(self.line))?;

        if bases.len() != qual_line.len() {
            return Err(ParseError::LengthMismatch {
                id,
                bases: bases.len(),
                quals: qual_line.len(),
            }
            .into());
        }
        let qualities = scores_from_fastq(qual_line.as_bytes())?;
        Ok(Some(FastqRecord {
            id,
            bases,
            qualities,
        }))
    }

    fn read_record(&mut self) -> Result<Option<FastqRecord>> {
        loop {
            match self.parse_block() {
                Ok(record) => return Ok(record),
                Err(err) if self.skip_malformed && recoverable(&err) => {
                    log::warn!("skipping malformed FASTQ record: {err}");
                    self.records_skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Whether an error is contained to one record, making skipping meaningful.
///
/// I/O failures and truncation are not: the stream cannot be resynchronized
/// past them.
fn recoverable(err: &Error) -> bool {
    !matches!(
        err,
        Error::IoError(_) | Error::ParseError(ParseError::UnexpectedEof(_))
    )
}

impl<R: BufRead> Iterator for Reader<R> {
    type Item = Result<FastqRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use anyhow::Result;

    const WELL_FORMED: &str = "@read1 lane7\nACGT\n+\nIIII\n@read2\nTT\n+read2\n!J\n";

    #[test]
    fn four_line_records_parse() -> Result<()> {
        let mut reader = Reader::new(WELL_FORMED.as_bytes());
        let first = reader.next().unwrap()?;
        assert_eq!(first.id, "read1");
        assert_eq!(first.bases, b"ACGT");
        assert_eq!(first.qualities.len(), 4);
        assert_eq!(first.qualities[0].value(), 40);

        let second = reader.next().unwrap()?;
        assert_eq!(second.id, "read2");
        assert_eq!(second.qualities[0].value(), 0);
        assert_eq!(second.qualities[1].value(), 41);

        assert!(reader.next().is_none());
        assert_eq!(reader.records_seen(), 2);
        Ok(())
    }

    #[test]
    fn separator_repeating_the_defline() {
        // The `+` line may repeat the full defline but nothing else.
        let input = "@r x\nAC\n+r x\nII\n";
        assert!(Reader::new(input.as_bytes()).next().unwrap().is_ok());

        let input = "@r\nAC\n+other\nII\n";
        let err = Reader::new(input.as_bytes()).next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            Error::ParseError(ParseError::MalformedRecord {
                record: "fastq separator",
                ..
            })
        ));
    }

    #[test]
    fn length_mismatch_is_a_record_error() {
        let input = "@r\nACGT\n+\nII\n";
        let err = Reader::new(input.as_bytes()).next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            Error::ParseError(ParseError::LengthMismatch { bases: 4, quals: 2, .. })
        ));
    }

    #[test]
    fn skip_malformed_preserves_siblings() -> Result<()> {
        let input = "@bad\nACGT\n+\nII\n@good\nAC\n+\nIJ\n";
        let mut reader = Reader::new(input.as_bytes()).skip_malformed();
        let survivor = reader.next().unwrap()?;
        assert_eq!(survivor.id, "good");
        assert!(reader.next().is_none());
        assert_eq!(reader.records_seen(), 2);
        assert_eq!(reader.records_skipped(), 1);
        Ok(())
    }

    #[test]
    fn truncation_is_not_skippable() {
        let input = "@r\nACGT\n";
        let mut reader = Reader::new(input.as_bytes()).skip_malformed();
        assert!(matches!(
            reader.next().unwrap().unwrap_err(),
            Error::ParseError(ParseError::UnexpectedEof(_))
        ));
    }

    #[test]
    fn missing_at_prefix() {
        let input = "read1\nACGT\n+\nIIII\n";
        let err = Reader::new(input.as_bytes()).next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            Error::ParseError(ParseError::MissingPrefix { prefix: '@', line: 1 })
        ));
    }

    #[test]
    fn bad_quality_characters_are_rejected() {
        let input = "@r\nAC\n+\nI\u{7f}\n";
        let err = Reader::new(input.as_bytes()).next().unwrap().unwrap_err();
        assert!(err.to_string().contains("quality"));
    }
}
