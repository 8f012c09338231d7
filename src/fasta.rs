//! # FASTA Reader and Writers
//!
//! A pull-style FASTA parser: the reader is an iterator of records, and a
//! defline filter predicate decides which records are worth materializing,
//! so skipped records cost line reads but no sequence allocation. Malformed
//! records either fail the iteration or, with
//! [`skip_malformed`](Reader::skip_malformed), are logged, counted, and
//! stepped over; nothing is dropped silently either way.
//!
//! Writers cover the two classic shapes: [`Writer`] for base sequences with
//! a wrapped body, and [`QualWriter`] for quality-FASTA files of
//! space-separated decimal scores.

use std::io::{BufRead, Write};

use crate::error::{ParseError, Result};
use crate::quality::PhredQuality;

/// Default body wrap width for [`Writer`].
pub const DEFAULT_LINE_WIDTH: usize = 60;

/// Default scores per line for [`QualWriter`].
pub const DEFAULT_SCORES_PER_LINE: usize = 17;

/// One FASTA record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FastaRecord {
    /// The identifier: the defline up to the first whitespace.
    pub id: String,
    /// The rest of the defline, when present.
    pub comment: Option<String>,
    /// The sequence body with line breaks removed, as ASCII.
    pub sequence: Vec<u8>,
}

/// A pull parser over `>`-delimited FASTA records.
pub struct Reader<R: BufRead> {
    reader: R,
    filter: Option<Box<dyn FnMut(&str) -> bool>>,
    skip_malformed: bool,
    line: usize,
    pending_defline: Option<String>,
    records_seen: usize,
    records_skipped: usize,
}

impl<R: BufRead> Reader<R> {
    /// Creates a reader over a buffered source.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            filter: None,
            skip_malformed: false,
            line: 0,
            pending_defline: None,
            records_seen: 0,
            records_skipped: 0,
        }
    }

    /// Installs a defline predicate.
    ///
    /// Records whose defline (without the `>`) fails the predicate are
    /// passed over without materializing their bodies.
    #[must_use]
    pub fn with_filter(mut self, filter: impl FnMut(&str) -> bool + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Step over malformed records instead of failing the iteration.
    ///
    /// Every skip is logged at warn level and counted in
    /// [`records_skipped`](Self::records_skipped).
    #[must_use]
    pub fn skip_malformed(mut self) -> Self {
        self.skip_malformed = true;
        self
    }

    /// Number of records encountered so far, filtered ones included.
    #[must_use]
    pub fn records_seen(&self) -> usize {
        self.records_seen
    }

    /// Number of malformed records stepped over so far.
    #[must_use]
    pub fn records_skipped(&self) -> usize {
        self.records_skipped
    }

    /// Reads the next line, stripping the terminator. `None` at EOF.
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

    /// Advances to the next defline, consuming stray body lines.
    fn next_defline(&mut self) -> Result<Option<String>> {
        if let Some(defline) = self.pending_defline.take() {
            return Ok(Some(defline));
        }
        while let Some(line) = self.next_line()? {
            if let Some(defline) = line.strip_prefix('>') {
                return Ok(Some(defline.to_owned()));
            }
            if line.is_empty() {
                continue;
            }
            // Sequence data with no defline above it.
            let err = ParseError::MissingPrefix {
                prefix: '>',
                line: self.line,
            };
            if self.skip_malformed {
                log::warn!("skipping FASTA content without a defline: {err}");
                self.records_skipped += 1;
                continue;
            }
            return Err(err.into());
        }
        Ok(None)
    }

    /// Reads body lines until the next defline or EOF.
    ///
    /// With `materialize` false the lines are consumed but not kept.
    fn read_body(&mut self, materialize: bool) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        while let Some(line) = self.next_line()? {
            if let Some(defline) = line.strip_prefix('>') {
                self.pending_defline = Some(defline.to_owned());
                break;
            }
            if materialize {
                body.extend_from_slice(line.trim().as_bytes());
            }
        }
        Ok(body)
    }

    fn read_record(&mut self) -> Result<Option<FastaRecord>> {
        loop {
            let Some(defline) = self.next_defline()? else {
                return Ok(None);
            };
            self.records_seen += 1;

            let wanted = match &mut self.filter {
                Some(filter) => filter(&defline),
                None => true,
            };
            let body = self.read_body(wanted)?;
            if !wanted {
                continue;
            }

            let mut parts = defline.splitn(2, char::is_whitespace);
            let id = parts.next().unwrap_or_default().to_owned();
            let comment = parts
                .next()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_owned);
            return Ok(Some(FastaRecord {
                id,
                comment,
                sequence: body,
            }));
        }
    }
}

impl<R: BufRead> Iterator for Reader<R> {
    type Item = Result<FastaRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

/// Writes FASTA records with a wrapped sequence body.
pub struct Writer<W: Write> {
    inner: W,
    width: usize,
}

impl<W: Write> Writer<W> {
    /// Creates a writer wrapping bodies at the default 60 columns.
    pub fn new(inner: W) -> Self {
        Self::with_width(inner, DEFAULT_LINE_WIDTH)
    }

    /// Creates a writer with an explicit wrap width.
    pub fn with_width(inner: W, width: usize) -> Self {
        Self {
            inner,
            width: width.max(1),
        }
    }

    /// Writes one record.
    pub fn write_record(
        &mut self,
        id: &str,
        comment: Option<&str>,
        sequence: &[u8],
    ) -> Result<()> {
        match comment {
            Some(comment) => writeln!(self.inner, ">{id} {comment}")?,
            None => writeln!(self.inner, ">{id}")?,
        }
        for chunk in sequence.chunks(self.width) {
            self.inner.write_all(chunk)?;
            self.inner.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Writes quality-FASTA records: space-separated decimal scores.
pub struct QualWriter<W: Write> {
    inner: W,
    per_line: usize,
    formatter: itoa::Buffer,
}

impl<W: Write> QualWriter<W> {
    /// Creates a writer with the default scores-per-line count.
    pub fn new(inner: W) -> Self {
        Self::with_scores_per_line(inner, DEFAULT_SCORES_PER_LINE)
    }

    /// Creates a writer with an explicit scores-per-line count.
    pub fn with_scores_per_line(inner: W, per_line: usize) -> Self {
        Self {
            inner,
            per_line: per_line.max(1),
            formatter: itoa::Buffer::new(),
        }
    }

    /// Writes one record's scores.
    pub fn write_record(&mut self, id: &str, scores: &[PhredQuality]) -> Result<()> {
        writeln!(self.inner, ">{id}")?;
        for line in scores.chunks(self.per_line) {
            for (i, q) in line.iter().enumerate() {
                if i > 0 {
                    self.inner.write_all(b" ")?;
                }
                self.inner.write_all(self.formatter.format(q.value()).as_bytes())?;
            }
            self.inner.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::error::Error;
    use anyhow::Result;

    const TWO_RECORDS: &str = ">seq1 sample comment\nACGTAC\nGTAC\n>seq2\nTTTT\n";

    #[test]
    fn multi_line_bodies_concatenate() -> Result<()> {
        let mut reader = Reader::new(TWO_RECORDS.as_bytes());
        let first = reader.next().unwrap()?;
        assert_eq!(first.id, "seq1");
        assert_eq!(first.comment.as_deref(), Some("sample comment"));
        assert_eq!(first.sequence, b"ACGTACGTAC");

        let second = reader.next().unwrap()?;
        assert_eq!(second.id, "seq2");
        assert_eq!(second.comment, None);
        assert_eq!(second.sequence, b"TTTT");

        assert!(reader.next().is_none());
        assert_eq!(reader.records_seen(), 2);
        assert_eq!(reader.records_skipped(), 0);
        Ok(())
    }

    #[test]
    fn crlf_and_blank_lines_are_tolerated() -> Result<()> {
        let input = ">a\r\nAC\r\nGT\r\n\r\n>b\r\nTT\r\n";
        let records: Vec<FastaRecord> = Reader::new(input.as_bytes()).collect::<Result<_, _>>()?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence, b"ACGT");
        assert_eq!(records[1].sequence, b"TT");
        Ok(())
    }

    #[test]
    fn filter_skips_without_materializing() -> Result<()> {
        let mut reader =
            Reader::new(TWO_RECORDS.as_bytes()).with_filter(|defline| defline.starts_with("seq2"));
        let only = reader.next().unwrap()?;
        assert_eq!(only.id, "seq2");
        assert!(reader.next().is_none());
        assert_eq!(reader.records_seen(), 2, "filtered records still count");
        Ok(())
    }

    #[test]
    fn missing_prefix_fails_or_skips() {
        let input = "ACGT\n>ok\nAC\n";
        let err = Reader::new(input.as_bytes()).next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            Error::ParseError(ParseError::MissingPrefix { prefix: '>', line: 1 })
        ));

        let mut reader = Reader::new(input.as_bytes()).skip_malformed();
        let record = reader.next().unwrap().unwrap();
        assert_eq!(record.id, "ok");
        assert_eq!(reader.records_skipped(), 1);
    }

    #[test]
    fn writer_wraps_bodies() -> Result<()> {
        let mut writer = Writer::with_width(Vec::new(), 4);
        writer.write_record("seq1", Some("c"), b"ACGTACGTAC")?;
        writer.write_record("seq2", None, b"")?;
        let text = String::from_utf8(writer.into_inner()?)?;
        assert_eq!(text, ">seq1 c\nACGT\nACGT\nAC\n>seq2\n");
        Ok(())
    }

    #[test]
    fn written_records_read_back() -> Result<()> {
        let mut writer = Writer::new(Vec::new());
        writer.write_record("r", None, b"ACGTACGT")?;
        let bytes = writer.into_inner()?;
        let record = Reader::new(bytes.as_slice()).next().unwrap()?;
        assert_eq!(record.id, "r");
        assert_eq!(record.sequence, b"ACGTACGT");
        Ok(())
    }

    #[test]
    fn qual_writer_wraps_scores() -> Result<()> {
        let scores: Vec<PhredQuality> = (0..5)
            .map(|v| PhredQuality::new(v * 10).unwrap())
            .collect();
        let mut writer = QualWriter::with_scores_per_line(Vec::new(), 3);
        writer.write_record("seq1", &scores)?;
        let text = String::from_utf8(writer.into_inner()?)?;
        assert_eq!(text, ">seq1\n0 10 20\n30 40\n");
        Ok(())
    }
}
