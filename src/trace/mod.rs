//! # Chromatogram Traces
//!
//! Binary trace-file readers and the in-memory chromatogram they produce:
//!
//! 1. [`ztr`] - chunked ZTR traces with layered codec stacks per chunk.
//! 2. [`sff`] - 454/Ion Torrent flowgram containers, streamed or
//!    memory-mapped with random access.
//! 3. [`scf`] - SCF v3 traces with double-delta sample planes.
//!
//! A [`Chromatogram`] pairs basecalls with their peak sample positions and
//! per-base confidences, plus the four raw sample channels when the source
//! format carries them. The three sections must align by index; the formats
//! store them in independent chunks, so [`ChromatogramBuilder`] is where the
//! alignment rule is enforced, not the codec layer.

pub mod scf;
pub mod sff;
pub mod ztr;

use crate::alphabet::Nucleotide;
use crate::error::{Result, TraceError};
use crate::quality::PhredQuality;

/// The four raw sample channels of a trace, one per base.
///
/// All channels have the same length (one value per sample point).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TraceSamples {
    /// A-channel intensities.
    pub a: Vec<u16>,
    /// C-channel intensities.
    pub c: Vec<u16>,
    /// G-channel intensities.
    pub g: Vec<u16>,
    /// T-channel intensities.
    pub t: Vec<u16>,
}

impl TraceSamples {
    /// Number of sample points per channel.
    #[must_use]
    pub fn len(&self) -> usize {
        self.a.len()
    }

    /// Whether the trace has no sample points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }

    /// The channel tracking a canonical base, if `base` is one.
    #[must_use]
    pub fn channel(&self, base: Nucleotide) -> Option<&[u16]> {
        match base {
            Nucleotide::A => Some(&self.a),
            Nucleotide::C => Some(&self.c),
            Nucleotide::G => Some(&self.g),
            Nucleotide::T => Some(&self.t),
            _ => None,
        }
    }
}

/// A decoded chromatogram: basecalls aligned with peaks and confidences.
///
/// Index `i` of every section describes the same called base. Values are
/// immutable once built; construction goes through [`ChromatogramBuilder`],
/// which rejects misaligned sections.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chromatogram {
    basecalls: Vec<Nucleotide>,
    peaks: Vec<u32>,
    confidences: Vec<PhredQuality>,
    samples: Option<TraceSamples>,
    comments: Vec<(String, String)>,
}

impl Chromatogram {
    /// The called bases.
    #[must_use]
    pub fn basecalls(&self) -> &[Nucleotide] {
        &self.basecalls
    }

    /// Peak sample position of each called base.
    #[must_use]
    pub fn peaks(&self) -> &[u32] {
        &self.peaks
    }

    /// Confidence of each called base.
    #[must_use]
    pub fn confidences(&self) -> &[PhredQuality] {
        &self.confidences
    }

    /// The raw sample channels, when the source format carries them.
    #[must_use]
    pub fn samples(&self) -> Option<&TraceSamples> {
        self.samples.as_ref()
    }

    /// Key/value metadata (ZTR `TEXT` chunks, SCF comments).
    #[must_use]
    pub fn comments(&self) -> &[(String, String)] {
        &self.comments
    }

    /// Looks up one metadata value by key.
    #[must_use]
    pub fn comment(&self, key: &str) -> Option<&str> {
        self.comments
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Number of called bases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.basecalls.len()
    }

    /// Whether no bases were called.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.basecalls.is_empty()
    }
}

/// Accumulates chromatogram sections as a format reader encounters them.
///
/// Formats deliver sections in arbitrary order, so each setter just stores;
/// [`build`](Self::build) checks that basecalls, peaks, and confidences are
/// all present and agree in length.
#[derive(Default)]
pub struct ChromatogramBuilder {
    basecalls: Option<Vec<Nucleotide>>,
    peaks: Option<Vec<u32>>,
    confidences: Option<Vec<PhredQuality>>,
    samples: Option<TraceSamples>,
    comments: Vec<(String, String)>,
}

impl ChromatogramBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the called bases.
    #[must_use]
    pub fn basecalls(mut self, basecalls: Vec<Nucleotide>) -> Self {
        self.basecalls = Some(basecalls);
        self
    }

    /// Sets the peak sample positions.
    #[must_use]
    pub fn peaks(mut self, peaks: Vec<u32>) -> Self {
        self.peaks = Some(peaks);
        self
    }

    /// Sets the per-base confidences.
    #[must_use]
    pub fn confidences(mut self, confidences: Vec<PhredQuality>) -> Self {
        self.confidences = Some(confidences);
        self
    }

    /// Sets the raw sample channels.
    #[must_use]
    pub fn samples(mut self, samples: TraceSamples) -> Self {
        self.samples = Some(samples);
        self
    }

    /// Appends one key/value comment.
    #[must_use]
    pub fn comment(mut self, key: String, value: String) -> Self {
        self.comments.push((key, value));
        self
    }

    /// Builds the chromatogram, enforcing the index-alignment rule.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::MissingSection`] when basecalls, peaks, or
    /// confidences were never set, and [`TraceError::SectionMisalignment`]
    /// when their lengths disagree.
    pub fn build(self) -> Result<Chromatogram> {
        let basecalls = self
            .basecalls
            .ok_or(TraceError::MissingSection("basecall"))?;
        let peaks = self.peaks.ok_or(TraceError::MissingSection("peak"))?;
        let confidences = self
            .confidences
            .ok_or(TraceError::MissingSection("confidence"))?;
        if basecalls.len() != peaks.len() || basecalls.len() != confidences.len() {
            return Err(TraceError::SectionMisalignment {
                bases: basecalls.len(),
                peaks: peaks.len(),
                confidences: confidences.len(),
            }
            .into());
        }
        Ok(Chromatogram {
            basecalls,
            peaks,
            confidences,
            samples: self.samples,
            comments: self.comments,
        })
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::alphabet::seq_from_str;
    use crate::error::Error;
    use anyhow::Result;

    fn scores(values: &[u8]) -> Vec<PhredQuality> {
        values
            .iter()
            .map(|&v| PhredQuality::new(v).unwrap())
            .collect()
    }

    #[test]
    fn aligned_sections_build() -> Result<()> {
        let chroma = ChromatogramBuilder::new()
            .basecalls(seq_from_str("ACGT")?)
            .peaks(vec![3, 15, 27, 40])
            .confidences(scores(&[20, 30, 30, 12]))
            .comment("MACH".into(), "test".into())
            .build()?;
        assert_eq!(chroma.len(), 4);
        assert_eq!(chroma.peaks()[2], 27);
        assert_eq!(chroma.comment("MACH"), Some("test"));
        assert_eq!(chroma.comment("NAME"), None);
        assert!(chroma.samples().is_none());
        Ok(())
    }

    #[test]
    fn misaligned_sections_are_rejected() {
        let err = ChromatogramBuilder::new()
            .basecalls(seq_from_str("ACGT").unwrap())
            .peaks(vec![3, 15, 27])
            .confidences(scores(&[20, 30, 30, 12]))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::TraceError(TraceError::SectionMisalignment {
                bases: 4,
                peaks: 3,
                confidences: 4
            })
        ));
    }

    #[test]
    fn missing_sections_are_named() {
        let err = ChromatogramBuilder::new()
            .basecalls(seq_from_str("AC").unwrap())
            .confidences(scores(&[1, 2]))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::TraceError(TraceError::MissingSection("peak"))
        ));
    }

    #[test]
    fn sample_channels_by_base() {
        let samples = TraceSamples {
            a: vec![1, 2],
            c: vec![3, 4],
            g: vec![5, 6],
            t: vec![7, 8],
        };
        assert_eq!(samples.len(), 2);
        assert_eq!(samples.channel(Nucleotide::G), Some(&[5u16, 6][..]));
        assert_eq!(samples.channel(Nucleotide::N), None);
    }
}
