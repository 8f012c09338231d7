//! # Phred Quality Scores
//!
//! A Phred score is a logarithmic error probability: a score of `q` means the
//! basecaller estimates the call is wrong with probability `10^(-q/10)`.
//! Scores are capped at 93 so every score has a printable FASTQ character
//! (offset 33, `'!'..='~'`).

use crate::error::{CodecError, Result};

/// The highest representable score (`'~'` in FASTQ encoding).
pub const MAX_SCORE: u8 = 93;

/// ASCII offset of the FASTQ quality encoding.
const FASTQ_OFFSET: u8 = b'!';

/// A Phred quality score attached to a single basecall.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct PhredQuality(u8);

impl PhredQuality {
    /// The minimum score (error probability 1.0).
    pub const MIN: PhredQuality = PhredQuality(0);
    /// The maximum score.
    pub const MAX: PhredQuality = PhredQuality(MAX_SCORE);

    /// Creates a score, rejecting values above [`MAX_SCORE`].
    pub fn new(value: u8) -> Result<Self> {
        if value > MAX_SCORE {
            return Err(CodecError::InvalidQualityScore(value).into());
        }
        Ok(Self(value))
    }

    /// Returns the raw score value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Returns the error probability this score encodes: `10^(-q/10)`.
    #[must_use]
    pub fn error_probability(self) -> f64 {
        10f64.powf(-f64::from(self.0) / 10.0)
    }

    /// Creates the score whose error probability is closest to `p`.
    ///
    /// Probabilities at or below `10^-9.3` saturate at [`PhredQuality::MAX`];
    /// probabilities of 1.0 or more map to [`PhredQuality::MIN`].
    #[must_use]
    pub fn from_error_probability(p: f64) -> Self {
        if p >= 1.0 {
            return Self::MIN;
        }
        let q = (-10.0 * p.log10()).round();
        if q >= f64::from(MAX_SCORE) {
            Self::MAX
        } else {
            Self(q as u8)
        }
    }

    /// Returns the FASTQ character for this score (offset 33).
    #[inline]
    #[must_use]
    pub const fn to_fastq_char(self) -> char {
        (self.0 + FASTQ_OFFSET) as char
    }

    /// Parses a FASTQ quality character (offset 33).
    pub fn from_fastq_char(c: char) -> Result<Self> {
        let b = c as u32;
        if !(FASTQ_OFFSET as u32..=(FASTQ_OFFSET + MAX_SCORE) as u32).contains(&b) {
            return Err(CodecError::UnsupportedSymbol {
                symbol: c,
                alphabet: "FASTQ quality characters '!'..='~'",
            }
            .into());
        }
        Ok(Self(b as u8 - FASTQ_OFFSET))
    }
}

impl From<PhredQuality> for u8 {
    fn from(q: PhredQuality) -> u8 {
        q.0
    }
}

impl std::fmt::Display for PhredQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parses a FASTQ quality line into scores.
pub fn scores_from_fastq(line: &[u8]) -> Result<Vec<PhredQuality>> {
    line.iter()
        .map(|&b| PhredQuality::from_fastq_char(b as char))
        .collect()
}

/// Converts raw byte values into scores, rejecting values above the ceiling.
pub fn scores_from_raw(values: &[u8]) -> Result<Vec<PhredQuality>> {
    values.iter().map(|&v| PhredQuality::new(v)).collect()
}

/// Strips the newtype from a slice of scores.
#[must_use]
pub fn scores_to_raw(scores: &[PhredQuality]) -> Vec<u8> {
    scores.iter().map(|q| q.value()).collect()
}
