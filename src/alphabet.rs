//! # Nucleotide Symbol Model
//!
//! The residue alphabet used throughout the crate: the four canonical bases,
//! the eleven IUPAC ambiguity codes, and the alignment gap. Every symbol
//! carries a stable byte-sized ordinal; the first four ordinals double as the
//! 2-bit packed codes used by the codec layer.

use crate::error::{CodecError, Result};

/// A nucleotide residue, including IUPAC ambiguity codes and the alignment gap.
///
/// Ordinals are explicit and stable: `A..=T` are the 2-bit packed codes,
/// `A..=N` are the 4-bit packed codes, and `Gap` is never packed (gap
/// positions travel in a side channel, see [`crate::codec`]).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Nucleotide {
    /// Adenine.
    A = 0,
    /// Cytosine.
    C = 1,
    /// Guanine.
    G = 2,
    /// Thymine.
    T = 3,
    /// Amino: A or C.
    M = 4,
    /// Purine: A or G.
    R = 5,
    /// Weak: A or T.
    W = 6,
    /// Strong: C or G.
    S = 7,
    /// Pyrimidine: C or T.
    Y = 8,
    /// Keto: G or T.
    K = 9,
    /// Not T: A, C, or G.
    V = 10,
    /// Not G: A, C, or T.
    H = 11,
    /// Not C: A, G, or T.
    D = 12,
    /// Not A: C, G, or T.
    B = 13,
    /// Any base.
    N = 14,
    /// Alignment gap.
    Gap = 15,
}

impl Nucleotide {
    /// Number of distinct symbols in the alphabet (gap included).
    pub const SIZE: usize = 16;

    /// Returns the byte-sized ordinal of this symbol.
    #[inline]
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    /// Returns the symbol with the given ordinal, or `None` if out of range.
    #[inline]
    #[must_use]
    pub const fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            0 => Some(Self::A),
            1 => Some(Self::C),
            2 => Some(Self::G),
            3 => Some(Self::T),
            4 => Some(Self::M),
            5 => Some(Self::R),
            6 => Some(Self::W),
            7 => Some(Self::S),
            8 => Some(Self::Y),
            9 => Some(Self::K),
            10 => Some(Self::V),
            11 => Some(Self::H),
            12 => Some(Self::D),
            13 => Some(Self::B),
            14 => Some(Self::N),
            15 => Some(Self::Gap),
            _ => None,
        }
    }

    /// Returns the symbol for a character, or `None` if it is not part of the
    /// alphabet.
    ///
    /// Matching is case-insensitive. `U` is accepted as an alias for `T`, and
    /// both `-` and `*` map to the gap (assembly formats write gaps as `*`).
    #[must_use]
    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            'A' | 'a' => Some(Self::A),
            'C' | 'c' => Some(Self::C),
            'G' | 'g' => Some(Self::G),
            'T' | 't' | 'U' | 'u' => Some(Self::T),
            'M' | 'm' => Some(Self::M),
            'R' | 'r' => Some(Self::R),
            'W' | 'w' => Some(Self::W),
            'S' | 's' => Some(Self::S),
            'Y' | 'y' => Some(Self::Y),
            'K' | 'k' => Some(Self::K),
            'V' | 'v' => Some(Self::V),
            'H' | 'h' => Some(Self::H),
            'D' | 'd' => Some(Self::D),
            'B' | 'b' => Some(Self::B),
            'N' | 'n' => Some(Self::N),
            '-' | '*' => Some(Self::Gap),
            _ => None,
        }
    }

    /// Returns the symbol for a character, erroring on anything outside the
    /// alphabet.
    pub fn try_from_char(c: char) -> Result<Self> {
        Self::from_char(c).ok_or_else(|| {
            CodecError::UnsupportedSymbol {
                symbol: c,
                alphabet: "IUPAC nucleotides and gap",
            }
            .into()
        })
    }

    /// Returns the canonical (uppercase) character for this symbol.
    #[must_use]
    pub const fn to_char(self) -> char {
        match self {
            Self::A => 'A',
            Self::C => 'C',
            Self::G => 'G',
            Self::T => 'T',
            Self::M => 'M',
            Self::R => 'R',
            Self::W => 'W',
            Self::S => 'S',
            Self::Y => 'Y',
            Self::K => 'K',
            Self::V => 'V',
            Self::H => 'H',
            Self::D => 'D',
            Self::B => 'B',
            Self::N => 'N',
            Self::Gap => '-',
        }
    }

    /// Whether this symbol is the alignment gap.
    #[inline]
    #[must_use]
    pub const fn is_gap(self) -> bool {
        matches!(self, Self::Gap)
    }

    /// Whether this symbol is an ambiguity code (anything other than the four
    /// canonical bases and the gap).
    #[inline]
    #[must_use]
    pub const fn is_ambiguity(self) -> bool {
        !matches!(self, Self::A | Self::C | Self::G | Self::T | Self::Gap)
    }

    /// Returns the set of canonical bases this symbol can resolve to.
    ///
    /// Canonical bases resolve to themselves; the gap resolves to nothing.
    /// For example `S` (strong) resolves to `{C, G}`.
    #[must_use]
    pub const fn constituents(self) -> &'static [Nucleotide] {
        use Nucleotide::{A, C, G, T};
        match self {
            Self::A => &[A],
            Self::C => &[C],
            Self::G => &[G],
            Self::T => &[T],
            Self::M => &[A, C],
            Self::R => &[A, G],
            Self::W => &[A, T],
            Self::S => &[C, G],
            Self::Y => &[C, T],
            Self::K => &[G, T],
            Self::V => &[A, C, G],
            Self::H => &[A, C, T],
            Self::D => &[A, G, T],
            Self::B => &[C, G, T],
            Self::N => &[A, C, G, T],
            Self::Gap => &[],
        }
    }

    /// Whether `base` is among the canonical bases this symbol resolves to.
    #[must_use]
    pub fn resolves_to(self, base: Nucleotide) -> bool {
        self.constituents().contains(&base)
    }

    /// Returns the Watson-Crick complement of this symbol.
    ///
    /// Ambiguity codes complement to the code covering the complements of
    /// their constituents; the gap is its own complement.
    #[must_use]
    pub const fn complement(self) -> Self {
        match self {
            Self::A => Self::T,
            Self::C => Self::G,
            Self::G => Self::C,
            Self::T => Self::A,
            Self::M => Self::K,
            Self::R => Self::Y,
            Self::W => Self::W,
            Self::S => Self::S,
            Self::Y => Self::R,
            Self::K => Self::M,
            Self::V => Self::B,
            Self::H => Self::D,
            Self::D => Self::H,
            Self::B => Self::V,
            Self::N => Self::N,
            Self::Gap => Self::Gap,
        }
    }
}

impl std::fmt::Display for Nucleotide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

/// Converts a string into a symbol sequence, erroring on the first character
/// outside the alphabet.
pub fn seq_from_str(s: &str) -> Result<Vec<Nucleotide>> {
    s.chars().map(Nucleotide::try_from_char).collect()
}

/// Converts an ASCII byte slice into a symbol sequence.
pub fn seq_from_bytes(bytes: &[u8]) -> Result<Vec<Nucleotide>> {
    bytes
        .iter()
        .map(|&b| Nucleotide::try_from_char(b as char))
        .collect()
}

/// Renders a symbol sequence as its canonical string form.
#[must_use]
pub fn seq_to_string(seq: &[Nucleotide]) -> String {
    seq.iter().map(|n| n.to_char()).collect()
}
