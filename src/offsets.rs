//! # Gapped/Ungapped Coordinate Translation
//!
//! An aligned sequence lives in two index spaces at once: the *gapped* space
//! (indices into the sequence with its alignment gaps) and the *ungapped*
//! space (indices into the raw sequence with gaps removed). [`GapOffsets`]
//! holds the ordered gap positions of a sequence and translates between the
//! two spaces.
//!
//! The forward direction is a subtraction; the inverse must account for gaps
//! introduced by the act of translating itself and is the subtle half (see
//! [`GapOffsets::gapped_offset_for`]).

use crate::alphabet::Nucleotide;
use crate::error::{CodecError, Result};

/// The ordered gap positions of a gapped sequence, in gapped coordinates.
///
/// Offsets are strictly increasing. The empty list translates both
/// directions as the identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct GapOffsets {
    offsets: Vec<u32>,
}

impl GapOffsets {
    /// Creates a translator from an offset list.
    ///
    /// # Errors
    ///
    /// Returns an error if the offsets are not strictly increasing.
    pub fn new(offsets: Vec<u32>) -> Result<Self> {
        for (pos, pair) in offsets.windows(2).enumerate() {
            if pair[0] >= pair[1] {
                return Err(CodecError::OffsetsOutOfOrder(pos + 1).into());
            }
        }
        Ok(Self { offsets })
    }

    /// Creates an empty translator (no gaps).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Collects the gap positions of a gapped symbol slice.
    #[must_use]
    pub fn from_symbols(seq: &[Nucleotide]) -> Self {
        let offsets = seq
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_gap())
            .map(|(i, _)| i as u32)
            .collect();
        Self { offsets }
    }

    /// Returns the gap positions, in increasing gapped coordinates.
    #[must_use]
    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// Returns the number of gaps.
    #[must_use]
    pub fn num_gaps(&self) -> usize {
        self.offsets.len()
    }

    /// Whether there are no gaps at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Whether the gapped index `gapped` is a gap position.
    #[must_use]
    pub fn is_gap(&self, gapped: usize) -> bool {
        let Ok(gapped) = u32::try_from(gapped) else {
            return false;
        };
        self.offsets.binary_search(&gapped).is_ok()
    }

    /// Counts the gaps at or before the gapped index `gapped` (inclusive).
    #[must_use]
    pub fn num_gaps_until(&self, gapped: usize) -> usize {
        self.offsets
            .partition_point(|&off| off as usize <= gapped)
    }

    /// Translates a gapped index into the ungapped space.
    ///
    /// A non-gap index maps to the index its symbol has once every gap is
    /// removed. A gap index maps forward to the ungapped index of the next
    /// non-gap symbol, so only gaps *strictly before* the query adjust it:
    /// for `ACGT-ACGT` (gap at 4), `ungapped_offset_for(4) == 4` and
    /// `ungapped_offset_for(8) == 7`.
    #[must_use]
    pub fn ungapped_offset_for(&self, gapped: usize) -> usize {
        let gaps_before = self.offsets.partition_point(|&off| (off as usize) < gapped);
        gapped - gaps_before
    }

    /// Translates an ungapped index into the gapped space.
    ///
    /// Each gap that lands at or before the position being built shifts the
    /// result forward, and whether a gap counts depends on the
    /// *already-shifted* position, not the raw ungapped one. Offsets are
    /// strictly increasing, so testing each once in increasing order is
    /// enough: once an offset fails the test the shifted position is final
    /// and every later offset fails too.
    #[must_use]
    pub fn gapped_offset_for(&self, ungapped: usize) -> usize {
        let mut gaps = 0usize;
        for &off in &self.offsets {
            if off as usize <= ungapped + gaps {
                gaps += 1;
            } else {
                break;
            }
        }
        ungapped + gaps
    }

    /// Returns the ungapped length of a sequence with this gap set.
    #[must_use]
    pub fn ungapped_length(&self, gapped_length: usize) -> usize {
        gapped_length - self.offsets.len()
    }
}
