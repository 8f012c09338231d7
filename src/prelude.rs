pub use crate::alphabet::Nucleotide;
pub use crate::codec::{
    DeltaCodec, EncodedNucleotides, Lane, Level, NucleotideCodec, RunLengthCodec,
};
pub use crate::datastore::{DataStore, LruDataStore};
pub use crate::error::{Error, Result};
pub use crate::offsets::GapOffsets;
pub use crate::quality::PhredQuality;
pub use crate::trace::{Chromatogram, TraceSamples};
