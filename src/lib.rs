//! Compact storage and interchange for nucleotide sequence data: bit-packed
//! sequence codecs with a gap side channel, run-length and delta byte codecs,
//! gapped/ungapped coordinate translation, chromatogram and flowgram trace
//! readers (ZTR, SFF, SCF), text-format parsers (FASTA, FASTQ, ACE), and an
//! LRU-cached datastore boundary.

pub mod ace;
pub mod alphabet;
pub mod codec;
pub mod datastore;
pub mod error;
pub mod fasta;
pub mod fastq;
pub mod offsets;
pub mod prelude;
pub mod quality;
pub mod trace;

pub use error::{Error, Result};
