//! I/O module: BGZF container and the BAM codec layered on it
//!
//! [`bgzf`] provides byte-level access to the block-compressed container;
//! [`bam`] reads and writes alignment records through it and builds or
//! consults the BAI bin index.

pub mod bam;
pub mod bgzf;

pub use bam::{BamReader, BamWriter};
pub use bgzf::{BgzfReader, BgzfWriter, VirtualOffset};
