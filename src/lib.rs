//! biobam: streaming BGZF container, BAM codec and BAI bin index
//!
//! # Overview
//!
//! biobam covers the binary alignment subsystem of a genomics toolkit:
//!
//! - **BGZF**: a seekable container of independently deflated members of at
//!   most 64 KiB, addressed by [`VirtualOffset`]s
//! - **BAM**: header text, reference dictionary and alignment records
//!   (CIGAR, 4-bit packed bases, typed auxiliary tags) layered on BGZF
//! - **BAI**: the hierarchical bin index mapping genomic bins to chunks of
//!   virtual offsets for region queries
//!
//! ## Quick Start
//!
//! ```no_run
//! use biobam::io::bam::BamReader;
//!
//! # fn main() -> biobam::Result<()> {
//! let mut bam = BamReader::from_path("alignments.bam")?;
//!
//! for record in bam.records() {
//!     let record = record?;
//!     println!("{} {:?}", record.name, record.position);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! A reader or writer owns exactly one (de)compression buffer and cursor and is
//! not shareable. Open one instance per file (or per worker) to run in
//! parallel; [`io::bam::RecordStream`] drives a reader on its own thread behind a
//! bounded channel.
//!
//! ## Module Organization
//!
//! - [`io::bgzf`]: container reader/writer, virtual offsets, CRC32, buffer pool
//! - [`io::bam`]: header, records, CIGAR, tags, reader/writer, BAI index
//! - [`error`]: error taxonomy

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod io;

// Re-export commonly used types
pub use error::{BiobamError, ErrorCategory, Result};
pub use io::bam::{BamIndex, BamReader, BamWriter, Header, Record};
pub use io::bgzf::{BgzfReader, BgzfWriter, VirtualOffset};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
