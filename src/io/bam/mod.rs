//! Native BAM (Binary Alignment Map) codec.
//!
//! A BAM file is a BGZF stream holding, in order:
//!
//! 1. Magic `BAM\1`, the SAM header text and the binary reference dictionary
//! 2. Alignment records, each prefixed by its block size
//!
//! Records carry a 32-byte fixed core, the read name, packed CIGAR, 4-bit
//! bases, Phred qualities and typed auxiliary tags. The companion BAI index
//! ([`index`]) maps genomic bins to chunks of virtual offsets.
//!
//! # Architecture
//!
//! - **Streaming**: [`BamReader`] decodes one record at a time; memory is
//!   bounded by the largest record
//! - **Pooled scratch**: record blocks are read and encoded into buffers
//!   borrowed from a shared [`BufferPool`](crate::io::bgzf::BufferPool)
//! - **Background decoding**: [`RecordStream`] runs a reader on its own
//!   thread behind a bounded channel, stopped by a [`CancellationToken`]
//!
//! # Example
//!
//! ```no_run
//! use biobam::io::bam::BamReader;
//!
//! # fn main() -> biobam::Result<()> {
//! let mut bam = BamReader::from_path("alignments.bam")?;
//! println!("Header: {} references", bam.header().reference_count());
//!
//! for record in bam.records() {
//!     let record = record?;
//!     if let Some(pos) = record.position {
//!         println!("Read {} at position {}", record.name, pos);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Writing
//!
//! ```no_run
//! use biobam::io::bam::{BamWriter, Header, Record, Reference};
//!
//! # fn main() -> biobam::Result<()> {
//! let header = Header::new(vec![Reference::new("chr1", 248_956_422)]);
//! let mut writer = BamWriter::create("out.bam", &header)?;
//! writer.write_record(&Record::new())?;
//! writer.finish()?;
//! # Ok(())
//! # }
//! ```

mod bytes;
pub mod cigar;
pub mod error;
pub mod header;
pub mod index;
pub mod reader;
pub mod record;
pub mod sequence;
pub mod stream;
pub mod tags;
pub mod writer;

// Re-export main types for convenience
pub use cigar::{encode_cigar, format_cigar, parse_cigar, CigarOp};
pub use error::BamDecodeError;
pub use header::{read_header, write_header, Header, HeaderRecord, Reference};
pub use index::{bin, bins, BamIndex, Bin, Chunk, IndexBuilder, ReferenceIndex, ReferenceMetadata};
pub use reader::{BamReader, Query, Records};
pub use record::{encode_record, flags, parse_record, read_record, Record};
pub use sequence::{decode_sequence, encode_sequence};
pub use stream::{CancellationToken, RecordStream};
pub use tags::{encode_tags, parse_tags, ArrayValue, Tag, TagValue, Tags};
pub use writer::{BamWriter, BamWriterOptions};
