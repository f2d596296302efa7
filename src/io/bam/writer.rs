//! BAM file writer with BGZF compression.
//!
//! The header goes into its own member so that the first record starts at
//! a member boundary. Records are encoded into pooled scratch buffers and
//! appended to the BGZF stream; optionally a BAI index is built on the fly
//! from the virtual offsets bracketing each record.
//!
//! # Example
//!
//! ```no_run
//! use biobam::io::bam::{BamWriter, BamWriterOptions, CigarOp, Header, Record, Reference};
//!
//! # fn main() -> biobam::Result<()> {
//! let header = Header::new(vec![Reference::new("chr1", 248_956_422)]);
//! let options = BamWriterOptions { build_index: true, ..Default::default() };
//! let mut writer = BamWriter::create_with_options("output.bam", &header, options)?;
//!
//! let mut record = Record::new();
//! record.name = "read1".to_string();
//! record.reference_id = Some(0);
//! record.position = Some(1000);
//! record.sequence = b"ACGT".to_vec();
//! record.quality = b"####".to_vec();
//! record.cigar = vec![CigarOp::Match(4)];
//! writer.write_record(&record)?;
//!
//! let (_, index) = writer.finish()?;
//! if let Some(index) = index {
//!     index.write_to_path("output.bam.bai")?;
//! }
//! # Ok(())
//! # }
//! ```

use super::header::{write_header, Header};
use super::index::{BamIndex, IndexBuilder};
use super::record::{encode_record, Record};
use crate::error::{BiobamError, Result};
use crate::io::bgzf::{BgzfWriter, BufferPool, VirtualOffset};
use flate2::Compression;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};

/// Writer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BamWriterOptions {
    /// Deflate level for every member
    pub compression: Compression,
    /// Build a BAI index while writing (requires coordinate-sorted input)
    pub build_index: bool,
}

impl Default for BamWriterOptions {
    fn default() -> Self {
        Self {
            compression: Compression::new(6),
            build_index: false,
        }
    }
}

/// BAM file writer.
pub struct BamWriter<W: Write> {
    writer: BgzfWriter<W>,
    reference_count: usize,
    index: Option<IndexBuilder>,
    pool: Arc<BufferPool>,
    records_written: u64,
}

impl<W: Write> BamWriter<W> {
    /// Create a writer with default options and write `header`.
    pub fn new(inner: W, header: &Header) -> Result<Self> {
        Self::with_options(inner, header, BamWriterOptions::default())
    }

    /// Create a writer and write `header`.
    pub fn with_options(inner: W, header: &Header, options: BamWriterOptions) -> Result<Self> {
        let mut writer = BgzfWriter::with_compression(inner, options.compression);
        write_header(&mut writer, header)?;
        writer.flush_member()?;

        debug!(
            references = header.reference_count(),
            build_index = options.build_index,
            "opened BAM writer"
        );
        Ok(Self {
            writer,
            reference_count: header.reference_count(),
            index: options
                .build_index
                .then(|| IndexBuilder::new(header.reference_count())),
            pool: Arc::new(BufferPool::default()),
            records_written: 0,
        })
    }

    /// Share a buffer pool with other readers or writers.
    pub fn with_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.pool = pool;
        self
    }

    /// Virtual offset at which the next record will start.
    pub fn virtual_offset(&self) -> VirtualOffset {
        self.writer.virtual_offset()
    }

    /// Number of records written.
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Encode and append one record.
    ///
    /// # Errors
    ///
    /// - [`BiobamError::InvalidInput`] for a reference outside the header
    ///   dictionary or a value the BAM layout cannot hold
    /// - [`BamDecodeError::UnsortedRecords`](super::BamDecodeError::UnsortedRecords)
    ///   when indexing and `record` sorts before the previous one
    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        for (id, field) in [
            (record.reference_id, "reference"),
            (record.mate_reference_id, "mate reference"),
        ] {
            if let Some(id) = id.filter(|&id| id >= self.reference_count) {
                return Err(BiobamError::InvalidInput(format!(
                    "{} id {} outside dictionary of {} references",
                    field, id, self.reference_count
                )));
            }
        }
        if let Some(index) = &self.index {
            index.check_record(record)?;
        }

        let mut block = self.pool.acquire(512);
        encode_record(record, &mut block)?;

        let begin = self.writer.virtual_offset();
        self.writer.write_all(&block)?;
        let end = self.writer.virtual_offset();

        if let Some(index) = &mut self.index {
            index.add_record(record, begin, end)?;
        }
        self.records_written += 1;
        trace!(%begin, name = %record.name, "wrote BAM record");
        Ok(())
    }

    /// Flush pending records, write the EOF marker and return the
    /// destination together with the index, if one was built.
    pub fn finish(mut self) -> Result<(W, Option<BamIndex>)> {
        self.writer.finish()?;
        let index = self.index.take().map(IndexBuilder::finish);
        debug!(records = self.records_written, "finished BAM writer");
        Ok((self.writer.into_inner()?, index))
    }
}

impl BamWriter<BufWriter<File>> {
    /// Create a BAM file at `path` with default options.
    pub fn create<P: AsRef<Path>>(path: P, header: &Header) -> Result<Self> {
        Self::create_with_options(path, header, BamWriterOptions::default())
    }

    /// Create a BAM file at `path`.
    pub fn create_with_options<P: AsRef<Path>>(
        path: P,
        header: &Header,
        options: BamWriterOptions,
    ) -> Result<Self> {
        let file = File::create(path)?;
        Self::with_options(BufWriter::new(file), header, options)
    }
}
