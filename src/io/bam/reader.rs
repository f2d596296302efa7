//! BAM streaming reader.
//!
//! Records are decoded one at a time from a [`BgzfReader`], so memory stays
//! bounded by the largest record regardless of file size. Each record block
//! is read into a buffer borrowed from a shared [`BufferPool`].
//!
//! # Usage
//!
//! ```no_run
//! use biobam::io::bam::BamReader;
//!
//! # fn main() -> biobam::Result<()> {
//! let mut bam = BamReader::from_path("alignments.bam")?;
//! println!("Header: {} references", bam.header().reference_count());
//!
//! for result in bam.records() {
//!     let record = result?;
//!     println!("{} at {:?}", record.name, record.position);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Region Queries
//!
//! With a [`BamIndex`], [`BamReader::query`] seeks straight to the chunks
//! that can hold records overlapping a region:
//!
//! ```no_run
//! use biobam::io::bam::{BamIndex, BamReader};
//!
//! # fn main() -> biobam::Result<()> {
//! let index = BamIndex::from_path("alignments.bam.bai")?;
//! let mut bam = BamReader::from_path("alignments.bam")?;
//!
//! for record in bam.query_by_name(&index, "chr1", 1_000_000, 1_001_000)? {
//!     let record = record?;
//!     println!("{}", record.name);
//! }
//! # Ok(())
//! # }
//! ```

use super::error::BamDecodeError;
use super::header::{read_header, Header};
use super::index::{BamIndex, Chunk};
use super::record::{parse_record, read_block, Record};
use super::stream::CancellationToken;
use crate::error::{BiobamError, Result};
use crate::io::bgzf::{BgzfReader, BufferPool, VirtualOffset};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};

/// Initial capacity requested from the pool for a record block.
const RECORD_BUFFER_HINT: usize = 512;

/// BAM file reader with streaming interface.
///
/// The header is read once during construction, then records are streamed.
pub struct BamReader<R> {
    reader: BgzfReader<R>,
    header: Header,
    pool: Arc<BufferPool>,
}

impl<R: Read> BamReader<R> {
    /// Create a new BAM reader over a BGZF byte source.
    ///
    /// Reads and validates the BAM header immediately.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The source is not BGZF
    /// - Invalid magic bytes
    /// - Header text and binary dictionary disagree
    pub fn new(inner: R) -> Result<Self> {
        Self::from_bgzf(BgzfReader::new(inner))
    }

    /// Create a reader from an already positioned [`BgzfReader`].
    pub fn from_bgzf(mut reader: BgzfReader<R>) -> Result<Self> {
        let header = read_header(&mut reader)?;
        debug!(
            references = header.reference_count(),
            offset = %reader.virtual_offset(),
            "opened BAM reader"
        );
        Ok(Self {
            reader,
            header,
            pool: Arc::new(BufferPool::default()),
        })
    }

    /// Share a buffer pool with other readers or writers.
    pub fn with_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.pool = pool;
        self
    }

    /// Get a reference to the BAM header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Virtual offset of the next record.
    pub fn virtual_offset(&self) -> VirtualOffset {
        self.reader.virtual_offset()
    }

    /// Consume the reader, returning the BGZF layer.
    pub fn into_inner(self) -> BgzfReader<R> {
        self.reader
    }

    /// Read a single record.
    ///
    /// Returns `Ok(None)` at the end of the stream.
    ///
    /// # Errors
    ///
    /// Besides truncation and decode failures, a record whose reference or
    /// mate reference lies outside the header dictionary is rejected with
    /// [`BamDecodeError::InvalidReferenceId`].
    pub fn read_record(&mut self) -> Result<Option<Record>> {
        let offset = self.reader.virtual_offset();
        let mut buf = self.pool.acquire(RECORD_BUFFER_HINT);
        if !read_block(&mut self.reader, &mut buf)? {
            return Ok(None);
        }

        let record = parse_record(&buf)?;
        self.check_references(&record)?;
        trace!(%offset, name = %record.name, "read BAM record");
        Ok(Some(record))
    }

    fn check_references(&self, record: &Record) -> Result<()> {
        let count = self.header.reference_count();
        for (id, field) in [
            (record.reference_id, "reference"),
            (record.mate_reference_id, "mate reference"),
        ] {
            if let Some(id) = id.filter(|&id| id >= count) {
                return Err(BamDecodeError::InvalidReferenceId {
                    value: id as i32,
                    field,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Create an iterator over BAM records.
    ///
    /// Iteration stops after the first error.
    pub fn records(&mut self) -> Records<'_, R> {
        Records {
            reader: self,
            cancel: None,
            done: false,
        }
    }

    /// Iterate records, checking `token` before each one.
    ///
    /// Once the token fires the iterator yields a single
    /// [`BiobamError::Cancelled`] and then ends.
    pub fn records_with_cancel(&mut self, token: &CancellationToken) -> Records<'_, R> {
        Records {
            reader: self,
            cancel: Some(token.clone()),
            done: false,
        }
    }
}

impl<R: Read + Seek> BamReader<R> {
    /// Reposition to a record boundary previously reported by
    /// [`BamReader::virtual_offset`] or an index.
    pub fn seek(&mut self, offset: VirtualOffset) -> Result<()> {
        self.reader.seek(offset)
    }

    /// Records overlapping the 0-based half-open interval `[begin, end)` on
    /// reference `reference_id`.
    ///
    /// # Errors
    ///
    /// [`BiobamError::InvalidRange`] for an unknown reference or an empty
    /// interval.
    pub fn query<'a>(
        &'a mut self,
        index: &BamIndex,
        reference_id: usize,
        begin: u64,
        end: u64,
    ) -> Result<Query<'a, R>> {
        if reference_id >= self.header.reference_count() {
            return Err(BiobamError::InvalidRange(format!(
                "reference {} not in header ({} references)",
                reference_id,
                self.header.reference_count()
            )));
        }
        let chunks = index.query_chunks(reference_id, begin, end)?;
        debug!(reference_id, begin, end, chunks = chunks.len(), "BAM region query");

        Ok(Query {
            reader: self,
            chunks: chunks.into_iter(),
            chunk_end: None,
            reference_id,
            begin,
            end,
            done: false,
        })
    }

    /// Like [`BamReader::query`], naming the reference.
    pub fn query_by_name<'a>(
        &'a mut self,
        index: &BamIndex,
        name: &str,
        begin: u64,
        end: u64,
    ) -> Result<Query<'a, R>> {
        let reference_id = self
            .header
            .reference_id(name)
            .ok_or_else(|| BiobamError::InvalidRange(format!("unknown reference '{}'", name)))?;
        self.query(index, reference_id, begin, end)
    }
}

impl BamReader<BufReader<File>> {
    /// Open a BAM file from a path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

/// Iterator over BAM records.
///
/// Created by [`BamReader::records()`] or [`BamReader::records_with_cancel()`].
pub struct Records<'a, R> {
    reader: &'a mut BamReader<R>,
    cancel: Option<CancellationToken>,
    done: bool,
}

impl<R: Read> Iterator for Records<'_, R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            self.done = true;
            return Some(Err(BiobamError::Cancelled));
        }

        match self.reader.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Iterator over records overlapping a region.
///
/// Created by [`BamReader::query`]. Visits the index chunks in file order
/// and drops records outside the region.
pub struct Query<'a, R> {
    reader: &'a mut BamReader<R>,
    chunks: std::vec::IntoIter<Chunk>,
    chunk_end: Option<VirtualOffset>,
    reference_id: usize,
    begin: u64,
    end: u64,
    done: bool,
}

impl<R: Read + Seek> Query<'_, R> {
    fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            let chunk_end = match self.chunk_end {
                Some(end) => end,
                None => {
                    let Some(chunk) = self.chunks.next() else {
                        return Ok(None);
                    };
                    self.reader.seek(chunk.begin)?;
                    self.chunk_end = Some(chunk.end);
                    chunk.end
                }
            };

            if self.reader.virtual_offset() >= chunk_end {
                self.chunk_end = None;
                continue;
            }
            let Some(record) = self.reader.read_record()? else {
                self.chunk_end = None;
                continue;
            };

            match record.reference_id {
                Some(id) if id == self.reference_id => {}
                // Coordinate order: nothing further can be on this reference
                Some(id) if id > self.reference_id => return Ok(None),
                _ => continue,
            }
            let Some((start, stop)) = record.span() else {
                continue;
            };
            if start >= self.end {
                return Ok(None);
            }
            if stop > self.begin {
                return Ok(Some(record));
            }
        }
    }
}

impl<R: Read + Seek> Iterator for Query<'_, R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
