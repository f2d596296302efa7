//! BAI (BAM Index): hierarchical bins of virtual-offset chunks.
//!
//! # Binning Scheme
//!
//! Coordinates up to 2^29 are covered by 37,449 bins on 6 levels:
//!
//! | Level | Bins          | Bin size |
//! |-------|---------------|----------|
//! | 0     | 0             | 512 Mbp  |
//! | 1     | 1-8           | 64 Mbp   |
//! | 2     | 9-72          | 8 Mbp    |
//! | 3     | 73-584        | 1 Mbp    |
//! | 4     | 585-4680      | 128 Kbp  |
//! | 5     | 4681-37448    | 16 Kbp   |
//!
//! A record is filed under the smallest bin that contains its whole span.
//! Each reference also has a linear index: for every 16 Kbp tile, the
//! lowest virtual offset of a record overlapping that tile.
//!
//! # Format
//!
//! ```text
//! magic[4]       "BAI\1"
//! n_ref[4]       Number of reference sequences (uint32)
//! For each reference:
//!   n_bin[4]     Number of bins (uint32)
//!   For each bin:
//!     bin[4]     Bin number (uint32)
//!     n_chunk[4] Number of chunks (uint32)
//!     For each chunk:
//!       chunk_beg[8]  Virtual offset (uint64)
//!       chunk_end[8]  Virtual offset (uint64)
//!   n_intv[4]    Number of linear index entries (uint32)
//!   ioffset[8]   One virtual offset per 16 Kbp tile
//! n_no_coor[8]   Records without a reference (optional)
//! ```
//!
//! Bin 37450 is a pseudo-bin holding per-reference metadata: the virtual
//! offset range of the reference's records and its mapped/unmapped counts.
//!
//! # Example
//!
//! ```no_run
//! use biobam::io::bam::BamIndex;
//!
//! # fn main() -> biobam::Result<()> {
//! let index = BamIndex::from_path("alignments.bam.bai")?;
//! for chunk in index.query_chunks(0, 1_000_000, 1_001_000)? {
//!     println!("{} - {}", chunk.begin, chunk.end);
//! }
//! # Ok(())
//! # }
//! ```

use super::bytes::{read_u32_le, read_u64_le, take};
use super::error::BamDecodeError;
use super::record::Record;
use crate::error::{BiobamError, Result};
use crate::io::bgzf::VirtualOffset;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, warn};

/// BAI magic bytes.
pub const BAI_MAGIC: [u8; 4] = *b"BAI\x01";

/// Pseudo-bin carrying per-reference metadata.
pub const METADATA_BIN: u32 = 37450;

/// Largest real bin id.
pub const MAX_BIN: u32 = 37448;

/// log2 of the linear index tile width (16 Kbp).
pub const LINEAR_SHIFT: u32 = 14;

/// Exclusive upper bound of indexable coordinates.
pub const MAX_COORDINATE: u64 = 1 << 29;

/// (shift, first bin id) for levels 5 down to 1.
const LEVELS: [(u32, u32); 5] = [(14, 4681), (17, 585), (20, 73), (23, 9), (26, 1)];

/// Smallest bin containing the 0-based half-open interval `[begin, end)`.
///
/// ```
/// use biobam::io::bam::index::bin;
///
/// assert_eq!(bin(0, 1), 4681);
/// assert_eq!(bin(0, 16384), 4681);
/// assert_eq!(bin(0, 16385), 585);
/// assert_eq!(bin(0, 2_000_000_000), 0);
/// ```
pub fn bin(begin: u64, end: u64) -> u32 {
    let last = end.max(begin + 1) - 1;
    for (shift, offset) in LEVELS {
        if begin >> shift == last >> shift {
            return offset + (begin >> shift) as u32;
        }
    }
    0
}

/// Every bin that may hold records overlapping `[begin, end)`.
///
/// Always contains bin 0. Coordinates are clamped to [`MAX_COORDINATE`].
pub fn bins(begin: u64, end: u64) -> Vec<u32> {
    let begin = begin.min(MAX_COORDINATE - 1);
    let last = end.max(begin + 1).min(MAX_COORDINATE) - 1;

    let mut ids = vec![0];
    for (shift, offset) in LEVELS.iter().rev() {
        let first = offset + (begin >> shift) as u32;
        let final_bin = offset + (last >> shift) as u32;
        ids.extend(first..=final_bin);
    }
    ids
}

/// A contiguous range of virtual offsets in the BAM file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Chunk {
    /// First byte of the first record
    pub begin: VirtualOffset,
    /// One past the last byte of the last record
    pub end: VirtualOffset,
}

impl Chunk {
    /// Create a new chunk.
    pub fn new(begin: VirtualOffset, end: VirtualOffset) -> Self {
        Chunk { begin, end }
    }
}

/// A bin in the hierarchical binning index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bin {
    /// Bin number (0-37448)
    pub id: u32,
    /// Chunks of data in this bin, in file order
    pub chunks: Vec<Chunk>,
}

/// Contents of the metadata pseudo-bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceMetadata {
    /// Offset of the reference's first record
    pub begin: VirtualOffset,
    /// Offset just past the reference's last record
    pub end: VirtualOffset,
    /// Mapped records on this reference
    pub mapped: u64,
    /// Unmapped records placed on this reference
    pub unmapped: u64,
}

/// Index data for one reference sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceIndex {
    /// Bins sorted by id (excluding the metadata pseudo-bin)
    pub bins: Vec<Bin>,
    /// Linear index: lowest offset per 16 Kbp tile
    pub intervals: Vec<VirtualOffset>,
    /// Pseudo-bin 37450 contents, if present
    pub metadata: Option<ReferenceMetadata>,
}

impl ReferenceIndex {
    /// Look up a bin by id.
    pub fn bin(&self, id: u32) -> Option<&Bin> {
        self.bins
            .binary_search_by_key(&id, |b| b.id)
            .ok()
            .map(|i| &self.bins[i])
    }

    /// Lower bound on the offset of any record overlapping `begin` or later.
    pub fn min_offset(&self, begin: u64) -> VirtualOffset {
        let tile = (begin >> LINEAR_SHIFT) as usize;
        self.intervals
            .get(tile)
            .or_else(|| self.intervals.last())
            .copied()
            .unwrap_or(VirtualOffset::ZERO)
    }
}

/// BAI index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BamIndex {
    /// Index data for each reference sequence
    pub references: Vec<ReferenceIndex>,
    /// Records with no reference (`n_no_coor`); 0 when the trailer is absent
    pub unmapped: u64,
}

impl BamIndex {
    /// Load a BAI index from a file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)?;
        Self::read(&mut file)
    }

    /// Read a BAI index from a stream.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::parse(&data)
    }

    /// Parse a BAI index held in memory.
    ///
    /// # Errors
    ///
    /// - [`BamDecodeError::InvalidMagic`] if the data is not a BAI index
    /// - [`BamDecodeError::InvalidBin`] / [`BamDecodeError::InvalidChunk`]
    ///   for out-of-scheme bins or inverted chunks
    /// - [`BiobamError::Truncated`] if the data ends before the optional
    ///   `n_no_coor` trailer
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = 0;
        let magic = take(data, &mut cursor, 4, "BAI magic")?;
        if magic != BAI_MAGIC {
            return Err(BamDecodeError::InvalidMagic {
                expected: BAI_MAGIC,
                actual: [magic[0], magic[1], magic[2], magic[3]],
            }
            .into());
        }

        let n_ref = read_u32_le(data, &mut cursor, "n_ref")? as usize;
        let mut references = Vec::with_capacity(n_ref.min(1 << 16));
        for reference in 0..n_ref {
            references.push(parse_reference(data, &mut cursor, reference)?);
        }

        let unmapped = match data.len() - cursor {
            0 => {
                warn!("BAI index has no n_no_coor trailer, assuming 0");
                0
            }
            _ => read_u64_le(data, &mut cursor, "n_no_coor")?,
        };

        debug!(references = references.len(), unmapped, "parsed BAI index");
        Ok(BamIndex { references, unmapped })
    }

    /// Serialize in BAI layout, including metadata pseudo-bins and the
    /// `n_no_coor` trailer.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&BAI_MAGIC)?;
        writer.write_all(&(self.references.len() as u32).to_le_bytes())?;

        for reference in &self.references {
            let n_bin = reference.bins.len() + usize::from(reference.metadata.is_some());
            writer.write_all(&(n_bin as u32).to_le_bytes())?;

            for bin in &reference.bins {
                writer.write_all(&bin.id.to_le_bytes())?;
                writer.write_all(&(bin.chunks.len() as u32).to_le_bytes())?;
                for chunk in &bin.chunks {
                    writer.write_all(&chunk.begin.as_raw().to_le_bytes())?;
                    writer.write_all(&chunk.end.as_raw().to_le_bytes())?;
                }
            }

            if let Some(meta) = &reference.metadata {
                writer.write_all(&METADATA_BIN.to_le_bytes())?;
                writer.write_all(&2u32.to_le_bytes())?;
                writer.write_all(&meta.begin.as_raw().to_le_bytes())?;
                writer.write_all(&meta.end.as_raw().to_le_bytes())?;
                writer.write_all(&meta.mapped.to_le_bytes())?;
                writer.write_all(&meta.unmapped.to_le_bytes())?;
            }

            writer.write_all(&(reference.intervals.len() as u32).to_le_bytes())?;
            for offset in &reference.intervals {
                writer.write_all(&offset.as_raw().to_le_bytes())?;
            }
        }

        writer.write_all(&self.unmapped.to_le_bytes())?;
        Ok(())
    }

    /// Write the index to a file.
    pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Chunks that may contain records overlapping `[begin, end)` on
    /// reference `reference_id`, sorted and merged.
    ///
    /// Chunks ending at or before the linear-index lower bound for `begin`
    /// are dropped.
    ///
    /// # Errors
    ///
    /// [`BiobamError::InvalidRange`] for an unknown reference or an empty
    /// interval.
    pub fn query_chunks(&self, reference_id: usize, begin: u64, end: u64) -> Result<Vec<Chunk>> {
        let reference = self.references.get(reference_id).ok_or_else(|| {
            BiobamError::InvalidRange(format!(
                "reference {} not in index ({} references)",
                reference_id,
                self.references.len()
            ))
        })?;
        if begin >= end {
            return Err(BiobamError::InvalidRange(format!("empty interval [{}, {})", begin, end)));
        }

        let min_offset = reference.min_offset(begin);
        let chunks = bins(begin, end)
            .into_iter()
            .filter_map(|id| reference.bin(id))
            .flat_map(|bin| bin.chunks.iter().copied())
            .filter(|chunk| chunk.end > min_offset)
            .collect();

        Ok(merge_chunks(chunks))
    }
}

fn parse_reference(data: &[u8], cursor: &mut usize, reference: usize) -> Result<ReferenceIndex> {
    let n_bin = read_u32_le(data, cursor, "n_bin")? as usize;
    let mut index = ReferenceIndex::default();

    for _ in 0..n_bin {
        let id = read_u32_le(data, cursor, "bin id")?;
        let n_chunk = read_u32_le(data, cursor, "n_chunk")? as usize;

        if id == METADATA_BIN {
            if n_chunk != 2 {
                return Err(BamDecodeError::InvalidData {
                    message: format!("metadata bin of reference {} has {} chunks", reference, n_chunk),
                }
                .into());
            }
            index.metadata = Some(ReferenceMetadata {
                begin: VirtualOffset::from_raw(read_u64_le(data, cursor, "metadata")?),
                end: VirtualOffset::from_raw(read_u64_le(data, cursor, "metadata")?),
                mapped: read_u64_le(data, cursor, "metadata")?,
                unmapped: read_u64_le(data, cursor, "metadata")?,
            });
            continue;
        }
        if id > MAX_BIN {
            return Err(BamDecodeError::InvalidBin { reference, bin: id }.into());
        }

        let mut chunks = Vec::with_capacity(n_chunk.min(1 << 16));
        for _ in 0..n_chunk {
            let begin = VirtualOffset::from_raw(read_u64_le(data, cursor, "chunk begin")?);
            let end = VirtualOffset::from_raw(read_u64_le(data, cursor, "chunk end")?);
            if begin > end {
                return Err(BamDecodeError::InvalidChunk { reference, begin, end }.into());
            }
            chunks.push(Chunk::new(begin, end));
        }
        index.bins.push(Bin { id, chunks });
    }
    index.bins.sort_by_key(|b| b.id);

    let n_intv = read_u32_le(data, cursor, "n_intv")? as usize;
    let raw = take(data, cursor, n_intv * 8, "linear index")?;
    index.intervals = raw
        .chunks_exact(8)
        .map(|b| {
            let mut v = [0u8; 8];
            v.copy_from_slice(b);
            VirtualOffset::from_raw(u64::from_le_bytes(v))
        })
        .collect();

    Ok(index)
}

/// Sort chunks and merge those that overlap or touch.
pub fn merge_chunks(mut chunks: Vec<Chunk>) -> Vec<Chunk> {
    chunks.sort();

    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        match merged.last_mut() {
            Some(current) if chunk.begin <= current.end => {
                current.end = current.end.max(chunk.end);
            }
            _ => merged.push(chunk),
        }
    }
    merged
}

#[derive(Debug, Default)]
struct ReferenceBuilder {
    bins: BTreeMap<u32, Vec<Chunk>>,
    intervals: Vec<Option<VirtualOffset>>,
    metadata: Option<ReferenceMetadata>,
}

impl ReferenceBuilder {
    fn record_metadata(&mut self, begin: VirtualOffset, end: VirtualOffset, mapped: bool) {
        let meta = self.metadata.get_or_insert(ReferenceMetadata {
            begin,
            end,
            mapped: 0,
            unmapped: 0,
        });
        meta.end = end;
        if mapped {
            meta.mapped += 1;
        } else {
            meta.unmapped += 1;
        }
    }

    fn finish(self) -> ReferenceIndex {
        let bins = self
            .bins
            .into_iter()
            .map(|(id, chunks)| Bin { id, chunks })
            .collect();

        let mut previous = VirtualOffset::ZERO;
        let intervals = self
            .intervals
            .into_iter()
            .map(|slot| {
                let offset = slot.unwrap_or(previous);
                previous = offset;
                offset
            })
            .collect();

        ReferenceIndex {
            bins,
            intervals,
            metadata: self.metadata,
        }
    }
}

/// Builds a [`BamIndex`] from coordinate-sorted records and the virtual
/// offsets bracketing each one.
///
/// # Example
///
/// ```
/// use biobam::io::bam::{IndexBuilder, Record};
/// use biobam::io::bgzf::VirtualOffset;
///
/// # fn main() -> biobam::Result<()> {
/// let mut record = Record::new();
/// record.reference_id = Some(0);
/// record.position = Some(1);
///
/// let mut builder = IndexBuilder::new(1);
/// builder.add_record(&record, VirtualOffset::new(0, 100), VirtualOffset::new(0, 180))?;
/// let index = builder.finish();
/// assert_eq!(index.query_chunks(0, 0, 10)?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct IndexBuilder {
    references: Vec<ReferenceBuilder>,
    unmapped: u64,
    last_key: Option<(i32, i64)>,
    seen_unplaced: bool,
}

impl IndexBuilder {
    /// Create a builder for a dictionary of `reference_count` references.
    pub fn new(reference_count: usize) -> Self {
        Self {
            references: (0..reference_count).map(|_| ReferenceBuilder::default()).collect(),
            unmapped: 0,
            last_key: None,
            seen_unplaced: false,
        }
    }

    /// Add a record stored between `begin` and `end`.
    ///
    /// # Errors
    ///
    /// - [`BamDecodeError::InvalidReferenceId`] for a reference outside the dictionary
    /// - [`BamDecodeError::UnsortedRecords`] if records are not coordinate-sorted
    pub fn add_record(&mut self, record: &Record, begin: VirtualOffset, end: VirtualOffset) -> Result<()> {
        let Some(reference_id) = record.reference_id else {
            self.seen_unplaced = true;
            self.unmapped += 1;
            return Ok(());
        };

        if reference_id >= self.references.len() {
            return Err(BamDecodeError::InvalidReferenceId {
                value: reference_id as i32,
                field: "read",
            }
            .into());
        }
        let span = record.span();
        if let Some((start, stop)) = span {
            check_span(start, stop)?;
            let key = self.check_order(reference_id, start)?;
            self.last_key = Some(key);
        }

        let reference = &mut self.references[reference_id];
        let Some((start, stop)) = span else {
            reference.record_metadata(begin, end, false);
            return Ok(());
        };

        let chunks = reference.bins.entry(bin(start, stop)).or_default();
        match chunks.last_mut() {
            Some(chunk) if chunk.end == begin => chunk.end = end,
            _ => chunks.push(Chunk::new(begin, end)),
        }

        let first_tile = (start >> LINEAR_SHIFT) as usize;
        let last_tile = ((stop - 1) >> LINEAR_SHIFT) as usize;
        if reference.intervals.len() <= last_tile {
            reference.intervals.resize(last_tile + 1, None);
        }
        for slot in &mut reference.intervals[first_tile.min(last_tile)..=last_tile] {
            slot.get_or_insert(begin);
        }

        reference.record_metadata(begin, end, !record.is_unmapped());
        Ok(())
    }

    /// Verify `record` may follow the records added so far.
    pub(crate) fn check_record(&self, record: &Record) -> Result<()> {
        match (record.reference_id, record.span()) {
            (Some(reference_id), Some((start, stop))) => {
                check_span(start, stop)?;
                self.check_order(reference_id, start).map(|_| ())
            }
            _ => Ok(()),
        }
    }

    fn check_order(&self, reference_id: usize, start: u64) -> Result<(i32, i64)> {
        let key = (reference_id as i32, start as i64);
        if self.seen_unplaced || self.last_key.is_some_and(|last| key < last) {
            return Err(BamDecodeError::UnsortedRecords {
                previous: self.last_key.filter(|_| !self.seen_unplaced).unwrap_or((-1, -1)),
                current: key,
            }
            .into());
        }
        Ok(key)
    }

    /// Finalize: fill linear-index gaps and emit the index.
    pub fn finish(self) -> BamIndex {
        let references: Vec<ReferenceIndex> = self.references.into_iter().map(ReferenceBuilder::finish).collect();
        debug!(
            references = references.len(),
            unmapped = self.unmapped,
            "built BAI index"
        );
        BamIndex {
            references,
            unmapped: self.unmapped,
        }
    }
}

/// Spans past [`MAX_COORDINATE`] have no bin in the five-level scheme.
fn check_span(start: u64, stop: u64) -> Result<()> {
    if stop > MAX_COORDINATE {
        return Err(BiobamError::InvalidRange(format!(
            "alignment [{}, {}) extends past the indexable limit {}",
            start, stop, MAX_COORDINATE
        )));
    }
    Ok(())
}
