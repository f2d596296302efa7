//! Streaming BGZF reader with virtual-offset seeking.
//!
//! Members are loaded on demand: when the inflated buffer is exhausted the
//! next member header is read, its payload inflated and its CRC32 checked.
//! Bytes are then served from that buffer through a cursor, so the reader
//! implements both [`Read`] and [`BufRead`].
//!
//! # Usage
//!
//! ```no_run
//! use biobam::io::bgzf::{BgzfReader, VirtualOffset};
//! use std::fs::File;
//! use std::io::Read;
//!
//! # fn main() -> biobam::Result<()> {
//! let mut reader = BgzfReader::new(File::open("reads.bam")?);
//! reader.seek(VirtualOffset::new(278, 0))?;
//!
//! let mut buf = [0u8; 4];
//! reader.read_exact(&mut buf)?;
//! # Ok(())
//! # }
//! ```

use super::block::{inflate_payload, parse_fixed_header, parse_member_size, FIXED_HEADER_SIZE, TRAILER_SIZE};
use super::VirtualOffset;
use crate::error::{BiobamError, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, trace};

/// BGZF reader over any byte source.
///
/// Owns one inflated member buffer and one cursor; not safe to share between
/// threads without external serialization. Open one reader per worker instead.
pub struct BgzfReader<R> {
    inner: R,
    /// Address of the member currently held in `buffer`
    member_address: u64,
    /// Address of the member following the current one
    next_address: u64,
    /// Inflated bytes of the current member
    buffer: Vec<u8>,
    /// Read position inside `buffer`
    cursor: usize,
    /// Scratch space for the compressed payload + trailer
    compressed: Vec<u8>,
}

impl<R: Read> BgzfReader<R> {
    /// Create a reader positioned at the start of `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            member_address: 0,
            next_address: 0,
            buffer: Vec::new(),
            cursor: 0,
            compressed: Vec::new(),
        }
    }

    /// Virtual offset of the next byte [`Read::read`] would return.
    ///
    /// When the current member is exhausted this names the start of the next
    /// member, which matches the offset a writer reports at the same point.
    pub fn virtual_offset(&self) -> VirtualOffset {
        if self.cursor >= self.buffer.len() {
            VirtualOffset::new(self.next_address, 0)
        } else {
            VirtualOffset::new(self.member_address, self.cursor as u16)
        }
    }

    /// Get a reference to the underlying source.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Consume the reader, returning the underlying source.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Load the member starting at `next_address`.
    ///
    /// Returns `Ok(false)` on a clean end of stream (no bytes at a member
    /// boundary). Any shortfall after the first byte is a truncation.
    fn load_member(&mut self) -> Result<bool> {
        let offset = self.next_address;

        let mut fixed = [0u8; FIXED_HEADER_SIZE];
        let n = read_full(&mut self.inner, &mut fixed)?;
        if n == 0 {
            self.member_address = offset;
            self.buffer.clear();
            self.cursor = 0;
            return Ok(false);
        }
        if n < FIXED_HEADER_SIZE {
            return Err(BiobamError::truncated(
                format!("BGZF header at offset {}", offset),
                FIXED_HEADER_SIZE,
                n,
            ));
        }

        let xlen = parse_fixed_header(&fixed, offset)?;
        let mut extra = vec![0u8; xlen];
        let n = read_full(&mut self.inner, &mut extra)?;
        if n < xlen {
            return Err(BiobamError::truncated(
                format!("BGZF extra field at offset {}", offset),
                xlen,
                n,
            ));
        }
        let member_size = parse_member_size(&extra, offset)?;

        let remaining = member_size - FIXED_HEADER_SIZE - xlen;
        self.compressed.resize(remaining, 0);
        let n = read_full(&mut self.inner, &mut self.compressed)?;
        if n < remaining {
            return Err(BiobamError::truncated(
                format!("BGZF member at offset {}", offset),
                remaining,
                n,
            ));
        }

        let (payload, trailer) = self.compressed.split_at(remaining - TRAILER_SIZE);
        inflate_payload(payload, trailer, offset, &mut self.buffer)?;

        trace!(offset, member_size, inflated = self.buffer.len(), "loaded BGZF member");

        self.member_address = offset;
        self.next_address = offset + member_size as u64;
        self.cursor = 0;
        Ok(true)
    }

    /// Ensure unread bytes are buffered, skipping empty members.
    ///
    /// Returns `Ok(false)` at end of stream.
    fn ensure_buffered(&mut self) -> Result<bool> {
        while self.cursor >= self.buffer.len() {
            if !self.load_member()? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl<R: Read + Seek> BgzfReader<R> {
    /// Reposition to `offset`.
    ///
    /// Seeks the source to the member address, reloads that member and places
    /// the cursor at the in-member offset. An in-member offset past the end of
    /// the inflated member is rejected.
    pub fn seek(&mut self, offset: VirtualOffset) -> Result<()> {
        let address = offset.member_address();
        let within = offset.in_member_offset() as usize;
        debug!(%offset, "seeking BGZF reader");

        self.inner.seek(SeekFrom::Start(address))?;
        self.next_address = address;
        self.buffer.clear();
        self.cursor = 0;

        if !self.load_member()? {
            if within == 0 {
                return Ok(());
            }
            return Err(BiobamError::InvalidRange(format!(
                "virtual offset {} points past end of stream",
                offset
            )));
        }

        if within > self.buffer.len() {
            return Err(BiobamError::InvalidRange(format!(
                "virtual offset {} exceeds member size {}",
                offset,
                self.buffer.len()
            )));
        }
        self.cursor = within;
        Ok(())
    }
}

impl BgzfReader<BufReader<File>> {
    /// Open a BGZF file from a path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> Read for BgzfReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let to_copy = available.len().min(buf.len());
        buf[..to_copy].copy_from_slice(&available[..to_copy]);
        self.consume(to_copy);
        Ok(to_copy)
    }
}

impl<R: Read> BufRead for BgzfReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if !self.ensure_buffered()? {
            return Ok(&[]);
        }
        Ok(&self.buffer[self.cursor..])
    }

    fn consume(&mut self, amt: usize) {
        self.cursor = (self.cursor + amt).min(self.buffer.len());
    }
}

/// Read until `buf` is full or the source is exhausted; returns bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
