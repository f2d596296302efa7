//! Append-only BGZF writer.
//!
//! Bytes accumulate in an assembly buffer of [`WRITE_BLOCK_SIZE`] bytes.
//! When the buffer fills (or [`BgzfWriter::flush_member`] / [`Write::flush`]
//! is called) it is deflated and emitted as one member.
//! [`BgzfWriter::finish`] appends the terminal empty member exactly once.
//!
//! # Example
//!
//! ```no_run
//! use biobam::io::bgzf::BgzfWriter;
//! use std::fs::File;
//! use std::io::Write;
//!
//! # fn main() -> biobam::Result<()> {
//! let mut writer = BgzfWriter::new(File::create("out.txt.gz")?);
//! writer.write_all(b"Hello, BGZF!\n")?;
//! let offset = writer.virtual_offset();
//! writer.write_all(b"second line\n")?;
//! writer.finish()?;
//! # let _ = offset;
//! # Ok(())
//! # }
//! ```

use super::block::{encode_members, EOF_MARKER, WRITE_BLOCK_SIZE};
use super::VirtualOffset;
use crate::error::{BiobamError, Result};
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, trace, warn};

/// BGZF writer.
///
/// Virtual offsets are computed from the number of compressed bytes this
/// writer has emitted, so `inner` must be positioned at the start of the
/// container when the writer is created.
pub struct BgzfWriter<W: Write> {
    /// Destination; `None` once handed back by [`BgzfWriter::into_inner`]
    inner: Option<W>,
    /// Uncompressed bytes waiting for the next member
    buffer: Vec<u8>,
    /// Scratch space for encoded members
    compressed: Vec<u8>,
    /// Compressed bytes emitted so far (address of the next member)
    address: u64,
    level: Compression,
    finished: bool,
    members_written: u64,
}

impl<W: Write> BgzfWriter<W> {
    /// Create a writer with the default compression level.
    pub fn new(inner: W) -> Self {
        Self::with_compression(inner, Compression::default())
    }

    /// Create a writer with an explicit deflate level.
    pub fn with_compression(inner: W, level: Compression) -> Self {
        Self {
            inner: Some(inner),
            buffer: Vec::with_capacity(WRITE_BLOCK_SIZE),
            compressed: Vec::new(),
            address: 0,
            level,
            finished: false,
            members_written: 0,
        }
    }

    /// Virtual offset at which the next written byte will land.
    pub fn virtual_offset(&self) -> VirtualOffset {
        // The buffer is flushed the moment it fills, so its length fits in u16
        VirtualOffset::new(self.address, self.buffer.len() as u16)
    }

    /// Number of members emitted so far (including the terminal member).
    pub fn members_written(&self) -> u64 {
        self.members_written
    }

    /// Whether [`BgzfWriter::finish`] has run.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Get a reference to the underlying writer.
    pub fn get_ref(&self) -> Option<&W> {
        self.inner.as_ref()
    }

    fn inner_mut(&mut self) -> Result<&mut W> {
        self.inner
            .as_mut()
            .ok_or(BiobamError::ModeViolation("BGZF writer already closed"))
    }

    /// Emit the buffered bytes as a member, if there are any.
    pub fn flush_member(&mut self) -> Result<()> {
        if self.finished {
            return Err(BiobamError::ModeViolation("write to finished BGZF writer"));
        }
        if self.buffer.is_empty() {
            return Ok(());
        }

        self.compressed.clear();
        let members = encode_members(&self.buffer, self.level, &mut self.compressed)?;
        let inner = self
            .inner
            .as_mut()
            .ok_or(BiobamError::ModeViolation("BGZF writer already closed"))?;
        inner.write_all(&self.compressed)?;

        trace!(
            address = self.address,
            uncompressed = self.buffer.len(),
            compressed = self.compressed.len(),
            members,
            "emitted BGZF member"
        );

        self.address += self.compressed.len() as u64;
        self.members_written += members as u64;
        self.buffer.clear();
        Ok(())
    }

    /// Flush remaining data and append the terminal empty member.
    ///
    /// Idempotent: calling it again is a no-op.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.flush_member()?;

        let inner = self.inner_mut()?;
        inner.write_all(&EOF_MARKER)?;
        inner.flush()?;

        self.address += EOF_MARKER.len() as u64;
        self.members_written += 1;
        self.finished = true;
        debug!(bytes = self.address, members = self.members_written, "finished BGZF stream");
        Ok(())
    }

    /// Finish the stream and return the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.finish()?;
        self.inner
            .take()
            .ok_or(BiobamError::ModeViolation("BGZF writer already closed"))
    }
}

impl BgzfWriter<BufWriter<File>> {
    /// Create a BGZF file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> Write for BgzfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.finished {
            return Err(BiobamError::ModeViolation("write to finished BGZF writer").into());
        }

        let mut remaining = buf;
        while !remaining.is_empty() {
            let space = WRITE_BLOCK_SIZE - self.buffer.len();
            let to_copy = remaining.len().min(space);
            self.buffer.extend_from_slice(&remaining[..to_copy]);
            remaining = &remaining[to_copy..];

            if self.buffer.len() >= WRITE_BLOCK_SIZE {
                self.flush_member()?;
            }
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        self.flush_member()?;
        self.inner_mut()?.flush()
    }
}

/// Seeking is meaningless on an append-only stream; every call fails with
/// [`BiobamError::ModeViolation`] without touching the destination.
impl<W: Write> Seek for BgzfWriter<W> {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(BiobamError::ModeViolation("seek on BGZF writer").into())
    }
}

impl<W: Write> Drop for BgzfWriter<W> {
    fn drop(&mut self) {
        if self.inner.is_some() && !self.finished {
            // Errors cannot be returned from drop; call finish() to observe them
            if let Err(e) = self.finish() {
                warn!(error = %e, address = self.address, "failed to finish BGZF stream on drop");
            }
        }
    }
}
