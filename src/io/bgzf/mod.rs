//! BGZF: blocked gzip container.
//!
//! A BGZF stream is a series of gzip members, each holding at most 64 KiB of
//! inflated data, terminated by a fixed empty member. Every member can be
//! inflated on its own, which gives two properties:
//!
//! - **Random access**: a [`VirtualOffset`] names a member start plus a byte
//!   offset inside that member, so readers can jump straight to a record
//! - **Parallelism**: members inflate independently
//!   ([`decompress_members_parallel`])
//!
//! # Example
//!
//! ```no_run
//! use biobam::io::bgzf::{BgzfReader, BgzfWriter};
//! use std::io::{Cursor, Read, Write};
//!
//! # fn main() -> biobam::Result<()> {
//! let mut writer = BgzfWriter::new(Vec::new());
//! writer.write_all(b"first")?;
//! writer.flush_member()?;
//! let second = writer.virtual_offset();
//! writer.write_all(b"second")?;
//! let compressed = writer.into_inner()?;
//!
//! let mut reader = BgzfReader::new(Cursor::new(compressed));
//! reader.seek(second)?;
//! let mut rest = String::new();
//! reader.read_to_string(&mut rest)?;
//! assert_eq!(rest, "second");
//! # Ok(())
//! # }
//! ```

mod block;
pub mod checksum;
mod parallel;
pub mod pool;
mod reader;
mod virtual_offset;
mod writer;

pub use block::{
    EOF_MARKER, HEADER_SIZE, MAX_MEMBER_SIZE, MAX_UNCOMPRESSED_SIZE, MEMBER_HEADER, TRAILER_SIZE,
    WRITE_BLOCK_SIZE,
};
pub use checksum::{crc32, Crc32};
pub use parallel::decompress_members_parallel;
pub use pool::{BufferPool, PooledBuffer};
pub use reader::BgzfReader;
pub use virtual_offset::{VirtualOffset, MAX_MEMBER_ADDRESS};
pub use writer::BgzfWriter;
