//! Parallel inflate of an in-memory BGZF stream.
//!
//! Members are independent, so once their boundaries are known each one can
//! be inflated and CRC-checked on its own rayon worker. Output is the
//! concatenation of every member in stream order.
//!
//! # Example
//!
//! ```no_run
//! use biobam::io::bgzf::decompress_members_parallel;
//!
//! # fn main() -> biobam::Result<()> {
//! let compressed = std::fs::read("reads.txt.gz")?;
//! let data = decompress_members_parallel(&compressed)?;
//! # let _ = data;
//! # Ok(())
//! # }
//! ```

use super::block::{inflate_member, parse_fixed_header, parse_member_size, FIXED_HEADER_SIZE};
use crate::error::{BiobamError, Result};
use rayon::prelude::*;
use tracing::debug;

/// Byte range of one member inside the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MemberSpan {
    pub offset: u64,
    pub start: usize,
    pub end: usize,
}

/// Walk member headers and return the span of every member.
pub(crate) fn split_members(data: &[u8]) -> Result<Vec<MemberSpan>> {
    let mut spans = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let offset = pos as u64;
        if pos + FIXED_HEADER_SIZE > data.len() {
            return Err(BiobamError::truncated(
                format!("BGZF header at offset {}", offset),
                FIXED_HEADER_SIZE,
                data.len() - pos,
            ));
        }

        let xlen = parse_fixed_header(&data[pos..pos + FIXED_HEADER_SIZE], offset)?;
        let extra_start = pos + FIXED_HEADER_SIZE;
        let extra_end = extra_start + xlen;
        if extra_end > data.len() {
            return Err(BiobamError::truncated(
                format!("BGZF extra field at offset {}", offset),
                xlen,
                data.len() - extra_start,
            ));
        }

        let member_size = parse_member_size(&data[extra_start..extra_end], offset)?;
        let end = pos + member_size;
        if end > data.len() {
            return Err(BiobamError::truncated(
                format!("BGZF member at offset {}", offset),
                member_size,
                data.len() - pos,
            ));
        }

        spans.push(MemberSpan { offset, start: pos, end });
        pos = end;
    }

    Ok(spans)
}

/// Inflate every member of `data` in parallel, verifying each CRC32.
///
/// The first failing member (in stream order) determines the error.
pub fn decompress_members_parallel(data: &[u8]) -> Result<Vec<u8>> {
    let spans = split_members(data)?;
    debug!(members = spans.len(), bytes = data.len(), "parallel BGZF inflate");

    let inflated = spans
        .par_iter()
        .map(|span| inflate_member(&data[span.start..span.end], span.offset))
        .collect::<Result<Vec<_>>>()?;

    Ok(inflated.concat())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::bgzf::{BgzfWriter, EOF_MARKER};
    use crate::ErrorCategory;
    use std::io::Write;

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut writer = BgzfWriter::new(Vec::new());
        writer.write_all(data).unwrap();
        writer.into_inner().unwrap()
    }

    #[test]
    fn test_split_members_counts_eof() {
        let spans = split_members(&EOF_MARKER).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].end, EOF_MARKER.len());
    }

    #[test]
    fn test_parallel_matches_input() {
        let data: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
        let compressed = compress(&data);
        assert!(split_members(&compressed).unwrap().len() > 2);
        assert_eq!(decompress_members_parallel(&compressed).unwrap(), data);
    }

    #[test]
    fn test_parallel_detects_truncation() {
        let compressed = compress(b"some data that will be cut short");
        let cut = &compressed[..compressed.len() - EOF_MARKER.len() - 3];
        let err = decompress_members_parallel(cut).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Truncation);
    }
}
