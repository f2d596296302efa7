//! BGZF member layout: header, deflated payload, trailer.
//!
//! # Member Structure
//!
//! ```text
//! 1f 8b 08 04        gzip magic, CM=deflate, FLG=FEXTRA
//! 00 00 00 00        MTIME = 0
//! 00 ff              XFL = 0, OS = unknown
//! 06 00              XLEN = 6
//! 42 43 02 00        subfield 'B''C', SLEN = 2
//! BSIZE (u16 LE)     total member length - 1
//! ...                raw deflate payload
//! CRC32 (u32 LE)     over the inflated bytes
//! ISIZE (u32 LE)     inflated length
//! ```
//!
//! A stream ends with the fixed 28-byte empty member [`EOF_MARKER`].

use super::checksum::crc32;
use crate::error::{BiobamError, Result};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Largest total length of one compressed member (BSIZE is a u16 of length - 1).
pub const MAX_MEMBER_SIZE: usize = 1 << 16;

/// Largest inflated payload of one member.
pub const MAX_UNCOMPRESSED_SIZE: usize = 1 << 16;

/// Payload length at which writers cut a member. Stored deflate blocks add a
/// few bytes per 16 KiB, so a full buffer still fits one member's BSIZE.
pub const WRITE_BLOCK_SIZE: usize = 0xff00;

/// Fixed first 16 bytes of every member written by this crate.
pub const MEMBER_HEADER: [u8; 16] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02,
    0x00,
];

/// Bytes before the extra field: magic through XLEN.
pub(crate) const FIXED_HEADER_SIZE: usize = 12;

/// Full header length including BSIZE.
pub const HEADER_SIZE: usize = 18;

/// CRC32 + ISIZE.
pub const TRAILER_SIZE: usize = 8;

/// Terminal empty member.
pub const EOF_MARKER: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02,
    0x00, 0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Validate the 12 fixed header bytes and return XLEN.
pub(crate) fn parse_fixed_header(fixed: &[u8], offset: u64) -> Result<usize> {
    if fixed[0] != 0x1f || fixed[1] != 0x8b {
        return Err(BiobamError::InvalidMember {
            offset,
            message: format!(
                "invalid gzip magic: expected [1f, 8b], got [{:02x}, {:02x}]",
                fixed[0], fixed[1]
            ),
        });
    }
    if fixed[2] != 0x08 {
        return Err(BiobamError::InvalidMember {
            offset,
            message: format!("unsupported compression method {}", fixed[2]),
        });
    }
    if fixed[3] & 0x04 == 0 {
        return Err(BiobamError::InvalidMember {
            offset,
            message: "FEXTRA flag not set (plain gzip, not BGZF)".to_string(),
        });
    }
    Ok(u16::from_le_bytes([fixed[10], fixed[11]]) as usize)
}

/// Find the `BC` subfield in the extra field and return the total member length.
pub(crate) fn parse_member_size(extra: &[u8], offset: u64) -> Result<usize> {
    let mut pos = 0;

    while pos + 4 <= extra.len() {
        let si1 = extra[pos];
        let si2 = extra[pos + 1];
        let slen = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]) as usize;

        if si1 == b'B' && si2 == b'C' && slen == 2 {
            if pos + 6 > extra.len() {
                return Err(BiobamError::InvalidMember {
                    offset,
                    message: "incomplete BSIZE subfield".to_string(),
                });
            }
            let bsize = u16::from_le_bytes([extra[pos + 4], extra[pos + 5]]) as usize;
            let member_size = bsize + 1;
            let minimum = FIXED_HEADER_SIZE + extra.len() + TRAILER_SIZE;
            if member_size < minimum {
                return Err(BiobamError::InvalidMember {
                    offset,
                    message: format!("member length {} shorter than header + trailer ({})", member_size, minimum),
                });
            }
            return Ok(member_size);
        }

        pos += 4 + slen;
    }

    Err(BiobamError::InvalidMember {
        offset,
        message: "missing BC subfield".to_string(),
    })
}

/// Inflate `payload` into `out` and check it against the member trailer.
///
/// `out` is cleared first; on success it holds exactly ISIZE bytes.
pub(crate) fn inflate_payload(
    payload: &[u8],
    trailer: &[u8],
    offset: u64,
    out: &mut Vec<u8>,
) -> Result<()> {
    let expected_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let isize = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]) as usize;

    if isize > MAX_UNCOMPRESSED_SIZE {
        return Err(BiobamError::InvalidMember {
            offset,
            message: format!("declared inflated size {} exceeds {}", isize, MAX_UNCOMPRESSED_SIZE),
        });
    }

    out.clear();
    out.reserve(isize);
    // Bound the inflate so a corrupt stream cannot grow the buffer past one member
    let decoder = DeflateDecoder::new(payload);
    decoder
        .take(MAX_UNCOMPRESSED_SIZE as u64 + 1)
        .read_to_end(out)
        .map_err(|e| BiobamError::CorruptPayload {
            offset,
            message: e.to_string(),
        })?;

    if out.len() != isize {
        return Err(BiobamError::LengthMismatch {
            offset,
            expected: isize,
            actual: out.len(),
        });
    }

    let actual_crc = crc32(out);
    if actual_crc != expected_crc {
        return Err(BiobamError::ChecksumMismatch {
            offset,
            expected: expected_crc,
            actual: actual_crc,
        });
    }

    Ok(())
}

/// Inflate one complete in-memory member (header through trailer).
pub(crate) fn inflate_member(member: &[u8], offset: u64) -> Result<Vec<u8>> {
    if member.len() < HEADER_SIZE + TRAILER_SIZE {
        return Err(BiobamError::truncated("BGZF member", HEADER_SIZE + TRAILER_SIZE, member.len()));
    }
    let xlen = parse_fixed_header(&member[..FIXED_HEADER_SIZE], offset)?;
    let payload_start = FIXED_HEADER_SIZE + xlen;
    let payload_end = member.len() - TRAILER_SIZE;
    if payload_start > payload_end {
        return Err(BiobamError::InvalidMember {
            offset,
            message: format!("extra field length {} overruns member", xlen),
        });
    }

    let mut out = Vec::new();
    inflate_payload(&member[payload_start..payload_end], &member[payload_end..], offset, &mut out)?;
    Ok(out)
}

/// Deflate `data` into a single member with the fixed header.
fn compress_member(data: &[u8], level: Compression) -> Result<Vec<u8>> {
    let mut member = Vec::with_capacity(HEADER_SIZE + data.len() / 2 + TRAILER_SIZE);
    member.extend_from_slice(&MEMBER_HEADER);
    // BSIZE placeholder, patched below
    member.extend_from_slice(&[0, 0]);

    let mut deflate = DeflateEncoder::new(member, level);
    deflate.write_all(data)?;
    let mut member = deflate.finish()?;

    member.extend_from_slice(&crc32(data).to_le_bytes());
    member.extend_from_slice(&(data.len() as u32).to_le_bytes());

    if member.len() <= MAX_MEMBER_SIZE {
        let bsize = (member.len() - 1) as u16;
        member[16..18].copy_from_slice(&bsize.to_le_bytes());
    }
    Ok(member)
}

/// Append one or more members holding `data` to `out`.
///
/// Incompressible input can deflate past [`MAX_MEMBER_SIZE`]; such payloads
/// are halved and emitted as consecutive members. Returns the number of
/// members written.
pub(crate) fn encode_members(data: &[u8], level: Compression, out: &mut Vec<u8>) -> Result<usize> {
    debug_assert!(data.len() <= MAX_UNCOMPRESSED_SIZE);
    let member = compress_member(data, level)?;
    if member.len() <= MAX_MEMBER_SIZE {
        out.extend_from_slice(&member);
        return Ok(1);
    }

    let mid = data.len() / 2;
    let first = encode_members(&data[..mid], level, out)?;
    let second = encode_members(&data[mid..], level, out)?;
    Ok(first + second)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_round_trip() {
        let data = b"ACGTACGTACGTACGTNNNN".repeat(100);
        let mut out = Vec::new();
        assert_eq!(encode_members(&data, Compression::default(), &mut out).unwrap(), 1);

        assert_eq!(&out[..16], &MEMBER_HEADER);
        let bsize = u16::from_le_bytes([out[16], out[17]]) as usize;
        assert_eq!(bsize + 1, out.len());

        let inflated = inflate_member(&out, 0).unwrap();
        assert_eq!(inflated, data);
    }

    #[test]
    fn test_eof_marker_is_empty_member() {
        let inflated = inflate_member(&EOF_MARKER, 0).unwrap();
        assert!(inflated.is_empty());
        assert_eq!(parse_member_size(&EOF_MARKER[12..18], 0).unwrap(), 28);
    }

    #[test]
    fn test_incompressible_payload_splits() {
        // xorshift noise does not deflate
        let mut state = 0x2545_f491_4f6c_dd1du64;
        let data: Vec<u8> = (0..MAX_UNCOMPRESSED_SIZE)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                state as u8
            })
            .collect();

        let mut out = Vec::new();
        let members = encode_members(&data, Compression::default(), &mut out).unwrap();
        assert!(members >= 2);

        let mut pos = 0;
        let mut inflated = Vec::new();
        while pos < out.len() {
            let size = parse_member_size(&out[pos + 12..pos + 18], pos as u64).unwrap();
            assert!(size <= MAX_MEMBER_SIZE);
            inflated.extend(inflate_member(&out[pos..pos + size], pos as u64).unwrap());
            pos += size;
        }
        assert_eq!(inflated, data);
    }

    #[test]
    fn test_crc_mismatch_detected() {
        let mut out = Vec::new();
        encode_members(b"hello bgzf", Compression::default(), &mut out).unwrap();
        let crc_pos = out.len() - 8;
        out[crc_pos] ^= 0xFF;

        let err = inflate_member(&out, 7).unwrap_err();
        assert!(matches!(err, BiobamError::ChecksumMismatch { offset: 7, .. }));
    }

    #[test]
    fn test_bad_magic() {
        let mut member = EOF_MARKER;
        member[0] = 0x1e;
        let err = parse_fixed_header(&member[..12], 0).unwrap_err();
        assert!(matches!(err, BiobamError::InvalidMember { .. }));
    }

    #[test]
    fn test_missing_bc_subfield() {
        let extra = [b'X', b'Y', 2, 0, 0, 0];
        assert!(parse_member_size(&extra, 0).is_err());
    }
}
