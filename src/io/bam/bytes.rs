//! Bounds-checked little-endian field readers shared by the BAM and BAI
//! decoders. Every reader advances `cursor` only on success.

use super::error::BamDecodeError;
use crate::error::{BiobamError, Result};
use std::io::Read;

/// Borrow the next `len` bytes.
pub(crate) fn take<'a>(data: &'a [u8], cursor: &mut usize, len: usize, context: &str) -> Result<&'a [u8]> {
    let available = data.len().saturating_sub(*cursor);
    if len > available {
        return Err(BiobamError::truncated(
            format!("{} at offset {}", context, *cursor),
            len,
            available,
        ));
    }
    let bytes = &data[*cursor..*cursor + len];
    *cursor += len;
    Ok(bytes)
}

pub(crate) fn read_u8(data: &[u8], cursor: &mut usize, context: &str) -> Result<u8> {
    Ok(take(data, cursor, 1, context)?[0])
}

pub(crate) fn read_u16_le(data: &[u8], cursor: &mut usize, context: &str) -> Result<u16> {
    let b = take(data, cursor, 2, context)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

pub(crate) fn read_i32_le(data: &[u8], cursor: &mut usize, context: &str) -> Result<i32> {
    let b = take(data, cursor, 4, context)?;
    Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

pub(crate) fn read_u32_le(data: &[u8], cursor: &mut usize, context: &str) -> Result<u32> {
    let b = take(data, cursor, 4, context)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

pub(crate) fn read_u64_le(data: &[u8], cursor: &mut usize, context: &str) -> Result<u64> {
    let b = take(data, cursor, 8, context)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(b);
    Ok(u64::from_le_bytes(raw))
}

/// Read a NUL-terminated UTF-8 string, consuming the terminator.
pub(crate) fn read_cstring(data: &[u8], cursor: &mut usize, field: &'static str) -> Result<String> {
    let start = *cursor;
    let rest = data.get(start..).unwrap_or_default();
    let len = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(BamDecodeError::MissingNulTerminator { field, offset: start })?;
    let value = utf8(rest[..len].to_vec(), field)?;
    *cursor = start + len + 1;
    Ok(value)
}

pub(crate) fn utf8(bytes: Vec<u8>, field: &'static str) -> Result<String> {
    String::from_utf8(bytes).map_err(|source| BamDecodeError::InvalidUtf8 { field, source }.into())
}

/// Read exactly `len` bytes from a stream, reporting how many arrived on
/// a short read.
pub(crate) fn read_exact_vec<R: Read>(reader: &mut R, len: usize, context: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(len.min(1 << 20));
    reader.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() < len {
        return Err(BiobamError::truncated(context, len, buf.len()));
    }
    Ok(buf)
}

pub(crate) fn read_u32_from<R: Read>(reader: &mut R, context: &str) -> Result<u32> {
    let b = read_exact_vec(reader, 4, context)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}
