//! BAM record structure and codec.
//!
//! A BAM record represents a single alignment (read mapped to reference).
//! Each record contains alignment information, sequence data, quality scores,
//! and optional tags.
//!
//! # Binary Format
//!
//! ```text
//! BAM Record (binary, little-endian):
//! - block_size (uint32): Record size in bytes (excluding this field)
//! - refID (int32): Reference sequence ID (-1 for unmapped)
//! - pos (int32): 0-based leftmost position (-1 for unmapped)
//! - l_read_name (uint8): Length of read name (includes null terminator)
//! - mapq (uint8): Mapping quality (255 = unavailable)
//! - bin (uint16): BAI index bin
//! - n_cigar_op (uint16): Number of CIGAR operations
//! - flag (uint16): Bitwise FLAGS
//! - l_seq (int32): Sequence length
//! - next_refID (int32): Reference ID of mate/next read
//! - next_pos (int32): Position of mate/next read
//! - tlen (int32): Template length
//! - read_name (char[l_read_name]): Null-terminated read name
//! - cigar (uint32[n_cigar_op]): CIGAR operations
//! - seq (uint8[(l_seq+1)/2]): 4-bit encoded sequence
//! - qual (uint8[l_seq]): Phred quality scores (0xFF fill = absent)
//! - tags: Optional tags (rest of the block)
//! ```
//!
//! Positions are exposed 1-based and quality as Phred+33 text. A stored
//! 0xFF quality byte maps to `' '`; a block made only of 0xFF bytes is an
//! absent quality string.

use super::bytes::{read_i32_le, read_u16_le, read_u8, take, utf8};
use super::cigar::{encode_cigar, parse_cigar, reference_length, CigarOp};
use super::error::BamDecodeError;
use super::index::bin;
use super::sequence::{decode_sequence, encode_sequence};
use super::tags::{encode_tags, parse_tags, ArrayValue, TagValue, Tags};
use crate::error::{BiobamError, Result};
use std::io::Read;

/// Fixed-layout bytes of a record after `block_size`.
pub const FIXED_BLOCK_SIZE: usize = 32;

/// Most CIGAR operations the 16-bit `n_cigar_op` field can hold.
pub const MAX_INLINE_CIGAR_OPS: usize = u16::MAX as usize;

/// SAM flag bits.
pub mod flags {
    /// Template has multiple segments
    pub const PAIRED: u16 = 0x1;
    /// Every segment properly aligned
    pub const PROPER_PAIR: u16 = 0x2;
    /// Segment unmapped
    pub const UNMAPPED: u16 = 0x4;
    /// Next segment unmapped
    pub const MATE_UNMAPPED: u16 = 0x8;
    /// Sequence reverse complemented
    pub const REVERSE: u16 = 0x10;
    /// Next segment reverse complemented
    pub const MATE_REVERSE: u16 = 0x20;
    /// First segment in the template
    pub const FIRST_IN_TEMPLATE: u16 = 0x40;
    /// Last segment in the template
    pub const LAST_IN_TEMPLATE: u16 = 0x80;
    /// Secondary alignment
    pub const SECONDARY: u16 = 0x100;
    /// Failed quality checks
    pub const QC_FAIL: u16 = 0x200;
    /// PCR or optical duplicate
    pub const DUPLICATE: u16 = 0x400;
    /// Supplementary alignment
    pub const SUPPLEMENTARY: u16 = 0x800;
}

/// Map a stored reference id to `Option<usize>`.
///
/// Only -1 (none) and non-negative ids are valid.
fn parse_reference_id(ref_id: i32, field: &'static str) -> Result<Option<usize>> {
    match ref_id {
        -1 => Ok(None),
        n if n >= 0 => Ok(Some(n as usize)),
        invalid => Err(BamDecodeError::InvalidReferenceId {
            value: invalid,
            field,
        }
        .into()),
    }
}

/// Map a stored 0-based position to a 1-based one; -1 (or below) is absent.
fn parse_position(pos: i32) -> Option<i32> {
    (pos >= 0).then(|| pos + 1)
}

/// BAM alignment record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Read name/query name
    pub name: String,

    /// Reference sequence ID (index into header.references)
    /// None if unmapped (refID = -1)
    pub reference_id: Option<usize>,

    /// 1-based leftmost mapping position
    /// None if unavailable (pos = -1)
    pub position: Option<i32>,

    /// Mapping quality (0-254)
    /// None if unavailable (mapq = 255)
    pub mapq: Option<u8>,

    /// Bitwise FLAGS, see [`flags`]
    pub flags: u16,

    /// Mate/next segment reference ID
    pub mate_reference_id: Option<usize>,

    /// Mate/next segment 1-based position
    pub mate_position: Option<i32>,

    /// Template length (TLEN)
    pub template_length: i32,

    /// Sequence bases (ASCII: A, C, G, T, N, etc.)
    pub sequence: Vec<u8>,

    /// Quality scores (Phred+33 ASCII); empty if absent
    pub quality: Vec<u8>,

    /// CIGAR operations
    pub cigar: Vec<CigarOp>,

    /// Optional tags
    pub tags: Tags,
}

impl Record {
    /// Create a new empty record.
    pub fn new() -> Self {
        Self {
            name: String::new(),
            reference_id: None,
            position: None,
            mapq: None,
            flags: 0,
            mate_reference_id: None,
            mate_position: None,
            template_length: 0,
            sequence: Vec::new(),
            quality: Vec::new(),
            cigar: Vec::new(),
            tags: Tags::new(),
        }
    }

    fn flag(&self, bit: u16) -> bool {
        self.flags & bit != 0
    }

    /// Template has multiple segments (0x1).
    pub fn is_paired(&self) -> bool {
        self.flag(flags::PAIRED)
    }

    /// Each segment properly aligned (0x2).
    pub fn is_proper_pair(&self) -> bool {
        self.flag(flags::PROPER_PAIR)
    }

    /// Check if the read is unmapped (0x4).
    pub fn is_unmapped(&self) -> bool {
        self.flag(flags::UNMAPPED)
    }

    /// Mate is unmapped (0x8).
    pub fn is_mate_unmapped(&self) -> bool {
        self.flag(flags::MATE_UNMAPPED)
    }

    /// Check if the read is a reverse complement (0x10).
    pub fn is_reverse_complement(&self) -> bool {
        self.flag(flags::REVERSE)
    }

    /// Mate is reverse complemented (0x20).
    pub fn is_mate_reverse_complement(&self) -> bool {
        self.flag(flags::MATE_REVERSE)
    }

    /// First segment in template (0x40).
    pub fn is_first_in_template(&self) -> bool {
        self.flag(flags::FIRST_IN_TEMPLATE)
    }

    /// Last segment in template (0x80).
    pub fn is_last_in_template(&self) -> bool {
        self.flag(flags::LAST_IN_TEMPLATE)
    }

    /// Secondary alignment (0x100).
    pub fn is_secondary(&self) -> bool {
        self.flag(flags::SECONDARY)
    }

    /// Failed platform/vendor quality checks (0x200).
    pub fn is_qc_fail(&self) -> bool {
        self.flag(flags::QC_FAIL)
    }

    /// PCR or optical duplicate (0x400).
    pub fn is_duplicate(&self) -> bool {
        self.flag(flags::DUPLICATE)
    }

    /// Supplementary alignment (0x800).
    pub fn is_supplementary(&self) -> bool {
        self.flag(flags::SUPPLEMENTARY)
    }

    /// Get sequence length.
    pub fn sequence_length(&self) -> usize {
        self.sequence.len()
    }

    /// Reference bases covered by the CIGAR.
    pub fn reference_length(&self) -> u64 {
        reference_length(&self.cigar)
    }

    /// 1-based inclusive end of the alignment.
    ///
    /// `None` without a position or reference-consuming CIGAR operations.
    pub fn alignment_end(&self) -> Option<i64> {
        let start = self.position? as i64;
        match self.reference_length() {
            0 => None,
            len => Some(start + len as i64 - 1),
        }
    }

    /// 0-based half-open reference interval used for binning.
    ///
    /// Records without reference-consuming operations occupy one base.
    pub fn span(&self) -> Option<(u64, u64)> {
        let start = u64::try_from(self.position?.checked_sub(1)?).ok()?;
        Some((start, start + self.reference_length().max(1)))
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a packed CIGAR carried in a `CG:B,I` (or `B,i`) array.
fn cigar_from_tag(value: &TagValue) -> Result<Option<Vec<CigarOp>>> {
    let raw: Vec<u32> = match value {
        TagValue::Array(ArrayValue::UInt32(v)) => v.clone(),
        TagValue::Array(ArrayValue::Int32(v)) => v.iter().map(|&x| x as u32).collect(),
        _ => return Ok(None),
    };
    let ops = raw
        .into_iter()
        .map(|packed| CigarOp::from_raw(packed).map_err(BiobamError::from))
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(ops))
}

/// Restore a CIGAR longer than 65535 operations.
///
/// Such records carry a placeholder `kS mN` (k = sequence length) and the
/// real operations in a `CG` array tag, which is removed once restored.
fn restore_oversized_cigar(cigar: Vec<CigarOp>, sequence_length: usize, tags: &mut Tags) -> Result<Vec<CigarOp>> {
    let is_placeholder = matches!(
        cigar.as_slice(),
        [CigarOp::SoftClip(len), CigarOp::RefSkip(_)] if *len as usize == sequence_length
    );
    if !is_placeholder {
        return Ok(cigar);
    }

    let restored = match tags.get(b"CG") {
        Some(value) => cigar_from_tag(value)?,
        None => None,
    };
    match restored {
        Some(real) => {
            tags.remove(b"CG");
            Ok(real)
        }
        None => Ok(cigar),
    }
}

/// Parse a BAM record from one block (the bytes after `block_size`).
///
/// # Errors
///
/// - [`BiobamError::Truncated`] when a field runs past the block
/// - [`BiobamError::Decode`] for invalid ids, lengths, names, CIGAR or tags
pub fn parse_record(data: &[u8]) -> Result<Record> {
    if data.len() < FIXED_BLOCK_SIZE {
        return Err(BiobamError::truncated("record core", FIXED_BLOCK_SIZE, data.len()));
    }

    let mut cursor = 0;
    let ref_id = read_i32_le(data, &mut cursor, "refID")?;
    let pos = read_i32_le(data, &mut cursor, "pos")?;

    let l_read_name = read_u8(data, &mut cursor, "l_read_name")?;
    if l_read_name == 0 {
        return Err(BamDecodeError::InvalidReadNameLength {
            length: l_read_name,
            offset: cursor - 1,
        }
        .into());
    }

    let mapq = read_u8(data, &mut cursor, "mapq")?;
    let _bin = read_u16_le(data, &mut cursor, "bin")?;
    let n_cigar_op = read_u16_le(data, &mut cursor, "n_cigar_op")? as usize;
    let flags = read_u16_le(data, &mut cursor, "flag")?;

    let l_seq = read_i32_le(data, &mut cursor, "l_seq")?;
    if l_seq < 0 {
        return Err(BamDecodeError::NegativeLength {
            field: "sequence length",
            value: l_seq,
        }
        .into());
    }
    let l_seq = l_seq as usize;

    let next_ref_id = read_i32_le(data, &mut cursor, "next_refID")?;
    let next_pos = read_i32_le(data, &mut cursor, "next_pos")?;
    let tlen = read_i32_le(data, &mut cursor, "tlen")?;

    let name_offset = cursor;
    let name_bytes = take(data, &mut cursor, l_read_name as usize, "read name")?;
    let name = match name_bytes.split_last() {
        Some((0, name)) => utf8(name.to_vec(), "read name")?,
        _ => {
            return Err(BamDecodeError::MissingNulTerminator {
                field: "read name",
                offset: name_offset,
            }
            .into())
        }
    };

    let cigar_bytes = take(data, &mut cursor, n_cigar_op * 4, "CIGAR")?;
    let cigar = parse_cigar(cigar_bytes, n_cigar_op)?;

    let seq_bytes = take(data, &mut cursor, l_seq.div_ceil(2), "sequence")?;
    let sequence = decode_sequence(seq_bytes, l_seq)?;

    let quality_bytes = take(data, &mut cursor, l_seq, "quality")?;
    let quality = if quality_bytes.iter().all(|&b| b == 0xFF) {
        Vec::new()
    } else {
        // 0xFF wraps to b' '
        quality_bytes.iter().map(|&q| q.wrapping_add(33)).collect()
    };

    let mut tags = parse_tags(&data[cursor..])?;
    let cigar = restore_oversized_cigar(cigar, l_seq, &mut tags)?;

    Ok(Record {
        name,
        reference_id: parse_reference_id(ref_id, "read")?,
        position: parse_position(pos),
        mapq: (mapq != 255).then_some(mapq),
        flags,
        mate_reference_id: parse_reference_id(next_ref_id, "mate")?,
        mate_position: parse_position(next_pos),
        template_length: tlen,
        sequence,
        quality,
        cigar,
        tags,
    })
}

fn reference_id_to_i32(id: Option<usize>, field: &str) -> Result<i32> {
    match id {
        None => Ok(-1),
        Some(id) => i32::try_from(id)
            .map_err(|_| BiobamError::InvalidInput(format!("{} reference id {} out of range", field, id))),
    }
}

fn position_to_i32(position: Option<i32>, field: &str) -> Result<i32> {
    match position {
        None => Ok(-1),
        Some(p) if p >= 1 => Ok(p - 1),
        Some(p) => Err(BiobamError::InvalidInput(format!(
            "{} position {} is not 1-based",
            field, p
        ))),
    }
}

/// Append `block_size` and the encoded block for `record` to `out`.
///
/// The bin field is computed from the alignment span. CIGARs longer than
/// 65535 operations are written as a `kS mN` placeholder plus a `CG:B,I` tag.
///
/// # Errors
///
/// [`BiobamError::InvalidInput`] for values the layout cannot represent:
/// names longer than 254 bytes or containing NUL, a quality length other
/// than 0 or the sequence length, a quality made only of blanks, positions
/// below 1.
pub fn encode_record(record: &Record, out: &mut Vec<u8>) -> Result<()> {
    let l_seq = record.sequence.len();
    if !record.quality.is_empty() && record.quality.len() != l_seq {
        return Err(BamDecodeError::QualityLengthMismatch {
            sequence: l_seq,
            quality: record.quality.len(),
        }
        .into());
    }
    if !record.quality.is_empty() && record.quality.iter().all(|&q| q == b' ') {
        // Stored as all 0xFF, which reads back as absent quality
        return Err(BiobamError::InvalidInput(format!(
            "read {:?} has an all-blank quality string; leave quality empty instead",
            record.name
        )));
    }
    if record.name.len() > 254 || record.name.as_bytes().contains(&0) {
        return Err(BiobamError::InvalidInput(format!(
            "read name {:?} must be at most 254 bytes without NUL",
            record.name
        )));
    }
    let l_seq_i32 = i32::try_from(l_seq)
        .map_err(|_| BiobamError::InvalidInput(format!("sequence length {} too large", l_seq)))?;

    let ref_id = reference_id_to_i32(record.reference_id, "read")?;
    let pos = position_to_i32(record.position, "read")?;
    let next_ref_id = reference_id_to_i32(record.mate_reference_id, "mate")?;
    let next_pos = position_to_i32(record.mate_position, "mate")?;

    // Unplaced records use bin 4680, i.e. bin(-1, 0) in the reference scheme
    let bin_id = match record.span() {
        Some((start, end)) => bin(start, end) as u16,
        None => 4680,
    };

    let oversized = record.cigar.len() > MAX_INLINE_CIGAR_OPS;
    let placeholder;
    let (cigar, extra_tag) = if oversized {
        placeholder = [
            CigarOp::SoftClip(l_seq as u32),
            CigarOp::RefSkip(record.reference_length() as u32),
        ];
        let packed = record.cigar.iter().map(CigarOp::to_raw).collect();
        (&placeholder[..], Some(ArrayValue::UInt32(packed)))
    } else {
        (record.cigar.as_slice(), None)
    };

    let start = out.len();
    out.extend_from_slice(&[0; 4]); // block_size, patched below
    out.extend_from_slice(&ref_id.to_le_bytes());
    out.extend_from_slice(&pos.to_le_bytes());
    out.push(record.name.len() as u8 + 1);
    out.push(record.mapq.unwrap_or(255));
    out.extend_from_slice(&bin_id.to_le_bytes());
    out.extend_from_slice(&(cigar.len() as u16).to_le_bytes());
    out.extend_from_slice(&record.flags.to_le_bytes());
    out.extend_from_slice(&l_seq_i32.to_le_bytes());
    out.extend_from_slice(&next_ref_id.to_le_bytes());
    out.extend_from_slice(&next_pos.to_le_bytes());
    out.extend_from_slice(&record.template_length.to_le_bytes());

    out.extend_from_slice(record.name.as_bytes());
    out.push(0);
    encode_cigar(cigar, out);
    encode_sequence(&record.sequence, out);
    if record.quality.is_empty() {
        out.resize(out.len() + l_seq, 0xFF);
    } else {
        out.extend(record.quality.iter().map(|&q| q.wrapping_sub(33)));
    }

    match extra_tag {
        Some(cg) => {
            let mut tags = record.tags.clone();
            tags.insert(*b"CG", cg);
            encode_tags(&tags, out)?;
        }
        None => encode_tags(&record.tags, out)?,
    }

    let block_size = u32::try_from(out.len() - start - 4)
        .map_err(|_| BiobamError::InvalidInput("record exceeds 4 GiB".to_string()))?;
    out[start..start + 4].copy_from_slice(&block_size.to_le_bytes());
    Ok(())
}

/// Read the next record block into `buf`.
///
/// Returns `Ok(false)` at a clean end of stream (no bytes where a
/// `block_size` would start); a partial `block_size` or block is a
/// truncation.
pub(crate) fn read_block<R: Read>(reader: &mut R, buf: &mut Vec<u8>) -> Result<bool> {
    let mut size_bytes = Vec::with_capacity(4);
    reader.by_ref().take(4).read_to_end(&mut size_bytes)?;
    match size_bytes.len() {
        0 => return Ok(false),
        4 => {}
        n => return Err(BiobamError::truncated("record block_size", 4, n)),
    }
    let block_size = u32::from_le_bytes([size_bytes[0], size_bytes[1], size_bytes[2], size_bytes[3]]) as usize;

    buf.clear();
    reader.by_ref().take(block_size as u64).read_to_end(buf)?;
    if buf.len() < block_size {
        return Err(BiobamError::truncated("record block", block_size, buf.len()));
    }
    Ok(true)
}

/// Read a single BAM record from a reader.
///
/// # Returns
///
/// - `Ok(Some(record))` - Successfully read a record
/// - `Ok(None)` - EOF (no more records)
/// - `Err(_)` - Truncation or decode error
pub fn read_record<R: Read>(reader: &mut R) -> Result<Option<Record>> {
    let mut buf = Vec::new();
    if !read_block(reader, &mut buf)? {
        return Ok(None);
    }
    parse_record(&buf).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> Record {
        let mut record = Record::new();
        record.name = "read1".to_string();
        record.reference_id = Some(0);
        record.position = Some(101);
        record.mapq = Some(60);
        record.flags = flags::PAIRED | flags::FIRST_IN_TEMPLATE;
        record.mate_reference_id = Some(0);
        record.mate_position = Some(301);
        record.template_length = 250;
        record.sequence = b"ACGTNACGTA".to_vec();
        record.quality = b"IIIIIHHHH#".to_vec();
        record.cigar = vec![CigarOp::SoftClip(2), CigarOp::Match(8)];
        record.tags.insert(*b"NM", TagValue::UInt8(1));
        record
    }

    fn encode(record: &Record) -> Vec<u8> {
        let mut out = Vec::new();
        encode_record(record, &mut out).unwrap();
        out
    }

    #[test]
    fn test_record_flags() {
        let mut record = Record::new();
        record.flags = flags::UNMAPPED;
        assert!(record.is_unmapped());
        assert!(!record.is_paired());

        record.flags = 0xFFF;
        assert!(record.is_paired() && record.is_proper_pair() && record.is_mate_unmapped());
        assert!(record.is_reverse_complement() && record.is_mate_reverse_complement());
        assert!(record.is_first_in_template() && record.is_last_in_template());
        assert!(record.is_secondary() && record.is_qc_fail());
        assert!(record.is_duplicate() && record.is_supplementary());
    }

    #[test]
    fn test_encode_layout() {
        let record = sample();
        let out = encode(&record);

        let block_size = u32::from_le_bytes([out[0], out[1], out[2], out[3]]) as usize;
        assert_eq!(block_size, out.len() - 4);
        // pos stored 0-based
        assert_eq!(i32::from_le_bytes([out[8], out[9], out[10], out[11]]), 100);
        // l_read_name counts the NUL
        assert_eq!(out[12], 6);
        // bin for [100, 108)
        assert_eq!(u16::from_le_bytes([out[14], out[15]]), 4681);
        // qualities stored without the +33 offset
        let qual_start = 4 + FIXED_BLOCK_SIZE + 6 + 8 + 5;
        assert_eq!(out[qual_start], b'I' - 33);
    }

    #[test]
    fn test_round_trip() {
        let record = sample();
        let out = encode(&record);
        assert_eq!(parse_record(&out[4..]).unwrap(), record);
    }

    #[test]
    fn test_missing_quality_round_trip() {
        let mut record = sample();
        record.quality.clear();
        let out = encode(&record);
        let qual_start = 4 + FIXED_BLOCK_SIZE + 6 + 8 + 5;
        assert!(out[qual_start..qual_start + 10].iter().all(|&q| q == 0xFF));
        assert!(parse_record(&out[4..]).unwrap().quality.is_empty());
    }

    #[test]
    fn test_single_sentinel_is_blank() {
        let mut record = sample();
        record.quality[3] = b' ';
        let decoded = parse_record(&encode(&record)[4..]).unwrap();
        assert_eq!(decoded.quality[3], b' ');
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_unmapped_record() {
        let mut record = Record::new();
        record.name = "u".to_string();
        record.flags = flags::UNMAPPED;
        record.sequence = b"ACG".to_vec();
        let out = encode(&record);
        assert_eq!(u16::from_le_bytes([out[14], out[15]]), 4680);

        let decoded = parse_record(&out[4..]).unwrap();
        assert_eq!(decoded.reference_id, None);
        assert_eq!(decoded.position, None);
        assert_eq!(decoded.mapq, None);
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_truncated_record() {
        let out = encode(&sample());
        let err = parse_record(&out[4..out.len() - 6]).unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Truncation);

        let err = parse_record(&out[4..20]).unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Truncation);
    }

    #[test]
    fn test_zero_read_name_length() {
        let mut out = encode(&sample());
        out[12] = 0;
        let err = parse_record(&out[4..]).unwrap_err();
        assert!(matches!(
            err,
            BiobamError::Decode(BamDecodeError::InvalidReadNameLength { length: 0, .. })
        ));
    }

    #[test]
    fn test_missing_null_terminator_in_name() {
        let mut out = encode(&sample());
        // last byte of "read1\0"
        out[4 + FIXED_BLOCK_SIZE + 5] = b'x';
        let err = parse_record(&out[4..]).unwrap_err();
        assert!(matches!(
            err,
            BiobamError::Decode(BamDecodeError::MissingNulTerminator { .. })
        ));
    }

    #[test]
    fn test_negative_sequence_length() {
        let mut out = encode(&sample());
        out[20..24].copy_from_slice(&(-5i32).to_le_bytes());
        let err = parse_record(&out[4..]).unwrap_err();
        assert!(matches!(
            err,
            BiobamError::Decode(BamDecodeError::NegativeLength { value: -5, .. })
        ));
    }

    #[test]
    fn test_invalid_reference_ids() {
        for (offset, field) in [(4usize, "read"), (24, "mate")] {
            let mut out = encode(&sample());
            out[offset..offset + 4].copy_from_slice(&(-2i32).to_le_bytes());
            match parse_record(&out[4..]).unwrap_err() {
                BiobamError::Decode(BamDecodeError::InvalidReferenceId { value, field: f }) => {
                    assert_eq!(value, -2);
                    assert_eq!(f, field);
                }
                other => panic!("unexpected error: {}", other),
            }
        }
    }

    #[test]
    fn test_encode_rejects_bad_quality_length() {
        let mut record = sample();
        record.quality.pop();
        let err = encode_record(&record, &mut Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            BiobamError::Decode(BamDecodeError::QualityLengthMismatch { sequence: 10, quality: 9 })
        ));
    }

    #[test]
    fn test_encode_rejects_all_blank_quality() {
        let mut record = sample();
        record.quality = vec![b' '; record.sequence.len()];
        let err = encode_record(&record, &mut Vec::new()).unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::InvalidInput);
    }

    #[test]
    fn test_encode_rejects_zero_position() {
        let mut record = sample();
        record.position = Some(0);
        assert!(encode_record(&record, &mut Vec::new()).is_err());
    }

    #[test]
    fn test_oversized_cigar_round_trip() {
        let mut record = sample();
        let ops = MAX_INLINE_CIGAR_OPS + 10;
        record.cigar = (0..ops)
            .map(|i| if i % 2 == 0 { CigarOp::Match(1) } else { CigarOp::Deletion(1) })
            .collect();
        record.sequence = vec![b'A'; ops.div_ceil(2)];
        record.quality.clear();

        let out = encode(&record);
        let n_cigar = u16::from_le_bytes([out[16], out[17]]);
        assert_eq!(n_cigar, 2);

        let decoded = parse_record(&out[4..]).unwrap();
        assert_eq!(decoded.cigar.len(), ops);
        assert!(decoded.tags.get(b"CG").is_none());
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_placeholder_without_cg_kept() {
        let mut record = sample();
        record.cigar = vec![CigarOp::SoftClip(10), CigarOp::RefSkip(5)];
        let decoded = parse_record(&encode(&record)[4..]).unwrap();
        assert_eq!(decoded.cigar, record.cigar);
    }

    #[test]
    fn test_span_and_end() {
        let mut record = sample();
        record.cigar = vec![CigarOp::Match(5), CigarOp::Deletion(3), CigarOp::Match(5)];
        assert_eq!(record.span(), Some((100, 113)));
        assert_eq!(record.alignment_end(), Some(113));

        record.cigar.clear();
        assert_eq!(record.span(), Some((100, 101)));
        assert_eq!(record.alignment_end(), None);
    }

    #[test]
    fn test_read_record_eof() {
        let mut empty: &[u8] = &[];
        assert!(read_record(&mut empty).unwrap().is_none());

        let mut partial: &[u8] = &[1, 0];
        let err = read_record(&mut partial).unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Truncation);
    }

    proptest! {
        #[test]
        fn prop_record_round_trip(
            name in "[A-Za-z0-9_:]{0,40}",
            pos in 1i32..1_000_000,
            mapq in prop::option::of(0u8..255),
            flag in 0u16..0x1000,
            bases in prop::collection::vec(prop::sample::select(b"ACGTN".to_vec()), 0..120),
            with_quality in any::<bool>(),
            tlen in any::<i32>(),
        ) {
            let mut record = Record::new();
            record.name = name;
            record.reference_id = Some(2);
            record.position = Some(pos);
            record.mapq = mapq;
            record.flags = flag;
            record.template_length = tlen;
            if !bases.is_empty() {
                record.cigar = vec![CigarOp::Match(bases.len() as u32)];
            }
            if with_quality {
                record.quality = bases.iter().enumerate().map(|(i, _)| b'!' + (i % 41) as u8).collect();
            }
            record.sequence = bases;

            let mut out = Vec::new();
            encode_record(&record, &mut out).unwrap();
            prop_assert_eq!(parse_record(&out[4..]).unwrap(), record);
        }
    }
}
