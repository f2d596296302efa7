//! CIGAR (Compact Idiosyncratic Gapped Alignment Report) operations.
//!
//! CIGAR strings describe how a read aligns to the reference, including
//! matches, insertions, deletions, and other operations.
//!
//! # BAM Format
//!
//! In BAM, CIGAR is stored as 32-bit little-endian integers:
//! - Low 4 bits: operation type (0-8)
//! - High 28 bits: operation length (0 to 268,435,455)
//!
//! # Operations
//!
//! | Code | Op | Consumes query | Consumes reference |
//! |------|----|----------------|--------------------|
//! | 0    | M  | yes            | yes                |
//! | 1    | I  | yes            | no                 |
//! | 2    | D  | no             | yes                |
//! | 3    | N  | no             | yes                |
//! | 4    | S  | yes            | no                 |
//! | 5    | H  | no             | no                 |
//! | 6    | P  | no             | no                 |
//! | 7    | =  | yes            | yes                |
//! | 8    | X  | yes            | yes                |

use super::error::BamDecodeError;
use crate::error::{BiobamError, Result};

/// Largest length an operation can carry (28 bits).
pub const MAX_OP_LENGTH: u32 = (1 << 28) - 1;

/// CIGAR operation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CigarOp {
    /// Match or mismatch (M)
    Match(u32),
    /// Insertion to reference (I)
    Insertion(u32),
    /// Deletion from reference (D)
    Deletion(u32),
    /// Skipped region from reference (N)
    RefSkip(u32),
    /// Soft clipping (S)
    SoftClip(u32),
    /// Hard clipping (H)
    HardClip(u32),
    /// Padding (P)
    Padding(u32),
    /// Sequence match (=)
    SeqMatch(u32),
    /// Sequence mismatch (X)
    SeqMismatch(u32),
}

impl CigarOp {
    /// Decode one packed `len << 4 | op` value.
    pub fn from_raw(value: u32) -> std::result::Result<Self, BamDecodeError> {
        let length = value >> 4;
        let op = match value & 0x0F {
            0 => CigarOp::Match(length),
            1 => CigarOp::Insertion(length),
            2 => CigarOp::Deletion(length),
            3 => CigarOp::RefSkip(length),
            4 => CigarOp::SoftClip(length),
            5 => CigarOp::HardClip(length),
            6 => CigarOp::Padding(length),
            7 => CigarOp::SeqMatch(length),
            8 => CigarOp::SeqMismatch(length),
            _ => return Err(BamDecodeError::InvalidCigarOp { value }),
        };
        Ok(op)
    }

    /// Pack as `len << 4 | op`. Lengths are truncated to 28 bits.
    pub fn to_raw(&self) -> u32 {
        ((self.length() & MAX_OP_LENGTH) << 4) | self.op_code()
    }

    /// Numeric operation code (0-8).
    pub fn op_code(&self) -> u32 {
        match self {
            CigarOp::Match(_) => 0,
            CigarOp::Insertion(_) => 1,
            CigarOp::Deletion(_) => 2,
            CigarOp::RefSkip(_) => 3,
            CigarOp::SoftClip(_) => 4,
            CigarOp::HardClip(_) => 5,
            CigarOp::Padding(_) => 6,
            CigarOp::SeqMatch(_) => 7,
            CigarOp::SeqMismatch(_) => 8,
        }
    }

    /// Get the operation count/length.
    pub fn length(&self) -> u32 {
        match *self {
            CigarOp::Match(len)
            | CigarOp::Insertion(len)
            | CigarOp::Deletion(len)
            | CigarOp::RefSkip(len)
            | CigarOp::SoftClip(len)
            | CigarOp::HardClip(len)
            | CigarOp::Padding(len)
            | CigarOp::SeqMatch(len)
            | CigarOp::SeqMismatch(len) => len,
        }
    }

    /// Check if this operation has zero length.
    pub fn is_empty(&self) -> bool {
        self.length() == 0
    }

    /// Whether this operation advances along the reference.
    pub fn consumes_reference(&self) -> bool {
        matches!(
            self,
            CigarOp::Match(_)
                | CigarOp::Deletion(_)
                | CigarOp::RefSkip(_)
                | CigarOp::SeqMatch(_)
                | CigarOp::SeqMismatch(_)
        )
    }

    /// Whether this operation advances along the read sequence.
    pub fn consumes_query(&self) -> bool {
        matches!(
            self,
            CigarOp::Match(_)
                | CigarOp::Insertion(_)
                | CigarOp::SoftClip(_)
                | CigarOp::SeqMatch(_)
                | CigarOp::SeqMismatch(_)
        )
    }

    /// Get the operation type as a character (for SAM format).
    pub fn as_char(&self) -> char {
        match self {
            CigarOp::Match(_) => 'M',
            CigarOp::Insertion(_) => 'I',
            CigarOp::Deletion(_) => 'D',
            CigarOp::RefSkip(_) => 'N',
            CigarOp::SoftClip(_) => 'S',
            CigarOp::HardClip(_) => 'H',
            CigarOp::Padding(_) => 'P',
            CigarOp::SeqMatch(_) => '=',
            CigarOp::SeqMismatch(_) => 'X',
        }
    }
}

impl std::fmt::Display for CigarOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.length(), self.as_char())
    }
}

/// Parse BAM CIGAR operations from binary format.
///
/// # Errors
///
/// - [`BiobamError::Truncated`] if `data` holds fewer than `n_ops * 4` bytes
/// - [`BamDecodeError::InvalidCigarOp`] for an operation code above 8
///
/// # Example
///
/// ```
/// use biobam::io::bam::{parse_cigar, CigarOp};
///
/// // 100M = 100 << 4 | 0 = 1600 = 0x00000640 (little-endian)
/// let data = vec![0x40, 0x06, 0x00, 0x00];
/// let cigar = parse_cigar(&data, 1).unwrap();
/// assert_eq!(cigar, vec![CigarOp::Match(100)]);
/// ```
pub fn parse_cigar(data: &[u8], n_ops: usize) -> Result<Vec<CigarOp>> {
    let required_bytes = n_ops * 4;
    if data.len() < required_bytes {
        return Err(BiobamError::truncated("CIGAR", required_bytes, data.len()));
    }

    data[..required_bytes]
        .chunks_exact(4)
        .map(|raw| {
            let value = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            CigarOp::from_raw(value).map_err(BiobamError::from)
        })
        .collect()
}

/// Append the packed form of `ops` to `out`.
pub fn encode_cigar(ops: &[CigarOp], out: &mut Vec<u8>) {
    out.reserve(ops.len() * 4);
    for op in ops {
        out.extend_from_slice(&op.to_raw().to_le_bytes());
    }
}

/// Number of reference bases covered by `ops` (M, D, N, =, X).
pub fn reference_length(ops: &[CigarOp]) -> u64 {
    ops.iter()
        .filter(|op| op.consumes_reference())
        .map(|op| op.length() as u64)
        .sum()
}

/// Number of read bases described by `ops` (M, I, S, =, X).
pub fn query_length(ops: &[CigarOp]) -> u64 {
    ops.iter()
        .filter(|op| op.consumes_query())
        .map(|op| op.length() as u64)
        .sum()
}

/// Render `ops` as a SAM CIGAR string (`*` when empty).
pub fn format_cigar(ops: &[CigarOp]) -> String {
    if ops.is_empty() {
        return "*".to_string();
    }
    ops.iter().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cigar_op_display() {
        assert_eq!(format!("{}", CigarOp::Match(100)), "100M");
        assert_eq!(format!("{}", CigarOp::Insertion(5)), "5I");
        assert_eq!(format_cigar(&[CigarOp::SoftClip(2), CigarOp::Match(8)]), "2S8M");
        assert_eq!(format_cigar(&[]), "*");
    }

    #[test]
    fn test_parse_multiple_operations() {
        // 50M 5I 45M
        let data = vec![
            0x20, 0x03, 0x00, 0x00, // 50M
            0x51, 0x00, 0x00, 0x00, // 5I
            0xD0, 0x02, 0x00, 0x00, // 45M
        ];
        let cigar = parse_cigar(&data, 3).unwrap();
        assert_eq!(
            cigar,
            vec![CigarOp::Match(50), CigarOp::Insertion(5), CigarOp::Match(45)]
        );
    }

    #[test]
    fn test_parse_all_operations() {
        let data: Vec<u8> = (0u8..9).flat_map(|op| [0x10 | op, 0, 0, 0]).collect();
        let cigar = parse_cigar(&data, 9).unwrap();
        let chars: String = cigar.iter().map(CigarOp::as_char).collect();
        assert_eq!(chars, "MIDNSHP=X");
    }

    #[test]
    fn test_insufficient_data_error() {
        let err = parse_cigar(&[0x10, 0x00], 1).unwrap_err();
        assert!(matches!(err, BiobamError::Truncated { expected: 4, actual: 2, .. }));
    }

    #[test]
    fn test_invalid_operation_code() {
        let err = parse_cigar(&[0x19, 0x00, 0x00, 0x00], 1).unwrap_err();
        assert!(matches!(
            err,
            BiobamError::Decode(BamDecodeError::InvalidCigarOp { value: 0x19 })
        ));
    }

    #[test]
    fn test_large_length() {
        let data = vec![0xF0, 0xFF, 0xFF, 0xFF];
        let cigar = parse_cigar(&data, 1).unwrap();
        assert_eq!(cigar[0], CigarOp::Match(MAX_OP_LENGTH));
    }

    #[test]
    fn test_reference_and_query_length() {
        // 3S 10M 2I 5D 100N 4M 7H
        let ops = [
            CigarOp::SoftClip(3),
            CigarOp::Match(10),
            CigarOp::Insertion(2),
            CigarOp::Deletion(5),
            CigarOp::RefSkip(100),
            CigarOp::Match(4),
            CigarOp::HardClip(7),
        ];
        assert_eq!(reference_length(&ops), 119);
        assert_eq!(query_length(&ops), 19);
    }

    fn op_strategy() -> impl Strategy<Value = CigarOp> {
        (0u32..=8, 0u32..=MAX_OP_LENGTH)
            .prop_map(|(code, len)| CigarOp::from_raw(len << 4 | code).unwrap())
    }

    proptest! {
        #[test]
        fn prop_cigar_encode_parse(ops in prop::collection::vec(op_strategy(), 0..20)) {
            let mut encoded = Vec::new();
            encode_cigar(&ops, &mut encoded);
            prop_assert_eq!(encoded.len(), ops.len() * 4);
            prop_assert_eq!(parse_cigar(&encoded, ops.len()).unwrap(), ops);
        }
    }
}
