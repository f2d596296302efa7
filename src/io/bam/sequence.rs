//! 4-bit BAM sequence codec.
//!
//! BAM stores sequences in 4-bit encoding (2 bases per byte), high nibble
//! first. Each nibble indexes the table `=ACMGRSVTWYHKDBN`; an odd-length
//! sequence pads the final low nibble with 0.
//!
//! Only the 16 table symbols survive an encode/decode cycle. Lowercase bases
//! are upper-cased and any other byte becomes `N`.

use crate::error::{BiobamError, Result};

/// BAM 4-bit to ASCII base lookup table.
///
/// - 0 = '=' (match to reference)
/// - 1, 2, 4, 8 = A, C, G, T
/// - everything else = IUPAC ambiguity codes, 15 = N
const SEQ_LOOKUP: [u8; 16] = [
    b'=', b'A', b'C', b'M', // 0-3
    b'G', b'R', b'S', b'V', // 4-7
    b'T', b'W', b'Y', b'H', // 8-11
    b'K', b'D', b'B', b'N', // 12-15
];

/// Decode a 4-bit encoded BAM sequence to ASCII.
///
/// # Errors
///
/// [`BiobamError::Truncated`] if `data` is shorter than `ceil(length / 2)`.
///
/// # Example
///
/// ```
/// use biobam::io::bam::decode_sequence;
///
/// // Byte 0x12 encodes bases at indices 1 ('A') and 2 ('C')
/// let sequence = decode_sequence(&[0x12], 2).unwrap();
/// assert_eq!(sequence, b"AC");
/// ```
pub fn decode_sequence(data: &[u8], length: usize) -> Result<Vec<u8>> {
    let required_bytes = length.div_ceil(2);
    if data.len() < required_bytes {
        return Err(BiobamError::truncated("sequence", required_bytes, data.len()));
    }

    let mut sequence = Vec::with_capacity(length);
    for &byte in &data[..length / 2] {
        sequence.push(SEQ_LOOKUP[(byte >> 4) as usize]);
        sequence.push(SEQ_LOOKUP[(byte & 0x0F) as usize]);
    }
    if length % 2 == 1 {
        sequence.push(SEQ_LOOKUP[(data[length / 2] >> 4) as usize]);
    }

    Ok(sequence)
}

/// Append the 4-bit packed form of `bases` to `out`.
pub fn encode_sequence(bases: &[u8], out: &mut Vec<u8>) {
    out.reserve(bases.len().div_ceil(2));
    for pair in bases.chunks(2) {
        let high = base_to_4bit(pair[0]) << 4;
        let low = pair.get(1).map_or(0, |&b| base_to_4bit(b));
        out.push(high | low);
    }
}

/// Convert an ASCII base to its 4-bit BAM code.
pub fn base_to_4bit(base: u8) -> u8 {
    match base.to_ascii_uppercase() {
        b'=' => 0,
        b'A' => 1,
        b'C' => 2,
        b'M' => 3,
        b'G' => 4,
        b'R' => 5,
        b'S' => 6,
        b'V' => 7,
        b'T' => 8,
        b'W' => 9,
        b'Y' => 10,
        b'H' => 11,
        b'K' => 12,
        b'D' => 13,
        b'B' => 14,
        _ => 15,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_single_base() {
        // 0x10 = high nibble 1 ('A'), low nibble 0 ('=')
        assert_eq!(decode_sequence(&[0x10], 1).unwrap(), b"A");
    }

    #[test]
    fn test_decode_acgt() {
        // 0x12 = 'A' (1) + 'C' (2), 0x48 = 'G' (4) + 'T' (8)
        assert_eq!(decode_sequence(&[0x12, 0x48], 4).unwrap(), b"ACGT");
    }

    #[test]
    fn test_decode_odd_length() {
        assert_eq!(decode_sequence(&[0x12, 0x48, 0x10], 5).unwrap(), b"ACGTA");
    }

    #[test]
    fn test_decode_empty() {
        assert!(decode_sequence(&[], 0).unwrap().is_empty());
    }

    #[test]
    fn test_decode_insufficient_data() {
        let err = decode_sequence(&[0x12], 3).unwrap_err();
        assert!(matches!(err, BiobamError::Truncated { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn test_encode_pads_odd_length() {
        let mut out = Vec::new();
        encode_sequence(b"ACG", &mut out);
        assert_eq!(out, vec![0x12, 0x40]);
    }

    #[test]
    fn test_encode_unknown_is_n() {
        let mut out = Vec::new();
        encode_sequence(b"a.", &mut out);
        assert_eq!(decode_sequence(&out, 2).unwrap(), b"AN");
    }

    proptest! {
        #[test]
        fn prop_table_symbols_survive(indices in prop::collection::vec(0usize..16, 0..200)) {
            let bases: Vec<u8> = indices.iter().map(|&i| SEQ_LOOKUP[i]).collect();
            let mut packed = Vec::new();
            encode_sequence(&bases, &mut packed);
            prop_assert_eq!(packed.len(), bases.len().div_ceil(2));
            prop_assert_eq!(decode_sequence(&packed, bases.len()).unwrap(), bases);
        }
    }
}
