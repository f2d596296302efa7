//! BAM and BAI decoding error types.
//!
//! Structured variants for format failures found while parsing the BAM
//! header, alignment records or a BAI index. They surface to callers as
//! [`BiobamError::Decode`](crate::BiobamError::Decode); truncation and I/O
//! failures use the crate-level variants instead.

use crate::io::bgzf::VirtualOffset;
use std::{error, fmt};

/// Errors that can occur during BAM/BAI decoding.
///
/// # Example
///
/// ```
/// use biobam::io::bam::error::BamDecodeError;
///
/// fn describe(err: &BamDecodeError) -> String {
///     match err {
///         BamDecodeError::InvalidTagType { tag, type_code } => {
///             format!("{}{} has type {}", tag[0] as char, tag[1] as char, *type_code as char)
///         }
///         BamDecodeError::InvalidReferenceId { value, field } => {
///             format!("bad {} reference {}", field, value)
///         }
///         other => other.to_string(),
///     }
/// }
/// ```
#[derive(Debug)]
pub enum BamDecodeError {
    /// Magic bytes did not match the expected file signature
    InvalidMagic {
        /// Expected signature (`BAM\1` or `BAI\1`)
        expected: [u8; 4],
        /// The bytes found
        actual: [u8; 4],
    },

    /// Invalid reference sequence ID (must be -1 or a dictionary index)
    InvalidReferenceId {
        /// The invalid reference ID value
        value: i32,
        /// Which field had the invalid ID ("read" or "mate")
        field: &'static str,
    },

    /// Invalid read name length (must be >= 1, counting the NUL)
    InvalidReadNameLength {
        /// The invalid length value
        length: u8,
        /// Offset in the record where the error occurred
        offset: usize,
    },

    /// Missing NUL terminator in string field
    MissingNulTerminator {
        /// Which field was missing the terminator
        field: &'static str,
        /// Offset in the data where the error occurred
        offset: usize,
    },

    /// Invalid UTF-8 in string field
    InvalidUtf8 {
        /// Which field had invalid UTF-8
        field: &'static str,
        /// The underlying UTF-8 error
        source: std::string::FromUtf8Error,
    },

    /// Invalid tag type code
    InvalidTagType {
        /// The tag key
        tag: [u8; 2],
        /// The invalid type code
        type_code: u8,
    },

    /// The same tag key appears twice in one record
    DuplicateTag {
        /// The duplicate tag key
        tag: [u8; 2],
    },

    /// Invalid `B` array subtype
    InvalidArraySubtype {
        /// The tag key
        tag: [u8; 2],
        /// The invalid subtype code
        subtype: u8,
    },

    /// Invalid CIGAR operation code
    InvalidCigarOp {
        /// The raw packed operation
        value: u32,
    },

    /// A signed length field was negative
    NegativeLength {
        /// Which field
        field: &'static str,
        /// The negative value
        value: i32,
    },

    /// Quality length is neither 0 nor the sequence length
    QualityLengthMismatch {
        /// Number of bases
        sequence: usize,
        /// Number of quality scores
        quality: usize,
    },

    /// Header text and binary dictionary disagree on reference count
    ReferenceCountMismatch {
        /// `@SQ` lines in the header text
        text: usize,
        /// Entries in the binary dictionary
        binary: usize,
    },

    /// Header text and binary dictionary disagree on a reference name
    ReferenceNameMismatch {
        /// Dictionary index
        index: usize,
        /// Name from the `@SQ` line
        text: String,
        /// Name from the binary dictionary
        binary: String,
    },

    /// A header text line could not be parsed
    MalformedHeaderLine {
        /// 1-based line number
        line: usize,
        /// What was wrong
        message: String,
    },

    /// Bin id outside the 5-level scheme (and not the metadata pseudo-bin)
    InvalidBin {
        /// Reference index
        reference: usize,
        /// The bin id
        bin: u32,
    },

    /// Chunk with `begin > end`
    InvalidChunk {
        /// Reference index
        reference: usize,
        /// Chunk start
        begin: VirtualOffset,
        /// Chunk end
        end: VirtualOffset,
    },

    /// Records not in coordinate order while building an index
    UnsortedRecords {
        /// Previous record's (reference id, 0-based start)
        previous: (i32, i64),
        /// Current record's (reference id, 0-based start)
        current: (i32, i64),
    },

    /// Generic invalid data error with context
    InvalidData {
        /// Description of what was invalid
        message: String,
    },
}

impl error::Error for BamDecodeError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::InvalidUtf8 { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for BamDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidMagic { expected, actual } => {
                write!(
                    f,
                    "Invalid magic bytes: expected {:?}, got {:?}",
                    String::from_utf8_lossy(expected),
                    String::from_utf8_lossy(actual)
                )
            }

            Self::InvalidReferenceId { value, field } => {
                write!(
                    f,
                    "Invalid {} reference ID: {} (must be -1 or a dictionary index)",
                    field, value
                )
            }

            Self::InvalidReadNameLength { length, offset } => {
                write!(
                    f,
                    "Invalid read name length at offset {}: {} (must be >= 1)",
                    offset, length
                )
            }

            Self::MissingNulTerminator { field, offset } => {
                write!(f, "Missing NUL terminator in {} at offset {}", field, offset)
            }

            Self::InvalidUtf8 { field, source } => {
                write!(f, "Invalid UTF-8 in {}: {}", field, source)
            }

            Self::InvalidTagType { tag, type_code } => {
                write!(
                    f,
                    "Invalid tag type for {}{}: {:?}",
                    tag[0] as char, tag[1] as char, *type_code as char
                )
            }

            Self::DuplicateTag { tag } => {
                write!(f, "Duplicate tag: {}{}", tag[0] as char, tag[1] as char)
            }

            Self::InvalidArraySubtype { tag, subtype } => {
                write!(
                    f,
                    "Invalid array subtype for {}{}: {:?}",
                    tag[0] as char, tag[1] as char, *subtype as char
                )
            }

            Self::InvalidCigarOp { value } => {
                write!(f, "Invalid CIGAR operation: {:#x} (op code {})", value, value & 0x0F)
            }

            Self::NegativeLength { field, value } => {
                write!(f, "Invalid negative {}: {}", field, value)
            }

            Self::QualityLengthMismatch { sequence, quality } => {
                write!(
                    f,
                    "Quality length {} does not match sequence length {}",
                    quality, sequence
                )
            }

            Self::ReferenceCountMismatch { text, binary } => {
                write!(
                    f,
                    "Header text declares {} references but binary dictionary has {}",
                    text, binary
                )
            }

            Self::ReferenceNameMismatch { index, text, binary } => {
                write!(
                    f,
                    "Reference {} is {:?} in header text but {:?} in binary dictionary",
                    index, text, binary
                )
            }

            Self::MalformedHeaderLine { line, message } => {
                write!(f, "Malformed header line {}: {}", line, message)
            }

            Self::InvalidBin { reference, bin } => {
                write!(f, "Invalid bin {} for reference {}", bin, reference)
            }

            Self::InvalidChunk { reference, begin, end } => {
                write!(
                    f,
                    "Invalid chunk for reference {}: begin {} > end {}",
                    reference, begin, end
                )
            }

            Self::UnsortedRecords { previous, current } => {
                write!(
                    f,
                    "Records are not coordinate-sorted: ({}, {}) follows ({}, {})",
                    current.0, current.1, previous.0, previous.1
                )
            }

            Self::InvalidData { message } => {
                write!(f, "Invalid data: {}", message)
            }
        }
    }
}
