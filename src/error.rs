//! Error types for biobam

use crate::io::bam::error::BamDecodeError;
use std::io;
use thiserror::Error;

/// Result type alias for biobam operations
pub type Result<T> = std::result::Result<T, BiobamError>;

/// Broad failure class of a [`BiobamError`].
///
/// Every class is fatal: nothing in this crate retries. Callers that want to
/// resume should reopen the source and seek to a known-good virtual offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad magic, malformed header, inconsistent dictionary, bad layout
    Format,
    /// Payload fails to inflate, or stored checksum or length disagrees
    /// with the inflated bytes
    Integrity,
    /// Fewer bytes available than a length prefix declared
    Truncation,
    /// Reader/writer used against its mode (e.g. writing after finish)
    ModeViolation,
    /// Cooperative cancellation was requested
    Cancelled,
    /// Underlying I/O failure
    Io,
    /// Caller supplied an invalid argument
    InvalidInput,
}

/// Error types that can occur in biobam
#[derive(Debug, Error)]
pub enum BiobamError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// Malformed BAM/BAI content
    #[error(transparent)]
    Decode(#[from] BamDecodeError),

    /// Malformed BGZF member header
    #[error("Invalid BGZF member at offset {offset}: {message}")]
    InvalidMember {
        /// Compressed offset of the member
        offset: u64,
        /// What was wrong
        message: String,
    },

    /// CRC32 of the inflated payload differs from the stored value
    #[error("CRC32 mismatch in member at offset {offset}: stored {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch {
        /// Compressed offset of the member
        offset: u64,
        /// CRC32 stored in the member trailer
        expected: u32,
        /// CRC32 of the inflated bytes
        actual: u32,
    },

    /// Deflate stream inside a well-formed member could not be inflated
    #[error("Corrupt deflate payload in member at offset {offset}: {message}")]
    CorruptPayload {
        /// Compressed offset of the member
        offset: u64,
        /// Decoder error
        message: String,
    },

    /// Inflated length differs from the stored ISIZE
    #[error("Length mismatch in member at offset {offset}: stored {expected} bytes, inflated {actual}")]
    LengthMismatch {
        /// Compressed offset of the member
        offset: u64,
        /// ISIZE stored in the member trailer
        expected: usize,
        /// Number of bytes actually inflated
        actual: usize,
    },

    /// A length-prefixed field ended early
    #[error("Truncated {context}: expected {expected} bytes, got {actual}")]
    Truncated {
        /// What was being read
        context: String,
        /// Declared number of bytes
        expected: usize,
        /// Number of bytes available
        actual: usize,
    },

    /// Reader or writer used outside its mode
    #[error("Mode violation: {0}")]
    ModeViolation(&'static str),

    /// Cancellation token fired between records
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid range or region
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Value that cannot be encoded (e.g. a NUL inside a `Z` tag)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl BiobamError {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Io(_) => ErrorCategory::Io,
            Self::Decode(_) | Self::InvalidMember { .. } => ErrorCategory::Format,
            Self::ChecksumMismatch { .. }
            | Self::CorruptPayload { .. }
            | Self::LengthMismatch { .. } => ErrorCategory::Integrity,
            Self::Truncated { .. } => ErrorCategory::Truncation,
            Self::ModeViolation(_) => ErrorCategory::ModeViolation,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::InvalidRange(_) | Self::InvalidInput(_) => ErrorCategory::InvalidInput,
        }
    }

    /// Shorthand for a truncation error.
    pub(crate) fn truncated(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::Truncated {
            context: context.into(),
            expected,
            actual,
        }
    }
}

// `Read`/`Write` impls can only surface `io::Error`, so crate errors ride
// inside one. Unwrap them here so the original variant survives the trip.
impl From<io::Error> for BiobamError {
    fn from(e: io::Error) -> Self {
        if e.get_ref().is_some_and(|inner| inner.is::<BiobamError>()) {
            let kind = e.kind();
            return match e.into_inner().map(|inner| inner.downcast::<BiobamError>()) {
                Some(Ok(err)) => *err,
                _ => BiobamError::Io(io::Error::from(kind)),
            };
        }
        if e.kind() == io::ErrorKind::UnexpectedEof {
            return BiobamError::truncated(e.to_string(), 0, 0);
        }
        BiobamError::Io(e)
    }
}

impl From<BiobamError> for io::Error {
    fn from(e: BiobamError) -> Self {
        match e {
            BiobamError::Io(io_err) => io_err,
            BiobamError::Truncated { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, e),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
