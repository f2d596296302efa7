//! BGZF virtual file offsets.
//!
//! A virtual offset packs two coordinates into one `u64`:
//!
//! ```text
//! bits 63..16  member address   (byte offset of a member in the compressed file)
//! bits 15..0   in-member offset (byte offset inside that member's inflated data)
//! ```
//!
//! Ordering of the packed integer matches file order, so offsets can be used
//! directly as sort keys and as chunk bounds in the BAI index.

use std::fmt;

/// Largest member address representable in 48 bits.
pub const MAX_MEMBER_ADDRESS: u64 = (1 << 48) - 1;

/// Virtual file offset in BGZF format.
///
/// # Example
///
/// ```
/// # use biobam::io::bgzf::VirtualOffset;
/// let offset = VirtualOffset::new(1024, 512);
/// assert_eq!(offset.member_address(), 1024);
/// assert_eq!(offset.in_member_offset(), 512);
/// assert_eq!(offset.as_raw(), (1024 << 16) | 512);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    /// Offset of the first byte of the file.
    pub const ZERO: VirtualOffset = VirtualOffset(0);

    /// Create a virtual offset from a member address and in-member offset.
    ///
    /// Bits of `member_address` above 48 are discarded.
    pub fn new(member_address: u64, in_member_offset: u16) -> Self {
        debug_assert!(member_address <= MAX_MEMBER_ADDRESS);
        VirtualOffset(((member_address & MAX_MEMBER_ADDRESS) << 16) | u64::from(in_member_offset))
    }

    /// Create from raw 64-bit value.
    pub fn from_raw(value: u64) -> Self {
        VirtualOffset(value)
    }

    /// Get raw 64-bit value.
    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Byte offset of the member in the compressed stream (high 48 bits).
    pub fn member_address(self) -> u64 {
        self.0 >> 16
    }

    /// Byte offset within the inflated member (low 16 bits).
    pub fn in_member_offset(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

impl From<u64> for VirtualOffset {
    fn from(value: u64) -> Self {
        VirtualOffset(value)
    }
}

impl From<VirtualOffset> for u64 {
    fn from(offset: VirtualOffset) -> Self {
        offset.0
    }
}

impl fmt::Display for VirtualOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.member_address(), self.in_member_offset())
    }
}
