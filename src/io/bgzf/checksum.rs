//! CRC32 (zip/gzip polynomial) for BGZF member trailers.

/// Compute the CRC32 of `data` in one shot.
///
/// ```
/// # use biobam::io::bgzf::checksum::crc32;
/// assert_eq!(crc32(b""), 0);
/// assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
/// ```
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Incremental CRC32 for data that arrives in pieces.
#[derive(Clone, Default)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
    len: u64,
}

impl Crc32 {
    /// Start a new checksum.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more bytes.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.len += data.len() as u64;
    }

    /// Number of bytes fed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether no bytes were fed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Final checksum value.
    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}
