//! BAM header: SAM header text plus the binary reference dictionary.
//!
//! # Format
//!
//! ```text
//! BAM Header:
//! - 4 bytes: Magic ("BAM\1")
//! - 4 bytes: SAM header text length (l_text, uint32)
//! - l_text bytes: SAM header text
//! - 4 bytes: Number of reference sequences (n_ref, uint32)
//! - For each reference:
//!   - 4 bytes: Reference name length (l_name, uint32, includes null terminator)
//!   - l_name bytes: Reference name (null-terminated)
//!   - 4 bytes: Reference length (uint32)
//! ```
//!
//! The text is parsed into typed entities (`@HD`, `@SQ`, `@RG`, `@PG`,
//! `@CO`). Its `@SQ` lines must agree with the binary dictionary in count
//! and order of names; a text without any `@SQ` lines defers to the
//! dictionary.

use super::bytes::{read_exact_vec, read_u32_from, utf8};
use super::error::BamDecodeError;
use crate::error::{BiobamError, Result};
use std::io::{Read, Write};
use tracing::{debug, warn};

/// BAM magic bytes.
pub const BAM_MAGIC: [u8; 4] = *b"BAM\x01";

/// One `@XX` line of the header text, as ordered `KEY:value` fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    /// Two-letter record type without the `@` (e.g. "RG")
    pub kind: String,
    /// Fields in line order
    pub fields: Vec<(String, String)>,
}

impl HeaderRecord {
    /// Create a record with no fields.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Vec::new(),
        }
    }

    /// Builder-style field append.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// Value of the first field named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The `ID` field (read groups and programs).
    pub fn id(&self) -> Option<&str> {
        self.get("ID")
    }

    fn render(&self, out: &mut String) {
        out.push('@');
        out.push_str(&self.kind);
        for (key, value) in &self.fields {
            out.push('\t');
            out.push_str(key);
            out.push(':');
            out.push_str(value);
        }
        out.push('\n');
    }
}

/// Reference sequence information.
///
/// Each reference sequence (chromosome/contig) has a name and length.
/// Records refer to references by their index in [`Header::references`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Reference sequence name (e.g., "chr1", "chrM")
    pub name: String,
    /// Reference sequence length in bases
    pub length: u32,
    /// Additional `@SQ` fields besides `SN` and `LN` (e.g. `M5`, `AS`)
    pub attributes: Vec<(String, String)>,
}

impl Reference {
    /// Create a new reference.
    pub fn new(name: impl Into<String>, length: u32) -> Self {
        Self {
            name: name.into(),
            length,
            attributes: Vec::new(),
        }
    }
}

/// BAM file header.
///
/// # Example
///
/// ```
/// use biobam::io::bam::{Header, HeaderRecord, Reference};
///
/// let header = Header::new(vec![Reference::new("chr1", 1000)])
///     .with_metadata(HeaderRecord::new("HD").with_field("VN", "1.6"))
///     .with_comment("simulated");
///
/// assert_eq!(header.text(), "@HD\tVN:1.6\n@SQ\tSN:chr1\tLN:1000\n@CO\tsimulated");
/// assert_eq!(header.reference_id("chr1"), Some(0));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    /// `@HD` line
    pub metadata: Option<HeaderRecord>,
    /// Reference dictionary, in record-index order
    pub references: Vec<Reference>,
    /// `@RG` lines
    pub read_groups: Vec<HeaderRecord>,
    /// `@PG` lines
    pub programs: Vec<HeaderRecord>,
    /// Other `@XX` lines, kept verbatim
    pub other: Vec<HeaderRecord>,
    /// `@CO` comment text
    pub comments: Vec<String>,
}

impl Header {
    /// Create a header holding only a reference dictionary.
    pub fn new(references: Vec<Reference>) -> Self {
        Self {
            references,
            ..Self::default()
        }
    }

    /// Builder-style `@HD` setter.
    pub fn with_metadata(mut self, metadata: HeaderRecord) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Builder-style `@RG` append.
    pub fn with_read_group(mut self, read_group: HeaderRecord) -> Self {
        self.read_groups.push(read_group);
        self
    }

    /// Builder-style `@PG` append.
    pub fn with_program(mut self, program: HeaderRecord) -> Self {
        self.programs.push(program);
        self
    }

    /// Builder-style `@CO` append.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comments.push(comment.into());
        self
    }

    /// Get reference by ID.
    pub fn reference(&self, id: usize) -> Option<&Reference> {
        self.references.get(id)
    }

    /// Get reference name by ID.
    pub fn reference_name(&self, id: usize) -> Option<&str> {
        self.reference(id).map(|r| r.name.as_str())
    }

    /// Index of the reference called `name`.
    pub fn reference_id(&self, name: &str) -> Option<usize> {
        self.references.iter().position(|r| r.name == name)
    }

    /// Get number of reference sequences.
    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    /// Read group by `ID`.
    pub fn read_group(&self, id: &str) -> Option<&HeaderRecord> {
        self.read_groups.iter().find(|rg| rg.id() == Some(id))
    }

    /// Render the SAM header text.
    ///
    /// Lines are emitted as `@HD`, `@PG`, `@RG`, one `@SQ` per reference,
    /// other record types, then `@CO`; the trailing newline is trimmed.
    pub fn text(&self) -> String {
        let mut out = String::new();
        if let Some(metadata) = &self.metadata {
            metadata.render(&mut out);
        }
        for program in &self.programs {
            program.render(&mut out);
        }
        for read_group in &self.read_groups {
            read_group.render(&mut out);
        }
        for reference in &self.references {
            let mut record = HeaderRecord::new("SQ")
                .with_field("SN", reference.name.as_str())
                .with_field("LN", reference.length.to_string());
            record.fields.extend(reference.attributes.iter().cloned());
            record.render(&mut out);
        }
        for record in &self.other {
            record.render(&mut out);
        }
        for comment in &self.comments {
            out.push_str("@CO\t");
            out.push_str(comment);
            out.push('\n');
        }
        out.trim_end().to_string()
    }

    /// Parse SAM header text.
    ///
    /// References come from the `@SQ` lines, which must carry `SN` and a
    /// numeric `LN`.
    pub fn parse_text(text: &str) -> Result<Self> {
        let mut header = Header::default();

        for (i, line) in text.lines().enumerate() {
            let line_no = i + 1;
            if line.trim().is_empty() {
                continue;
            }
            let malformed = |message: String| BamDecodeError::MalformedHeaderLine {
                line: line_no,
                message,
            };

            let (kind, rest) = match line.split_once('\t') {
                Some((kind, rest)) => (kind, rest),
                None => (line, ""),
            };
            let kind = kind
                .strip_prefix('@')
                .filter(|k| k.len() == 2)
                .ok_or_else(|| malformed(format!("expected @XX record type, got {:?}", kind)))?;

            if kind == "CO" {
                header.comments.push(rest.to_string());
                continue;
            }

            let mut record = HeaderRecord::new(kind);
            for field in rest.split('\t').filter(|f| !f.is_empty()) {
                match field.split_once(':') {
                    Some((key, value)) if key.len() == 2 => {
                        record.fields.push((key.to_string(), value.to_string()));
                    }
                    _ => return Err(malformed(format!("invalid field {:?}", field)).into()),
                }
            }

            match kind {
                "HD" => header.metadata = Some(record),
                "RG" => header.read_groups.push(record),
                "PG" => header.programs.push(record),
                "SQ" => {
                    let name = record
                        .get("SN")
                        .ok_or_else(|| malformed("@SQ without SN".to_string()))?
                        .to_string();
                    let length = record
                        .get("LN")
                        .ok_or_else(|| malformed("@SQ without LN".to_string()))?
                        .parse::<u32>()
                        .map_err(|e| malformed(format!("invalid LN: {}", e)))?;
                    let attributes = record
                        .fields
                        .into_iter()
                        .filter(|(k, _)| k != "SN" && k != "LN")
                        .collect();
                    header.references.push(Reference {
                        name,
                        length,
                        attributes,
                    });
                }
                _ => header.other.push(record),
            }
        }

        Ok(header)
    }

    /// Combine parsed text with the binary dictionary.
    ///
    /// The binary dictionary is authoritative for lengths; the text
    /// contributes extra `@SQ` attributes.
    fn merge_dictionary(&mut self, binary: Vec<Reference>) -> Result<()> {
        if self.references.is_empty() {
            if !binary.is_empty() {
                warn!(
                    references = binary.len(),
                    "header text has no @SQ lines, using binary dictionary"
                );
            }
            self.references = binary;
            return Ok(());
        }

        if self.references.len() != binary.len() {
            return Err(BamDecodeError::ReferenceCountMismatch {
                text: self.references.len(),
                binary: binary.len(),
            }
            .into());
        }

        for (index, (text_ref, binary_ref)) in self.references.iter_mut().zip(binary).enumerate() {
            if text_ref.name != binary_ref.name {
                return Err(BamDecodeError::ReferenceNameMismatch {
                    index,
                    text: text_ref.name.clone(),
                    binary: binary_ref.name,
                }
                .into());
            }
            text_ref.length = binary_ref.length;
        }
        Ok(())
    }
}

/// Read and validate BAM magic bytes.
pub fn read_magic<R: Read>(reader: &mut R) -> Result<()> {
    let bytes = read_exact_vec(reader, 4, "BAM magic")?;
    let actual = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if actual != BAM_MAGIC {
        return Err(BamDecodeError::InvalidMagic {
            expected: BAM_MAGIC,
            actual,
        }
        .into());
    }
    Ok(())
}

/// Read the length-prefixed SAM header text.
///
/// Trailing NUL padding, which some writers append, is dropped.
pub fn read_header_text<R: Read>(reader: &mut R) -> Result<String> {
    let len = read_u32_from(reader, "header text length")? as usize;
    let mut bytes = read_exact_vec(reader, len, "header text")?;
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    utf8(bytes, "header text")
}

/// Read a single binary dictionary entry.
pub fn read_reference<R: Read>(reader: &mut R) -> Result<Reference> {
    let name_len = read_u32_from(reader, "reference name length")? as usize;
    if name_len == 0 {
        return Err(BamDecodeError::InvalidData {
            message: "reference name length is 0".to_string(),
        }
        .into());
    }

    let mut name = read_exact_vec(reader, name_len, "reference name")?;
    if name.pop() != Some(0) {
        return Err(BamDecodeError::MissingNulTerminator {
            field: "reference name",
            offset: name_len - 1,
        }
        .into());
    }
    let name = utf8(name, "reference name")?;

    let length = read_u32_from(reader, "reference length")?;
    Ok(Reference::new(name, length))
}

/// Read the binary reference dictionary.
pub fn read_references<R: Read>(reader: &mut R) -> Result<Vec<Reference>> {
    let count = read_u32_from(reader, "reference count")? as usize;
    let mut references = Vec::with_capacity(count.min(1 << 16));
    for _ in 0..count {
        references.push(read_reference(reader)?);
    }
    Ok(references)
}

/// Read complete BAM header and merge text with the binary dictionary.
///
/// # Errors
///
/// - [`BamDecodeError::InvalidMagic`] if the stream is not BAM
/// - [`BamDecodeError::ReferenceCountMismatch`] /
///   [`BamDecodeError::ReferenceNameMismatch`] if text and dictionary disagree
/// - [`BiobamError::Truncated`] if the stream ends early
pub fn read_header<R: Read>(reader: &mut R) -> Result<Header> {
    read_magic(reader)?;
    let text = read_header_text(reader)?;
    let mut header = Header::parse_text(&text)?;
    let references = read_references(reader)?;
    header.merge_dictionary(references)?;

    debug!(
        references = header.reference_count(),
        read_groups = header.read_groups.len(),
        text_len = text.len(),
        "parsed BAM header"
    );
    Ok(header)
}

/// Write magic, rendered header text and binary dictionary.
pub fn write_header<W: Write>(writer: &mut W, header: &Header) -> Result<()> {
    let text = header.text();
    let text_len = u32::try_from(text.len())
        .map_err(|_| BiobamError::InvalidInput("header text exceeds 4 GiB".to_string()))?;

    writer.write_all(&BAM_MAGIC)?;
    writer.write_all(&text_len.to_le_bytes())?;
    writer.write_all(text.as_bytes())?;
    writer.write_all(&(header.references.len() as u32).to_le_bytes())?;

    for reference in &header.references {
        if reference.name.as_bytes().contains(&0) {
            return Err(BiobamError::InvalidInput(format!(
                "reference name {:?} contains a NUL byte",
                reference.name
            )));
        }
        writer.write_all(&(reference.name.len() as u32 + 1).to_le_bytes())?;
        writer.write_all(reference.name.as_bytes())?;
        writer.write_all(&[0])?;
        writer.write_all(&reference.length.to_le_bytes())?;
    }
    Ok(())
}
