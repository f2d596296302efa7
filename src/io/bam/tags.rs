//! BAM optional tags (auxiliary data).
//!
//! Optional tags store additional information about alignments such as:
//! - Edit distance (NM:i)
//! - Alignment score (AS:i)
//! - Read group (RG:Z)
//! - MD string (MD:Z)
//! - Many others
//!
//! # Format
//!
//! Each tag is encoded as:
//! - 2 bytes: tag name (e.g., "NM")
//! - 1 byte: value type
//! - N bytes: value (width fixed by the type)
//!
//! # Tag Types
//!
//! | Code | Value                       | Width            |
//! |------|-----------------------------|------------------|
//! | `A`  | printable character         | 1                |
//! | `c`/`C` | signed/unsigned 8-bit    | 1                |
//! | `s`/`S` | signed/unsigned 16-bit   | 2                |
//! | `i`/`I` | signed/unsigned 32-bit   | 4                |
//! | `f`  | IEEE 754 single             | 4                |
//! | `Z`  | string                      | NUL-terminated   |
//! | `H`  | hex digit pairs             | NUL-terminated   |
//! | `B`  | subtype, u32 count, values  | 5 + count × size |
//!
//! Every integer width is its own [`TagValue`] variant, so a decoded record
//! re-encodes to the same bytes.

use super::bytes::{read_cstring, read_u32_le, read_u8, take};
use super::error::BamDecodeError;
use crate::error::{BiobamError, Result};
use std::fmt;

/// Tag value, one variant per BAM type code.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    /// `A`: single printable character
    Char(u8),
    /// `c`
    Int8(i8),
    /// `C`
    UInt8(u8),
    /// `s`
    Int16(i16),
    /// `S`
    UInt16(u16),
    /// `i`
    Int32(i32),
    /// `I`
    UInt32(u32),
    /// `f`
    Float(f32),
    /// `Z`: NUL-terminated string
    String(String),
    /// `H`: hex-encoded byte array, stored as its hex text
    Hex(String),
    /// `B`: typed array of numbers
    Array(ArrayValue),
}

/// Array value types for tag arrays (B type).
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValue {
    /// Array of signed 8-bit integers
    Int8(Vec<i8>),
    /// Array of unsigned 8-bit integers
    UInt8(Vec<u8>),
    /// Array of signed 16-bit integers
    Int16(Vec<i16>),
    /// Array of unsigned 16-bit integers
    UInt16(Vec<u16>),
    /// Array of signed 32-bit integers
    Int32(Vec<i32>),
    /// Array of unsigned 32-bit integers
    UInt32(Vec<u32>),
    /// Array of 32-bit floats
    Float(Vec<f32>),
}

impl TagValue {
    /// BAM type code of this value.
    pub fn type_code(&self) -> u8 {
        match self {
            TagValue::Char(_) => b'A',
            TagValue::Int8(_) => b'c',
            TagValue::UInt8(_) => b'C',
            TagValue::Int16(_) => b's',
            TagValue::UInt16(_) => b'S',
            TagValue::Int32(_) => b'i',
            TagValue::UInt32(_) => b'I',
            TagValue::Float(_) => b'f',
            TagValue::String(_) => b'Z',
            TagValue::Hex(_) => b'H',
            TagValue::Array(_) => b'B',
        }
    }

    /// Integer value widened to `i64`, for any of the six integer types.
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            TagValue::Int8(v) => Some(v as i64),
            TagValue::UInt8(v) => Some(v as i64),
            TagValue::Int16(v) => Some(v as i64),
            TagValue::UInt16(v) => Some(v as i64),
            TagValue::Int32(v) => Some(v as i64),
            TagValue::UInt32(v) => Some(v as i64),
            _ => None,
        }
    }
}

impl From<i32> for TagValue {
    fn from(value: i32) -> Self {
        TagValue::Int32(value)
    }
}

impl From<f32> for TagValue {
    fn from(value: f32) -> Self {
        TagValue::Float(value)
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::String(value.to_string())
    }
}

impl From<ArrayValue> for TagValue {
    fn from(value: ArrayValue) -> Self {
        TagValue::Array(value)
    }
}

impl ArrayValue {
    /// Subtype code written after `B`.
    pub fn subtype(&self) -> u8 {
        match self {
            ArrayValue::Int8(_) => b'c',
            ArrayValue::UInt8(_) => b'C',
            ArrayValue::Int16(_) => b's',
            ArrayValue::UInt16(_) => b'S',
            ArrayValue::Int32(_) => b'i',
            ArrayValue::UInt32(_) => b'I',
            ArrayValue::Float(_) => b'f',
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            ArrayValue::Int8(v) => v.len(),
            ArrayValue::UInt8(v) => v.len(),
            ArrayValue::Int16(v) => v.len(),
            ArrayValue::UInt16(v) => v.len(),
            ArrayValue::Int32(v) => v.len(),
            ArrayValue::UInt32(v) => v.len(),
            ArrayValue::Float(v) => v.len(),
        }
    }

    /// Whether the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single BAM tag with name and value.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    /// Two-character tag name (e.g., "NM", "AS", "RG")
    pub name: [u8; 2],
    /// Tag value
    pub value: TagValue,
}

impl Tag {
    /// Create a tag.
    pub fn new(name: [u8; 2], value: impl Into<TagValue>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }

    /// Get tag name as a string slice.
    ///
    /// ```
    /// # use biobam::io::bam::{Tag, TagValue};
    /// let tag = Tag::new(*b"NM", TagValue::Int32(5));
    /// assert_eq!(tag.name_str(), "NM");
    /// ```
    pub fn name_str(&self) -> &str {
        std::str::from_utf8(&self.name).unwrap_or("??")
    }
}

fn join<T: ToString>(values: &[T]) -> String {
    values.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}

/// SAM text form, e.g. `NM:i:5` or `ZB:B:i,1,2`.
impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.name_str())?;
        match &self.value {
            TagValue::Char(c) => write!(f, "A:{}", *c as char),
            TagValue::Float(v) => write!(f, "f:{}", v),
            TagValue::String(s) => write!(f, "Z:{}", s),
            TagValue::Hex(h) => write!(f, "H:{}", h),
            TagValue::Array(arr) => {
                let values = match arr {
                    ArrayValue::Int8(v) => join(v),
                    ArrayValue::UInt8(v) => join(v),
                    ArrayValue::Int16(v) => join(v),
                    ArrayValue::UInt16(v) => join(v),
                    ArrayValue::Int32(v) => join(v),
                    ArrayValue::UInt32(v) => join(v),
                    ArrayValue::Float(v) => join(v),
                };
                if values.is_empty() {
                    write!(f, "B:{}", arr.subtype() as char)
                } else {
                    write!(f, "B:{},{}", arr.subtype() as char, values)
                }
            }
            // SAM text has a single integer type
            other => write!(f, "i:{}", other.as_int().unwrap_or_default()),
        }
    }
}

/// Ordered collection of a record's tags.
///
/// Keys are unique: [`Tags::insert`] replaces an existing value in place and
/// [`parse_tags`] rejects duplicates.
///
/// # Example
///
/// ```
/// # use biobam::io::bam::{Tags, TagValue};
/// let mut tags = Tags::new();
/// tags.insert(*b"NM", TagValue::UInt8(5));
/// tags.insert(*b"RG", "lane1");
///
/// assert_eq!(tags.edit_distance(), Some(5));
/// assert_eq!(tags.read_group(), Some("lane1"));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tags(Vec<Tag>);

impl Tags {
    /// Create empty tags.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Number of tags.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no tags.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over tags in record order.
    pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
        self.0.iter()
    }

    /// Set `name` to `value`, replacing any existing value.
    pub fn insert(&mut self, name: [u8; 2], value: impl Into<TagValue>) {
        let value = value.into();
        match self.0.iter_mut().find(|tag| tag.name == name) {
            Some(tag) => tag.value = value,
            None => self.0.push(Tag { name, value }),
        }
    }

    /// Remove and return the value stored under `name`.
    pub fn remove(&mut self, name: &[u8; 2]) -> Option<TagValue> {
        let index = self.0.iter().position(|tag| &tag.name == name)?;
        Some(self.0.remove(index).value)
    }

    /// Get a tag value by name.
    pub fn get(&self, name: &[u8; 2]) -> Option<&TagValue> {
        self.0.iter().find(|tag| &tag.name == name).map(|tag| &tag.value)
    }

    /// Integer value of any width.
    pub fn get_int(&self, name: &[u8; 2]) -> Option<i64> {
        self.get(name).and_then(TagValue::as_int)
    }

    /// String (`Z`) value.
    pub fn get_string(&self, name: &[u8; 2]) -> Option<&str> {
        match self.get(name)? {
            TagValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Character (`A`) value.
    pub fn get_char(&self, name: &[u8; 2]) -> Option<u8> {
        match self.get(name)? {
            TagValue::Char(c) => Some(*c),
            _ => None,
        }
    }

    /// Float (`f`) value.
    pub fn get_float(&self, name: &[u8; 2]) -> Option<f32> {
        match self.get(name)? {
            TagValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Hex (`H`) value.
    pub fn get_hex(&self, name: &[u8; 2]) -> Option<&str> {
        match self.get(name)? {
            TagValue::Hex(h) => Some(h),
            _ => None,
        }
    }

    /// Array (`B`) value.
    pub fn get_array(&self, name: &[u8; 2]) -> Option<&ArrayValue> {
        match self.get(name)? {
            TagValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    // ==================================================================
    // Common BAM Tag Convenience Methods
    // ==================================================================

    /// Edit distance to the reference (NM tag).
    pub fn edit_distance(&self) -> Option<i64> {
        self.get_int(b"NM")
    }

    /// Aligner-specific alignment score (AS tag).
    pub fn alignment_score(&self) -> Option<i64> {
        self.get_int(b"AS")
    }

    /// Read group identifier (RG tag).
    pub fn read_group(&self) -> Option<&str> {
        self.get_string(b"RG")
    }

    /// Mismatching positions string (MD tag).
    pub fn md_string(&self) -> Option<&str> {
        self.get_string(b"MD")
    }
}

impl FromIterator<Tag> for Tags {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        let mut tags = Tags::new();
        for tag in iter {
            tags.insert(tag.name, tag.value);
        }
        tags
    }
}

impl<'a> IntoIterator for &'a Tags {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Decode the tag block at the end of a record.
///
/// Reads `(key, type, payload)` triples until `data` is exhausted.
///
/// # Example
///
/// ```
/// use biobam::io::bam::{parse_tags, TagValue};
///
/// let tags = parse_tags(&[b'N', b'M', b'C', 5]).unwrap();
/// assert_eq!(tags.get(b"NM"), Some(&TagValue::UInt8(5)));
/// ```
pub fn parse_tags(data: &[u8]) -> Result<Tags> {
    let mut tags = Vec::new();
    let mut cursor = 0;

    while cursor < data.len() {
        let key = take(data, &mut cursor, 2, "tag name")?;
        let name = [key[0], key[1]];
        let type_code = read_u8(data, &mut cursor, "tag type")?;
        let value = parse_tag_value(data, &mut cursor, name, type_code)?;

        if tags.iter().any(|tag: &Tag| tag.name == name) {
            return Err(BamDecodeError::DuplicateTag { tag: name }.into());
        }
        tags.push(Tag { name, value });
    }

    Ok(Tags(tags))
}

fn fixed<const N: usize>(data: &[u8], cursor: &mut usize) -> Result<[u8; N]> {
    let mut raw = [0u8; N];
    raw.copy_from_slice(take(data, cursor, N, "tag value")?);
    Ok(raw)
}

fn parse_tag_value(data: &[u8], cursor: &mut usize, name: [u8; 2], type_code: u8) -> Result<TagValue> {
    let value = match type_code {
        b'A' => TagValue::Char(read_u8(data, cursor, "tag value")?),
        b'c' => TagValue::Int8(i8::from_le_bytes(fixed(data, cursor)?)),
        b'C' => TagValue::UInt8(u8::from_le_bytes(fixed(data, cursor)?)),
        b's' => TagValue::Int16(i16::from_le_bytes(fixed(data, cursor)?)),
        b'S' => TagValue::UInt16(u16::from_le_bytes(fixed(data, cursor)?)),
        b'i' => TagValue::Int32(i32::from_le_bytes(fixed(data, cursor)?)),
        b'I' => TagValue::UInt32(u32::from_le_bytes(fixed(data, cursor)?)),
        b'f' => TagValue::Float(f32::from_le_bytes(fixed(data, cursor)?)),
        b'Z' => TagValue::String(read_cstring(data, cursor, "Z tag")?),
        b'H' => TagValue::Hex(read_cstring(data, cursor, "H tag")?),
        b'B' => TagValue::Array(parse_array(data, cursor, name)?),
        _ => return Err(BamDecodeError::InvalidTagType { tag: name, type_code }.into()),
    };
    Ok(value)
}

fn parse_array(data: &[u8], cursor: &mut usize, name: [u8; 2]) -> Result<ArrayValue> {
    let subtype = read_u8(data, cursor, "array subtype")?;
    let count = read_u32_le(data, cursor, "array count")? as usize;

    let width = match subtype {
        b'c' | b'C' => 1,
        b's' | b'S' => 2,
        b'i' | b'I' | b'f' => 4,
        _ => return Err(BamDecodeError::InvalidArraySubtype { tag: name, subtype }.into()),
    };
    let byte_len = count
        .checked_mul(width)
        .ok_or_else(|| BiobamError::truncated("array values", usize::MAX, data.len() - *cursor))?;
    let raw = take(data, cursor, byte_len, "array values")?;

    let array = match subtype {
        b'c' => ArrayValue::Int8(raw.iter().map(|&b| b as i8).collect()),
        b'C' => ArrayValue::UInt8(raw.to_vec()),
        b's' => ArrayValue::Int16(raw.chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]])).collect()),
        b'S' => ArrayValue::UInt16(raw.chunks_exact(2).map(|b| u16::from_le_bytes([b[0], b[1]])).collect()),
        b'i' => ArrayValue::Int32(
            raw.chunks_exact(4)
                .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        ),
        b'I' => ArrayValue::UInt32(
            raw.chunks_exact(4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        ),
        _ => ArrayValue::Float(
            raw.chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        ),
    };
    Ok(array)
}

fn write_cstring(out: &mut Vec<u8>, name: [u8; 2], value: &str) -> Result<()> {
    if value.as_bytes().contains(&0) {
        return Err(BiobamError::InvalidInput(format!(
            "tag {}{} contains a NUL byte",
            name[0] as char, name[1] as char
        )));
    }
    out.extend_from_slice(value.as_bytes());
    out.push(0);
    Ok(())
}

/// Append the binary form of `tags` to `out`.
///
/// # Errors
///
/// [`BiobamError::InvalidInput`] if a `Z` or `H` value contains a NUL byte or
/// an array holds more than `u32::MAX` elements.
pub fn encode_tags(tags: &Tags, out: &mut Vec<u8>) -> Result<()> {
    for tag in tags {
        out.extend_from_slice(&tag.name);
        out.push(tag.value.type_code());
        match &tag.value {
            TagValue::Char(c) => out.push(*c),
            TagValue::Int8(v) => out.extend_from_slice(&v.to_le_bytes()),
            TagValue::UInt8(v) => out.push(*v),
            TagValue::Int16(v) => out.extend_from_slice(&v.to_le_bytes()),
            TagValue::UInt16(v) => out.extend_from_slice(&v.to_le_bytes()),
            TagValue::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
            TagValue::UInt32(v) => out.extend_from_slice(&v.to_le_bytes()),
            TagValue::Float(v) => out.extend_from_slice(&v.to_le_bytes()),
            TagValue::String(s) | TagValue::Hex(s) => write_cstring(out, tag.name, s)?,
            TagValue::Array(arr) => {
                out.push(arr.subtype());
                let count = u32::try_from(arr.len()).map_err(|_| {
                    BiobamError::InvalidInput(format!("tag {} array too long", tag.name_str()))
                })?;
                out.extend_from_slice(&count.to_le_bytes());
                match arr {
                    ArrayValue::Int8(v) => out.extend(v.iter().map(|&x| x as u8)),
                    ArrayValue::UInt8(v) => out.extend_from_slice(v),
                    ArrayValue::Int16(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
                    ArrayValue::UInt16(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
                    ArrayValue::Int32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
                    ArrayValue::UInt32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
                    ArrayValue::Float(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
                }
            }
        }
    }
    Ok(())
}
