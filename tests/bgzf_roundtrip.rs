use biobam::io::bgzf::{
    decompress_members_parallel, BgzfReader, BgzfWriter, VirtualOffset, EOF_MARKER,
};
use biobam::{BiobamError, ErrorCategory};
use flate2::Compression;
use std::io::{BufRead, Cursor, Read, Write};
use tempfile::NamedTempFile;

/// Integration tests for the BGZF container
///
/// These tests validate that:
/// - Payloads of any size survive a write/read cycle through a file
/// - Virtual offsets taken while writing seek to the same bytes when reading
/// - Corruption is detected, never silently decoded

fn payload(len: usize) -> Vec<u8> {
    // Mildly repetitive so members compress but are not trivial
    (0..len).map(|i| b"ACGTTGCAN"[(i * 7 + i / 13) % 9]).collect()
}

fn round_trip_file(data: &[u8]) -> Vec<u8> {
    let file = NamedTempFile::new().expect("Failed to create temp file");

    let mut writer = BgzfWriter::create(file.path()).expect("Failed to create writer");
    writer.write_all(data).unwrap();
    writer.finish().unwrap();
    drop(writer);

    let mut reader = BgzfReader::from_path(file.path()).expect("Failed to open reader");
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    out
}

#[test]
fn test_round_trip_empty() {
    assert!(round_trip_file(&[]).is_empty());
}

#[test]
fn test_round_trip_single_byte() {
    assert_eq!(round_trip_file(b"x"), b"x");
}

#[test]
fn test_round_trip_one_member_boundary() {
    let data = payload(65536);
    assert_eq!(round_trip_file(&data), data);
}

#[test]
fn test_round_trip_many_members() {
    let data = payload(1_200_000);
    let out = round_trip_file(&data);
    assert_eq!(out.len(), data.len());
    assert_eq!(out, data);
}

#[test]
fn test_empty_file_is_eof_marker_only() {
    let file = NamedTempFile::new().unwrap();
    BgzfWriter::create(file.path()).unwrap().finish().unwrap();
    assert_eq!(std::fs::read(file.path()).unwrap(), EOF_MARKER);
}

#[test]
fn test_compression_levels_agree() {
    let data = payload(200_000);
    for level in [Compression::none(), Compression::fast(), Compression::best()] {
        let mut writer = BgzfWriter::with_compression(Vec::new(), level);
        writer.write_all(&data).unwrap();
        let compressed = writer.into_inner().unwrap();

        let mut out = Vec::new();
        BgzfReader::new(Cursor::new(compressed)).read_to_end(&mut out).unwrap();
        assert_eq!(out, data, "level {:?}", level);
    }
}

#[test]
fn test_seek_yields_second_payload() {
    let a = payload(100_000);
    let b = b"payload B follows payload A".to_vec();

    let mut writer = BgzfWriter::new(Vec::new());
    writer.write_all(&a).unwrap();
    let offset = writer.virtual_offset();
    writer.write_all(&b).unwrap();
    let compressed = writer.into_inner().unwrap();

    let mut reader = BgzfReader::new(Cursor::new(compressed));
    reader.seek(offset).unwrap();
    assert_eq!(reader.virtual_offset(), offset);

    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    assert_eq!(out, b);
}

#[test]
fn test_offsets_match_between_writer_and_reader() {
    let lines: Vec<String> = (0..20_000).map(|i| format!("line {}\n", i)).collect();

    let mut writer = BgzfWriter::new(Vec::new());
    let mut offsets = Vec::new();
    for line in &lines {
        offsets.push(writer.virtual_offset());
        writer.write_all(line.as_bytes()).unwrap();
    }
    let compressed = writer.into_inner().unwrap();

    let mut reader = BgzfReader::new(Cursor::new(compressed.clone()));
    for (i, line) in lines.iter().enumerate() {
        assert_eq!(reader.virtual_offset(), offsets[i], "line {}", i);
        let mut buf = String::new();
        reader.read_line(&mut buf).unwrap();
        assert_eq!(&buf, line);
    }

    let mut reader = BgzfReader::new(Cursor::new(compressed));
    for i in [19_999usize, 0, 12_345, 7] {
        reader.seek(offsets[i]).unwrap();
        let mut buf = String::new();
        reader.read_line(&mut buf).unwrap();
        assert_eq!(buf, lines[i]);
    }
}

#[test]
fn test_corrupted_payload_is_integrity_error() {
    let mut writer = BgzfWriter::new(Vec::new());
    writer.write_all(&payload(10_000)).unwrap();
    let mut compressed = writer.into_inner().unwrap();

    // Flip a bit inside the stored CRC32 of the first member
    let bsize = u16::from_le_bytes([compressed[16], compressed[17]]) as usize;
    compressed[bsize + 1 - 8] ^= 0x01;

    let mut out = Vec::new();
    let err = BiobamError::from(
        BgzfReader::new(Cursor::new(compressed.clone()))
            .read_to_end(&mut out)
            .unwrap_err(),
    );
    assert_eq!(err.category(), ErrorCategory::Integrity);

    let err = decompress_members_parallel(&compressed).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Integrity);
}

#[test]
fn test_every_payload_byte_flip_is_detected() {
    let data = payload(10_000);
    let mut writer = BgzfWriter::new(Vec::new());
    writer.write_all(&data).unwrap();
    let compressed = writer.into_inner().unwrap();

    let bsize = u16::from_le_bytes([compressed[16], compressed[17]]) as usize;
    let payload_range = 18..bsize + 1 - 8;
    assert!(!payload_range.is_empty());

    for i in payload_range {
        let mut corrupted = compressed.clone();
        corrupted[i] ^= 0x10;

        let mut out = Vec::new();
        match BgzfReader::new(Cursor::new(corrupted.clone())).read_to_end(&mut out) {
            // Flips in unused padding bits still inflate to the original bytes
            Ok(_) => assert_eq!(out, data, "byte {} decoded to wrong output", i),
            Err(e) => assert_eq!(
                BiobamError::from(e).category(),
                ErrorCategory::Integrity,
                "byte {}",
                i
            ),
        }

        match decompress_members_parallel(&corrupted) {
            Ok(out) => assert_eq!(out, data, "byte {} decoded to wrong output", i),
            Err(e) => assert_eq!(e.category(), ErrorCategory::Integrity, "byte {}", i),
        }
    }
}

#[test]
fn test_plain_gzip_rejected() {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(b"not bgzf").unwrap();
    let gzip = encoder.finish().unwrap();

    let mut out = Vec::new();
    let err = BiobamError::from(BgzfReader::new(Cursor::new(gzip)).read_to_end(&mut out).unwrap_err());
    assert_eq!(err.category(), ErrorCategory::Format);
}

#[test]
fn test_parallel_matches_streaming() {
    let data = payload(700_000);
    let mut writer = BgzfWriter::new(Vec::new());
    writer.write_all(&data).unwrap();
    let compressed = writer.into_inner().unwrap();

    assert_eq!(decompress_members_parallel(&compressed).unwrap(), data);
}

#[test]
fn test_write_after_finish_is_mode_violation() {
    let mut writer = BgzfWriter::new(Vec::new());
    writer.finish().unwrap();
    writer.finish().unwrap();

    let err = BiobamError::from(writer.write_all(b"late").unwrap_err());
    assert_eq!(err.category(), ErrorCategory::ModeViolation);
}

#[test]
fn test_seek_to_zero_offset() {
    let mut writer = BgzfWriter::new(Vec::new());
    writer.write_all(b"start").unwrap();
    let compressed = writer.into_inner().unwrap();

    let mut reader = BgzfReader::new(Cursor::new(compressed));
    let mut skip = [0u8; 3];
    reader.read_exact(&mut skip).unwrap();
    reader.seek(VirtualOffset::ZERO).unwrap();

    let mut out = String::new();
    reader.read_to_string(&mut out).unwrap();
    assert_eq!(out, "start");
}
