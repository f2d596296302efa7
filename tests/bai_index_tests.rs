use biobam::io::bam::{
    bin, bins, BamIndex, BamReader, BamWriter, BamWriterOptions, CigarOp, Header, Record,
    Reference,
};
use biobam::io::bgzf::VirtualOffset;
use biobam::{BiobamError, ErrorCategory, Result};
use proptest::prelude::*;
use std::io::Cursor;
use tempfile::TempDir;

/// Integration tests for BAI index functionality
///
/// These tests validate that our BAI index implementation correctly:
/// - Computes bins per the fixed 5-level scheme
/// - Builds an index while writing and round-trips it through a file
/// - Answers region queries with exactly the records a full scan finds

fn header() -> Header {
    Header::new(vec![
        Reference::new("chr1", 5_000_000),
        Reference::new("chr2", 3_000_000),
    ])
}

/// Deterministic spread of read placements, some long enough to land in
/// coarse bins.
fn sorted_records() -> Vec<Record> {
    let mut records = Vec::new();
    let mut state = 0x9e37_79b9_u32;
    for reference_id in 0..2usize {
        let mut position = 1i32;
        for i in 0..3_000 {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            position += (state >> 24) as i32 * 3;
            let length = if i % 97 == 0 { 150_000 } else { 100 };

            let mut record = Record::new();
            record.name = format!("r{}_{}", reference_id, i);
            record.reference_id = Some(reference_id);
            record.position = Some(position);
            record.mapq = Some(30);
            record.sequence = vec![b'A'; 100];
            record.cigar = if length == 100 {
                vec![CigarOp::Match(100)]
            } else {
                vec![CigarOp::Match(50), CigarOp::RefSkip(length - 100), CigarOp::Match(50)]
            };
            records.push(record);
        }
    }

    let mut unplaced = Record::new();
    unplaced.name = "unplaced".to_string();
    unplaced.flags = 0x4;
    records.push(unplaced);
    records
}

fn write_indexed(records: &[Record]) -> (Vec<u8>, BamIndex) {
    let options = BamWriterOptions {
        build_index: true,
        ..Default::default()
    };
    let mut writer = BamWriter::with_options(Vec::new(), &header(), options).unwrap();
    for record in records {
        writer.write_record(record).unwrap();
    }
    let (data, index) = writer.finish().unwrap();
    (data, index.expect("index requested"))
}

fn overlaps(record: &Record, reference_id: usize, begin: u64, end: u64) -> bool {
    record.reference_id == Some(reference_id)
        && record.span().is_some_and(|(start, stop)| start < end && stop > begin)
}

#[test]
fn test_binning_reference_values() {
    assert_eq!(bin(0, 1), 4681);
    assert_eq!(bin(0, 16384), 4681);
    assert_eq!(bin(0, 2_000_000_000), 0);
    assert!(bins(0, 1).contains(&0));
    assert!(bins(100_000_000, 100_000_001).contains(&0));
}

#[test]
fn test_chunks_are_ordered() {
    let (_, index) = write_indexed(&sorted_records());
    for reference in &index.references {
        for bin in &reference.bins {
            for chunk in &bin.chunks {
                assert!(chunk.begin <= chunk.end, "bin {} has inverted chunk", bin.id);
            }
        }
        for pair in reference.intervals.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }
}

#[test]
fn test_index_metadata_counts() {
    let (_, index) = write_indexed(&sorted_records());
    assert_eq!(index.references.len(), 2);
    assert_eq!(index.unmapped, 1);
    for reference in &index.references {
        let meta = reference.metadata.expect("metadata pseudo-bin");
        assert_eq!(meta.mapped, 3_000);
        assert_eq!(meta.unmapped, 0);
        assert!(meta.begin < meta.end);
    }
}

#[test]
fn test_index_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let bam_path = dir.path().join("sorted.bam");
    let bai_path = dir.path().join("sorted.bam.bai");

    let options = BamWriterOptions {
        build_index: true,
        ..Default::default()
    };
    let mut writer = BamWriter::create_with_options(&bam_path, &header(), options).unwrap();
    for record in &sorted_records() {
        writer.write_record(record).unwrap();
    }
    let (_, index) = writer.finish().unwrap();
    let index = index.unwrap();
    index.write_to_path(&bai_path).unwrap();

    let loaded = BamIndex::from_path(&bai_path).unwrap();
    assert_eq!(loaded, index);

    let mut bam = BamReader::from_path(&bam_path).unwrap();
    let hits = bam
        .query_by_name(&loaded, "chr2", 0, 50_000)
        .unwrap()
        .collect::<Result<Vec<_>>>()
        .unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|r| r.reference_id == Some(1)));
}

#[test]
fn test_missing_trailer_reads_as_zero() {
    let (_, index) = write_indexed(&sorted_records());
    let mut data = Vec::new();
    index.write(&mut data).unwrap();
    data.truncate(data.len() - 8);

    let loaded = BamIndex::read(&mut Cursor::new(data)).unwrap();
    assert_eq!(loaded.unmapped, 0);
    assert_eq!(loaded.references, index.references);
}

#[test]
fn test_truncation_before_trailer_is_fatal() {
    let (_, index) = write_indexed(&sorted_records());
    let mut data = Vec::new();
    index.write(&mut data).unwrap();
    data.truncate(data.len() / 2);

    let err = BamIndex::parse(&data).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Truncation);
}

#[test]
fn test_query_matches_full_scan() {
    let records = sorted_records();
    let (data, index) = write_indexed(&records);
    let mut bam = BamReader::new(Cursor::new(data)).unwrap();

    let regions = [
        (0usize, 0u64, 1_000u64),
        (0, 10_000, 20_000),
        (0, 200_000, 200_001),
        (0, 300_000, 900_000),
        (1, 0, 16_384),
        (1, 150_000, 160_000),
        (1, 4_000_000, 4_500_000),
    ];
    for (reference_id, begin, end) in regions {
        let expected: Vec<&str> = records
            .iter()
            .filter(|r| overlaps(r, reference_id, begin, end))
            .map(|r| r.name.as_str())
            .collect();
        let actual: Vec<String> = bam
            .query(&index, reference_id, begin, end)
            .unwrap()
            .map(|r| r.unwrap().name)
            .collect();
        assert_eq!(actual, expected, "region {}:{}-{}", reference_id, begin, end);
    }
}

#[test]
fn test_query_rejects_bad_ranges() {
    let (data, index) = write_indexed(&sorted_records());
    let mut bam = BamReader::new(Cursor::new(data)).unwrap();

    let err = bam.query(&index, 0, 500, 500).err().unwrap();
    assert!(matches!(err, BiobamError::InvalidRange(_)));
    assert!(bam.query(&index, 9, 0, 10).is_err());
    assert!(index.query_chunks(9, 0, 10).is_err());
}

#[test]
fn test_stream_cancellation_mid_scan() {
    let records = sorted_records();
    let (data, _) = write_indexed(&records);
    let bam = BamReader::new(Cursor::new(data)).unwrap();
    let mut stream = bam.into_stream(16);

    let first = stream.by_ref().take(100).collect::<Result<Vec<_>>>().unwrap();
    assert_eq!(first.len(), 100);
    assert_eq!(first[0].name, records[0].name);

    stream.cancel();
    let tail: Vec<_> = stream.collect();
    assert!(tail.len() < records.len() - 100);
    assert!(matches!(tail.last(), Some(Err(BiobamError::Cancelled))));
}

proptest! {
    #[test]
    fn prop_bins_always_include_zero_and_own_bin(begin in 0u64..(1 << 29) - 1, len in 1u64..5_000_000) {
        let end = (begin + len).min(1 << 29);
        let candidates = bins(begin, end);
        prop_assert!(candidates.contains(&0));
        prop_assert!(candidates.contains(&bin(begin, end)));
    }

    #[test]
    fn prop_bin_is_deterministic_within_tile(tile in 0u64..32_768, a in 0u64..16_384, b in 0u64..16_384) {
        let base = tile << 14;
        let (lo, hi) = (a.min(b), a.max(b));
        prop_assert_eq!(bin(base + lo, base + hi + 1), 4681 + tile as u32);
    }

    #[test]
    fn prop_virtual_offsets_order_like_packed(a in any::<u64>(), b in any::<u64>()) {
        let (va, vb) = (VirtualOffset::from_raw(a), VirtualOffset::from_raw(b));
        prop_assert_eq!(va.cmp(&vb), a.cmp(&b));
    }
}
