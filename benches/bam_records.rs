//! BAM record encode/decode throughput
//!
//! Measures the codec alone (no BGZF) and the full reader path over an
//! in-memory file.

use biobam::io::bam::{
    encode_record, parse_record, BamReader, BamWriter, CigarOp, Header, Record, Reference, TagValue,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::io::Cursor;

fn sample_record(i: usize) -> Record {
    let mut record = Record::new();
    record.name = format!("read_{:08}", i);
    record.reference_id = Some(0);
    record.position = Some(1 + (i as i32) * 10);
    record.mapq = Some(60);
    record.sequence = (0..150).map(|j| b"ACGT"[(i + j) % 4]).collect();
    record.quality = vec![b'I'; 150];
    record.cigar = vec![CigarOp::SoftClip(5), CigarOp::Match(140), CigarOp::SoftClip(5)];
    record.tags.insert(*b"NM", TagValue::Int32(2));
    record.tags.insert(*b"RG", TagValue::String("lane1".to_string()));
    record
}

fn bench_codec(c: &mut Criterion) {
    let record = sample_record(42);
    let mut block = Vec::new();
    encode_record(&record, &mut block).unwrap();

    let mut group = c.benchmark_group("bam_codec");
    group.throughput(Throughput::Elements(1));
    group.bench_function("encode", |b| {
        let mut out = Vec::with_capacity(block.len());
        b.iter(|| {
            out.clear();
            encode_record(black_box(&record), &mut out).unwrap();
            black_box(out.len())
        });
    });
    group.bench_function("decode", |b| {
        // encode_record prefixes block_size
        b.iter(|| black_box(parse_record(black_box(&block[4..])).unwrap()));
    });
    group.finish();
}

fn bench_reader(c: &mut Criterion) {
    let header = Header::new(vec![Reference::new("chr1", 10_000_000)]);
    let mut writer = BamWriter::new(Vec::new(), &header).unwrap();
    for i in 0..50_000 {
        writer.write_record(&sample_record(i)).unwrap();
    }
    let (data, _) = writer.finish().unwrap();

    let mut group = c.benchmark_group("bam_reader");
    group.throughput(Throughput::Elements(50_000));
    group.bench_function("records", |b| {
        b.iter(|| {
            let mut bam = BamReader::new(Cursor::new(data.as_slice())).unwrap();
            black_box(bam.records().map(|r| r.unwrap()).count())
        });
    });
    group.bench_function("stream", |b| {
        b.iter(|| {
            let bam = BamReader::new(Cursor::new(data.clone())).unwrap();
            black_box(bam.into_stream(256).map(|r| r.unwrap()).count())
        });
    });
    group.finish();
}

criterion_group!(benches, bench_codec, bench_reader);
criterion_main!(benches);
