//! Partitioned output end to end: dispersion, union, and the combined
//! partition+sort disciplines through the configured front door.

use std::sync::Arc;

use tempfile::TempDir;

use recio::output::{partition_filename, ExtOptions, ExtWriter, RecordSink, WriterOptions};
use recio::record::{compare_u32, split_by_u32, CompareFn, PartitionFn, Record};
use recio::{Cursor, CursorOptions, Format};

fn read_u32s(path: &std::path::Path) -> Vec<u32> {
    let mut opts = CursorOptions::default();
    opts.format = Format::prefix();
    let mut c = Cursor::open(path, &opts);
    let mut out = Vec::new();
    while let Some(r) = c.advance() {
        out.push(u32::from_le_bytes([r.bytes[0], r.bytes[1], r.bytes[2], r.bytes[3]]));
    }
    out
}

#[test]
fn thousand_records_mod_four() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.bin");
    let mut ext = ExtOptions::default();
    let split: PartitionFn = Arc::new(|r: &Record<'_>, n: usize| split_by_u32(r, n));
    ext.set_partition(split, 4);
    let mut out = ExtWriter::create(&path, &WriterOptions::default(), &ext).unwrap();
    for i in 0..1000u32 {
        out.write_record(&i.to_le_bytes()).unwrap();
    }
    out.finish().unwrap();

    let mut union = Vec::new();
    for k in 0..4usize {
        let part = partition_filename(&path, k, 4);
        assert!(part.exists(), "partition {k} missing");
        let got = read_u32s(&part);
        assert_eq!(got.len(), 250);
        assert!(got.iter().all(|v| (*v as usize) % 4 == k), "misrouted in {k}");
        // Input order preserved inside a plain partition.
        assert!(got.windows(2).all(|w| w[0] < w[1]));
        union.extend(got);
    }
    union.sort_unstable();
    assert_eq!(union, (0..1000).collect::<Vec<u32>>());
}

#[test]
fn partitioned_and_sorted_lz4_outputs() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.lz4");
    let cmp: CompareFn = Arc::new(|a: &Record<'_>, b: &Record<'_>| compare_u32(a, b));
    let split: PartitionFn = Arc::new(|r: &Record<'_>, n: usize| split_by_u32(r, n));
    let mut ext = ExtOptions::default();
    ext.set_partition(split, 3);
    ext.set_compare(cmp);
    ext.num_sort_threads = 2;
    let mut out = ExtWriter::create(&path, &WriterOptions::default(), &ext).unwrap();
    let n = 30_000u32;
    for i in (0..n).rev() {
        out.write_record(&i.to_le_bytes()).unwrap();
    }
    out.finish().unwrap();

    let mut total = 0usize;
    for k in 0..3usize {
        let part = partition_filename(&path, k, 3);
        let got = read_u32s(&part);
        assert!(got.windows(2).all(|w| w[0] <= w[1]), "partition {k} unsorted");
        assert!(got.iter().all(|v| (*v as usize) % 3 == k));
        total += got.len();
    }
    assert_eq!(total, n as usize);
}

#[test]
fn hash_partitioning_covers_every_record() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.bin");
    let split: PartitionFn =
        Arc::new(|r: &Record<'_>, n: usize| recio::record::hash_partition(r, n, 0));
    let mut ext = ExtOptions::default();
    ext.set_partition(split, 8);
    let mut out = ExtWriter::create(&path, &WriterOptions::default(), &ext).unwrap();
    for i in 0..5_000u32 {
        out.write_record(&i.to_le_bytes()).unwrap();
    }
    out.finish().unwrap();

    let mut union = Vec::new();
    for k in 0..8usize {
        union.extend(read_u32s(&partition_filename(&path, k, 8)));
    }
    union.sort_unstable();
    assert_eq!(union, (0..5_000).collect::<Vec<u32>>());
}
