//! External sort at scale: a million shuffled integers through a 1 MiB
//! buffer come back sorted and multiset-identical, whatever the spill and
//! merge schedule looked like.

use std::collections::HashMap;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use tempfile::TempDir;

use recio::output::{ExtOptions, ExtWriter, RecordSink, WriterOptions};
use recio::record::{compare_u32, CompareFn, Record, Reduced, ReduceFn};
use recio::{Cursor, CursorOptions, Format, MB};

fn u32_cmp() -> CompareFn {
    Arc::new(|a: &Record<'_>, b: &Record<'_>| compare_u32(a, b))
}

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
fn million_shuffled_u32s_come_back_sorted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sorted.bin");

    let n: u32 = 1_000_000;
    // Repeats included: each value appears four times.
    let mut values: Vec<u32> = (0..n).map(|i| i % (n / 4)).collect();
    let mut rng = rand::rngs::StdRng::seed_from_u64(0xC0FFEE);
    values.shuffle(&mut rng);

    let mut wopts = WriterOptions::default();
    wopts.buffer_size = MB;
    let mut ext = ExtOptions::default();
    ext.set_compare(u32_cmp());
    let mut out = ExtWriter::create(&path, &wopts, &ext).unwrap();
    for v in &values {
        out.write_record(&v.to_le_bytes()).unwrap();
    }
    out.finish().unwrap();

    let got = read_u32s(&path);
    assert_eq!(got.len(), values.len());
    assert!(got.windows(2).all(|w| w[0] <= w[1]), "output not sorted");

    let mut want_counts: HashMap<u32, u32> = HashMap::new();
    for v in values {
        *want_counts.entry(v).or_default() += 1;
    }
    let mut got_counts: HashMap<u32, u32> = HashMap::new();
    for v in got {
        *got_counts.entry(v).or_default() += 1;
    }
    assert_eq!(got_counts, want_counts, "multiset changed");
}

#[test]
fn chained_sorts_through_into_cursor() {
    // Sort by the first word, then feed the merge cursor straight into a
    // second sort keyed on the second word, never writing the first file.
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("first.bin");
    let second = dir.path().join("second.bin");

    let mut wopts = WriterOptions::default();
    wopts.buffer_size = 256 * 1024;
    let mut ext = ExtOptions::default();
    ext.set_compare(u32_cmp());
    let mut out = ExtWriter::create(&first, &wopts, &ext).unwrap();
    let n = 50_000u32;
    for i in 0..n {
        let mut rec = ((i * 7919) % n).to_le_bytes().to_vec();
        rec.extend_from_slice(&((n - i) as u32).to_le_bytes());
        out.write_record(&rec).unwrap();
    }
    let mut sorted_by_first = out.into_cursor().unwrap();
    assert!(!first.exists());

    let by_second: CompareFn = Arc::new(|a: &Record<'_>, b: &Record<'_>| {
        let ka = u32::from_le_bytes([a.bytes[4], a.bytes[5], a.bytes[6], a.bytes[7]]);
        let kb = u32::from_le_bytes([b.bytes[4], b.bytes[5], b.bytes[6], b.bytes[7]]);
        ka.cmp(&kb)
    });
    let mut ext2 = ExtOptions::default();
    ext2.set_compare(by_second);
    let mut out2 = ExtWriter::create(&second, &wopts, &ext2).unwrap();
    sorted_by_first.pump(&mut out2).unwrap();
    out2.finish().unwrap();

    let mut opts = CursorOptions::default();
    opts.format = Format::prefix();
    let mut c = Cursor::open(&second, &opts);
    let mut prev = 0u32;
    let mut count = 0usize;
    while let Some(r) = c.advance() {
        let k = u32::from_le_bytes([r.bytes[4], r.bytes[5], r.bytes[6], r.bytes[7]]);
        assert!(k >= prev);
        prev = k;
        count += 1;
    }
    assert_eq!(count, n as usize);
}

#[test]
fn sum_reducer_aggregates_across_spills() {
    // key(u32) | count(u32) records; the reducer sums counts per key.
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("summed.bin");

    let sum: ReduceFn = Arc::new(|group: &[Record<'_>], out: &mut Reduced| {
        let total: u64 = group
            .iter()
            .map(|r| u32::from_le_bytes([r.bytes[4], r.bytes[5], r.bytes[6], r.bytes[7]]) as u64)
            .sum();
        out.data.clear();
        out.data.extend_from_slice(&group[0].bytes[..4]);
        out.data.extend_from_slice(&(total as u32).to_le_bytes());
        true
    });

    let mut wopts = WriterOptions::default();
    wopts.buffer_size = 64 * 1024;
    let mut ext = ExtOptions::default();
    ext.set_compare(u32_cmp());
    ext.set_reducer(sum);
    let mut out = ExtWriter::create(&path, &wopts, &ext).unwrap();
    let keys = 2_000u32;
    let rounds = 10u32;
    let pad = [0u8; 24];
    for _ in 0..rounds {
        for k in 0..keys {
            let mut rec = k.to_le_bytes().to_vec();
            rec.extend_from_slice(&1u32.to_le_bytes());
            rec.extend_from_slice(&pad);
            out.write_record(&rec).unwrap();
        }
    }
    out.finish().unwrap();

    let mut opts = CursorOptions::default();
    opts.format = Format::prefix();
    let mut c = Cursor::open(&path, &opts);
    let mut seen = 0u32;
    while let Some(r) = c.advance() {
        let key = u32::from_le_bytes([r.bytes[0], r.bytes[1], r.bytes[2], r.bytes[3]]);
        let count = u32::from_le_bytes([r.bytes[4], r.bytes[5], r.bytes[6], r.bytes[7]]);
        assert_eq!(key, seen);
        assert_eq!(count, rounds, "key {key} missed counts");
        seen += 1;
    }
    assert_eq!(seen, keys);
}
