//! Transparent-compression round trips: records written through gzip and
//! LZ4 writers come back bytewise identical through the auto-detecting
//! cursor.

use tempfile::TempDir;

use recio::output::{BlockSize, RecordSink, Writer, WriterOptions};
use recio::{Cursor, CursorOptions, Format};

fn write_records(path: &std::path::Path, opts: &WriterOptions, records: &[Vec<u8>]) {
    let mut w = Writer::create(path, opts).unwrap();
    for r in records {
        w.write_record(r).unwrap();
    }
    w.finish().unwrap();
}

fn read_records(path: &std::path::Path, format: Format) -> Vec<Vec<u8>> {
    let mut opts = CursorOptions::default();
    opts.format = format;
    let mut c = Cursor::open(path, &opts);
    let mut out = Vec::new();
    while let Some(r) = c.advance() {
        out.push(r.bytes.to_vec());
    }
    out
}

/// Deterministic pseudo-random record payloads without pulling in a
/// generator: a little multiplicative sequence.
fn pseudo_records(count: usize, max_len: usize) -> Vec<Vec<u8>> {
    let mut state: u64 = 0x9E3779B97F4A7C15;
    let mut step = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        state
    };
    (0..count)
        .map(|_| {
            let len = (step() as usize) % (max_len + 1);
            (0..len).map(|_| step() as u8).collect()
        })
        .collect()
}

#[test]
fn lz4_prefix_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.lz4");
    let records = pseudo_records(100, 10 * 1024);
    let opts = WriterOptions::default();
    write_records(&path, &opts, &records);
    assert_eq!(read_records(&path, Format::prefix()), records);
}

#[test]
fn lz4_block_sizes_and_checksums() {
    let dir = TempDir::new().unwrap();
    let records = pseudo_records(40, 64 * 1024);
    for (i, block_size) in [BlockSize::S64kb, BlockSize::S256kb, BlockSize::S1mb]
        .into_iter()
        .enumerate()
    {
        let path = dir.path().join(format!("out{i}.lz4"));
        let mut opts = WriterOptions::default();
        opts.set_lz4(1, block_size, true, true);
        write_records(&path, &opts, &records);
        assert_eq!(read_records(&path, Format::prefix()), records, "{block_size:?}");
    }
}

#[test]
fn gz_delimited_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.gz");
    let mut opts = WriterOptions::default();
    opts.format = Format::delimited(b'\n');
    let records: Vec<Vec<u8>> =
        (0..500).map(|i| format!("record number {i}").into_bytes()).collect();
    write_records(&path, &opts, &records);
    assert_eq!(read_records(&path, Format::delimited(b'\n')), records);
}

#[test]
fn lz4_fixed_records_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fixed.lz4");
    let mut opts = WriterOptions::default();
    opts.format = Format::fixed(8);
    let records: Vec<Vec<u8>> = (0..10_000u64).map(|i| i.to_le_bytes().to_vec()).collect();
    write_records(&path, &opts, &records);
    assert_eq!(read_records(&path, Format::fixed(8)), records);
}

#[test]
fn lz4_record_bigger_than_block() {
    // One record spanning several 64 KiB blocks.
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("big.lz4");
    let records = vec![vec![0xABu8; 500_000], b"tail".to_vec()];
    write_records(&path, &WriterOptions::default(), &records);
    assert_eq!(read_records(&path, Format::prefix()), records);
}

#[test]
fn explicit_compression_flags_without_extension() {
    let dir = TempDir::new().unwrap();
    let records = pseudo_records(20, 2048);

    let lz4_path = dir.path().join("blob-a");
    let mut wopts = WriterOptions::default();
    wopts.set_lz4(1, BlockSize::S64kb, false, false);
    write_records(&lz4_path, &wopts, &records);
    let mut ropts = CursorOptions::default();
    ropts.lz4 = true;
    let mut c = Cursor::open(&lz4_path, &ropts);
    let mut got = Vec::new();
    while let Some(r) = c.advance() {
        got.push(r.bytes.to_vec());
    }
    assert_eq!(got, records);

    let gz_path = dir.path().join("blob-b");
    let mut wopts = WriterOptions::default();
    wopts.set_gz(6);
    write_records(&gz_path, &wopts, &records);
    let mut ropts = CursorOptions::default();
    ropts.gz = true;
    let mut c = Cursor::open(&gz_path, &ropts);
    let mut got = Vec::new();
    while let Some(r) = c.advance() {
        got.push(r.bytes.to_vec());
    }
    assert_eq!(got, records);
}

#[test]
fn truncated_lz4_reads_to_the_cut() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cut.lz4");
    let records = pseudo_records(200, 4096);
    write_records(&path, &WriterOptions::default(), &records);
    let full = std::fs::read(&path).unwrap();
    // Drop the tail: the reader should yield some prefix of the records
    // and then stop, not error.
    std::fs::write(&path, &full[..full.len() / 2]).unwrap();
    let got = read_records(&path, Format::prefix());
    assert!(got.len() < records.len());
    assert_eq!(got[..], records[..got.len()]);
}
