//! End-to-end cursor scenarios over real files: basic delimited reads,
//! records spanning buffer refills, limits, resets, and file-list
//! concatenation.

use std::fs;

use tempfile::TempDir;

use recio::fsutil::{self, FileInfo};
use recio::{Cursor, CursorOptions, Format};

fn delim_opts(buffer_size: usize) -> CursorOptions {
    let mut o = CursorOptions::default();
    o.format = Format::delimited(b'\n');
    o.buffer_size = buffer_size;
    o
}

fn drain(mut c: Cursor) -> Vec<String> {
    let mut out = Vec::new();
    while let Some(r) = c.advance() {
        out.push(String::from_utf8_lossy(r.bytes).into_owned());
    }
    out
}

#[test]
fn delimited_file_read() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lines.txt");
    fs::write(&path, "a\nbb\nccc\n").unwrap();

    let c = Cursor::open(&path, &delim_opts(32));
    assert_eq!(drain(c), vec!["a", "bb", "ccc"]);

    assert_eq!(Cursor::open(&path, &delim_opts(32)).count(), 3);

    let mut c = Cursor::open(&path, &delim_opts(32));
    c.limit(2);
    assert_eq!(c.count(), 2);
}

#[test]
fn record_spanning_buffer_is_reassembled() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("span.txt");
    fs::write(&path, "AAAAAAAAAA\nB\n").unwrap();

    // A 4-byte buffer forces the first record through the overflow path.
    let c = Cursor::open(&path, &delim_opts(4));
    assert_eq!(drain(c), vec!["AAAAAAAAAA", "B"]);

    // Huge record crossing many refills.
    let big = "x".repeat(700_000);
    fs::write(&path, format!("{big}\nshort\n")).unwrap();
    let got = drain(Cursor::open(&path, &delim_opts(64 * 1024)));
    assert_eq!(got.len(), 2);
    assert_eq!(got[0].len(), 700_000);
    assert_eq!(got[1], "short");
}

#[test]
fn reset_replays_across_formats() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("recs.bin");
    let mut data = Vec::new();
    for r in [&b"one"[..], b"two", b"three"] {
        data.extend_from_slice(&(r.len() as u32).to_le_bytes());
        data.extend_from_slice(r);
    }
    fs::write(&path, &data).unwrap();

    let mut opts = CursorOptions::default();
    opts.format = Format::prefix();
    let mut c = Cursor::open(&path, &opts);
    assert_eq!(c.advance().unwrap().bytes, b"one");
    c.reset();
    assert_eq!(c.advance().unwrap().bytes, b"one");
    assert_eq!(c.advance().unwrap().bytes, b"two");
    assert_eq!(c.advance().unwrap().bytes, b"three");
    assert!(c.advance().is_none());
}

#[test]
fn fixed_format_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fixed.bin");
    fs::write(&path, b"aabbccdd").unwrap();
    let mut opts = CursorOptions::default();
    opts.format = Format::fixed(2);
    let c = Cursor::open(&path, &opts);
    assert_eq!(drain(c), vec!["aa", "bb", "cc", "dd"]);
}

#[test]
fn file_list_concatenates_with_tags() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    let empty = dir.path().join("empty.txt");
    fs::write(&a, "1\n2\n").unwrap();
    fs::write(&b, "3\n").unwrap();
    fs::write(&empty, "").unwrap();

    let mut files = vec![
        FileInfo::stat(&a).unwrap(),
        FileInfo::stat(&empty).unwrap(),
        FileInfo::stat(&b).unwrap(),
    ];
    files[0].tag = 10;
    files[2].tag = 20;

    let mut c = Cursor::from_list(files, &delim_opts(1024));
    let mut got = Vec::new();
    while let Some(r) = c.advance() {
        got.push((String::from_utf8_lossy(r.bytes).into_owned(), r.tag));
    }
    assert_eq!(
        got,
        vec![
            ("1".to_string(), 10),
            ("2".to_string(), 10),
            ("3".to_string(), 20)
        ]
    );
}

#[test]
fn listing_feeds_list_cursor() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("x.log"), "x1\n").unwrap();
    fs::write(dir.path().join("y.log"), "y1\ny2\n").unwrap();
    fs::write(dir.path().join("skip.txt"), "nope\n").unwrap();

    let only_log = |p: &std::path::Path| fsutil::has_extension(p, "log");
    let mut files = fsutil::list(dir.path(), Some(&only_log)).unwrap();
    fsutil::sort_file_info_by_filename(&mut files);
    let c = Cursor::from_list(files, &delim_opts(1024));
    assert_eq!(drain(c), vec!["x1", "y1", "y2"]);
}

#[test]
fn missing_and_empty_files_are_empty_streams() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("not-there.txt");
    assert_eq!(Cursor::open(&missing, &delim_opts(1024)).count(), 0);

    let empty = dir.path().join("empty.txt");
    fs::write(&empty, "").unwrap();
    assert_eq!(Cursor::open(&empty, &delim_opts(1024)).count(), 0);
}
