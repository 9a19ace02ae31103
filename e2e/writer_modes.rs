//! Publication modes and stream plumbing: safe-rename, ack sentinels,
//! append, unframed writes, pumping between cursors and writers, and the
//! transform chain.

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;

use recio::output::{ExtOptions, ExtWriter, RecordSink, Writer, WriterOptions};
use recio::record::{compare_bytes, CompareFn, Record};
use recio::{Cursor, CursorOptions, Format, Result};

fn delim_opts() -> CursorOptions {
    let mut o = CursorOptions::default();
    o.format = Format::delimited(b'\n');
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
fn safe_mode_with_ack_publishes_atomically() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("final.txt");
    let mut opts = WriterOptions::default();
    opts.format = Format::delimited(b'\n');
    opts.safe_mode = true;
    opts.write_ack_file = true;

    let mut w = Writer::create(&path, &opts).unwrap();
    w.write_record(b"payload").unwrap();
    // Before finish: only the sidecar exists, no ack.
    assert!(dir.path().join("final.txt-safe").exists());
    assert!(!path.exists());
    assert!(!dir.path().join("final.txt.ack").exists());

    w.finish().unwrap();
    assert!(path.exists());
    assert!(!dir.path().join("final.txt-safe").exists());
    assert!(dir.path().join("final.txt.ack").exists());
}

#[test]
fn sorted_output_honors_safe_and_ack_modes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sorted.txt");
    let mut opts = WriterOptions::default();
    opts.format = Format::delimited(b'\n');
    opts.safe_mode = true;
    opts.write_ack_file = true;
    let mut ext = ExtOptions::default();
    let cmp: CompareFn = Arc::new(|a: &Record<'_>, b: &Record<'_>| compare_bytes(a, b));
    ext.set_compare(cmp);

    let mut out = ExtWriter::create(&path, &opts, &ext).unwrap();
    for r in ["cherry", "apple", "banana"] {
        out.write_record(r.as_bytes()).unwrap();
    }
    out.finish().unwrap();

    assert_eq!(drain(Cursor::open(&path, &delim_opts())), vec!["apple", "banana", "cherry"]);
    assert!(dir.path().join("sorted.txt.ack").exists());
}

#[test]
fn unframed_primitives_compose_with_framed_reads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mixed.bin");
    let mut opts = WriterOptions::default();
    opts.format = Format::prefix();
    let mut w = Writer::create(&path, &opts).unwrap();
    // Hand-build two prefix-framed records from the unframed primitives.
    w.write(&3u32.to_le_bytes()).unwrap();
    w.write(b"abc").unwrap();
    w.write_prefix(b"defg").unwrap();
    w.finish().unwrap();

    let mut ropts = CursorOptions::default();
    ropts.format = Format::prefix();
    let mut c = Cursor::open(&path, &ropts);
    assert_eq!(c.advance().unwrap().bytes, b"abc");
    assert_eq!(c.advance().unwrap().bytes, b"defg");
    assert!(c.advance().is_none());
}

#[test]
fn pump_copies_between_formats() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("src.txt");
    let dst = dir.path().join("dst.bin");
    fs::write(&src, "alpha\nbeta\ngamma\n").unwrap();

    let mut wopts = WriterOptions::default();
    wopts.format = Format::prefix();
    let mut w = Writer::create(&dst, &wopts).unwrap();
    Cursor::open(&src, &delim_opts()).pump(&mut w).unwrap();
    w.finish().unwrap();

    let mut ropts = CursorOptions::default();
    ropts.format = Format::prefix();
    let mut c = Cursor::open(&dst, &ropts);
    let mut got = Vec::new();
    while let Some(r) = c.advance() {
        got.push(String::from_utf8_lossy(r.bytes).into_owned());
    }
    assert_eq!(got, vec!["alpha", "beta", "gamma"]);
}

#[test]
fn pump_group_sees_runs_and_continuation_flag() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("src.txt");
    let dst = dir.path().join("dst.txt");
    fs::write(&src, "a\na\nb\nc\nc\nc\n").unwrap();

    let mut wopts = WriterOptions::default();
    wopts.format = Format::delimited(b'\n');
    let mut w = Writer::create(&dst, &wopts).unwrap();
    let mut groups: Vec<(String, usize, bool)> = Vec::new();
    Cursor::open(&src, &delim_opts())
        .pump_group(
            &mut w,
            |a, b| compare_bytes(a, b),
            |out, group, more| -> Result<()> {
                let head = group.get(0);
                groups.push((
                    String::from_utf8_lossy(head.bytes).into_owned(),
                    group.len(),
                    more,
                ));
                out.write_record(head.bytes)?;
                Ok(())
            },
        )
        .unwrap();
    w.finish().unwrap();

    assert_eq!(
        groups,
        vec![
            ("a".to_string(), 2, true),
            ("b".to_string(), 1, true),
            ("c".to_string(), 3, false)
        ]
    );
    assert_eq!(drain(Cursor::open(&dst, &delim_opts())), vec!["a", "b", "c"]);
}

#[test]
fn transform_chains_sort_without_final_file() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("src.txt");
    fs::write(&src, "pear\napple\nquince\napple\n").unwrap();

    let cmp: CompareFn = Arc::new(|a: &Record<'_>, b: &Record<'_>| compare_bytes(a, b));
    let sorted = Cursor::open(&src, &delim_opts())
        .transform(
            Format::delimited(b'\n'),
            64 * 1024,
            cmp,
            Some(recio::record::keep_first_fn()),
            |cur, out| cur.pump(out),
        )
        .unwrap();
    assert_eq!(drain(sorted), vec!["apple", "pear", "quince"]);
}

#[test]
fn stream_writer_goes_to_any_sink() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stream.txt");
    let file = fs::File::create(&path).unwrap();
    let mut opts = WriterOptions::default();
    opts.format = Format::delimited(b'\n');
    let mut w = Writer::from_writer(Box::new(file), &opts);
    w.write_record(b"via stream").unwrap();
    w.finish().unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "via stream\n");
}
