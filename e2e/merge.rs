//! End-to-end k-way merge scenarios over real files.

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;

use recio::record::{compare_bytes, CompareFn, Record, Reduced, ReduceFn};
use recio::{Cursor, CursorOptions, Format};

fn delim_opts() -> CursorOptions {
    let mut o = CursorOptions::default();
    o.format = Format::delimited(b'\n');
    o
}

fn byte_cmp() -> CompareFn {
    Arc::new(|a: &Record<'_>, b: &Record<'_>| compare_bytes(a, b))
}

#[test]
fn two_sorted_files_with_a_shared_key() {
    let dir = TempDir::new().unwrap();
    let left = dir.path().join("left.txt");
    let right = dir.path().join("right.txt");
    fs::write(&left, "a\nb\n").unwrap();
    fs::write(&right, "a\nc\n").unwrap();

    let mut m = Cursor::merge(byte_cmp(), &delim_opts());
    m.add(Cursor::open(&left, &delim_opts()), 0);
    m.add(Cursor::open(&right, &delim_opts()), 1);

    let (r, n) = m.advance_unique().unwrap();
    assert_eq!((r.bytes, n), (&b"a"[..], 2));

    let (r, n) = m.advance_unique().unwrap();
    assert_eq!(n, 1);
    let second = r.bytes.to_vec();
    assert!(second == b"b" || second == b"c");

    let (r, n) = m.advance_unique().unwrap();
    assert_eq!(n, 1);
    assert_ne!(r.bytes.to_vec(), second);

    assert!(m.advance_unique().is_none());
}

#[test]
fn merge_emits_multiset_union_in_order() {
    let dir = TempDir::new().unwrap();
    let mut expected = Vec::new();
    let mut m = Cursor::merge(byte_cmp(), &delim_opts());
    for (i, recs) in [vec!["b", "d", "f"], vec!["a", "d", "z"], vec!["c", "d"]]
        .iter()
        .enumerate()
    {
        let path = dir.path().join(format!("in{i}.txt"));
        fs::write(&path, recs.join("\n") + "\n").unwrap();
        expected.extend(recs.iter().map(|s| s.to_string()));
        m.add(Cursor::open(&path, &delim_opts()), i as i32);
    }
    expected.sort();

    let mut got = Vec::new();
    while let Some(r) = m.advance() {
        got.push(String::from_utf8_lossy(r.bytes).into_owned());
    }
    assert_eq!(got, expected);
}

#[test]
fn keep_first_dedupes_across_files() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    fs::write(&a, "dup\nonly-a\n").unwrap();
    fs::write(&b, "dup\nonly-b\n").unwrap();

    let mut m = Cursor::merge(byte_cmp(), &delim_opts());
    m.keep_first();
    m.add(Cursor::open(&a, &delim_opts()), 1);
    m.add(Cursor::open(&b, &delim_opts()), 2);

    let mut got = Vec::new();
    while let Some(r) = m.advance() {
        got.push((String::from_utf8_lossy(r.bytes).into_owned(), r.tag));
    }
    assert_eq!(
        got,
        vec![
            ("dup".to_string(), 1),
            ("only-a".to_string(), 1),
            ("only-b".to_string(), 2)
        ]
    );
}

#[test]
fn merge_reducer_concatenates_group_payloads() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    fs::write(&a, "k\nx\n").unwrap();
    fs::write(&b, "k\ny\n").unwrap();

    let join: ReduceFn = Arc::new(|group: &[Record<'_>], out: &mut Reduced| {
        out.data.clear();
        for r in group {
            out.data.extend_from_slice(r.bytes);
        }
        out.tag = group[0].tag;
        true
    });
    let mut m = Cursor::merge(byte_cmp(), &delim_opts());
    m.set_merge_reducer(join);
    m.add(Cursor::open(&a, &delim_opts()), 0);
    m.add(Cursor::open(&b, &delim_opts()), 1);

    let mut got = Vec::new();
    while let Some(r) = m.advance() {
        got.push(String::from_utf8_lossy(r.bytes).into_owned());
    }
    assert_eq!(got, vec!["kk", "x", "y"]);
}

#[test]
fn many_files_one_record_each() {
    let dir = TempDir::new().unwrap();
    let mut m = Cursor::merge(byte_cmp(), &delim_opts());
    for i in 0..50 {
        let path = dir.path().join(format!("f{i:02}.txt"));
        fs::write(&path, format!("{:03}\n", (i * 37) % 100)).unwrap();
        m.add(Cursor::open(&path, &delim_opts()), i);
    }
    let mut got = Vec::new();
    while let Some(r) = m.advance() {
        got.push(String::from_utf8_lossy(r.bytes).into_owned());
    }
    assert_eq!(got.len(), 50);
    assert!(got.windows(2).all(|w| w[0] <= w[1]));
}
