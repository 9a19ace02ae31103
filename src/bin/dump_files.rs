//! Dumps newline-delimited records from every matching file, either
//! straight through or as a deduplicated k-way merge.
//!
//! ```text
//! dump_files <extensions> <path> [path2] ...        # concatenate
//! dump_files --merge <extensions> <path> [path2]... # sorted keep-first merge
//! ```
//!
//! In merge mode each input file becomes one stream tagged by its
//! discovery order; equal records across streams are collapsed to the
//! first (lowest tag), and every line is printed as `<tag>: <record>`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use recio::record::{compare_bytes, Record};
use recio::{fsutil, Cursor, CursorOptions, Format};

#[derive(Parser)]
#[command(about = "Dump newline-delimited records from matching files")]
struct Args {
    /// Merge all inputs in sorted order, keeping the first of each
    /// duplicate, instead of concatenating.
    #[arg(long)]
    merge: bool,
    /// Comma-delimited list of valid extensions (e.g. "txt,gz,lz4").
    extensions: String,
    /// Files or directories to scan.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let extensions: Vec<String> = args.extensions.split(',').map(str::to_owned).collect();
    let valid = |p: &Path| extensions.iter().any(|e| fsutil::has_extension(p, e));

    let mut opts = CursorOptions::default();
    opts.format = Format::delimited(b'\n');

    if args.merge {
        // Tags break ties, so the comparator folds them in after the bytes.
        let cmp = Arc::new(|a: &Record<'_>, b: &Record<'_>| {
            compare_bytes(a, b).then(a.tag.cmp(&b.tag))
        });
        let mut merged = Cursor::merge(cmp, &opts);
        merged.keep_first();
        let mut tag = 0;
        for path in &args.paths {
            for fi in fsutil::list(path, Some(&valid))? {
                merged.add(Cursor::open(&fi.filename, &opts), tag);
                tag += 1;
            }
        }
        while let Some(r) = merged.advance() {
            println!("{}: {}", r.tag, String::from_utf8_lossy(r.bytes));
        }
    } else {
        for path in &args.paths {
            for fi in fsutil::list(path, Some(&valid))? {
                let mut cur = Cursor::open(&fi.filename, &opts);
                while let Some(r) = cur.advance() {
                    println!("{}", String::from_utf8_lossy(r.bytes));
                }
            }
        }
    }
    Ok(())
}
