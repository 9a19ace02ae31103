//! Converts an interactions CSV into timestamp-sorted prefix-framed
//! records.
//!
//! ```text
//! convert_interactions <in.csv> <out>
//! ```
//!
//! The header row is scanned case-insensitively for `ITEM_ID`, `USER_ID`,
//! `TIMESTAMP`, and optionally `EVENT_TYPE`. Each data row becomes one
//! record `u32 timestamp LE | user\0 | item\0 | event\0`, written through
//! an external sort keyed on the leading timestamp. Malformed rows are
//! reported and skipped.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Parser;

use recio::output::{ExtOptions, ExtWriter, RecordSink, WriterOptions};
use recio::record::{compare_u32, Record};
use recio::{Cursor, CursorOptions, Format, MB};

#[derive(Parser)]
#[command(about = "Convert an interactions CSV to timestamp-sorted framed records")]
struct Args {
    /// Input CSV with an ITEM_ID/USER_ID/TIMESTAMP header.
    input: PathBuf,
    /// Output file of prefix-framed records (extension picks compression).
    output: PathBuf,
}

#[derive(Default)]
struct Fields {
    user: Option<usize>,
    item: Option<usize>,
    timestamp: Option<usize>,
    event_type: Option<usize>,
    /// Columns a data row must have for the mapped fields to exist.
    max_field: usize,
}

fn discover_fields(header: &str) -> Fields {
    let mut f = Fields::default();
    for (i, name) in header.split(',').enumerate() {
        let slot = match name.trim().to_ascii_uppercase().as_str() {
            "ITEM_ID" => &mut f.item,
            "USER_ID" => &mut f.user,
            "TIMESTAMP" => &mut f.timestamp,
            "EVENT_TYPE" => &mut f.event_type,
            _ => continue,
        };
        *slot = Some(i);
        f.max_field = f.max_field.max(i + 1);
    }
    f
}

/// Strips a trailing carriage return from a CSV line.
fn trim_cr(bytes: &[u8]) -> &[u8] {
    match bytes.last() {
        Some(b'\r') => &bytes[..bytes.len() - 1],
        _ => bytes,
    }
}

fn open_sorted_output(path: &PathBuf) -> Result<ExtWriter> {
    let mut opts = WriterOptions::default();
    opts.format = Format::prefix();
    opts.buffer_size = 32 * MB;
    let mut ext = ExtOptions::default();
    ext.set_compare(Arc::new(|a: &Record<'_>, b: &Record<'_>| compare_u32(a, b)));
    ext.use_extra_thread = true;
    Ok(ExtWriter::create(path, &opts, &ext)?)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut in_opts = CursorOptions::default();
    in_opts.format = Format::delimited(b'\n');
    let mut input = Cursor::open(&args.input, &in_opts);

    let header = match input.advance() {
        Some(r) => String::from_utf8_lossy(trim_cr(r.bytes)).into_owned(),
        None => return Ok(()),
    };
    let fields = discover_fields(&header);
    let (Some(user_f), Some(item_f), Some(ts_f)) = (fields.user, fields.item, fields.timestamp)
    else {
        bail!("input must carry ITEM_ID, USER_ID, and TIMESTAMP columns");
    };

    let mut out = open_sorted_output(&args.output)?;
    let mut record = Vec::with_capacity(256);
    while let Some(r) = input.advance() {
        let line = String::from_utf8_lossy(trim_cr(r.bytes)).into_owned();
        let cols: Vec<&str> = line.split(',').collect();
        if cols.len() < fields.max_field {
            eprintln!("WARN (num_fields: {} < {}): {line}", cols.len(), fields.max_field);
            continue;
        }
        let Ok(timestamp) = cols[ts_f].trim().parse::<u32>() else {
            eprintln!("WARN (timestamp: {}): {line}", cols[ts_f]);
            continue;
        };
        let event = fields.event_type.map(|i| cols[i]).unwrap_or("");

        record.clear();
        record.extend_from_slice(&timestamp.to_le_bytes());
        record.extend_from_slice(cols[user_f].as_bytes());
        record.push(0);
        record.extend_from_slice(cols[item_f].as_bytes());
        record.push(0);
        record.extend_from_slice(event.as_bytes());
        record.push(0);
        out.write_record(&record)?;
    }
    out.finish()?;
    Ok(())
}
