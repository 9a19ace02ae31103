//! The input side: a uniform record iterator over files, buffers, record
//! arrays, file lists, producer callbacks, and k-way merges.
//!
//! A [`Cursor`] yields [`Record`]s one at a time. Whatever the source, the
//! surface is the same: `advance` to the next record, `current` to
//! re-borrow it, `reset` to replay it once, `limit` to cap the stream,
//! `count` to drain it. Compression is transparent — filenames ending in
//! `.gz` or `.lz4` (or the equivalent option flags) are unwrapped before
//! framing.
//!
//! Sorted inputs compose: [`Cursor::merge`] merges many sorted cursors into
//! one sorted stream, with optional reduction of equal keys, and
//! [`Cursor::transform`] pipes any cursor through a sorted temporary output
//! and hands back a cursor over the result.

pub(crate) mod base;
pub(crate) mod framed;
pub(crate) mod lz4f;
mod merge;

use std::any::Any;
use std::collections::VecDeque;
use std::io::Read;
use std::path::Path;

use crate::error::{abort_with, Error, Result};
use crate::format::Format;
use crate::fsutil::{self, FileInfo};
use crate::output::{ExtOptions, ExtWriter, RecordSink, WriterOptions};
use crate::record::{CompareFn, Group, OwnedRecord, Record, ReduceFn, Reduced};
use crate::KB;

use base::{BaseReader, Feed};
use framed::{FramePolicy, Framer};
use lz4f::Lz4FrameReader;
use merge::MergeCursor;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Everything configurable about an input stream. Plain fields; the couple
/// of setters exist where two fields move together.
#[derive(Clone)]
pub struct CursorOptions {
    /// Read-buffer size for uncompressed content (the decompressed side for
    /// compressed files). Records larger than this still work; they take
    /// the overflow path.
    pub buffer_size: usize,
    /// Buffer size for the compressed side of an LZ4 file; 0 means use
    /// `buffer_size`.
    pub compressed_buffer_size: usize,
    pub format: Format,
    /// Tag stamped on records from this stream (and the default used by
    /// merge `add`).
    pub tag: i32,
    pub abort_on_error: bool,
    pub abort_on_partial_record: bool,
    pub abort_on_file_not_found: bool,
    pub abort_on_file_empty: bool,
    /// When set (the default), a record cut short by end of stream is
    /// dropped; otherwise it is emitted as-is.
    pub full_record_required: bool,
    /// Treat the input as gzip even without a `.gz` extension.
    pub gz: bool,
    /// Treat the input as an LZ4 frame even without a `.lz4` extension.
    pub lz4: bool,
    pub(crate) reducer: Option<(CompareFn, ReduceFn)>,
}

impl Default for CursorOptions {
    fn default() -> CursorOptions {
        CursorOptions {
            buffer_size: 128 * KB,
            compressed_buffer_size: 0,
            format: Format::Prefix,
            tag: 0,
            abort_on_error: false,
            abort_on_partial_record: false,
            abort_on_file_not_found: false,
            abort_on_file_empty: false,
            full_record_required: true,
            gz: false,
            lz4: false,
            reducer: None,
        }
    }
}

impl CursorOptions {
    pub fn new() -> CursorOptions {
        CursorOptions::default()
    }

    /// Emit trailing partial records instead of dropping them.
    pub fn allow_partial_records(&mut self) {
        self.full_record_required = false;
        self.abort_on_partial_record = false;
    }

    /// Reduce runs of equal records (under `compare`) within this single
    /// stream; the stream is assumed sorted.
    pub fn set_reducer(&mut self, compare: CompareFn, reduce: ReduceFn) {
        self.reducer = Some((compare, reduce));
    }

    fn frame_policy(&self) -> FramePolicy {
        FramePolicy {
            full_record_required: self.full_record_required,
            abort_on_partial_record: self.abort_on_partial_record,
            abort_on_error: self.abort_on_error,
        }
    }

    /// Buffer size for the compressed side of an LZ4 stream.
    fn compressed_side_size(&self) -> usize {
        if self.compressed_buffer_size > 0 {
            self.compressed_buffer_size
        } else {
            self.buffer_size
        }
    }
}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// A uniform iterator over records. See the module docs for the surface.
pub struct Cursor {
    kind: Kind,
    /// Records still allowed through; `None` = unlimited.
    limit: Option<usize>,
    /// One pending replay of the current record.
    pending_reset: bool,
    /// Batch size of the last `advance_unique`.
    last_unique_n: usize,
    /// Scratch for `advance_group`.
    group: Group,
    /// Objects that must outlive this cursor (temporary files backing a
    /// transform, the writer that produced a merge's runs).
    keepalive: Vec<Box<dyn Any + Send>>,
}

enum Kind {
    Empty,
    Framed(FramedCursor),
    Records(RecordsCursor),
    List(ListCursor),
    Callback(CbCursor),
    Merge(MergeCursor),
}

impl Cursor {
    fn with_kind(kind: Kind) -> Cursor {
        Cursor {
            kind,
            limit: None,
            pending_reset: false,
            last_unique_n: 0,
            group: Group::default(),
            keepalive: Vec::new(),
        }
    }

    /// A cursor that yields nothing.
    pub fn empty() -> Cursor {
        Cursor::with_kind(Kind::Empty)
    }

    /// Opens `path`. Compression is chosen by extension (`.gz`, `.lz4`) or
    /// the option flags. A missing file is an empty stream unless
    /// `abort_on_file_not_found` is set; likewise open failures under
    /// `abort_on_error`.
    pub fn open(path: impl AsRef<Path>, options: &CursorOptions) -> Cursor {
        let path = path.as_ref();
        let is_lz4 = options.lz4 || fsutil::has_extension(path, "lz4");
        let gz = options.gz || fsutil::has_extension(path, "gz");
        let base_size = if is_lz4 { options.compressed_side_size() } else { options.buffer_size };
        let base = match BaseReader::open(path, gz, base_size) {
            Ok(b) => b,
            Err(e @ Error::FileNotFound(_)) => {
                if options.abort_on_file_not_found {
                    abort_with(&e);
                }
                return Cursor::empty();
            }
            Err(e) => {
                if options.abort_on_error {
                    abort_with(&e);
                }
                return Cursor::empty();
            }
        };
        Cursor::from_base(base, is_lz4, options, &path.display().to_string())
    }

    /// [`Cursor::open`] with the two most common options inline.
    pub fn open_quick(path: impl AsRef<Path>, format: Format, buffer_size: usize) -> Cursor {
        let mut opts = CursorOptions::default();
        opts.format = format;
        opts.buffer_size = buffer_size;
        Cursor::open(path, &opts)
    }

    /// Reads records from an already-open stream (e.g. a file descriptor
    /// handed over by the caller, or stdin). Compression comes from the
    /// option flags only.
    pub fn from_reader(reader: Box<dyn Read + Send>, options: &CursorOptions) -> Cursor {
        let base_size =
            if options.lz4 { options.compressed_side_size() } else { options.buffer_size };
        let base = BaseReader::from_reader(reader, options.gz, base_size);
        Cursor::from_base(base, options.lz4, options, "<stream>")
    }

    /// Reads records straight out of an in-memory buffer.
    pub fn from_buffer(data: Vec<u8>, options: &CursorOptions) -> Cursor {
        let base = if options.gz {
            BaseReader::from_reader(
                Box::new(std::io::Cursor::new(data)),
                true,
                options.buffer_size,
            )
        } else {
            BaseReader::from_buffer(data)
        };
        Cursor::from_base(base, options.lz4, options, "<buffer>")
    }

    fn from_base(base: BaseReader, is_lz4: bool, options: &CursorOptions, name: &str) -> Cursor {
        let feed: Box<dyn Feed> = if is_lz4 {
            match Lz4FrameReader::open(base, options.buffer_size, name) {
                Ok(r) => Box::new(r),
                Err(e @ Error::EmptyFile(_)) => {
                    if options.abort_on_file_empty {
                        abort_with(&e);
                    }
                    return Cursor::empty();
                }
                Err(e) => {
                    if options.abort_on_error {
                        abort_with(&e);
                    }
                    return Cursor::empty();
                }
            }
        } else {
            Box::new(base)
        };
        let framer = Framer::new(feed, options.format, options.frame_policy());
        Cursor::with_kind(Kind::Framed(FramedCursor::new(framer, options)))
    }

    /// Iterates an owned record array. A reducer in `options` collapses
    /// adjacent equal runs (the array is assumed sorted).
    pub fn from_records(records: Vec<OwnedRecord>, options: &CursorOptions) -> Cursor {
        Cursor::with_kind(Kind::Records(RecordsCursor {
            records,
            idx: 0,
            cur: RCur::None,
            red: options.reducer.clone().map(|(compare, reduce)| RecordsReduce {
                compare,
                reduce,
                scratch: Reduced::default(),
            }),
        }))
    }

    /// Concatenates the given files, opened lazily one at a time. Each
    /// file's cursor inherits `options` with the buffer shrunk to the file
    /// size and the tag taken from its [`FileInfo`]. Zero-length files are
    /// skipped outright.
    pub fn from_list(files: Vec<FileInfo>, options: &CursorOptions) -> Cursor {
        let files: VecDeque<FileInfo> = files.into_iter().filter(|f| f.size > 0).collect();
        Cursor::with_kind(Kind::List(ListCursor {
            files,
            options: options.clone(),
            cur: None,
        }))
    }

    /// Concatenates cursors pulled from `producer` until it returns `None`.
    pub fn from_fn(producer: impl FnMut() -> Option<Cursor> + Send + 'static) -> Cursor {
        let mut producer = Box::new(producer);
        let first = producer();
        match first {
            None => Cursor::empty(),
            Some(c) => Cursor::with_kind(Kind::Callback(CbCursor {
                producer,
                cur: Some(Box::new(c)),
            })),
        }
    }

    /// A k-way merge of sorted sub-cursors under `compare`; feed it with
    /// [`Cursor::add`].
    pub fn merge(compare: CompareFn, _options: &CursorOptions) -> Cursor {
        Cursor::with_kind(Kind::Merge(MergeCursor::new(compare)))
    }

    /// Adds a sub-cursor to a merge under `tag`. Anything but a merge
    /// ignores the call (and drops `sub`).
    pub fn add(&mut self, sub: Cursor, tag: i32) {
        if let Kind::Merge(m) = &mut self.kind {
            m.add(sub, tag);
        }
    }

    /// On a merge, collapse each equal batch to its first record.
    pub fn keep_first(&mut self) {
        if let Kind::Merge(m) = &mut self.kind {
            m.keep_first();
        }
    }

    /// On a merge, collapse equal batches through `reduce`.
    pub fn set_merge_reducer(&mut self, reduce: ReduceFn) {
        if let Kind::Merge(m) = &mut self.kind {
            m.set_reducer(reduce);
        }
    }

    // -- core iteration ----------------------------------------------------

    fn kind_step(&mut self) -> bool {
        match &mut self.kind {
            Kind::Empty => false,
            Kind::Framed(f) => f.step(),
            Kind::Records(r) => r.step(),
            Kind::List(l) => l.step(),
            Kind::Callback(c) => c.step(),
            Kind::Merge(m) => m.step(),
        }
    }

    fn kind_current(kind: &Kind) -> Option<Record<'_>> {
        match kind {
            Kind::Empty => None,
            Kind::Framed(f) => f.current(),
            Kind::Records(r) => r.current(),
            Kind::List(l) => l.current(),
            Kind::Callback(c) => c.current(),
            Kind::Merge(m) => m.current(),
        }
    }

    /// Advances and reports whether a record is available; pair with
    /// [`Cursor::current`]. [`Cursor::advance`] is the borrowed-record
    /// convenience over this.
    pub fn advance_ok(&mut self) -> bool {
        if self.pending_reset {
            self.pending_reset = false;
            return Self::kind_current(&self.kind).is_some();
        }
        if self.limit == Some(0) {
            self.kind = Kind::Empty;
            return false;
        }
        let ok = self.kind_step();
        if ok {
            if let Some(left) = self.limit.as_mut() {
                *left -= 1;
            }
        }
        ok
    }

    /// Next record, or `None` at end of stream.
    pub fn advance(&mut self) -> Option<Record<'_>> {
        if self.advance_ok() {
            Self::kind_current(&self.kind)
        } else {
            None
        }
    }

    /// The last record yielded, or `None` before the first advance, after
    /// the end, or while a reset is pending.
    pub fn current(&self) -> Option<Record<'_>> {
        if self.pending_reset {
            return None;
        }
        Self::kind_current(&self.kind)
    }

    /// Makes the next advance re-yield the current record. At most one
    /// reset is pending at a time; without a current record this is a
    /// no-op.
    pub fn reset(&mut self) {
        if !self.pending_reset && Self::kind_current(&self.kind).is_some() {
            self.pending_reset = true;
        }
    }

    /// Caps the stream at `n` further records.
    pub fn limit(&mut self, n: usize) {
        self.limit = Some(n);
    }

    /// Stamps records from this stream with `tag` (merge `add` uses this).
    pub fn set_tag(&mut self, tag: i32) {
        match &mut self.kind {
            Kind::Framed(f) => f.tag = tag,
            Kind::List(l) => l.options.tag = tag,
            // Record arrays keep their per-record tags; merges and
            // callbacks delegate tagging to their sub-cursors.
            _ => {}
        }
    }

    /// Drains the cursor and returns how many records it held.
    pub fn count(mut self) -> usize {
        let mut n = 0;
        while self.advance_ok() {
            n += 1;
        }
        n
    }

    /// The next batch of equal records across a merge's streams: the first
    /// record plus the batch size. On non-merge cursors the batch size is
    /// always 1.
    pub fn advance_unique(&mut self) -> Option<(Record<'_>, usize)> {
        if self.pending_reset {
            self.pending_reset = false;
            let n = self.last_unique_n.max(1);
            return Self::kind_current(&self.kind).map(|r| (r, n));
        }
        match &mut self.kind {
            Kind::Merge(m) => {
                let n = m.step_unique();
                self.last_unique_n = n;
                if n == 0 {
                    return None;
                }
            }
            _ => {
                if !self.advance_ok() {
                    self.last_unique_n = 0;
                    return None;
                }
                self.last_unique_n = 1;
            }
        }
        let n = self.last_unique_n;
        Self::kind_current(&self.kind).map(|r| (r, n))
    }

    /// Materializes the next run of records equal under `compare` (copied,
    /// because the underlying buffer is overwritten on each advance). The
    /// record that ended the run stays unconsumed via reset. The `bool` is
    /// true when more records follow the run.
    pub fn advance_group(
        &mut self,
        compare: impl Fn(&Record<'_>, &Record<'_>) -> std::cmp::Ordering,
    ) -> Option<(&Group, bool)> {
        self.group.clear();
        if !self.advance_ok() {
            return None;
        }
        if let Some(r) = Self::kind_current(&self.kind) {
            self.group.push(&r);
        } else {
            return None;
        }
        loop {
            if !self.advance_ok() {
                return Some((&self.group, false));
            }
            let Some(r) = Self::kind_current(&self.kind) else {
                return Some((&self.group, false));
            };
            let breaks = {
                let first = self.group.get(0);
                compare(&first, &r) != std::cmp::Ordering::Equal
            };
            if breaks {
                self.pending_reset = true;
                return Some((&self.group, true));
            }
            self.group.push(&r);
        }
    }

    /// Keeps `item` alive as long as this cursor (temporary files, the
    /// writer whose runs a merge is reading).
    pub fn attach(&mut self, item: Box<dyn Any + Send>) {
        self.keepalive.push(item);
    }

    // -- pumping into outputs ----------------------------------------------

    /// Writes every remaining record to `out`.
    pub fn pump(&mut self, out: &mut dyn RecordSink) -> Result<()> {
        while let Some(r) = self.advance() {
            out.write_record(r.bytes)?;
        }
        Ok(())
    }

    /// Writes every remaining record to both outputs.
    pub fn pump2(&mut self, out: &mut dyn RecordSink, out2: &mut dyn RecordSink) -> Result<()> {
        while let Some(r) = self.advance() {
            out.write_record(r.bytes)?;
            out2.write_record(r.bytes)?;
        }
        Ok(())
    }

    /// Calls `f` for every remaining record, with the output alongside.
    pub fn pump_custom(
        &mut self,
        out: &mut dyn RecordSink,
        mut f: impl FnMut(&mut dyn RecordSink, &Record<'_>) -> Result<()>,
    ) -> Result<()> {
        while self.advance_ok() {
            let Some(r) = Self::kind_current(&self.kind) else { break };
            f(out, &r)?;
        }
        Ok(())
    }

    /// Calls `f` once per run of records equal under `compare`.
    pub fn pump_group(
        &mut self,
        out: &mut dyn RecordSink,
        compare: impl Fn(&Record<'_>, &Record<'_>) -> std::cmp::Ordering + Copy,
        mut f: impl FnMut(&mut dyn RecordSink, &Group, bool) -> Result<()>,
    ) -> Result<()> {
        loop {
            if self.advance_group(compare).is_none() {
                return Ok(());
            }
            // A pending reset means the run was ended by an unequal record,
            // so more records follow.
            let more = self.pending_reset;
            f(out, &self.group, more)?;
        }
    }

    /// Pipes this cursor through a sorted temporary output and returns a
    /// cursor over the sorted (and optionally reduced) result. The
    /// temporary run files ride along with the returned cursor and are
    /// removed when it is dropped.
    pub fn transform(
        mut self,
        format: Format,
        buffer_size: usize,
        compare: CompareFn,
        reducer: Option<ReduceFn>,
        apply: impl FnOnce(&mut Cursor, &mut ExtWriter) -> Result<()>,
    ) -> Result<Cursor> {
        let mut opts = WriterOptions::default();
        opts.buffer_size = buffer_size;
        opts.format = format;
        let mut ext = ExtOptions::default();
        ext.set_compare(compare);
        if let Some(r) = reducer {
            ext.set_reducer(r);
        }
        let path = std::env::temp_dir().join(format!(
            "transform_{}.lz4",
            crate::output::next_tmp_id()
        ));
        let mut out = ExtWriter::create(&path, &opts, &ext)?;
        apply(&mut self, &mut out)?;
        drop(self);
        let mut merged = out.into_cursor()?;
        // The sorted output was never published; drop the placeholder path
        // along with the cursor.
        merged.attach(Box::new(fsutil::RemoveOnDrop::new(path)));
        Ok(merged)
    }
}

// ---------------------------------------------------------------------------
// Framed files / streams
// ---------------------------------------------------------------------------

enum FCur {
    None,
    Span(base::Span),
    Reduced,
}

struct FramedReduce {
    compare: CompareFn,
    reduce: ReduceFn,
    group: Group,
    scratch: Reduced,
    /// The record that ended the previous group, carried into the next one.
    pending: Option<OwnedRecord>,
}

struct FramedCursor {
    framer: Framer,
    tag: i32,
    cur: FCur,
    red: Option<FramedReduce>,
}

impl FramedCursor {
    fn new(framer: Framer, options: &CursorOptions) -> FramedCursor {
        FramedCursor {
            framer,
            tag: options.tag,
            cur: FCur::None,
            red: options.reducer.clone().map(|(compare, reduce)| FramedReduce {
                compare,
                reduce,
                group: Group::default(),
                scratch: Reduced::default(),
                pending: None,
            }),
        }
    }

    fn step(&mut self) -> bool {
        if self.red.is_some() {
            return self.step_reduced();
        }
        match self.framer.advance_span() {
            Some(s) => {
                self.cur = FCur::Span(s);
                true
            }
            None => {
                self.cur = FCur::None;
                false
            }
        }
    }

    /// Collects runs of equal records and feeds them to the reducer until
    /// it accepts one; the accepted output becomes the current record.
    fn step_reduced(&mut self) -> bool {
        let Some(mut red) = self.red.take() else { return false };
        let ok = loop {
            // Seed the group with the record that ended the last one, or a
            // fresh read.
            red.group.clear();
            match red.pending.take() {
                Some(owned) => red.group.push(&owned.as_record()),
                None => match self.framer.advance_span() {
                    Some(s) => {
                        let rec = Record::new(self.framer.span_bytes(s), self.tag);
                        red.group.push(&rec);
                    }
                    None => {
                        self.cur = FCur::None;
                        break false;
                    }
                },
            }
            // Extend the run while records stay equal to its head.
            while let Some(s) = self.framer.advance_span() {
                let rec = Record::new(self.framer.span_bytes(s), self.tag);
                let equal = {
                    let head = red.group.get(0);
                    (red.compare)(&head, &rec) == std::cmp::Ordering::Equal
                };
                if equal {
                    red.group.push(&rec);
                } else {
                    red.pending = Some(rec.to_owned());
                    break;
                }
            }
            let records = red.group.records();
            red.scratch.tag = records[0].tag;
            if (red.reduce)(&records, &mut red.scratch) {
                self.cur = FCur::Reduced;
                break true;
            }
        };
        self.red = Some(red);
        ok
    }

    fn current(&self) -> Option<Record<'_>> {
        match self.cur {
            FCur::None => None,
            FCur::Span(s) => Some(Record::new(self.framer.span_bytes(s), self.tag)),
            FCur::Reduced => self.red.as_ref().map(|r| r.scratch.as_record()),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory record arrays
// ---------------------------------------------------------------------------

enum RCur {
    None,
    Idx(usize),
    Reduced,
}

struct RecordsReduce {
    compare: CompareFn,
    reduce: ReduceFn,
    scratch: Reduced,
}

struct RecordsCursor {
    records: Vec<OwnedRecord>,
    idx: usize,
    cur: RCur,
    red: Option<RecordsReduce>,
}

impl RecordsCursor {
    fn step(&mut self) -> bool {
        if self.red.is_some() {
            return self.step_reduced();
        }
        if self.idx < self.records.len() {
            self.cur = RCur::Idx(self.idx);
            self.idx += 1;
            true
        } else {
            self.cur = RCur::None;
            false
        }
    }

    fn step_reduced(&mut self) -> bool {
        let Some(red) = self.red.as_mut() else { return false };
        while self.idx < self.records.len() {
            // The array is stable, so the run can be sliced in place.
            let start = self.idx;
            let head = self.records[start].as_record();
            let mut end = start + 1;
            while end < self.records.len()
                && (red.compare)(&head, &self.records[end].as_record())
                    == std::cmp::Ordering::Equal
            {
                end += 1;
            }
            self.idx = end;
            let views: Vec<Record<'_>> =
                self.records[start..end].iter().map(|r| r.as_record()).collect();
            red.scratch.tag = views[0].tag;
            if (red.reduce)(&views, &mut red.scratch) {
                self.cur = RCur::Reduced;
                return true;
            }
        }
        self.cur = RCur::None;
        false
    }

    fn current(&self) -> Option<Record<'_>> {
        match self.cur {
            RCur::None => None,
            RCur::Idx(i) => Some(self.records[i].as_record()),
            RCur::Reduced => self.red.as_ref().map(|r| r.scratch.as_record()),
        }
    }
}

// ---------------------------------------------------------------------------
// File-list and callback concatenation
// ---------------------------------------------------------------------------

struct ListCursor {
    files: VecDeque<FileInfo>,
    options: CursorOptions,
    cur: Option<Box<Cursor>>,
}

impl ListCursor {
    fn step(&mut self) -> bool {
        loop {
            if let Some(c) = self.cur.as_mut() {
                if c.advance_ok() {
                    return true;
                }
                self.cur = None;
            }
            let Some(fi) = self.files.pop_front() else {
                return false;
            };
            let mut opts = self.options.clone();
            if (fi.size as usize) < opts.buffer_size {
                opts.buffer_size = fi.size as usize;
            }
            opts.tag = fi.tag;
            self.cur = Some(Box::new(Cursor::open(&fi.filename, &opts)));
        }
    }

    fn current(&self) -> Option<Record<'_>> {
        self.cur.as_ref()?.current()
    }
}

struct CbCursor {
    producer: Box<dyn FnMut() -> Option<Cursor> + Send>,
    cur: Option<Box<Cursor>>,
}

impl CbCursor {
    fn step(&mut self) -> bool {
        loop {
            if let Some(c) = self.cur.as_mut() {
                if c.advance_ok() {
                    return true;
                }
                self.cur = None;
            }
            match (self.producer)() {
                Some(c) => self.cur = Some(Box::new(c)),
                None => return false,
            }
        }
    }

    fn current(&self) -> Option<Record<'_>> {
        self.cur.as_ref()?.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{compare_bytes, keep_first_fn};
    use std::sync::Arc;

    fn delim_opts() -> CursorOptions {
        let mut o = CursorOptions::default();
        o.format = Format::delimited(b'\n');
        o
    }

    fn lines(data: &str) -> Cursor {
        Cursor::from_buffer(data.as_bytes().to_vec(), &delim_opts())
    }

    fn drain(mut c: Cursor) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(r) = c.advance() {
            out.push(r.bytes.to_vec());
        }
        out
    }

    #[test]
    fn advance_and_current_agree() {
        let mut c = lines("a\nbb\n");
        assert!(c.current().is_none());
        let r = c.advance().unwrap();
        assert_eq!(r.bytes, b"a");
        assert_eq!(c.current().unwrap().bytes, b"a");
        assert_eq!(c.advance().unwrap().bytes, b"bb");
        assert!(c.advance().is_none());
        assert!(c.current().is_none());
    }

    #[test]
    fn reset_replays_once() {
        let mut c = lines("a\nbb\nccc\n");
        assert_eq!(c.advance().unwrap().bytes, b"a");
        c.reset();
        assert!(c.current().is_none());
        assert_eq!(c.advance().unwrap().bytes, b"a");
        assert_eq!(c.advance().unwrap().bytes, b"bb");
        // A second reset with no current-after-reset works the same way.
        c.reset();
        c.reset();
        assert_eq!(c.advance().unwrap().bytes, b"bb");
        assert_eq!(c.advance().unwrap().bytes, b"ccc");
    }

    #[test]
    fn limit_caps_count() {
        let c = lines("a\nb\nc\n");
        assert_eq!(c.count(), 3);
        let mut c = lines("a\nb\nc\n");
        c.limit(2);
        assert_eq!(c.count(), 2);
        let mut c = lines("a\nb\nc\n");
        c.limit(0);
        assert_eq!(c.count(), 0);
    }

    #[test]
    fn tags_stamp_records() {
        let mut opts = delim_opts();
        opts.tag = 7;
        let mut c = Cursor::from_buffer(b"x\n".to_vec(), &opts);
        assert_eq!(c.advance().unwrap().tag, 7);
    }

    #[test]
    fn records_cursor_yields_owned_tags() {
        let recs = vec![
            OwnedRecord::new(b"a".to_vec(), 1),
            OwnedRecord::new(b"b".to_vec(), 2),
        ];
        let mut c = Cursor::from_records(recs, &CursorOptions::default());
        let r = c.advance().unwrap();
        assert_eq!((r.bytes, r.tag), (&b"a"[..], 1));
        let r = c.advance().unwrap();
        assert_eq!((r.bytes, r.tag), (&b"b"[..], 2));
        assert!(c.advance().is_none());
    }

    #[test]
    fn records_cursor_reduces_adjacent_runs() {
        let mut opts = CursorOptions::default();
        opts.set_reducer(Arc::new(|a, b| compare_bytes(a, b)), keep_first_fn());
        let recs = vec![
            OwnedRecord::new(b"a".to_vec(), 1),
            OwnedRecord::new(b"a".to_vec(), 2),
            OwnedRecord::new(b"b".to_vec(), 3),
        ];
        let mut c = Cursor::from_records(recs, &opts);
        let r = c.advance().unwrap();
        assert_eq!((r.bytes, r.tag), (&b"a"[..], 1));
        let r = c.advance().unwrap();
        assert_eq!((r.bytes, r.tag), (&b"b"[..], 3));
        assert!(c.advance().is_none());
    }

    #[test]
    fn single_stream_reducer_collapses_runs() {
        let mut opts = delim_opts();
        opts.set_reducer(Arc::new(|a, b| compare_bytes(a, b)), keep_first_fn());
        let c = Cursor::from_buffer(b"a\na\na\nb\nc\nc\n".to_vec(), &opts);
        assert_eq!(drain(c), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn advance_group_materializes_runs() {
        let mut c = lines("a\na\nb\n");
        let (g, more) = c.advance_group(|a, b| compare_bytes(a, b)).unwrap();
        assert_eq!(g.len(), 2);
        assert_eq!(g.get(0).bytes, b"a");
        assert_eq!(g.get(1).bytes, b"a");
        assert!(more);
        let (g, more) = c.advance_group(|a, b| compare_bytes(a, b)).unwrap();
        assert_eq!(g.len(), 1);
        assert_eq!(g.get(0).bytes, b"b");
        assert!(!more);
        assert!(c.advance_group(|a, b| compare_bytes(a, b)).is_none());
    }

    #[test]
    fn callback_cursor_concatenates() {
        let mut chunks = vec!["c\n", "b\n", "a\n"];
        let c = Cursor::from_fn(move || chunks.pop().map(lines));
        assert_eq!(drain(c), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn callback_cursor_empty_producer() {
        let c = Cursor::from_fn(|| None);
        assert_eq!(c.count(), 0);
    }

    #[test]
    fn empty_cursor_is_empty() {
        let mut c = Cursor::empty();
        assert!(c.advance().is_none());
        assert!(c.current().is_none());
    }

    #[test]
    fn missing_file_is_empty_stream() {
        let c = Cursor::open("/no/such/file/anywhere.txt", &delim_opts());
        assert_eq!(c.count(), 0);
    }

    #[test]
    fn advance_unique_single_stream_is_batch_of_one() {
        let mut c = lines("a\nb\n");
        let (r, n) = c.advance_unique().unwrap();
        assert_eq!((r.bytes, n), (&b"a"[..], 1));
        let (r, n) = c.advance_unique().unwrap();
        assert_eq!((r.bytes, n), (&b"b"[..], 1));
        assert!(c.advance_unique().is_none());
    }
}
