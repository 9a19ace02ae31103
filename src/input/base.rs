//! Buffered byte sources for the framing layer.
//!
//! [`BaseReader`] fronts a file, an arbitrary reader (an already-open file
//! descriptor, a socket, a test fixture), or an in-memory buffer, with gzip
//! streams unwrapped transparently. The LZ4 frame reader in
//! [`crate::input::lz4f`] presents the same surface over a
//! block-decompressed buffer; the shared behavior lives in the [`Feed`]
//! trait, whose provided methods implement the three read primitives used by
//! the framing layer:
//!
//! - [`Feed::read`] — exactly `n` contiguous bytes, or `None` at end of
//!   stream.
//! - [`Feed::read_partial`] — up to `n` bytes; short only at end of stream.
//! - [`Feed::read_delimited`] — bytes up to a delimiter byte, with optional
//!   CSV quote handling.
//!
//! The primitives return [`Span`]s — locations inside the feed rather than
//! slices — so the current record can be re-borrowed cheaply after the call
//! (`reset` support). A span is valid until the next primitive call on the
//! same feed.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// BlockBuffer
// ---------------------------------------------------------------------------

/// A refillable window over a byte stream. `data[pos..used]` holds bytes not
/// yet consumed; `eof` is set once the source is exhausted.
#[derive(Debug)]
pub(crate) struct BlockBuffer {
    pub data: Vec<u8>,
    pub pos: usize,
    pub used: usize,
    pub eof: bool,
}

impl BlockBuffer {
    pub fn new(size: usize) -> BlockBuffer {
        BlockBuffer { data: vec![0; size.max(1)], pos: 0, used: 0, eof: false }
    }

    /// Wraps an already-complete byte buffer; the window never refills.
    pub fn preloaded(data: Vec<u8>) -> BlockBuffer {
        let used = data.len();
        BlockBuffer { data, pos: 0, used, eof: true }
    }

    pub fn available(&self) -> usize {
        self.used - self.pos
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Moves the unconsumed tail to the front, making room to refill.
    pub fn slide(&mut self) {
        if self.pos > 0 {
            self.data.copy_within(self.pos..self.used, 0);
            self.used -= self.pos;
            self.pos = 0;
        }
    }

    /// Grows the window to at least `min_size`, preserving contents.
    pub fn grow(&mut self, min_size: usize) {
        if self.data.len() < min_size {
            self.data.resize(min_size, 0);
        }
    }
}

// ---------------------------------------------------------------------------
// Span
// ---------------------------------------------------------------------------

/// Where a record's bytes currently live inside a feed. Valid until the next
/// read primitive runs on that feed.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Span {
    /// `len` bytes starting at `start` in the feed's block buffer.
    Buf { start: usize, len: usize },
    /// The first `len` bytes of the feed's overflow buffer (a record that
    /// crossed a refill or exceeded the buffer).
    Overflow { len: usize },
}

impl Span {
    pub fn len(&self) -> usize {
        match *self {
            Span::Buf { len, .. } | Span::Overflow { len } => len,
        }
    }
}

/// Outcome of a delimited read.
#[derive(Clone, Copy, Debug)]
pub(crate) enum DelimRead {
    /// A full record; the delimiter byte was consumed and is not included.
    Found(Span),
    /// End of stream with bytes but no delimiter — a trailing partial.
    Tail(Span),
    /// End of stream, nothing left.
    End,
}

/// Delimiter scan state carried across buffer refills (a CSV quote region
/// may span a refill boundary).
#[derive(Default)]
struct ScanState {
    in_quotes: bool,
}

/// Scans `hay` for `delim`, honoring CSV quote regions when `csv` is set.
/// Returns the index of the delimiter relative to `hay`.
fn scan_for_delim(hay: &[u8], delim: u8, csv: bool, state: &mut ScanState) -> Option<usize> {
    let mut i = 0;
    while i < hay.len() {
        let c = hay[i];
        if state.in_quotes {
            if c == b'"' {
                if i + 1 < hay.len() && hay[i + 1] == b'"' {
                    // Escaped quote; stay inside the region.
                    i += 2;
                    continue;
                }
                state.in_quotes = false;
            }
            i += 1;
        } else if csv && c == b'"' {
            state.in_quotes = true;
            i += 1;
        } else if c == delim {
            return Some(i);
        } else {
            i += 1;
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

/// A refillable byte window plus an overflow buffer for records that do not
/// fit contiguously. Implemented by [`BaseReader`] (raw / gzip bytes) and by
/// the LZ4 frame reader (decompressed blocks).
pub(crate) trait Feed: Send {
    fn buf(&self) -> &BlockBuffer;
    fn buf_mut(&mut self) -> &mut BlockBuffer;

    /// Refills `buf` after `used`, reading until the window is full or the
    /// source is exhausted (which sets `eof`). The caller slides first.
    fn fill(&mut self) -> Result<()>;

    /// Whether an oversized `read` should grow the window in place. Raw
    /// sources grow; block-granular sources assemble into the overflow
    /// instead, since their window must stay block-aligned.
    fn grows_for_oversize(&self) -> bool {
        true
    }

    /// Whether another `fill` can add bytes to the window as it stands.
    /// Block-granular sources need room for a whole block.
    fn window_full(&self) -> bool {
        self.buf().used == self.buf().capacity()
    }

    fn overflow(&self) -> &Vec<u8>;
    fn overflow_mut(&mut self) -> &mut Vec<u8>;

    /// Both buffers at once, for copying out of the window into the
    /// overflow without an intermediate allocation.
    fn parts_mut(&mut self) -> (&mut BlockBuffer, &mut Vec<u8>);

    /// Resolves a span produced by one of the read primitives.
    fn span_bytes(&self, span: Span) -> &[u8] {
        match span {
            Span::Buf { start, len } => &self.buf().data[start..start + len],
            Span::Overflow { len } => &self.overflow()[..len],
        }
    }

    /// Returns exactly `n` contiguous bytes, or `None` if the stream ends
    /// first. Bytes short of `n` at end of stream are consumed and dropped.
    fn read(&mut self, n: usize) -> Result<Option<Span>> {
        let (span, actual) = self.read_upto(n)?;
        Ok(if actual == n { Some(span) } else { None })
    }

    /// Returns up to `n` bytes; the span is shorter than `n` only at end of
    /// stream. A zero-length span at end of stream means the stream is done.
    fn read_partial(&mut self, n: usize) -> Result<Span> {
        let (span, _) = self.read_upto(n)?;
        Ok(span)
    }

    /// Shared implementation for [`Feed::read`] / [`Feed::read_partial`]:
    /// consumes up to `n` bytes and reports how many were available.
    fn read_upto(&mut self, n: usize) -> Result<(Span, usize)> {
        self.overflow_mut().clear();
        loop {
            let b = self.buf();
            if b.available() >= n {
                let start = b.pos;
                self.buf_mut().pos += n;
                return Ok((Span::Buf { start, len: n }, n));
            }
            if b.eof {
                let start = b.pos;
                let len = b.available();
                self.buf_mut().pos += len;
                return Ok((Span::Buf { start, len }, len));
            }
            if n > b.capacity() {
                if self.grows_for_oversize() {
                    self.buf_mut().grow(n);
                } else {
                    return self.assemble_overflow(n);
                }
            }
            self.buf_mut().slide();
            if self.window_full() {
                // No contiguous room left even after the slide (the window
                // refills in whole blocks); assemble out of line.
                return self.assemble_overflow(n);
            }
            self.fill()?;
        }
    }

    /// Copies up to `n` bytes into the overflow buffer across refills, for
    /// records larger than a block-aligned window.
    fn assemble_overflow(&mut self, n: usize) -> Result<(Span, usize)> {
        self.overflow_mut().clear();
        self.overflow_mut().reserve(n);
        loop {
            let (b, ov) = self.parts_mut();
            let take = (n - ov.len()).min(b.available());
            ov.extend_from_slice(&b.data[b.pos..b.pos + take]);
            b.pos += take;
            let have = ov.len();
            if have == n {
                return Ok((Span::Overflow { len: n }, n));
            }
            if b.eof {
                return Ok((Span::Overflow { len: have }, have));
            }
            b.slide();
            self.fill()?;
        }
    }

    /// Returns the bytes up to (not including) `delim`, consuming the
    /// delimiter. In `csv` mode a double-quoted region hides the delimiter
    /// and `""` encodes a literal quote; an unterminated quote region runs
    /// to end of stream.
    fn read_delimited(&mut self, delim: u8, csv: bool) -> Result<DelimRead> {
        self.overflow_mut().clear();
        let mut state = ScanState::default();
        let mut spilled = false;
        // Index into the window where scanning resumes; everything before it
        // (and after pos) has already been scanned without finding delim.
        let mut scan_from = self.buf().pos;
        loop {
            let b = self.buf();
            let found = scan_for_delim(&b.data[scan_from..b.used], delim, csv, &mut state)
                .map(|rel| scan_from + rel);
            match found {
                Some(idx) => {
                    let (b, ov) = self.parts_mut();
                    let start = b.pos;
                    b.pos = idx + 1;
                    if spilled {
                        ov.extend_from_slice(&b.data[start..idx]);
                        return Ok(DelimRead::Found(Span::Overflow { len: ov.len() }));
                    }
                    return Ok(DelimRead::Found(Span::Buf { start, len: idx - start }));
                }
                None => {
                    let (eof, consumed) = (b.eof, b.pos);
                    let full = self.window_full();
                    if eof {
                        let (b, ov) = self.parts_mut();
                        let start = b.pos;
                        let len = b.available();
                        b.pos = start + len;
                        if spilled {
                            ov.extend_from_slice(&b.data[start..start + len]);
                            if ov.is_empty() {
                                return Ok(DelimRead::End);
                            }
                            return Ok(DelimRead::Tail(Span::Overflow { len: ov.len() }));
                        }
                        if len == 0 {
                            return Ok(DelimRead::End);
                        }
                        return Ok(DelimRead::Tail(Span::Buf { start, len }));
                    }
                    if consumed > 0 {
                        // Make refill room; the scanned region shifts left
                        // with the slide.
                        self.buf_mut().slide();
                        scan_from = self.buf().used;
                        self.fill()?;
                    } else if !full {
                        // Nothing consumed and the window has room (fresh
                        // stream): just top it up.
                        scan_from = self.buf().used;
                        self.fill()?;
                    } else {
                        // Window is full with no delimiter: spill it and keep
                        // scanning fresh bytes. Sized at 1.5× so the common
                        // one-refill overflow does not reallocate.
                        let (b, ov) = self.parts_mut();
                        if !spilled {
                            ov.reserve(b.used + b.used / 2);
                            spilled = true;
                        }
                        ov.extend_from_slice(&b.data[..b.used]);
                        b.pos = 0;
                        b.used = 0;
                        scan_from = 0;
                        self.fill()?;
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// BaseReader
// ---------------------------------------------------------------------------

enum Source {
    /// A live byte stream (file, reader over an open descriptor, gzip).
    Stream(Box<dyn Read + Send>),
    /// Everything is already in the window (in-memory buffers, or a stream
    /// that hit end of file).
    Drained,
}

/// Buffered reader over a file, stream, or in-memory buffer, with gzip
/// unwrapped when the filename ends in `.gz` (or the caller says so).
pub(crate) struct BaseReader {
    src: Source,
    buf: BlockBuffer,
    overflow: Vec<u8>,
}

impl std::fmt::Debug for BaseReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseReader").finish_non_exhaustive()
    }
}

impl BaseReader {
    /// Opens `path`, unwrapping gzip when the extension is `.gz` or `gz` is
    /// set. Missing files surface as [`Error::FileNotFound`].
    pub fn open(path: &Path, gz: bool, buffer_size: usize) -> Result<BaseReader> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::FileNotFound(path.display().to_string())
            } else {
                Error::Io(e)
            }
        })?;
        let gz = gz || crate::fsutil::has_extension(path, "gz");
        Ok(Self::from_reader(Box::new(file), gz, buffer_size))
    }

    /// Wraps an already-open reader (e.g. a file descriptor handed over by
    /// the caller).
    pub fn from_reader(
        reader: Box<dyn Read + Send>,
        gz: bool,
        buffer_size: usize,
    ) -> BaseReader {
        let src: Box<dyn Read + Send> = if gz {
            Box::new(MultiGzDecoder::new(reader))
        } else {
            reader
        };
        BaseReader {
            src: Source::Stream(src),
            buf: BlockBuffer::new(buffer_size),
            overflow: Vec::new(),
        }
    }

    /// Serves records straight out of `data` with no copying or refills.
    pub fn from_buffer(data: Vec<u8>) -> BaseReader {
        BaseReader {
            src: Source::Drained,
            buf: BlockBuffer::preloaded(data),
            overflow: Vec::new(),
        }
    }

    /// Grows the window, e.g. when a compressed block is known to need more
    /// room than the configured buffer size.
    pub fn reinit(&mut self, min_size: usize) {
        self.buf.grow(min_size);
    }
}

impl Feed for BaseReader {
    fn buf(&self) -> &BlockBuffer {
        &self.buf
    }

    fn buf_mut(&mut self) -> &mut BlockBuffer {
        &mut self.buf
    }

    fn fill(&mut self) -> Result<()> {
        loop {
            match self.src {
                Source::Drained => {
                    self.buf.eof = true;
                    return Ok(());
                }
                Source::Stream(ref mut r) => {
                    if self.buf.used == self.buf.data.len() {
                        return Ok(());
                    }
                    match r.read(&mut self.buf.data[self.buf.used..]) {
                        Ok(0) => {
                            self.buf.eof = true;
                            self.src = Source::Drained;
                            return Ok(());
                        }
                        Ok(n) => self.buf.used += n,
                        Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => return Err(Error::Io(e)),
                    }
                }
            }
        }
    }

    fn overflow(&self) -> &Vec<u8> {
        &self.overflow
    }

    fn overflow_mut(&mut self) -> &mut Vec<u8> {
        &mut self.overflow
    }

    fn parts_mut(&mut self) -> (&mut BlockBuffer, &mut Vec<u8>) {
        (&mut self.buf, &mut self.overflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_from(data: &[u8], window: usize) -> BaseReader {
        BaseReader::from_reader(Box::new(io::Cursor::new(data.to_vec())), false, window)
    }

    fn bytes_of(r: &BaseReader, span: Span) -> Vec<u8> {
        r.span_bytes(span).to_vec()
    }

    #[test]
    fn read_exact_and_eof() {
        let mut r = feed_from(b"abcdef", 4);
        let s = r.read(3).unwrap().unwrap();
        assert_eq!(bytes_of(&r, s), b"abc");
        let s = r.read(3).unwrap().unwrap();
        assert_eq!(bytes_of(&r, s), b"def");
        assert!(r.read(1).unwrap().is_none());
    }

    #[test]
    fn read_spanning_refill() {
        // 4-byte window; the 6-byte read must slide and refill.
        let mut r = feed_from(b"abcdefgh", 4);
        let s = r.read(2).unwrap().unwrap();
        assert_eq!(bytes_of(&r, s), b"ab");
        let s = r.read(6).unwrap().unwrap();
        assert_eq!(bytes_of(&r, s), b"cdefgh");
    }

    #[test]
    fn read_larger_than_window_grows() {
        let mut r = feed_from(b"0123456789", 4);
        let s = r.read(10).unwrap().unwrap();
        assert_eq!(bytes_of(&r, s), b"0123456789");
    }

    #[test]
    fn read_partial_returns_short_tail() {
        let mut r = feed_from(b"abc", 8);
        let s = r.read_partial(5).unwrap();
        assert_eq!(s.len(), 3);
        assert_eq!(bytes_of(&r, s), b"abc");
        let s = r.read_partial(5).unwrap();
        assert_eq!(s.len(), 0);
    }

    #[test]
    fn delimited_simple() {
        let mut r = feed_from(b"a\nbb\nccc\n", 16);
        for expect in [&b"a"[..], b"bb", b"ccc"] {
            match r.read_delimited(b'\n', false).unwrap() {
                DelimRead::Found(s) => assert_eq!(bytes_of(&r, s), expect),
                other => panic!("expected Found, got {other:?}"),
            }
        }
        assert!(matches!(r.read_delimited(b'\n', false).unwrap(), DelimRead::End));
    }

    #[test]
    fn delimited_record_crossing_refill() {
        // Window of 4 forces "AAAAAAAAAA" through the overflow path.
        let mut r = feed_from(b"AAAAAAAAAA\nB\n", 4);
        match r.read_delimited(b'\n', false).unwrap() {
            DelimRead::Found(s) => assert_eq!(bytes_of(&r, s), b"AAAAAAAAAA"),
            other => panic!("expected Found, got {other:?}"),
        }
        match r.read_delimited(b'\n', false).unwrap() {
            DelimRead::Found(s) => assert_eq!(bytes_of(&r, s), b"B"),
            other => panic!("expected Found, got {other:?}"),
        }
        assert!(matches!(r.read_delimited(b'\n', false).unwrap(), DelimRead::End));
    }

    #[test]
    fn delimited_tail_without_delimiter() {
        let mut r = feed_from(b"abc\ntail", 16);
        assert!(matches!(r.read_delimited(b'\n', false).unwrap(), DelimRead::Found(_)));
        match r.read_delimited(b'\n', false).unwrap() {
            DelimRead::Tail(s) => assert_eq!(bytes_of(&r, s), b"tail"),
            other => panic!("expected Tail, got {other:?}"),
        }
        assert!(matches!(r.read_delimited(b'\n', false).unwrap(), DelimRead::End));
    }

    #[test]
    fn delimited_empty_records() {
        let mut r = feed_from(b"\n\nx\n", 8);
        match r.read_delimited(b'\n', false).unwrap() {
            DelimRead::Found(s) => assert_eq!(s.len(), 0),
            other => panic!("{other:?}"),
        }
        match r.read_delimited(b'\n', false).unwrap() {
            DelimRead::Found(s) => assert_eq!(s.len(), 0),
            other => panic!("{other:?}"),
        }
        match r.read_delimited(b'\n', false).unwrap() {
            DelimRead::Found(s) => assert_eq!(bytes_of(&r, s), b"x"),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn csv_quotes_hide_delimiter() {
        let mut r = feed_from(b"\"a,b\",c", 32);
        match r.read_delimited(b',', true).unwrap() {
            DelimRead::Found(s) => assert_eq!(bytes_of(&r, s), b"\"a,b\""),
            other => panic!("{other:?}"),
        }
        match r.read_delimited(b',', true).unwrap() {
            DelimRead::Tail(s) => assert_eq!(bytes_of(&r, s), b"c"),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn csv_escaped_quote_stays_inside_region() {
        let mut r = feed_from(b"\"he said \"\"hi, there\"\"\",x\n", 64);
        match r.read_delimited(b',', true).unwrap() {
            DelimRead::Found(s) => {
                assert_eq!(bytes_of(&r, s), b"\"he said \"\"hi, there\"\"\"")
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn csv_quote_region_across_refill() {
        // Quoted comma sits past the first 4-byte window.
        let mut r = feed_from(b"\"abcdef,gh\",z\n", 4);
        match r.read_delimited(b',', true).unwrap() {
            DelimRead::Found(s) => assert_eq!(bytes_of(&r, s), b"\"abcdef,gh\""),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn in_memory_buffer_is_zero_copy_window() {
        let mut r = BaseReader::from_buffer(b"x\ny\n".to_vec());
        match r.read_delimited(b'\n', false).unwrap() {
            DelimRead::Found(s) => assert_eq!(r.span_bytes(s), b"x"),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn gz_stream_round_trip() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"one\ntwo\n").unwrap();
        let gz = enc.finish().unwrap();

        let mut r = BaseReader::from_reader(Box::new(io::Cursor::new(gz)), true, 16);
        match r.read_delimited(b'\n', false).unwrap() {
            DelimRead::Found(s) => assert_eq!(r.span_bytes(s), b"one"),
            other => panic!("{other:?}"),
        }
        match r.read_delimited(b'\n', false).unwrap() {
            DelimRead::Found(s) => assert_eq!(r.span_bytes(s), b"two"),
            other => panic!("{other:?}"),
        }
    }
}
