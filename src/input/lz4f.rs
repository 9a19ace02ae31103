//! LZ4 frame decoding for the input side.
//!
//! [`Lz4FrameReader`] sits on top of a [`BaseReader`] carrying compressed
//! bytes and exposes the same [`Feed`] surface over a decompressed block
//! window. The frame layout is the interoperable one:
//!
//! ```text
//! magic(4, LE 0x184D2204) | FLG | BD | HC      7-byte header
//! { u32 LE block_len | payload [| u32 block checksum] }*
//! u32 LE 0                                      end mark
//! [ u32 LE content checksum ]
//! ```
//!
//! The high bit of `block_len` marks a block stored uncompressed. Block
//! checksums are consumed but not verified; the content checksum, when the
//! header declares one, is verified at the end mark. Decode failures
//! truncate the stream unless the cursor was configured to abort on error.

use xxhash_rust::xxh32::{xxh32, Xxh32};

use crate::error::{Error, Result};
use crate::input::base::{BaseReader, BlockBuffer, Feed};

/// Frame magic number.
pub(crate) const LZ4F_MAGIC: u32 = 0x184D2204;

/// Header length: magic + FLG + BD + HC.
pub(crate) const LZ4F_HEADER_SIZE: usize = 7;

/// Decoded FLG/BD fields.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FrameHeader {
    pub block_size: usize,
    pub independent: bool,
    pub block_checksum: bool,
    pub content_checksum: bool,
}

/// Block byte-size for a BD block-maximum id (4..=7).
pub(crate) fn block_size_for_id(id: u8) -> Option<usize> {
    match id {
        4 => Some(64 * 1024),
        5 => Some(256 * 1024),
        6 => Some(1024 * 1024),
        7 => Some(4 * 1024 * 1024),
        _ => None,
    }
}

/// One-byte header checksum: second byte of the xxh32 of the descriptor
/// bytes (everything between the magic and the HC byte itself).
pub(crate) fn header_checksum(descriptor: &[u8]) -> u8 {
    ((xxh32(descriptor, 0) >> 8) & 0xFF) as u8
}

/// Parses the 7-byte frame header.
pub(crate) fn parse_header(header: &[u8]) -> Result<FrameHeader> {
    let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if magic != LZ4F_MAGIC {
        return Err(Error::Codec(format!("bad frame magic {magic:#010x}")));
    }
    let flg = header[4];
    let bd = header[5];
    if (flg >> 6) != 0b01 {
        return Err(Error::Codec(format!("unsupported frame version {}", flg >> 6)));
    }
    if flg & 0b0000_1000 != 0 {
        return Err(Error::Codec("content-size field not supported".into()));
    }
    if flg & 0b0000_0001 != 0 {
        return Err(Error::Codec("dictionary id not supported".into()));
    }
    let block_size = block_size_for_id((bd >> 4) & 0x7)
        .ok_or_else(|| Error::Codec(format!("bad block-maximum id in BD byte {bd:#04x}")))?;
    let expect = header_checksum(&header[4..6]);
    if header[6] != expect {
        return Err(Error::Codec(format!(
            "header checksum mismatch (got {:#04x}, want {expect:#04x})",
            header[6]
        )));
    }
    Ok(FrameHeader {
        block_size,
        independent: flg & 0b0010_0000 != 0,
        block_checksum: flg & 0b0001_0000 != 0,
        content_checksum: flg & 0b0000_0100 != 0,
    })
}

/// Longest back-reference distance a block may use into earlier output when
/// blocks are linked.
const LINKED_WINDOW: usize = 64 * 1024;

/// Decompressed-side view over an LZ4 frame.
pub(crate) struct Lz4FrameReader {
    base: BaseReader,
    buf: BlockBuffer,
    overflow: Vec<u8>,
    header: FrameHeader,
    hasher: Option<Xxh32>,
    /// End mark (or truncation) reached; no further blocks will be read.
    done: bool,
}

impl std::fmt::Debug for Lz4FrameReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lz4FrameReader")
            .field("header", &self.header)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl Lz4FrameReader {
    /// Consumes and validates the frame header from `base`, then sizes both
    /// buffers: the compressed side must hold one block plus its length and
    /// checksum words, the decompressed side at least two blocks (so a
    /// record can straddle a block boundary without spilling).
    ///
    /// Returns [`Error::EmptyFile`] when `base` has no bytes at all and
    /// [`Error::Codec`] when the header is short or malformed.
    pub fn open(mut base: BaseReader, buffer_size: usize, name: &str) -> Result<Lz4FrameReader> {
        let span = match base.read(LZ4F_HEADER_SIZE)? {
            Some(s) => s,
            None => {
                if base.buf().used == 0 {
                    return Err(Error::EmptyFile(name.to_string()));
                }
                return Err(Error::Codec(format!("{name}: truncated frame header")));
            }
        };
        let mut header_bytes = [0u8; LZ4F_HEADER_SIZE];
        header_bytes.copy_from_slice(base.span_bytes(span));
        let header = parse_header(&header_bytes)?;

        let compressed_need = header.block_size + 4 + if header.block_checksum { 4 } else { 0 };
        base.reinit(compressed_need);

        let decompressed = buffer_size.max(2 * header.block_size + 100);
        Ok(Lz4FrameReader {
            base,
            buf: BlockBuffer::new(decompressed),
            overflow: Vec::new(),
            hasher: header.content_checksum.then(|| Xxh32::new(0)),
            header,
            done: false,
        })
    }

    /// Appends one block's worth of decompressed bytes after `buf.used`.
    /// Returns the number of bytes produced; 0 means the frame ended (end
    /// mark, or truncated input, which the format cannot distinguish from a
    /// short final read and is treated as end of stream).
    fn read_block(&mut self) -> Result<usize> {
        let span = match self.base.read(4)? {
            Some(s) => s,
            None => return Ok(0),
        };
        let word = {
            let b = self.base.span_bytes(span);
            u32::from_le_bytes([b[0], b[1], b[2], b[3]])
        };
        let stored = word & 0x8000_0000 != 0;
        let len = (word & 0x7FFF_FFFF) as usize;
        if len == 0 {
            self.verify_content_checksum()?;
            return Ok(0);
        }
        if len > self.header.block_size {
            return Err(Error::Codec(format!(
                "block length {len} exceeds block size {}",
                self.header.block_size
            )));
        }
        let total = len + if self.header.block_checksum { 4 } else { 0 };
        let span = match self.base.read(total)? {
            Some(s) => s,
            None => return Ok(0),
        };

        // Decode into the free tail of the window. For linked blocks the
        // already-produced bytes immediately before the tail are the match
        // window.
        let used = self.buf.used;
        let (head, tail) = self.buf.data.split_at_mut(used);
        let dest = &mut tail[..self.header.block_size];
        let payload = &self.base.span_bytes(span)[..len];
        let produced = if stored {
            dest[..len].copy_from_slice(payload);
            len
        } else if self.header.independent {
            lz4_flex::block::decompress_into(payload, dest)
                .map_err(|e| Error::Codec(e.to_string()))?
        } else {
            let dict_start = used.saturating_sub(LINKED_WINDOW);
            lz4_flex::block::decompress_into_with_dict(payload, dest, &head[dict_start..])
                .map_err(|e| Error::Codec(e.to_string()))?
        };
        if let Some(h) = self.hasher.as_mut() {
            h.update(&tail[..produced]);
        }
        self.buf.used += produced;
        Ok(produced)
    }

    fn verify_content_checksum(&mut self) -> Result<()> {
        let Some(hasher) = self.hasher.take() else { return Ok(()) };
        let span = self
            .base
            .read(4)?
            .ok_or_else(|| Error::Codec("missing content checksum".into()))?;
        let b = self.base.span_bytes(span);
        let stored = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
        let computed = hasher.digest();
        if stored != computed {
            return Err(Error::Codec(format!(
                "content checksum mismatch (got {stored:#010x}, want {computed:#010x})"
            )));
        }
        Ok(())
    }
}

impl Feed for Lz4FrameReader {
    fn buf(&self) -> &BlockBuffer {
        &self.buf
    }

    fn buf_mut(&mut self) -> &mut BlockBuffer {
        &mut self.buf
    }

    fn fill(&mut self) -> Result<()> {
        while !self.done && self.buf.used + self.header.block_size <= self.buf.data.len() {
            if self.read_block()? == 0 {
                self.done = true;
            }
        }
        if self.done {
            self.buf.eof = true;
        }
        Ok(())
    }

    fn grows_for_oversize(&self) -> bool {
        // The window is refilled a whole block at a time; records larger
        // than it are assembled in the overflow instead of growing it.
        false
    }

    fn window_full(&self) -> bool {
        self.buf.used + self.header.block_size > self.buf.data.len()
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
    use crate::input::base::DelimRead;
    use crate::output::lz4fw::{Lz4FrameWriter, Lz4WriterOptions};
    use std::io::Write;

    fn compress(data: &[u8], opts: Lz4WriterOptions) -> Vec<u8> {
        let mut out = Vec::new();
        let mut w = Lz4FrameWriter::new(&mut out, opts);
        w.write_all(data).unwrap();
        w.finish().unwrap();
        drop(w);
        out
    }

    fn reader_over(frame: Vec<u8>, buffer_size: usize) -> Lz4FrameReader {
        let base = BaseReader::from_buffer(frame);
        Lz4FrameReader::open(base, buffer_size, "test.lz4").unwrap()
    }

    #[test]
    fn header_round_trip() {
        let frame = compress(b"hello", Lz4WriterOptions::default());
        let h = parse_header(&frame[..LZ4F_HEADER_SIZE]).unwrap();
        assert_eq!(h.block_size, 64 * 1024);
        assert!(h.independent);
        assert!(!h.block_checksum);
    }

    #[test]
    fn bad_magic_is_codec_error() {
        let mut frame = compress(b"hello", Lz4WriterOptions::default());
        frame[0] ^= 0xFF;
        let base = BaseReader::from_buffer(frame);
        let err = Lz4FrameReader::open(base, 1024, "x.lz4").unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
    }

    #[test]
    fn bad_header_checksum_is_codec_error() {
        let mut frame = compress(b"hello", Lz4WriterOptions::default());
        frame[6] ^= 0xFF;
        let base = BaseReader::from_buffer(frame);
        let err = Lz4FrameReader::open(base, 1024, "x.lz4").unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
    }

    #[test]
    fn empty_input_is_empty_file() {
        let base = BaseReader::from_buffer(Vec::new());
        let err = Lz4FrameReader::open(base, 1024, "x.lz4").unwrap_err();
        assert!(matches!(err, Error::EmptyFile(_)));
    }

    #[test]
    fn delimited_records_survive_compression() {
        let frame = compress(b"a\nbb\nccc\n", Lz4WriterOptions::default());
        let mut r = reader_over(frame, 1024);
        for expect in [&b"a"[..], b"bb", b"ccc"] {
            match r.read_delimited(b'\n', false).unwrap() {
                DelimRead::Found(s) => assert_eq!(r.span_bytes(s).to_vec(), expect),
                other => panic!("{other:?}"),
            }
        }
        assert!(matches!(r.read_delimited(b'\n', false).unwrap(), DelimRead::End));
    }

    #[test]
    fn content_checksum_verified() {
        let opts = Lz4WriterOptions { content_checksum: true, ..Default::default() };
        let payload: Vec<u8> = (0..10_000u32).flat_map(|i| i.to_le_bytes()).collect();
        let frame = compress(&payload, opts);
        let mut r = reader_over(frame, 1024);
        let span = r.read_partial(payload.len()).unwrap();
        assert_eq!(r.span_bytes(span), &payload[..]);
        // Drains the end mark and checks the digest.
        assert!(r.read(1).unwrap().is_none());
    }

    #[test]
    fn corrupt_content_checksum_reported() {
        let opts = Lz4WriterOptions { content_checksum: true, ..Default::default() };
        let mut frame = compress(b"payload bytes", opts);
        let n = frame.len();
        frame[n - 1] ^= 0xFF;
        let base = BaseReader::from_buffer(frame);
        let mut r = Lz4FrameReader::open(base, 1024, "x.lz4").unwrap();
        let err = r.read_partial(64).unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
    }

    #[test]
    fn block_checksums_are_skipped() {
        let opts = Lz4WriterOptions { block_checksum: true, ..Default::default() };
        let frame = compress(b"one\ntwo\n", opts);
        let mut r = reader_over(frame, 1024);
        match r.read_delimited(b'\n', false).unwrap() {
            DelimRead::Found(s) => assert_eq!(r.span_bytes(s), b"one"),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn record_larger_than_window_uses_overflow() {
        // Window is forced tiny relative to the record: the reader must
        // assemble across blocks without growing the block window.
        let big = vec![b'x'; 300_000];
        let mut data = big.clone();
        data.push(b'\n');
        let opts = Lz4WriterOptions::default(); // 64 KiB blocks
        let frame = compress(&data, opts);
        let mut r = reader_over(frame, 1024);
        match r.read_delimited(b'\n', false).unwrap() {
            DelimRead::Found(s) => {
                assert_eq!(s.len(), big.len());
                assert_eq!(r.span_bytes(s), &big[..]);
            }
            other => panic!("{other:?}"),
        }
    }
}
