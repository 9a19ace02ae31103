//! LZ4 frame encoding for the output side.
//!
//! [`Lz4FrameWriter`] produces the same frame layout the input side decodes:
//! 7-byte header, blocks of `u32 LE length | payload` with the high length
//! bit marking a stored (uncompressed) block, a zero end mark, and optional
//! block / content checksums. Blocks are compressed independently so that
//! temporary run files can be merged and re-read without carrying a match
//! window across writers.

use std::io::{self, Write};

use xxhash_rust::xxh32::{xxh32, Xxh32};

use crate::input::lz4f::{header_checksum, LZ4F_MAGIC};

/// Block sizes a frame may declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockSize {
    S64kb,
    S256kb,
    S1mb,
    S4mb,
}

impl BlockSize {
    pub fn bytes(self) -> usize {
        match self {
            BlockSize::S64kb => 64 * 1024,
            BlockSize::S256kb => 256 * 1024,
            BlockSize::S1mb => 1024 * 1024,
            BlockSize::S4mb => 4 * 1024 * 1024,
        }
    }

    fn id(self) -> u8 {
        match self {
            BlockSize::S64kb => 4,
            BlockSize::S256kb => 5,
            BlockSize::S1mb => 6,
            BlockSize::S4mb => 7,
        }
    }
}

impl Default for BlockSize {
    fn default() -> BlockSize {
        BlockSize::S64kb
    }
}

/// Frame parameters. `level` is accepted for configuration compatibility;
/// the block codec has a single (fast) profile, so all levels currently
/// produce the same output.
#[derive(Clone, Copy, Debug)]
pub struct Lz4WriterOptions {
    pub level: i32,
    pub block_size: BlockSize,
    pub block_checksum: bool,
    pub content_checksum: bool,
}

impl Default for Lz4WriterOptions {
    fn default() -> Lz4WriterOptions {
        Lz4WriterOptions {
            level: 1,
            block_size: BlockSize::S64kb,
            block_checksum: false,
            content_checksum: false,
        }
    }
}

/// Streaming frame encoder over any writer. Call [`Lz4FrameWriter::finish`]
/// to emit the end mark; dropping without finishing leaves a truncated
/// frame, which readers treat as end of stream.
pub struct Lz4FrameWriter<W: Write> {
    out: W,
    opts: Lz4WriterOptions,
    /// Uncompressed staging for the current block.
    block: Vec<u8>,
    /// Compressed scratch, sized to the codec's worst case once.
    cbuf: Vec<u8>,
    hasher: Option<Xxh32>,
    wrote_header: bool,
    finished: bool,
}

impl<W: Write> Lz4FrameWriter<W> {
    pub fn new(out: W, opts: Lz4WriterOptions) -> Lz4FrameWriter<W> {
        let block_bytes = opts.block_size.bytes();
        Lz4FrameWriter {
            out,
            opts,
            block: Vec::with_capacity(block_bytes),
            cbuf: vec![0; lz4_flex::block::get_maximum_output_size(block_bytes)],
            hasher: opts.content_checksum.then(|| Xxh32::new(0)),
            wrote_header: false,
            finished: false,
        }
    }

    fn write_header(&mut self) -> io::Result<()> {
        let mut header = [0u8; 7];
        header[..4].copy_from_slice(&LZ4F_MAGIC.to_le_bytes());
        // Version 01, independent blocks, optional checksum flags.
        let mut flg = 0b0110_0000u8;
        if self.opts.block_checksum {
            flg |= 0b0001_0000;
        }
        if self.opts.content_checksum {
            flg |= 0b0000_0100;
        }
        header[4] = flg;
        header[5] = self.opts.block_size.id() << 4;
        header[6] = header_checksum(&header[4..6]);
        self.out.write_all(&header)?;
        self.wrote_header = true;
        Ok(())
    }

    /// Compresses and emits the staged block. Stored form wins whenever
    /// compression does not shrink the payload.
    fn flush_block(&mut self) -> io::Result<()> {
        if self.block.is_empty() {
            return Ok(());
        }
        if !self.wrote_header {
            self.write_header()?;
        }
        let compressed = lz4_flex::block::compress_into(&self.block, &mut self.cbuf)
            .map_err(io::Error::other)?;
        let (word, payload): (u32, &[u8]) = if compressed < self.block.len() {
            (compressed as u32, &self.cbuf[..compressed])
        } else {
            (self.block.len() as u32 | 0x8000_0000, &self.block)
        };
        self.out.write_all(&word.to_le_bytes())?;
        self.out.write_all(payload)?;
        if self.opts.block_checksum {
            self.out.write_all(&xxh32(payload, 0).to_le_bytes())?;
        }
        if let Some(h) = self.hasher.as_mut() {
            h.update(&self.block);
        }
        self.block.clear();
        Ok(())
    }

    /// Flushes the final partial block, writes the end mark and the content
    /// checksum, and flushes the underlying writer.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        self.flush_block()?;
        if !self.wrote_header {
            self.write_header()?;
        }
        self.out.write_all(&0u32.to_le_bytes())?;
        if let Some(h) = self.hasher.take() {
            self.out.write_all(&h.digest().to_le_bytes())?;
        }
        self.finished = true;
        self.out.flush()
    }
}

impl<W: Write> Write for Lz4FrameWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut rest = buf;
        while !rest.is_empty() {
            let room = self.opts.block_size.bytes() - self.block.len();
            let take = room.min(rest.len());
            self.block.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.block.len() == self.opts.block_size.bytes() {
                self.flush_block()?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // Record boundaries do not align with block boundaries; flushing
        // mid-frame would force short blocks, so only the staged sink is
        // flushed here. finish() emits everything.
        self.out.flush()
    }
}

impl<W: Write> Drop for Lz4FrameWriter<W> {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_has_header_and_end_mark() {
        let mut out = Vec::new();
        let mut w = Lz4FrameWriter::new(&mut out, Lz4WriterOptions::default());
        w.write_all(b"hello").unwrap();
        w.finish().unwrap();
        drop(w);
        assert_eq!(&out[..4], &LZ4F_MAGIC.to_le_bytes());
        assert_eq!(&out[out.len() - 4..], &0u32.to_le_bytes());
    }

    #[test]
    fn incompressible_block_is_stored() {
        // 4 random-ish distinct bytes cannot shrink; the length word must
        // carry the stored bit.
        let mut out = Vec::new();
        let mut w = Lz4FrameWriter::new(&mut out, Lz4WriterOptions::default());
        w.write_all(&[0x01, 0xAB, 0x47, 0xF3]).unwrap();
        w.finish().unwrap();
        drop(w);
        let word = u32::from_le_bytes([out[7], out[8], out[9], out[10]]);
        assert!(word & 0x8000_0000 != 0);
        assert_eq!(word & 0x7FFF_FFFF, 4);
    }

    #[test]
    fn empty_frame_still_valid() {
        let mut out = Vec::new();
        let mut w = Lz4FrameWriter::new(&mut out, Lz4WriterOptions::default());
        w.finish().unwrap();
        drop(w);
        // Header + end mark only.
        assert_eq!(out.len(), 7 + 4);
    }

    #[test]
    fn drop_finishes_frame() {
        let mut out = Vec::new();
        {
            let mut w = Lz4FrameWriter::new(&mut out, Lz4WriterOptions::default());
            w.write_all(b"abc").unwrap();
        }
        assert_eq!(&out[out.len() - 4..], &0u32.to_le_bytes());
    }
}
