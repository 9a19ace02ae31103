//! The output side: buffered framing writers, external sorting, and
//! partitioned output.
//!
//! [`Writer`] serializes records into one file (or stream) in the
//! configured [`Format`], with optional gzip / LZ4 compression chosen by
//! extension or option, safe-rename publication, and an ack sentinel for
//! downstream pickup. [`ExtWriter`] is the configured front door: depending
//! on the extended options it is a plain writer, an [`ExternalSorter`]
//! (records come back out sorted, however many there are), or a
//! [`Partitioner`] (records split across N files, each optionally sorted).

pub(crate) mod lz4fw;
mod partition;
mod sorter;

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{abort_with, Error, Result};
use crate::format::Format;
use crate::fsutil;
use crate::input::Cursor;
use crate::record::{CompareFn, PartitionFn, ReduceFn};
use crate::KB;

pub use lz4fw::{BlockSize, Lz4FrameWriter, Lz4WriterOptions};
pub use partition::{partition_filename, Partitioner};
pub use sorter::ExternalSorter;

/// Process-wide id source for temporary file names (sort runs, transforms).
/// Unique, not densely ordered; nothing may depend on the ordering.
static TMP_ID: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_tmp_id() -> u64 {
    TMP_ID.fetch_add(1, Ordering::Relaxed)
}

/// Anything records can be written into: writers, sorters, partitioners.
pub trait RecordSink {
    fn write_record(&mut self, bytes: &[u8]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for a single output file.
#[derive(Clone, Debug)]
pub struct WriterOptions {
    pub buffer_size: usize,
    /// Open the file for append. Not possible for LZ4 output (appending to
    /// a finished frame would corrupt it).
    pub append_mode: bool,
    /// Write to `<name>-safe` and rename to `<name>` on close, so readers
    /// never observe a half-written file.
    pub safe_mode: bool,
    /// Touch `<name>.ack` after a successful close.
    pub write_ack_file: bool,
    pub abort_on_error: bool,
    pub format: Format,
    /// Compress with gzip even without a `.gz` extension.
    pub gz: bool,
    pub gz_level: u32,
    /// Compress with LZ4 even without an `.lz4` extension.
    pub lz4: bool,
    pub lz4_opts: Lz4WriterOptions,
}

impl Default for WriterOptions {
    fn default() -> WriterOptions {
        WriterOptions {
            buffer_size: 128 * KB,
            append_mode: false,
            safe_mode: false,
            write_ack_file: false,
            abort_on_error: false,
            format: Format::Prefix,
            gz: false,
            gz_level: 6,
            lz4: false,
            lz4_opts: Lz4WriterOptions::default(),
        }
    }
}

impl WriterOptions {
    pub fn new() -> WriterOptions {
        WriterOptions::default()
    }

    /// gzip output at `level` (0–9).
    pub fn set_gz(&mut self, level: u32) {
        self.gz = true;
        self.lz4 = false;
        self.gz_level = level;
    }

    /// LZ4 output with the given frame parameters.
    pub fn set_lz4(
        &mut self,
        level: i32,
        block_size: BlockSize,
        block_checksum: bool,
        content_checksum: bool,
    ) {
        self.lz4 = true;
        self.gz = false;
        self.lz4_opts = Lz4WriterOptions { level, block_size, block_checksum, content_checksum };
    }
}

/// Extended options: sorted output, partitioned output, or both.
#[derive(Clone)]
pub struct ExtOptions {
    /// Sort-and-spill on a background thread with a double-buffered
    /// hand-off.
    pub use_extra_thread: bool,
    /// Compress temporary run files with LZ4 (the default).
    pub compress_tmp: bool,
    /// Sort the whole stream first, then route partitions (preserves order
    /// inside partitions at the cost of an extra write).
    pub sort_before_partitioning: bool,
    /// Make each partition an external sorter from the start, so sorting
    /// happens while partitions are being written rather than at close.
    pub sort_while_partitioning: bool,
    /// Partition sorts that may run at once; 0 picks a default from the
    /// core count.
    pub num_sort_threads: usize,
    /// Merge every N runs into one as they accumulate, bounding the final
    /// merge fan-in; 0 disables intermediate merges.
    pub num_per_group: usize,
    pub num_partitions: usize,
    pub(crate) partition: Option<PartitionFn>,
    pub(crate) compare: Option<CompareFn>,
    pub(crate) int_compare: Option<CompareFn>,
    pub(crate) reducer: Option<ReduceFn>,
    pub(crate) int_reducer: Option<ReduceFn>,
    pub(crate) fixed: FixedHooks,
}

/// Hooks for sorting packed fixed-size records without per-record
/// descriptors. The callbacks see raw bytes; the record size is the
/// `Format::Fixed` size.
#[derive(Clone, Default)]
pub struct FixedHooks {
    /// Sorts a packed array of records in place.
    pub(crate) sort: Option<std::sync::Arc<dyn Fn(&mut [u8]) + Send + Sync>>,
    /// Compares two packed records.
    pub(crate) compare:
        Option<std::sync::Arc<dyn Fn(&[u8], &[u8]) -> std::cmp::Ordering + Send + Sync>>,
    /// Collapses `n` adjacent equal packed records into the first slot;
    /// returning false drops the group.
    pub(crate) reducer: Option<std::sync::Arc<dyn Fn(&mut [u8], usize) -> bool + Send + Sync>>,
}

impl FixedHooks {
    pub(crate) fn any(&self) -> bool {
        self.sort.is_some() || self.compare.is_some()
    }
}

impl Default for ExtOptions {
    fn default() -> ExtOptions {
        ExtOptions {
            use_extra_thread: false,
            compress_tmp: true,
            sort_before_partitioning: false,
            sort_while_partitioning: false,
            num_sort_threads: 0,
            num_per_group: 0,
            num_partitions: 0,
            partition: None,
            compare: None,
            int_compare: None,
            reducer: None,
            int_reducer: None,
            fixed: FixedHooks::default(),
        }
    }
}

impl ExtOptions {
    pub fn new() -> ExtOptions {
        ExtOptions::default()
    }

    /// Route records through `partition` into `num_partitions` outputs.
    pub fn set_partition(&mut self, partition: PartitionFn, num_partitions: usize) {
        self.partition = Some(partition);
        self.num_partitions = num_partitions;
    }

    /// Sort the output under `compare`.
    pub fn set_compare(&mut self, compare: CompareFn) {
        self.compare = Some(compare);
    }

    /// Comparator for intermediate run merges, when it differs from the
    /// final one.
    pub fn set_intermediate_compare(&mut self, compare: CompareFn) {
        self.int_compare = Some(compare);
    }

    /// Collapse equal-key groups in the sorted output.
    pub fn set_reducer(&mut self, reduce: ReduceFn) {
        self.reducer = Some(reduce);
    }

    /// Reducer for run files and intermediate merges, when it differs from
    /// the final one.
    pub fn set_intermediate_reducer(&mut self, reduce: ReduceFn) {
        self.int_reducer = Some(reduce);
    }

    /// In-place sort over packed fixed-size records.
    pub fn set_fixed_sort(&mut self, sort: impl Fn(&mut [u8]) + Send + Sync + 'static) {
        self.fixed.sort = Some(std::sync::Arc::new(sort));
    }

    /// Comparator over packed fixed-size records.
    pub fn set_fixed_compare(
        &mut self,
        compare: impl Fn(&[u8], &[u8]) -> std::cmp::Ordering + Send + Sync + 'static,
    ) {
        self.fixed.compare = Some(std::sync::Arc::new(compare));
    }

    /// Reducer over packed fixed-size records.
    pub fn set_fixed_reducer(
        &mut self,
        reduce: impl Fn(&mut [u8], usize) -> bool + Send + Sync + 'static,
    ) {
        self.fixed.reducer = Some(std::sync::Arc::new(reduce));
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

enum Sink {
    Plain(BufWriter<Box<dyn Write + Send>>),
    Gz(GzEncoder<BufWriter<Box<dyn Write + Send>>>),
    Lz4(Lz4FrameWriter<BufWriter<Box<dyn Write + Send>>>),
}

impl Sink {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            Sink::Plain(w) => w.write_all(bytes),
            Sink::Gz(w) => w.write_all(bytes),
            Sink::Lz4(w) => w.write_all(bytes),
        }
    }

    fn finish(self) -> io::Result<()> {
        match self {
            Sink::Plain(mut w) => w.flush(),
            Sink::Gz(w) => w.finish()?.flush(),
            Sink::Lz4(mut w) => {
                w.finish()?;
                Ok(())
            }
        }
    }
}

/// Buffered, format-aware writer over one file or stream.
///
/// Call [`Writer::finish`] when done; safe-mode rename and the ack file
/// happen there. Dropping an unfinished writer finishes it best-effort,
/// swallowing errors.
pub struct Writer {
    sink: Option<Sink>,
    /// Published name; `None` for stream-backed writers.
    path: Option<PathBuf>,
    /// The name actually being written (differs from `path` in safe mode).
    write_path: Option<PathBuf>,
    format: Format,
    abort_on_error: bool,
    safe_mode: bool,
    write_ack_file: bool,
    finished: bool,
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("path", &self.path)
            .field("write_path", &self.write_path)
            .field("format", &self.format)
            .field("abort_on_error", &self.abort_on_error)
            .field("safe_mode", &self.safe_mode)
            .field("write_ack_file", &self.write_ack_file)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl Writer {
    /// Creates `path` for writing. Compression comes from the extension
    /// (`.gz`, `.lz4`) or the option flags; append mode plus LZ4 is a
    /// configuration error.
    pub fn create(path: impl AsRef<Path>, options: &WriterOptions) -> Result<Writer> {
        let path = path.as_ref();
        let lz4 = options.lz4 || fsutil::has_extension(path, "lz4");
        let gz = !lz4 && (options.gz || fsutil::has_extension(path, "gz"));
        if lz4 && options.append_mode {
            return Err(Error::Config("append mode cannot extend an LZ4 frame".into()));
        }

        let write_path = if options.safe_mode {
            let mut name = path.as_os_str().to_owned();
            name.push("-safe");
            PathBuf::from(name)
        } else {
            path.to_path_buf()
        };
        let file = Self::open_file(&write_path, options)?;
        let sink = Self::wrap(Box::new(file), gz, lz4, options);
        Ok(Writer {
            sink: Some(sink),
            path: Some(path.to_path_buf()),
            write_path: Some(write_path),
            format: options.format,
            abort_on_error: options.abort_on_error,
            safe_mode: options.safe_mode,
            write_ack_file: options.write_ack_file,
            finished: false,
        })
    }

    /// Writes into an already-open stream (an inherited file descriptor,
    /// stdout). Safe mode and ack files do not apply; compression comes
    /// from the option flags.
    pub fn from_writer(out: Box<dyn Write + Send>, options: &WriterOptions) -> Writer {
        let sink = Self::wrap(out, options.gz, options.lz4, options);
        Writer {
            sink: Some(sink),
            path: None,
            write_path: None,
            format: options.format,
            abort_on_error: options.abort_on_error,
            safe_mode: false,
            write_ack_file: false,
            finished: false,
        }
    }

    fn open_file(path: &Path, options: &WriterOptions) -> Result<File> {
        let mut open = OpenOptions::new();
        open.write(true).create(true);
        if options.append_mode {
            open.append(true);
        } else {
            open.truncate(true);
        }
        open.open(path).map_err(|e| {
            let err = Error::Io(e);
            if options.abort_on_error {
                abort_with(&err);
            }
            err
        })
    }

    fn wrap(out: Box<dyn Write + Send>, gz: bool, lz4: bool, options: &WriterOptions) -> Sink {
        let buffered = BufWriter::with_capacity(options.buffer_size.max(1), out);
        if lz4 {
            Sink::Lz4(Lz4FrameWriter::new(buffered, options.lz4_opts))
        } else if gz {
            Sink::Gz(GzEncoder::new(buffered, Compression::new(options.gz_level)))
        } else {
            Sink::Plain(buffered)
        }
    }

    fn sink_write(&mut self, bytes: &[u8]) -> Result<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Err(Error::Config("write after finish".into()));
        };
        sink.write_all(bytes).map_err(|e| {
            let err = Error::Io(e);
            if self.abort_on_error {
                abort_with(&err);
            }
            err
        })
    }

    /// Raw bytes, no framing. Only meaningful on single-file output.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.sink_write(bytes)
    }

    /// A length-prefixed record, regardless of the configured format.
    pub fn write_prefix(&mut self, bytes: &[u8]) -> Result<()> {
        self.sink_write(&(bytes.len() as u32).to_le_bytes())?;
        self.sink_write(bytes)
    }

    /// Bytes followed by an explicit delimiter.
    pub fn write_delimiter(&mut self, bytes: &[u8], delim: u8) -> Result<()> {
        self.sink_write(bytes)?;
        self.sink_write(&[delim])
    }

    /// Finishes the stream: flushes, finalizes compression, closes, then
    /// renames the `-safe` name into place and touches the ack file.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        if let Some(sink) = self.sink.take() {
            sink.finish().map_err(|e| {
                let err = Error::Io(e);
                if self.abort_on_error {
                    abort_with(&err);
                }
                err
            })?;
        }
        if let (true, Some(from), Some(to)) =
            (self.safe_mode, self.write_path.as_ref(), self.path.as_ref())
        {
            std::fs::rename(from, to).map_err(Error::Io)?;
        }
        if self.write_ack_file {
            if let Some(path) = self.path.as_ref() {
                let mut name = path.as_os_str().to_owned();
                name.push(".ack");
                File::create(PathBuf::from(name)).map_err(Error::Io)?;
            }
        }
        Ok(())
    }
}

impl RecordSink for Writer {
    /// Serializes one record in the configured format.
    fn write_record(&mut self, bytes: &[u8]) -> Result<()> {
        match self.format {
            Format::Prefix => self.write_prefix(bytes),
            Format::Delimited { delim, .. } => self.write_delimiter(bytes, delim),
            Format::Fixed(n) => {
                if bytes.len() != n as usize {
                    let err = Error::Config(format!(
                        "fixed-size record of {} bytes given to a Fixed({n}) writer",
                        bytes.len()
                    ));
                    if self.abort_on_error {
                        abort_with(&err);
                    }
                    return Err(err);
                }
                self.sink_write(bytes)
            }
        }
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

// ---------------------------------------------------------------------------
// ExtWriter
// ---------------------------------------------------------------------------

/// The configured output: plain, sorted, or partitioned, depending on the
/// extended options.
pub struct ExtWriter {
    inner: ExtKind,
}

enum ExtKind {
    Plain(Writer),
    Sorted(ExternalSorter),
    Parted(Partitioner),
}

impl ExtWriter {
    pub fn create(
        path: impl AsRef<Path>,
        options: &WriterOptions,
        ext: &ExtOptions,
    ) -> Result<ExtWriter> {
        let path = path.as_ref();
        let inner = if ext.partition.is_some() && ext.num_partitions > 0 {
            ExtKind::Parted(Partitioner::create(path, options, ext)?)
        } else if ext.compare.is_some() || ext.fixed.any() {
            ExtKind::Sorted(ExternalSorter::create(path, options, ext)?)
        } else {
            ExtKind::Plain(Writer::create(path, options)?)
        };
        Ok(ExtWriter { inner })
    }

    /// Completes the output: final sort merges, partition sorts, renames.
    pub fn finish(&mut self) -> Result<()> {
        match &mut self.inner {
            ExtKind::Plain(w) => w.finish(),
            ExtKind::Sorted(s) => s.finish(),
            ExtKind::Parted(p) => p.finish(),
        }
    }

    /// On sorted output, hands back the merged cursor instead of writing
    /// the final file — the way to chain sorts without an extra round-trip
    /// through disk.
    pub fn into_cursor(self) -> Result<Cursor> {
        match self.inner {
            ExtKind::Sorted(s) => s.into_cursor(),
            _ => Err(Error::Config("into_cursor requires sorted, unpartitioned output".into())),
        }
    }
}

impl RecordSink for ExtWriter {
    fn write_record(&mut self, bytes: &[u8]) -> Result<()> {
        match &mut self.inner {
            ExtKind::Plain(w) => w.write_record(bytes),
            ExtKind::Sorted(s) => s.write_record(bytes),
            ExtKind::Parted(p) => p.write_record(bytes),
        }
    }
}
