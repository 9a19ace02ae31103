//! External sort: buffer records in memory, spill sorted runs to
//! LZ4-compressed temporaries, and merge the runs back into one sorted
//! stream at the end.
//!
//! Every run file is itself sorted under the output comparator, so the
//! final step is a k-way merge ([`Cursor::merge`]) over cursors opened on
//! the runs. With `num_per_group` set, runs are folded together as they
//! accumulate so the final merge fan-in stays bounded. A reducer collapses
//! equal keys; the intermediate variants apply to run files and
//! intermediate merges so that every run stays internally distinct.
//!
//! With `use_extra_thread`, sorting and spilling happen on a background
//! thread: the writer fills one buffer while the worker sorts the other,
//! exchanged whole through a bounded channel so each buffer is owned by
//! exactly one thread at a time.

use std::cmp::Ordering;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::error::{Error, Result};
use crate::format::Format;
use crate::fsutil::RemoveOnDrop;
use crate::input::{Cursor, CursorOptions};
use crate::output::{next_tmp_id, ExtOptions, RecordSink, Writer, WriterOptions};
use crate::record::{CompareFn, Record, ReduceFn, Reduced};
use crate::{KB, MB};

/// Flat record storage: payloads back-to-back plus `(offset, len)` entries.
/// The fixed-record fast path uses `data` alone, packed.
#[derive(Default)]
struct RecordBuffer {
    data: Vec<u8>,
    index: Vec<(usize, usize)>,
}

impl RecordBuffer {
    fn clear(&mut self) {
        self.data.clear();
        self.index.clear();
    }

    fn is_empty(&self) -> bool {
        // Zero-length records occupy index entries but no payload bytes.
        self.data.is_empty() && self.index.is_empty()
    }
}

/// Fixed-record hooks resolved against the record size.
#[derive(Clone)]
struct FixedPath {
    size: usize,
    sort: Option<Arc<dyn Fn(&mut [u8]) + Send + Sync>>,
    compare: Option<Arc<dyn Fn(&[u8], &[u8]) -> Ordering + Send + Sync>>,
    reducer: Option<Arc<dyn Fn(&mut [u8], usize) -> bool + Send + Sync>>,
}

/// Everything a spill needs; shared with the background worker.
struct SpillCtx {
    final_path: PathBuf,
    run_options: WriterOptions,
    compare: CompareFn,
    int_compare: CompareFn,
    /// Reducer applied inside run files and intermediate merges.
    run_reducer: Option<ReduceFn>,
    num_per_group: usize,
    run_buffer_size: usize,
    fixed: Option<FixedPath>,
    /// Live run files, oldest first. Order carries the arrival epoch for
    /// tie-breaking in the final merge.
    runs: Mutex<Vec<PathBuf>>,
}

impl SpillCtx {
    fn new_run_path(&self) -> PathBuf {
        let mut name = self.final_path.as_os_str().to_owned();
        name.push(format!(".tmp{}", next_tmp_id()));
        if self.run_options.lz4 {
            name.push(".lz4");
        }
        PathBuf::from(name)
    }

    fn run_cursor_options(&self) -> CursorOptions {
        let mut opts = CursorOptions::default();
        opts.format = self.run_options.format;
        opts.buffer_size = self.run_buffer_size;
        opts
    }

    /// Sorts `buf`, writes it out as a new run, and folds runs together if
    /// the group size has been reached.
    fn spill(&self, buf: &mut RecordBuffer) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let path = self.new_run_path();
        match self.fixed.clone() {
            Some(f) => self.write_fixed_run(buf, &f, &path)?,
            None => self.write_run(buf, &path)?,
        }
        buf.clear();
        self.runs.lock().expect("runs lock").push(path);
        self.fold_run_groups()
    }

    fn write_run(&self, buf: &mut RecordBuffer, path: &Path) -> Result<()> {
        let data = &buf.data;
        // Stable sort: ties keep their arrival order inside the run.
        buf.index.sort_by(|&(ao, al), &(bo, bl)| {
            (self.compare)(
                &Record::new(&data[ao..ao + al], 0),
                &Record::new(&data[bo..bo + bl], 0),
            )
        });
        let mut w = Writer::create(path, &self.run_options)?;
        match &self.run_reducer {
            None => {
                for &(off, len) in &buf.index {
                    w.write_record(&data[off..off + len])?;
                }
            }
            Some(reduce) => {
                let mut scratch = Reduced::default();
                let mut i = 0;
                while i < buf.index.len() {
                    let (ho, hl) = buf.index[i];
                    let head = Record::new(&data[ho..ho + hl], 0);
                    let mut j = i + 1;
                    while j < buf.index.len() {
                        let (o, l) = buf.index[j];
                        if (self.compare)(&head, &Record::new(&data[o..o + l], 0))
                            != Ordering::Equal
                        {
                            break;
                        }
                        j += 1;
                    }
                    let group: Vec<Record<'_>> = buf.index[i..j]
                        .iter()
                        .map(|&(o, l)| Record::new(&data[o..o + l], 0))
                        .collect();
                    scratch.tag = 0;
                    if reduce(&group, &mut scratch) {
                        w.write_record(&scratch.data)?;
                    }
                    i = j;
                }
            }
        }
        w.finish()
    }

    /// The packed fast path: no per-record descriptors, the caller's hooks
    /// see raw bytes.
    fn write_fixed_run(&self, buf: &mut RecordBuffer, f: &FixedPath, path: &Path) -> Result<()> {
        let size = f.size;
        if let Some(sort) = &f.sort {
            sort(&mut buf.data);
        } else if let Some(cmp) = &f.compare {
            // Sort a permutation, then lay the records back down once.
            let n = buf.data.len() / size;
            let data = &buf.data;
            let mut perm: Vec<u32> = (0..n as u32).collect();
            perm.sort_by(|&a, &b| {
                let a = a as usize * size;
                let b = b as usize * size;
                cmp(&data[a..a + size], &data[b..b + size])
            });
            let mut out = vec![0u8; buf.data.len()];
            for (slot, &src) in perm.iter().enumerate() {
                let src = src as usize * size;
                out[slot * size..(slot + 1) * size].copy_from_slice(&buf.data[src..src + size]);
            }
            buf.data = out;
        }

        let mut w = Writer::create(path, &self.run_options)?;
        match (&f.reducer, &f.compare) {
            (Some(reduce), Some(cmp)) => {
                let n = buf.data.len() / size;
                let mut i = 0;
                while i < n {
                    let mut j = i + 1;
                    while j < n {
                        let (a, b) = (i * size, j * size);
                        let equal = {
                            let d = &buf.data;
                            cmp(&d[a..a + size], &d[b..b + size]) == Ordering::Equal
                        };
                        if !equal {
                            break;
                        }
                        j += 1;
                    }
                    let group = &mut buf.data[i * size..j * size];
                    if reduce(group, j - i) {
                        w.write_record(&buf.data[i * size..(i + 1) * size])?;
                    }
                    i = j;
                }
            }
            _ => {
                for chunk in buf.data.chunks_exact(size) {
                    w.write_record(chunk)?;
                }
            }
        }
        w.finish()
    }

    /// Merges the oldest `num_per_group` runs into one whenever that many
    /// have accumulated, bounding the final fan-in.
    fn fold_run_groups(&self) -> Result<()> {
        loop {
            let group: Vec<PathBuf> = {
                let mut runs = self.runs.lock().expect("runs lock");
                if self.num_per_group < 2 || runs.len() < self.num_per_group {
                    return Ok(());
                }
                runs.drain(..self.num_per_group).collect()
            };
            let merged_path = self.new_run_path();
            {
                let opts = self.run_cursor_options();
                let mut m = Cursor::merge(
                    merge_comparator(&self.int_compare, self.run_reducer.is_some()),
                    &opts,
                );
                for (i, p) in group.iter().enumerate() {
                    m.add(Cursor::open(p, &opts), i as i32);
                }
                if let Some(r) = &self.run_reducer {
                    m.set_merge_reducer(r.clone());
                }
                let mut w = Writer::create(&merged_path, &self.run_options)?;
                m.pump(&mut w)?;
                w.finish()?;
            }
            for p in &group {
                let _ = std::fs::remove_file(p);
            }
            // The folded run represents the oldest records; it goes back to
            // the front so run order keeps meaning arrival order.
            self.runs.lock().expect("runs lock").insert(0, merged_path);
        }
    }
}

/// When there is no reducer, ties across runs must come out in arrival
/// order: break them on the run tag. A reducer collapses ties instead, and
/// needs the raw comparator so batches group correctly.
fn merge_comparator(compare: &CompareFn, has_reducer: bool) -> CompareFn {
    if has_reducer {
        compare.clone()
    } else {
        let compare = compare.clone();
        Arc::new(move |a: &Record<'_>, b: &Record<'_>| {
            compare(a, b).then_with(|| a.tag.cmp(&b.tag))
        })
    }
}

struct SpillWorker {
    tx: Option<Sender<RecordBuffer>>,
    back: Receiver<RecordBuffer>,
    handle: Option<JoinHandle<Result<()>>>,
}

/// Sorted (and optionally reduced) output that spills to disk when the
/// in-memory buffer fills. Create through [`crate::output::ExtWriter`] or
/// directly; call [`ExternalSorter::finish`] to write the final file, or
/// [`ExternalSorter::into_cursor`] to consume the merge without one.
pub struct ExternalSorter {
    ctx: Arc<SpillCtx>,
    options: WriterOptions,
    compare: CompareFn,
    reducer: Option<ReduceFn>,
    buf: RecordBuffer,
    capacity: usize,
    use_extra_thread: bool,
    worker: Option<SpillWorker>,
    finished: bool,
}

impl ExternalSorter {
    pub fn create(
        path: impl AsRef<Path>,
        options: &WriterOptions,
        ext: &ExtOptions,
    ) -> Result<ExternalSorter> {
        let path = path.as_ref();
        let compare: CompareFn = match (&ext.compare, &ext.fixed.compare) {
            (Some(c), _) => c.clone(),
            (None, Some(fc)) => {
                let fc = fc.clone();
                Arc::new(move |a: &Record<'_>, b: &Record<'_>| fc(a.bytes, b.bytes))
            }
            (None, None) => {
                return Err(Error::Config("sorted output requires a comparator".into()))
            }
        };
        let fixed = match options.format {
            Format::Fixed(n) if ext.fixed.any() => Some(FixedPath {
                size: n as usize,
                sort: ext.fixed.sort.clone(),
                compare: ext.fixed.compare.clone(),
                reducer: ext.fixed.reducer.clone(),
            }),
            _ => None,
        };

        let mut run_options = WriterOptions::default();
        run_options.format = options.format;
        run_options.buffer_size = 256 * KB;
        run_options.abort_on_error = options.abort_on_error;
        if ext.compress_tmp {
            run_options.lz4 = true;
        }

        let run_buffer_size = (options.buffer_size / 8).clamp(64 * KB, 4 * MB);
        let ctx = SpillCtx {
            final_path: path.to_path_buf(),
            run_options,
            compare: compare.clone(),
            int_compare: ext.int_compare.clone().unwrap_or_else(|| compare.clone()),
            run_reducer: ext.int_reducer.clone().or_else(|| ext.reducer.clone()),
            num_per_group: ext.num_per_group,
            run_buffer_size,
            fixed,
            runs: Mutex::new(Vec::new()),
        };
        Ok(ExternalSorter {
            ctx: Arc::new(ctx),
            options: options.clone(),
            compare,
            reducer: ext.reducer.clone(),
            buf: RecordBuffer::default(),
            capacity: options.buffer_size.max(64 * KB),
            use_extra_thread: ext.use_extra_thread,
            worker: None,
            finished: false,
        })
    }

    fn spawn_worker(&mut self) {
        let (tx, rx) = bounded::<RecordBuffer>(1);
        let (back_tx, back_rx) = bounded::<RecordBuffer>(2);
        // One spare buffer so the writer can keep filling while the worker
        // sorts.
        let _ = back_tx.send(RecordBuffer::default());
        let ctx = Arc::clone(&self.ctx);
        let handle = std::thread::spawn(move || -> Result<()> {
            for mut b in rx.iter() {
                ctx.spill(&mut b)?;
                b.clear();
                if back_tx.send(b).is_err() {
                    break;
                }
            }
            Ok(())
        });
        self.worker = Some(SpillWorker { tx: Some(tx), back: back_rx, handle: Some(handle) });
    }

    fn join_worker(&mut self) -> Result<()> {
        let Some(mut w) = self.worker.take() else { return Ok(()) };
        w.tx.take();
        match w.handle.take() {
            Some(h) => match h.join() {
                Ok(result) => result,
                Err(_) => Err(Error::Io(io::Error::other("sort thread panicked"))),
            },
            None => Ok(()),
        }
    }

    /// Sorts and spills whatever is buffered.
    fn spill_now(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        if self.use_extra_thread && self.worker.is_none() {
            self.spawn_worker();
        }
        if self.worker.is_none() {
            return self.ctx.spill(&mut self.buf);
        }
        let filled = std::mem::take(&mut self.buf);
        let exchanged = {
            let w = self.worker.as_mut().expect("spill worker");
            match w.tx.as_ref() {
                Some(tx) if tx.send(filled).is_ok() => w.back.recv().ok(),
                _ => None,
            }
        };
        match exchanged {
            Some(spare) => {
                self.buf = spare;
                Ok(())
            }
            None => {
                // The worker is gone; its join result carries the real error.
                self.join_worker()?;
                Err(Error::Io(io::Error::other("sort thread exited early")))
            }
        }
    }

    /// Spills the tail and stops the worker; all runs are on disk after
    /// this.
    fn flush_runs(&mut self) -> Result<()> {
        if self.worker.is_some() {
            self.spill_now()?;
            self.join_worker()
        } else {
            self.ctx.spill(&mut self.buf)
        }
    }

    /// The merged (and reduced) stream over all runs. Run files are removed
    /// when the returned cursor is dropped.
    fn merged_cursor(&self) -> Cursor {
        let runs: Vec<PathBuf> =
            std::mem::take(&mut *self.ctx.runs.lock().expect("runs lock"));
        let mut opts = CursorOptions::default();
        opts.format = self.options.format;
        opts.buffer_size = (self.capacity / (runs.len() + 1)).clamp(64 * KB, 4 * MB);
        let mut m = Cursor::merge(merge_comparator(&self.compare, self.reducer.is_some()), &opts);
        for (i, p) in runs.iter().enumerate() {
            m.add(Cursor::open(p, &opts), i as i32);
        }
        if let Some(r) = &self.reducer {
            m.set_merge_reducer(r.clone());
        }
        m.attach(Box::new(RemoveOnDrop::many(runs)));
        m
    }

    /// Merges the runs and writes the final file (honoring safe mode, ack,
    /// compression from the writer options).
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.flush_runs()?;
        let mut merged = self.merged_cursor();
        let mut w = Writer::create(&self.ctx.final_path, &self.options)?;
        merged.pump(&mut w)?;
        w.finish()
    }

    /// Hands the merge cursor to the caller instead of writing the final
    /// file. The temporary runs ride along and are removed when the cursor
    /// is dropped.
    pub fn into_cursor(mut self) -> Result<Cursor> {
        self.finished = true;
        self.flush_runs()?;
        Ok(self.merged_cursor())
    }
}

impl RecordSink for ExternalSorter {
    fn write_record(&mut self, bytes: &[u8]) -> Result<()> {
        if self.finished {
            return Err(Error::Config("write after finish".into()));
        }
        if !self.buf.is_empty() && self.buf.data.len() + bytes.len() > self.capacity {
            self.spill_now()?;
        }
        let off = self.buf.data.len();
        self.buf.data.extend_from_slice(bytes);
        if self.ctx.fixed.is_none() {
            self.buf.index.push((off, bytes.len()));
        }
        Ok(())
    }
}

impl Drop for ExternalSorter {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::compare_u32;
    use tempfile::TempDir;

    fn u32_cmp() -> CompareFn {
        Arc::new(|a: &Record<'_>, b: &Record<'_>| compare_u32(a, b))
    }

    fn sorted_output(path: &Path, format: Format) -> Vec<Vec<u8>> {
        let mut opts = CursorOptions::default();
        opts.format = format;
        let mut c = Cursor::open(path, &opts);
        let mut out = Vec::new();
        while let Some(r) = c.advance() {
            out.push(r.bytes.to_vec());
        }
        out
    }

    #[test]
    fn small_input_sorts_in_one_run() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        let mut wopts = WriterOptions::default();
        wopts.format = Format::Prefix;
        let mut ext = ExtOptions::default();
        ext.set_compare(u32_cmp());
        let mut s = ExternalSorter::create(&path, &wopts, &ext).unwrap();
        for v in [5u32, 1, 9, 3] {
            s.write_record(&v.to_le_bytes()).unwrap();
        }
        s.finish().unwrap();
        let got: Vec<u32> = sorted_output(&path, Format::Prefix)
            .iter()
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(got, vec![1, 3, 5, 9]);
        // No stray run files left behind.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name() != "out.bin")
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn spills_and_merges_across_runs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        let mut wopts = WriterOptions::default();
        wopts.buffer_size = 64 * KB; // floor; forces several spills below
        let mut ext = ExtOptions::default();
        ext.set_compare(u32_cmp());
        let mut s = ExternalSorter::create(&path, &wopts, &ext).unwrap();
        // Descending input, ~48 bytes per record: 20k records overflow the
        // 64 KiB buffer about fifteen times.
        let pad = [7u8; 44];
        let n: u32 = 20_000;
        for v in (0..n).rev() {
            let mut rec = v.to_le_bytes().to_vec();
            rec.extend_from_slice(&pad);
            s.write_record(&rec).unwrap();
        }
        s.finish().unwrap();
        let out = sorted_output(&path, Format::Prefix);
        assert_eq!(out.len(), n as usize);
        for (i, b) in out.iter().enumerate() {
            assert_eq!(u32::from_le_bytes([b[0], b[1], b[2], b[3]]), i as u32);
        }
    }

    #[test]
    fn ties_preserve_arrival_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        let mut wopts = WriterOptions::default();
        wopts.buffer_size = 64 * KB;
        let mut ext = ExtOptions::default();
        ext.set_compare(u32_cmp());
        let mut s = ExternalSorter::create(&path, &wopts, &ext).unwrap();
        // All records share one key; the payload records arrival order.
        // Spills split them across several runs.
        let n = 9_000u32;
        for seq in 0..n {
            let mut rec = 42u32.to_le_bytes().to_vec();
            rec.extend_from_slice(&seq.to_le_bytes());
            rec.extend_from_slice(&[0u8; 24]);
            s.write_record(&rec).unwrap();
        }
        s.finish().unwrap();
        let out = sorted_output(&path, Format::Prefix);
        assert_eq!(out.len(), n as usize);
        for (i, b) in out.iter().enumerate() {
            let seq = u32::from_le_bytes([b[4], b[5], b[6], b[7]]);
            assert_eq!(seq, i as u32, "tie order broken at {i}");
        }
    }

    #[test]
    fn reducer_collapses_duplicates_across_runs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        let mut wopts = WriterOptions::default();
        wopts.buffer_size = 64 * KB;
        let mut ext = ExtOptions::default();
        ext.set_compare(u32_cmp());
        ext.set_reducer(crate::record::keep_first_fn());
        let mut s = ExternalSorter::create(&path, &wopts, &ext).unwrap();
        let keys = 3_000u32;
        let pad = [1u8; 28];
        for round in 0..3 {
            for k in 0..keys {
                let mut rec = k.to_le_bytes().to_vec();
                rec.push(round);
                rec.extend_from_slice(&pad);
                s.write_record(&rec).unwrap();
            }
        }
        s.finish().unwrap();
        let out = sorted_output(&path, Format::Prefix);
        assert_eq!(out.len(), keys as usize);
        for (i, b) in out.iter().enumerate() {
            assert_eq!(u32::from_le_bytes([b[0], b[1], b[2], b[3]]), i as u32);
        }
    }

    #[test]
    fn intermediate_group_merges_bound_fan_in() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        let mut wopts = WriterOptions::default();
        wopts.buffer_size = 64 * KB;
        let mut ext = ExtOptions::default();
        ext.set_compare(u32_cmp());
        ext.num_per_group = 2;
        let mut s = ExternalSorter::create(&path, &wopts, &ext).unwrap();
        let n = 20_000u32;
        let pad = [9u8; 44];
        for v in (0..n).rev() {
            let mut rec = v.to_le_bytes().to_vec();
            rec.extend_from_slice(&pad);
            s.write_record(&rec).unwrap();
        }
        s.finish().unwrap();
        let out = sorted_output(&path, Format::Prefix);
        assert_eq!(out.len(), n as usize);
        assert!(out.windows(2).all(|w| {
            let a = u32::from_le_bytes([w[0][0], w[0][1], w[0][2], w[0][3]]);
            let b = u32::from_le_bytes([w[1][0], w[1][1], w[1][2], w[1][3]]);
            a <= b
        }));
    }

    #[test]
    fn background_thread_matches_foreground_result() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        let mut wopts = WriterOptions::default();
        wopts.buffer_size = 64 * KB;
        let mut ext = ExtOptions::default();
        ext.set_compare(u32_cmp());
        ext.use_extra_thread = true;
        let mut s = ExternalSorter::create(&path, &wopts, &ext).unwrap();
        let n = 15_000u32;
        let pad = [3u8; 44];
        for v in (0..n).rev() {
            let mut rec = v.to_le_bytes().to_vec();
            rec.extend_from_slice(&pad);
            s.write_record(&rec).unwrap();
        }
        s.finish().unwrap();
        let out = sorted_output(&path, Format::Prefix);
        assert_eq!(out.len(), n as usize);
        for (i, b) in out.iter().enumerate() {
            assert_eq!(u32::from_le_bytes([b[0], b[1], b[2], b[3]]), i as u32);
        }
    }

    #[test]
    fn into_cursor_skips_the_final_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("never-written.bin");
        let mut ext = ExtOptions::default();
        ext.set_compare(u32_cmp());
        let mut s = ExternalSorter::create(&path, &WriterOptions::default(), &ext).unwrap();
        for v in [4u32, 2, 8] {
            s.write_record(&v.to_le_bytes()).unwrap();
        }
        let mut c = s.into_cursor().unwrap();
        let mut got = Vec::new();
        while let Some(r) = c.advance() {
            got.push(u32::from_le_bytes([r.bytes[0], r.bytes[1], r.bytes[2], r.bytes[3]]));
        }
        assert_eq!(got, vec![2, 4, 8]);
        assert!(!path.exists());
        drop(c);
        // Runs are cleaned up with the cursor.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn fixed_fast_path_sorts_packed_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        let mut wopts = WriterOptions::default();
        wopts.format = Format::Fixed(4);
        let mut ext = ExtOptions::default();
        ext.set_fixed_compare(|a: &[u8], b: &[u8]| {
            u32::from_le_bytes([a[0], a[1], a[2], a[3]])
                .cmp(&u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        });
        let mut s = ExternalSorter::create(&path, &wopts, &ext).unwrap();
        for v in [7u32, 0, 3, 3, 1] {
            s.write_record(&v.to_le_bytes()).unwrap();
        }
        s.finish().unwrap();
        let got: Vec<u32> = sorted_output(&path, Format::Fixed(4))
            .iter()
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(got, vec![0, 1, 3, 3, 7]);
    }

    #[test]
    fn uncompressed_tmp_runs_when_disabled() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        let mut wopts = WriterOptions::default();
        wopts.buffer_size = 64 * KB;
        let mut ext = ExtOptions::default();
        ext.set_compare(u32_cmp());
        ext.compress_tmp = false;
        let mut s = ExternalSorter::create(&path, &wopts, &ext).unwrap();
        let n = 10_000u32;
        let pad = [0u8; 44];
        for v in (0..n).rev() {
            let mut rec = v.to_le_bytes().to_vec();
            rec.extend_from_slice(&pad);
            s.write_record(&rec).unwrap();
        }
        s.finish().unwrap();
        let out = sorted_output(&path, Format::Prefix);
        assert_eq!(out.len(), n as usize);
    }
}
