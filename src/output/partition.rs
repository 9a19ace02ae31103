//! Partitioned output: one record stream split across N files by a
//! partition function, each partition optionally sorted.
//!
//! Three disciplines, in the order callers usually want them:
//!
//! - **partition-then-sort** (the default when a comparator is set):
//!   records are routed to unsorted per-partition temporaries; at finish,
//!   each temporary is externally sorted into its final file, with the
//!   per-partition sorts running in parallel.
//! - **sort-while-partitioning**: every partition is an [`ExternalSorter`]
//!   from the first record, so sorting overlaps the writing.
//! - **sort-before-partitioning**: the whole stream is sorted first and the
//!   sorted stream routed to plain partition writers — order inside each
//!   partition matches the global sort, at the cost of writing everything
//!   twice.
//!
//! Partition files are named `<stem>.<zero-padded id>.<ext>`, keeping the
//! extension so compression auto-detection works on the pieces.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::input::{Cursor, CursorOptions};
use crate::output::{ExtOptions, ExternalSorter, RecordSink, Writer, WriterOptions};
use crate::record::{PartitionFn, Record};
use crate::KB;

/// `<stem>.<zero-padded id>.<ext>` for partition `id` of `num_partitions`.
pub fn partition_filename(path: &Path, id: usize, num_partitions: usize) -> PathBuf {
    let mut width = 1;
    let mut bound = 10;
    while num_partitions.saturating_sub(1) >= bound {
        width += 1;
        bound *= 10;
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => path.with_extension(format!("{id:0width$}.{ext}")),
        None => {
            let mut name = path.as_os_str().to_owned();
            name.push(format!(".{id:0width$}"));
            PathBuf::from(name)
        }
    }
}

/// Default bound on concurrent partition sorts: the physical cores minus a
/// share reserved for the rest of the process.
fn default_sort_threads() -> usize {
    let cores = num_cpus::get_physical().max(1);
    let spared = 1 + (cores >> 3);
    if cores <= spared {
        1
    } else {
        cores - spared
    }
}

enum Mode {
    /// No comparator: plain routed writers.
    Plain(Vec<Writer>),
    /// Sort-while-partitioning: a sorter per partition from the start.
    SortWhile(Vec<ExternalSorter>),
    /// Partition-then-sort: unsorted temporaries now, parallel sorts at
    /// finish.
    Deferred { tmps: Vec<Writer>, tmp_paths: Vec<PathBuf> },
    /// Sort-before-partitioning: one big sorter, routed at finish (taken
    /// out of the option there).
    SortBefore(Option<Box<ExternalSorter>>),
}

/// Splits records across `num_partitions` outputs. See the module docs for
/// the disciplines.
pub struct Partitioner {
    partition: PartitionFn,
    num: usize,
    names: Vec<PathBuf>,
    options: WriterOptions,
    /// Extended options for the per-partition sorters, with partitioning
    /// itself stripped out.
    sub_ext: ExtOptions,
    num_sort_threads: usize,
    mode: Mode,
    finished: bool,
}

impl Partitioner {
    pub fn create(
        path: impl AsRef<Path>,
        options: &WriterOptions,
        ext: &ExtOptions,
    ) -> Result<Partitioner> {
        let path = path.as_ref();
        let partition = ext
            .partition
            .clone()
            .ok_or_else(|| Error::Config("partitioned output requires a partition fn".into()))?;
        let num = ext.num_partitions;
        if num == 0 {
            return Err(Error::Config("partitioned output requires num_partitions > 0".into()));
        }
        let names: Vec<PathBuf> = (0..num).map(|i| partition_filename(path, i, num)).collect();

        let mut sub_ext = ext.clone();
        sub_ext.partition = None;
        sub_ext.num_partitions = 0;
        // Parallelism across partitions replaces the per-sorter thread.
        sub_ext.use_extra_thread = false;

        let sorted = ext.compare.is_some() || ext.fixed.any();
        let mode = if !sorted {
            let writers: Result<Vec<Writer>> =
                names.iter().map(|n| Writer::create(n, options)).collect();
            Mode::Plain(writers?)
        } else if ext.sort_before_partitioning {
            let mut pre_name = path.as_os_str().to_owned();
            pre_name.push(".presort");
            let pre = ExternalSorter::create(PathBuf::from(pre_name), options, &sub_ext)?;
            Mode::SortBefore(Some(Box::new(pre)))
        } else if ext.sort_while_partitioning {
            let sorters: Result<Vec<ExternalSorter>> = names
                .iter()
                .map(|n| ExternalSorter::create(n, options, &sub_ext))
                .collect();
            Mode::SortWhile(sorters?)
        } else {
            let mut tmp_options = WriterOptions::default();
            tmp_options.format = options.format;
            tmp_options.buffer_size = 256 * KB;
            tmp_options.abort_on_error = options.abort_on_error;
            if ext.compress_tmp {
                tmp_options.lz4 = true;
            }
            let mut tmps = Vec::with_capacity(num);
            let mut tmp_paths = Vec::with_capacity(num);
            for name in &names {
                let mut t = name.as_os_str().to_owned();
                t.push(".unsorted");
                if ext.compress_tmp {
                    t.push(".lz4");
                }
                let t = PathBuf::from(t);
                tmps.push(Writer::create(&t, &tmp_options)?);
                tmp_paths.push(t);
            }
            Mode::Deferred { tmps, tmp_paths }
        };

        Ok(Partitioner {
            partition,
            num,
            names,
            options: options.clone(),
            sub_ext,
            num_sort_threads: if ext.num_sort_threads > 0 {
                ext.num_sort_threads
            } else {
                default_sort_threads()
            },
            mode,
            finished: false,
        })
    }

    /// Completes every partition. For the deferred discipline this is where
    /// the actual sorting happens, in parallel across partitions.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let threads = self.num_sort_threads;
        match &mut self.mode {
            Mode::Plain(writers) => {
                for w in writers {
                    w.finish()?;
                }
                Ok(())
            }
            Mode::SortWhile(sorters) => {
                let pool = build_pool(threads)?;
                pool.install(|| {
                    sorters
                        .par_iter_mut()
                        .map(|s| s.finish())
                        .collect::<Result<Vec<()>>>()
                })?;
                Ok(())
            }
            Mode::Deferred { tmps, tmp_paths } => {
                for t in tmps.iter_mut() {
                    t.finish()?;
                }
                tmps.clear();
                let pool = build_pool(threads)?;
                let options = &self.options;
                let sub_ext = &self.sub_ext;
                let jobs: Vec<(PathBuf, PathBuf)> = tmp_paths
                    .drain(..)
                    .zip(self.names.iter().cloned())
                    .collect();
                pool.install(|| {
                    jobs.par_iter()
                        .map(|(tmp, final_path)| {
                            sort_one_partition(tmp, final_path, options, sub_ext)
                        })
                        .collect::<Result<Vec<()>>>()
                })?;
                Ok(())
            }
            Mode::SortBefore(pre) => {
                let Some(pre) = pre.take() else { return Ok(()) };
                let mut cur = pre.into_cursor()?;
                let mut writers = Vec::with_capacity(self.num);
                for name in &self.names {
                    writers.push(Writer::create(name, &self.options)?);
                }
                while let Some(r) = cur.advance() {
                    let p = (self.partition)(&r, self.num);
                    if p < self.num {
                        writers[p].write_record(r.bytes)?;
                    }
                }
                for mut w in writers {
                    w.finish()?;
                }
                Ok(())
            }
        }
    }
}

fn build_pool(threads: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| Error::Io(std::io::Error::other(e)))
}

/// Reads one unsorted partition temporary, sorts it into its final file,
/// and removes the temporary.
fn sort_one_partition(
    tmp: &Path,
    final_path: &Path,
    options: &WriterOptions,
    sub_ext: &ExtOptions,
) -> Result<()> {
    let mut in_opts = CursorOptions::default();
    in_opts.format = options.format;
    in_opts.buffer_size = 256 * KB;
    let mut cur = Cursor::open(tmp, &in_opts);
    let mut sorter = ExternalSorter::create(final_path, options, sub_ext)?;
    cur.pump(&mut sorter)?;
    sorter.finish()?;
    drop(cur);
    let _ = std::fs::remove_file(tmp);
    Ok(())
}

impl RecordSink for Partitioner {
    /// Routes one record; a partition of `num_partitions` (or beyond)
    /// drops it.
    fn write_record(&mut self, bytes: &[u8]) -> Result<()> {
        if self.finished {
            return Err(Error::Config("write after finish".into()));
        }
        if let Mode::SortBefore(pre) = &mut self.mode {
            return match pre.as_mut() {
                Some(pre) => pre.write_record(bytes),
                None => Err(Error::Config("write after finish".into())),
            };
        }
        let p = (self.partition)(&Record::new(bytes, 0), self.num);
        if p >= self.num {
            return Ok(());
        }
        match &mut self.mode {
            Mode::Plain(writers) => writers[p].write_record(bytes),
            Mode::SortWhile(sorters) => sorters[p].write_record(bytes),
            Mode::Deferred { tmps, .. } => tmps[p].write_record(bytes),
            Mode::SortBefore(_) => unreachable!(),
        }
    }
}

impl Drop for Partitioner {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{compare_u32, split_by_u32, CompareFn};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn u32_cmp() -> CompareFn {
        Arc::new(|a: &Record<'_>, b: &Record<'_>| compare_u32(a, b))
    }

    fn split4() -> PartitionFn {
        Arc::new(|r: &Record<'_>, n: usize| split_by_u32(r, n))
    }

    fn read_u32s(path: &Path) -> Vec<u32> {
        let mut c = Cursor::open(path, &CursorOptions::default());
        let mut out = Vec::new();
        while let Some(r) = c.advance() {
            out.push(u32::from_le_bytes([r.bytes[0], r.bytes[1], r.bytes[2], r.bytes[3]]));
        }
        out
    }

    #[test]
    fn partition_filenames_are_zero_padded() {
        let p = Path::new("/data/out.lz4");
        assert_eq!(partition_filename(p, 0, 4), Path::new("/data/out.0.lz4"));
        assert_eq!(partition_filename(p, 3, 4), Path::new("/data/out.3.lz4"));
        assert_eq!(partition_filename(p, 7, 100), Path::new("/data/out.07.lz4"));
        assert_eq!(partition_filename(Path::new("plain"), 2, 16), Path::new("plain.02"));
    }

    #[test]
    fn plain_partitioning_disperses_by_function() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        let mut ext = ExtOptions::default();
        ext.set_partition(split4(), 4);
        let mut p = Partitioner::create(&path, &WriterOptions::default(), &ext).unwrap();
        for v in 0..100u32 {
            p.write_record(&v.to_le_bytes()).unwrap();
        }
        p.finish().unwrap();
        for k in 0..4usize {
            let got = read_u32s(&partition_filename(&path, k, 4));
            assert_eq!(got.len(), 25);
            assert!(got.iter().all(|v| (*v as usize) % 4 == k));
            // Input order preserved within the partition.
            assert!(got.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn returning_num_partitions_drops_the_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        let mut ext = ExtOptions::default();
        let drop_odd: PartitionFn = Arc::new(|r: &Record<'_>, n: usize| {
            let v = u32::from_le_bytes([r.bytes[0], r.bytes[1], r.bytes[2], r.bytes[3]]);
            if v % 2 == 1 {
                n
            } else {
                (v as usize / 2) % n
            }
        });
        ext.set_partition(drop_odd, 2);
        let mut p = Partitioner::create(&path, &WriterOptions::default(), &ext).unwrap();
        for v in 0..10u32 {
            p.write_record(&v.to_le_bytes()).unwrap();
        }
        p.finish().unwrap();
        let total: usize = (0..2)
            .map(|k| read_u32s(&partition_filename(&path, k, 2)).len())
            .sum();
        assert_eq!(total, 5);
    }

    #[test]
    fn partition_then_sort_sorts_each_piece() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        let mut ext = ExtOptions::default();
        ext.set_partition(split4(), 4);
        ext.set_compare(u32_cmp());
        let mut p = Partitioner::create(&path, &WriterOptions::default(), &ext).unwrap();
        for v in (0..1000u32).rev() {
            p.write_record(&v.to_le_bytes()).unwrap();
        }
        p.finish().unwrap();
        let mut seen = 0;
        for k in 0..4usize {
            let got = read_u32s(&partition_filename(&path, k, 4));
            assert!(got.windows(2).all(|w| w[0] <= w[1]), "partition {k} unsorted");
            assert!(got.iter().all(|v| (*v as usize) % 4 == k));
            seen += got.len();
        }
        assert_eq!(seen, 1000);
        // Temporaries are gone.
        let stray = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().contains("unsorted"));
        assert!(!stray);
    }

    #[test]
    fn sort_while_partitioning_matches_deferred() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        let mut ext = ExtOptions::default();
        ext.set_partition(split4(), 4);
        ext.set_compare(u32_cmp());
        ext.sort_while_partitioning = true;
        let mut p = Partitioner::create(&path, &WriterOptions::default(), &ext).unwrap();
        for v in (0..1000u32).rev() {
            p.write_record(&v.to_le_bytes()).unwrap();
        }
        p.finish().unwrap();
        for k in 0..4usize {
            let got = read_u32s(&partition_filename(&path, k, 4));
            assert_eq!(got.len(), 250);
            assert!(got.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn sort_before_partitioning_routes_sorted_stream() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        let mut ext = ExtOptions::default();
        ext.set_partition(split4(), 4);
        ext.set_compare(u32_cmp());
        ext.sort_before_partitioning = true;
        let mut p = Partitioner::create(&path, &WriterOptions::default(), &ext).unwrap();
        for v in (0..1000u32).rev() {
            p.write_record(&v.to_le_bytes()).unwrap();
        }
        p.finish().unwrap();
        for k in 0..4usize {
            let got = read_u32s(&partition_filename(&path, k, 4));
            assert_eq!(got.len(), 250);
            assert!(got.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
