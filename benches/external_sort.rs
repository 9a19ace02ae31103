//! External-sort throughput over shuffled fixed-width records, with the
//! buffer sized to force spilling.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use tempfile::TempDir;

use recio::output::{ExtOptions, ExtWriter, RecordSink, WriterOptions};
use recio::record::{compare_u32, CompareFn, Record};
use recio::KB;

fn u32_cmp() -> CompareFn {
    Arc::new(|a: &Record<'_>, b: &Record<'_>| compare_u32(a, b))
}

fn shuffled_records(n: u32) -> Vec<[u8; 16]> {
    // Multiplicative shuffle; the padding makes records realistic-sized.
    (0..n)
        .map(|i| {
            let key = i.wrapping_mul(2_654_435_761) % n;
            let mut rec = [0u8; 16];
            rec[..4].copy_from_slice(&key.to_le_bytes());
            rec
        })
        .collect()
}

fn bench_external_sort(c: &mut Criterion) {
    let n: u32 = 200_000;
    let records = shuffled_records(n);
    let mut group = c.benchmark_group("external_sort");
    group.throughput(Throughput::Bytes(records.len() as u64 * 16));
    group.sample_size(10);

    for (name, extra_thread) in [("foreground", false), ("extra_thread", true)] {
        group.bench_function(name, |b| {
            b.iter_batched(
                || TempDir::new().unwrap(),
                |dir| {
                    let path = dir.path().join("out.bin");
                    let mut wopts = WriterOptions::default();
                    wopts.buffer_size = 256 * KB;
                    let mut ext = ExtOptions::default();
                    ext.set_compare(u32_cmp());
                    ext.use_extra_thread = extra_thread;
                    let mut out = ExtWriter::create(&path, &wopts, &ext).unwrap();
                    for rec in &records {
                        out.write_record(rec).unwrap();
                    }
                    out.finish().unwrap();
                    dir
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_external_sort);
criterion_main!(benches);
