//! Storage backend and segment benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use tabula_core::{Pkey, Segment, SegmentId, SegmentRecord};
use tabula_storage::{FileBackend, InMemoryBackend, StorageBackend};
use tempfile::TempDir;

/// Deterministic payload of the given size.
fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

/// Benchmark raw backend appends.
fn bench_backend_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("backend_append");

    for size in [64, 256, 1024, 4096] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("memory", size), &size, |b, &size| {
            let backend = InMemoryBackend::new();
            let data = payload(size);
            b.iter(|| black_box(backend.append(black_box(&data)).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("file", size), &size, |b, &size| {
            let dir = TempDir::new().unwrap();
            let backend = FileBackend::open(&dir.path().join("bench.seg")).unwrap();
            let data = payload(size);
            b.iter(|| black_box(backend.append(black_box(&data)).unwrap()));
        });
    }
    group.finish();
}

/// Benchmark segment appends and point reads, active and sealed.
fn bench_segment(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment");

    group.bench_function("append", |b| {
        let segment = Segment::create(SegmentId::new(1), Arc::new(InMemoryBackend::new())).unwrap();
        let data = payload(128);
        let mut next = 1u64;
        b.iter(|| {
            let pkey = Pkey::new(next);
            segment
                .append(&SegmentRecord::put(pkey, pkey, black_box(data.clone())))
                .unwrap();
            next += 1;
        });
    });

    let backend = Arc::new(InMemoryBackend::new());
    let segment = Segment::create(SegmentId::new(1), Arc::clone(&backend) as Arc<dyn StorageBackend>)
        .unwrap();
    for pkey in 1..=10_000u64 {
        let pkey = Pkey::new(pkey);
        segment
            .append(&SegmentRecord::put(pkey, pkey, payload(128)))
            .unwrap();
    }
    group.bench_function("get_active", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let record = segment.get(Pkey::new(i % 10_000 + 1)).unwrap();
            i += 7;
            black_box(record);
        });
    });

    segment.seal(false).unwrap();
    let sealed = Segment::open(SegmentId::new(1), backend).unwrap();
    group.bench_function("get_sealed", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let record = sealed.get(Pkey::new(i % 10_000 + 1)).unwrap();
            i += 7;
            black_box(record);
        });
    });
    group.finish();
}

criterion_group!(benches, bench_backend_append, bench_segment);
criterion_main!(benches);
