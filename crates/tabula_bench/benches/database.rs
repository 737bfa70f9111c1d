//! Database operation benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use tabula_bench::{bench_table, populated, random_rows, BENCH_TABLE};
use tabula_codec::field_map;
use tabula_core::{Consistency, Database, ReadOption, TraverseOption, WriteOptions};
use tempfile::TempDir;

/// Benchmark single-row puts in memory.
fn bench_put(c: &mut Criterion) {
    c.bench_function("put", |b| {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connect();
        conn.create_table(bench_table()).unwrap();
        let rows = random_rows(1_024, 100);
        let mut i = 0;

        b.iter(|| {
            let pkey = conn
                .put(BENCH_TABLE, black_box(&rows[i % rows.len()]), &WriteOptions::relaxed())
                .unwrap();
            i += 1;
            black_box(pkey);
        });
    });
}

/// Benchmark on-disk puts per consistency level.
fn bench_put_durability(c: &mut Criterion) {
    let mut group = c.benchmark_group("put_file");
    group.sample_size(20);

    for consistency in [Consistency::Relaxed, Consistency::Strong] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{consistency:?}")),
            &consistency,
            |b, &consistency| {
                let dir = TempDir::new().unwrap();
                let db = Database::open(dir.path()).unwrap();
                let conn = db.connect();
                conn.create_table(bench_table()).unwrap();
                let rows = random_rows(256, 100);
                let options = WriteOptions::new().consistency(consistency);
                let mut i = 0;

                b.iter(|| {
                    conn.put(BENCH_TABLE, black_box(&rows[i % rows.len()]), &options)
                        .unwrap();
                    i += 1;
                });
            },
        );
    }
    group.finish();
}

/// Benchmark equality queries on the single-field index.
fn bench_point_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("point_query");

    for rows in [1_000, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, &rows| {
            let (_db, conn) = populated(rows, 1_000);
            let mut rng = rand::thread_rng();

            b.iter(|| {
                let card = format!("card{}", rng.gen_range(0..1_000));
                let found = conn
                    .query(BENCH_TABLE, &ReadOption::new().bind("card", card))
                    .unwrap()
                    .collect_rows()
                    .unwrap();
                black_box(found);
            });
        });
    }
    group.finish();
}

/// Benchmark prefix and range scans on the composite index.
fn bench_prefix_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("prefix_query");
    let (_db, conn) = populated(50_000, 100);

    group.bench_function("prefix", |b| {
        b.iter(|| {
            let option = ReadOption::on_index("card_date").bind("card", "card42");
            let count = conn
                .query(BENCH_TABLE, black_box(&option))
                .unwrap()
                .count_matches()
                .unwrap();
            black_box(count);
        });
    });

    group.bench_function("prefix_range", |b| {
        b.iter(|| {
            let option = ReadOption::on_index("card_date")
                .bind("card", "card42")
                .range("p_biz_date", 2_500i64..7_500);
            let rows = conn
                .query(BENCH_TABLE, black_box(&option))
                .unwrap()
                .collect_rows()
                .unwrap();
            black_box(rows);
        });
    });
    group.finish();
}

/// Benchmark full traversals.
fn bench_traverse(c: &mut Criterion) {
    let mut group = c.benchmark_group("traverse");

    for rows in [1_000, 10_000] {
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, &rows| {
            let (_db, conn) = populated(rows, 100);

            b.iter(|| {
                let count = conn
                    .traverse_with(BENCH_TABLE, &TraverseOption::new())
                    .unwrap()
                    .count();
                black_box(count);
            });
        });
    }
    group.finish();
}

/// Benchmark updates rewriting every row of one card.
fn bench_update(c: &mut Criterion) {
    c.bench_function("update_card", |b| {
        let (_db, conn) = populated(10_000, 1_000);
        let mut i = 0u64;

        b.iter(|| {
            let condition = field_map([("card", format!("card{}", i % 1_000))]);
            let values = field_map([("mcc", format!("mcc{i}"))]);
            let updated = conn
                .update(BENCH_TABLE, &condition, &values, &WriteOptions::relaxed())
                .unwrap();
            i += 1;
            black_box(updated);
        });
    });
}

criterion_group!(
    benches,
    bench_put,
    bench_put_durability,
    bench_point_query,
    bench_prefix_query,
    bench_traverse,
    bench_update,
);

criterion_main!(benches);
