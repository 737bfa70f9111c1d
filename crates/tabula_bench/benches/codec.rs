//! Row and key codec benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tabula_bench::{bench_schema, random_rows};
use tabula_codec::{decode, encode, encode_key, RowView};

fn bench_row_codec(c: &mut Criterion) {
    let schema = bench_schema();
    let records: Vec<_> = random_rows(256, 100)
        .iter()
        .map(|fields| schema.record_from_fields(fields).unwrap())
        .collect();
    let encoded: Vec<_> = records.iter().map(|r| encode(r, &schema).unwrap()).collect();

    let mut group = c.benchmark_group("row");
    group.bench_function("encode", |b| {
        let mut i = 0;
        b.iter(|| {
            let bytes = encode(black_box(&records[i % records.len()]), &schema).unwrap();
            i += 1;
            black_box(bytes);
        });
    });
    group.bench_function("decode", |b| {
        let mut i = 0;
        b.iter(|| {
            let record = decode(black_box(&encoded[i % encoded.len()]), &schema).unwrap();
            i += 1;
            black_box(record);
        });
    });
    group.bench_function("view_single_column", |b| {
        let mut i = 0;
        b.iter(|| {
            let view = RowView::new(&schema, black_box(&encoded[i % encoded.len()])).unwrap();
            i += 1;
            black_box(view.get(0).unwrap());
        });
    });
    group.bench_function("from_fields", |b| {
        let rows = random_rows(256, 100);
        let mut i = 0;
        b.iter(|| {
            let record = schema.record_from_fields(black_box(&rows[i % rows.len()])).unwrap();
            i += 1;
            black_box(record);
        });
    });
    group.finish();
}

fn bench_key_codec(c: &mut Criterion) {
    let schema = bench_schema();
    let records: Vec<_> = random_rows(256, 100)
        .iter()
        .map(|fields| schema.record_from_fields(fields).unwrap())
        .collect();

    c.bench_function("key/composite", |b| {
        let mut i = 0;
        b.iter(|| {
            let record = &records[i % records.len()];
            let key = encode_key([record.get(0).unwrap(), record.get(2).unwrap()]);
            i += 1;
            black_box(key);
        });
    });
}

criterion_group!(benches, bench_row_codec, bench_key_codec);
criterion_main!(benches);
