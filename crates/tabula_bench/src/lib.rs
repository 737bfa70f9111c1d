//! Benchmark utilities.

use rand::Rng;
use tabula_codec::{field_map, ColumnDef, DataType, FieldMap, Schema, Value};
use tabula_core::{Connection, Database, IndexDef, TableDef, WriteOptions};

/// Table every database benchmark uses.
pub const BENCH_TABLE: &str = "bench";

/// Schema of the benchmark table.
pub fn bench_schema() -> Schema {
    Schema::new(vec![
        ColumnDef::new("card", DataType::Varchar).not_null(),
        ColumnDef::new("mcc", DataType::Varchar),
        ColumnDef::new("p_biz_date", DataType::BigInt),
        ColumnDef::new("amount", DataType::Double),
    ])
    .expect("valid bench schema")
}

/// The benchmark table: a single-field and a composite index.
pub fn bench_table() -> TableDef {
    TableDef::new(BENCH_TABLE, bench_schema())
        .with_index(IndexDef::new("card", ["card"]))
        .with_index(IndexDef::new("card_date", ["card", "p_biz_date"]))
}

/// Generate one random row over `cards` distinct cards.
pub fn random_row<R: Rng>(rng: &mut R, cards: usize) -> FieldMap {
    field_map([
        ("card", Value::from(format!("card{}", rng.gen_range(0..cards)))),
        ("mcc", Value::from(format!("mcc{}", rng.gen_range(0..16)))),
        ("p_biz_date", Value::BigInt(rng.gen_range(0..10_000))),
        ("amount", Value::Double(rng.gen_range(0.0..1_000.0))),
    ])
}

/// Generate `count` random rows.
pub fn random_rows(count: usize, cards: usize) -> Vec<FieldMap> {
    let mut rng = rand::thread_rng();
    (0..count).map(|_| random_row(&mut rng, cards)).collect()
}

/// Opens an in-memory database holding `rows` random rows over `cards`
/// distinct cards.
pub fn populated(rows: usize, cards: usize) -> (Database, Connection) {
    let db = Database::open_in_memory().expect("open in-memory database");
    let conn = db.connect();
    conn.create_table(bench_table()).expect("create bench table");
    for row in random_rows(rows, cards) {
        conn.put(BENCH_TABLE, &row, &WriteOptions::relaxed())
            .expect("populate bench table");
    }
    (db, conn)
}
