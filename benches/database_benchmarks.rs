//! Criterion benchmarks for rust_dbmap

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rust_dbmap::core::dialect::rebind;
use rust_dbmap::prelude::*;

#[derive(Debug, Default)]
struct Person {
    id: i64,
    created: i64,
    fname: String,
    lname: String,
    version: i64,
}

impl_record!(Person {
    id: i64,
    created: i64,
    fname: String,
    lname: String,
    version: i64,
});

fn person_table() -> TableMap {
    let mut table = TableMap::derive::<Person>(None);
    table.set_keys(true, &["id"]);
    table
}

// ============================================================================
// Statement Generation Benchmarks
// ============================================================================

fn bench_plans(c: &mut Criterion) {
    let mut group = c.benchmark_group("plans");
    group.throughput(Throughput::Elements(1));

    group.bench_function("compile_update", |b| {
        b.iter(|| {
            let table = person_table();
            black_box(table.update_plan(&PostgresDialect).map(|p| p.query.len()))
        });
    });

    group.bench_function("cached_update", |b| {
        let table = person_table();
        b.iter(|| black_box(table.update_plan(&PostgresDialect).map(|p| p.args.len())));
    });

    group.bench_function("bind_args", |b| {
        let table = person_table();
        let plan = table.update_plan(&PostgresDialect).unwrap();
        let person = Person {
            id: 7,
            created: 1,
            fname: "Ben".to_string(),
            lname: "Doe".to_string(),
            version: 3,
        };
        b.iter(|| black_box(plan.bind_args(&person, Some(3))));
    });

    group.finish();
}

fn bench_rebind(c: &mut Criterion) {
    let mut group = c.benchmark_group("rebind");

    for count in [1usize, 10, 100] {
        let query = format!(
            "select * from person where {}",
            vec!["id = ?"; count].join(" or ")
        );
        group.throughput(Throughput::Bytes(query.len() as u64));
        group.bench_with_input(BenchmarkId::new("postgres", count), &query, |b, query| {
            b.iter(|| black_box(rebind(query, &PostgresDialect)));
        });
    }

    group.finish();
}

// ============================================================================
// SQLite CRUD Benchmarks
// ============================================================================

fn bench_sqlite_crud(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ctx = Context::background();

    let dbmap = rt.block_on(async {
        let conn = SqliteDatabase::connect(":memory:").await.unwrap();
        let mut dbmap = DbMap::new(Box::new(conn), Box::new(SqliteDialect));
        dbmap.add_table::<Person>().set_keys(true, &["id"]);
        dbmap.create_tables(&ctx).await.unwrap();
        dbmap
    });

    let mut group = c.benchmark_group("sqlite_crud");
    group.throughput(Throughput::Elements(1));

    group.bench_function("insert", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut person = Person {
                    fname: "Ben".to_string(),
                    lname: "Doe".to_string(),
                    ..Default::default()
                };
                dbmap.insert(&ctx, &mut [&mut person]).await.unwrap();
                black_box(person.id)
            })
        });
    });

    let id = rt.block_on(async {
        let mut person = Person {
            fname: "Amy".to_string(),
            ..Default::default()
        };
        dbmap.insert(&ctx, &mut [&mut person]).await.unwrap();
        person.id
    });

    group.bench_function("get", |b| {
        b.iter(|| {
            rt.block_on(async {
                let person: Person = dbmap.get(&ctx, &[id.into()]).await.unwrap();
                black_box(person)
            })
        });
    });

    group.bench_function("update", |b| {
        let mut person: Person = rt.block_on(dbmap.get(&ctx, &[id.into()])).unwrap();
        b.iter(|| {
            rt.block_on(async {
                person.created += 1;
                black_box(dbmap.update(&ctx, &mut [&mut person]).await.unwrap())
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_plans, bench_rebind, bench_sqlite_crud);
criterion_main!(benches);
