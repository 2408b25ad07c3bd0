// In benches/pack_set_bench.rs

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::{json, Value};

use tamper::{AttributeDeclaration, BuildOptions, PackSet};

// --- Mock Data Generation ---

const COLORS: [&str; 4] = ["red", "green", "blue", "black"];
const SIZES: [&str; 12] = ["xxs", "xs", "s", "m", "l", "xl", "xxl", "3xl", "4xl", "5xl", "6xl", "7xl"];

/// Generates records with every other guid present, sorted by guid.
fn generate_records(size: usize) -> Vec<Value> {
    (0..size)
        .map(|i| {
            json!({
                "id": (i * 2) as u64,
                "color": COLORS[i % COLORS.len()],
                "size": [SIZES[i % SIZES.len()], SIZES[(i / 3) % SIZES.len()]],
            })
        })
        .collect()
}

fn declared_set() -> PackSet {
    let mut set = PackSet::new();
    set.declare_attribute(AttributeDeclaration::new(
        "color",
        COLORS.iter().map(|c| json!(c)),
        1,
    ))
    .unwrap();
    set.declare_attribute(AttributeDeclaration::new(
        "size",
        SIZES.iter().map(|s| json!(s)),
        2,
    ))
    .unwrap();
    set
}

// --- Benchmark Suite ---

const BENCH_RECORDS: usize = 50_000;

fn bench_build_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("PackSet Build Paths");
    group.throughput(criterion::Throughput::Elements(BENCH_RECORDS as u64));

    let sorted = generate_records(BENCH_RECORDS);
    let reversed: Vec<Value> = sorted.iter().rev().cloned().collect();

    group.bench_function("Ordered pack on sorted records", |b| {
        b.iter(|| {
            let mut set = declared_set();
            set.pack(black_box(&sorted), &BuildOptions::default()).unwrap();
            black_box(set.to_json().unwrap())
        })
    });

    group.bench_function("Unordered pack on reversed records", |b| {
        b.iter(|| {
            let mut set = declared_set();
            set.build_unordered_pack(&BuildOptions::default(), |buffer| {
                for record in black_box(&reversed) {
                    buffer.add(record.clone())?;
                }
                Ok(())
            })
            .unwrap();
            black_box(set.to_json().unwrap())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_build_paths);
criterion_main!(benches);
