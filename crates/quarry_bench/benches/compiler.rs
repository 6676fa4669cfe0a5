//! Criteria compiler benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use quarry_bench::utils::criteria_batch;
use quarry_core::{compile, Criteria, CriteriaSet, ShapeKey, Skeleton, Verb};

/// Benchmark compiling batches that all share one shape.
fn bench_single_shape(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_single_shape");
    let skeleton = Skeleton::parse("SELECT * FROM people WHERE <<condition>>").unwrap();

    for count in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let criteria = criteria_batch(count, 1);
            b.iter(|| {
                let statements = compile(&skeleton, Verb::Select, black_box(&criteria)).unwrap();
                black_box(statements);
            });
        });
    }
    group.finish();
}

/// Benchmark bucketing across many shapes.
fn bench_many_shapes(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_many_shapes");
    let skeleton = Skeleton::parse("SELECT * FROM people WHERE <<condition>>").unwrap();

    for shapes in [2, 8, 32].iter() {
        group.throughput(Throughput::Elements(1000));
        group.bench_with_input(BenchmarkId::from_parameter(shapes), shapes, |b, &shapes| {
            let criteria = criteria_batch(1000, shapes);
            b.iter(|| {
                let statements = compile(&skeleton, Verb::Select, black_box(&criteria)).unwrap();
                black_box(statements);
            });
        });
    }
    group.finish();
}

/// Benchmark shape key hashing alone.
fn bench_shape_key(c: &mut Criterion) {
    let criteria: Vec<Criteria> = criteria_batch(100, 4).iter().cloned().collect();

    c.bench_function("shape_key_100", |b| {
        b.iter(|| {
            for criterion in &criteria {
                black_box(ShapeKey::of(black_box(criterion)));
            }
        });
    });
}

/// Benchmark decoding the JSON wire shape.
fn bench_wire_decode(c: &mut Criterion) {
    let json = criteria_batch(100, 4).to_json();

    c.bench_function("criteria_from_json_100", |b| {
        b.iter(|| {
            let set = CriteriaSet::from_json(black_box(&json)).unwrap();
            black_box(set);
        });
    });
}

criterion_group!(
    benches,
    bench_single_shape,
    bench_many_shapes,
    bench_shape_key,
    bench_wire_decode,
);

criterion_main!(benches);
