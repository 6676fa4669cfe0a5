//! Model benchmarks: filtering, diffing, sorting, joins, and pivots.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use quarry_bench::utils::{random_rows, static_connection};
use quarry_codec::Value;
use quarry_core::{
    equals, AndGroup, Condition, Connection, Criteria, Diff, JoinKind, JoinOn, Model, Pivot,
    SortKey, StatementGroup, Verb,
};
use std::sync::Arc;

/// Benchmark applying a local filter.
fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter");

    for count in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let mut model = Model::from_rows("people", random_rows(count));
            let filter = vec![
                Criteria::with_where(equals([("city", "Oslo")])),
                Criteria::with_where(AndGroup::new().with("age", Condition::gt(60))),
            ];
            b.iter(|| {
                model.set_filter(black_box(filter.clone())).unwrap();
                black_box(model.len());
            });
        });
    }
    group.finish();
}

/// Benchmark the full-row differ.
fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_between");

    for count in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let before = random_rows(count);
            let mut after = before.clone();
            // Change every tenth row.
            for row in after.iter_mut().step_by(10) {
                row.insert("age".into(), Value::Integer(0));
            }
            b.iter(|| {
                let diff = Diff::between(black_box(&before), black_box(&after));
                black_box(diff);
            });
        });
    }
    group.finish();
}

/// Benchmark select with diff against a static connection.
fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_with_diff");

    for count in [100, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let conn: Arc<dyn Connection> = static_connection(random_rows(count));
            let select = StatementGroup::new(
                conn,
                "SELECT * FROM people WHERE <<condition>>",
                Verb::Select,
            )
            .unwrap();
            let mut model = Model::new("people").with_procedure(Verb::Select, select);
            model.select(false).unwrap();

            b.iter(|| {
                let diff = model.select(true).unwrap();
                black_box(diff);
            });
        });
    }
    group.finish();
}

/// Benchmark a two-key sort.
fn bench_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort");

    for count in [1000, 10000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let rows = random_rows(count);
            let keys = [SortKey::asc("city"), SortKey::desc("age")];
            b.iter(|| {
                let mut model = Model::from_rows("people", rows.clone());
                model.sort(black_box(&keys)).unwrap();
                black_box(model);
            });
        });
    }
    group.finish();
}

/// Benchmark the nested-loop join and a pivot over its result.
fn bench_join_pivot(c: &mut Criterion) {
    let mut group = c.benchmark_group("join_pivot");

    for count in [100, 500].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let people = Model::from_rows("people", random_rows(count));
            let visits: Vec<_> = random_rows(count)
                .into_iter()
                .map(|mut row| {
                    row.shift_remove("name");
                    row
                })
                .collect();
            let visits = Model::from_rows("visits", visits);
            let on = JoinOn::using("id");
            let pivot = Pivot::new("visits.city", "name", "visits.age");

            b.iter(|| {
                let joined = people.join(JoinKind::Inner, &visits, &on).unwrap();
                let table = joined.pivot(&pivot).unwrap();
                black_box(table);
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_filter,
    bench_diff,
    bench_select,
    bench_sort,
    bench_join_pivot,
);

criterion_main!(benches);
