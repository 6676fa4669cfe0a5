//! Benchmark utilities.

use quarry_codec::{Row, Value};
use quarry_connection::{InMemoryConnection, Outcome};
use quarry_core::{AndGroup, Condition, Criteria, CriteriaSet};
use rand::Rng;
use std::sync::Arc;

const CITIES: [&str; 4] = ["Oslo", "Bergen", "Lagos", "Accra"];

/// Generate `count` rows of `id`, `name`, `city`, `age`.
pub fn random_rows(count: usize) -> Vec<Row> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| {
            let age = if rng.gen_bool(0.1) {
                Value::Null
            } else {
                Value::Integer(rng.gen_range(18..90))
            };
            let mut row = Row::new();
            row.insert("id".into(), Value::Integer(i as i64 + 1));
            row.insert("name".into(), Value::Text(format!("person_{i}")));
            row.insert(
                "city".into(),
                Value::from(CITIES[rng.gen_range(0..CITIES.len())]),
            );
            row.insert("age".into(), age);
            row
        })
        .collect()
}

/// Generate `count` where-only criteria spread over `shapes` distinct
/// shapes. Shape `s` is an `IN` list of `s + 1` ages plus a city match.
pub fn criteria_batch(count: usize, shapes: usize) -> CriteriaSet {
    let mut rng = rand::thread_rng();
    let shapes = shapes.max(1);
    (0..count)
        .map(|i| {
            let ages: Vec<Value> = (0..=i % shapes)
                .map(|_| Value::Integer(rng.gen_range(18..90)))
                .collect();
            let city = CITIES[rng.gen_range(0..CITIES.len())];
            Criteria::with_where(
                AndGroup::new()
                    .with("age", Condition::in_list(ages))
                    .with("city", Condition::eq(city)),
            )
        })
        .collect()
}

/// A connection that answers every `SELECT` with its rows and counts
/// everything else as one affected row.
pub fn static_connection(rows: Vec<Row>) -> Arc<InMemoryConnection<Vec<Row>>> {
    InMemoryConnection::new("bench", rows, |session, sql, _params| {
        if sql.starts_with("SELECT") {
            Ok(Outcome::rows(session.state.clone()))
        } else {
            Ok(Outcome::affected(1))
        }
    })
    .shared()
}
