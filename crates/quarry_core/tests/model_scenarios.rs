//! End-to-end model scenarios against the single-table fixture.

use proptest::prelude::*;
use quarry_core::{
    equals, row, AndGroup, Condition, Criteria, Diff, JoinKind, JoinOn, Model, Pivot, Row,
    SortKey, Value,
};
use quarry_testkit::generators::{equality_filter_strategy, rows_strategy};
use quarry_testkit::{people, table_connection, table_model};

fn names(model: &Model) -> Vec<String> {
    model.rows().map(|row| row["name"].to_string()).collect()
}

#[test]
fn insert_then_select_round_trip() {
    let conn = table_connection("people", "id", people());
    let mut model = table_model("people", &conn).unwrap();
    model.select(false).unwrap();

    model
        .insert(vec![
            row! { "name" => "Fola", "city" => "Accra", "age" => 33 },
            row! { "name" => "Gus", "city" => "Oslo", "age" => 60 },
        ])
        .unwrap();

    assert_eq!(model.len(), 7);
    assert_eq!(model.last_affected(), [Value::Integer(6), Value::Integer(7)]);
    let fola = model.row(5).unwrap();
    assert_eq!(fola["id"], Value::Integer(6));
    assert_eq!(fola["name"], Value::from("Fola"));
}

#[test]
fn remote_change_reported_as_delete_plus_insert() {
    let conn = table_connection(
        "letters",
        "id",
        vec![
            row! { "id" => 1, "v" => "A" },
            row! { "id" => 2, "v" => "B" },
            row! { "id" => 3, "v" => "C" },
        ],
    );
    let mut model = table_model("letters", &conn).unwrap();
    model.select(false).unwrap();

    // Another writer replaces A with D.
    let mut other = table_model("letters", &conn).unwrap();
    other.delete(row! { "id" => 1 }).unwrap();
    other.insert(row! { "id" => 4, "v" => "D" }).unwrap();

    let diff = model.select(true).unwrap().unwrap();
    assert_eq!(diff.delete.len(), 1);
    assert_eq!(diff.insert.len(), 1);
    assert!(diff.update.is_empty());
    assert_eq!(
        diff.insert.iter().next().unwrap().value_row(),
        Some(&row! { "id" => 4, "v" => "D" })
    );

    let values: Vec<String> = model.rows().map(|row| row["v"].to_string()).collect();
    assert_eq!(values, ["B", "C", "D"]);
}

#[test]
fn changed_row_is_never_an_update() {
    let conn = table_connection("t", "id", vec![row! { "id" => 1, "v" => "old" }]);
    let mut model = table_model("t", &conn).unwrap();
    model.select(false).unwrap();

    let mut writer = table_model("t", &conn).unwrap();
    writer.update(row! { "id" => 1, "v" => "new" }).unwrap();

    let diff = model.select(true).unwrap().unwrap();
    assert!(diff.update.is_empty());
    assert_eq!((diff.delete.len(), diff.insert.len()), (1, 1));
}

#[test]
fn synchronize_pushes_local_edits() {
    let conn = table_connection("people", "id", people());
    let mut model = table_model("people", &conn).unwrap();
    model.select(false).unwrap();

    let mut diff = Diff::new();
    diff.update.push(
        Criteria::with_values(row! { "city" => "Oslo" }).filter(equals([("name", "Dana")])),
    );
    diff.delete.push(Criteria::with_where(equals([("id", 2)])));
    diff.insert.push(Criteria::with_values(row! { "name" => "Hana", "city" => "Oslo" }));
    diff.select.push(Criteria::with_where(equals([("city", "Oslo")])));

    model.synchronize(diff).unwrap();
    assert_eq!(model.total_len(), 5);
    assert_eq!(names(&model), ["Ada", "Chidi", "Dana", "Hana"]);
    assert!(conn.state().rows.iter().all(|row| row["id"] != Value::Integer(2)));
}

#[test]
fn inner_join_counts_matching_pairs() {
    let left = Model::from_rows(
        "l",
        vec![row! { "a" => 1 }, row! { "a" => 2 }, row! { "a" => 2 }, row! { "a" => 3 }],
    );
    let right = Model::from_rows(
        "r",
        vec![row! { "b" => 2 }, row! { "b" => 3 }, row! { "b" => 3 }, row! { "b" => 9 }],
    );
    let joined = left
        .join(JoinKind::Inner, &right, &JoinOn::on("a", "=", "b").unwrap())
        .unwrap();

    // a=2 twice against one b=2, a=3 once against two b=3.
    assert_eq!(joined.len(), 4);
    assert!(joined.rows().all(|row| row["a"] == row["b"]));
}

#[test]
fn join_then_pivot_then_sort() {
    let people = Model::from_rows("people", people());
    let visits = Model::from_rows(
        "visits",
        vec![
            row! { "id" => 1, "month" => "jan", "n" => 2 },
            row! { "id" => 1, "month" => "feb", "n" => 1 },
            row! { "id" => 3, "month" => "jan", "n" => 4 },
            row! { "id" => 1, "month" => "jan", "n" => 3 },
        ],
    );
    let joined = people.join(JoinKind::Inner, &visits, &JoinOn::using("id")).unwrap();
    let mut table = joined.pivot(&Pivot::new("month", "name", "n")).unwrap();
    table.sort(&[SortKey::desc("jan")]).unwrap();

    assert_eq!(table.columns(), ["name", "jan", "feb"]);
    assert_eq!(table.row(0).unwrap(), &row! { "name" => "Ada", "jan" => 5, "feb" => 1 });
    assert_eq!(table.row(1).unwrap(), &row! { "name" => "Chidi", "jan" => 4, "feb" => Value::Null });
}

#[test]
fn pivot_single_index() {
    let model = Model::from_rows(
        "m",
        vec![
            row! { "idx" => 1, "piv" => "c1", "val" => 10 },
            row! { "idx" => 1, "piv" => "c2", "val" => 20 },
        ],
    );
    let table = model.pivot(&Pivot::new("piv", "idx", "val")).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.row(0).unwrap(), &row! { "idx" => 1, "c1" => 10, "c2" => 20 });
}

#[test]
fn filter_with_like_and_multiple_groups() {
    let mut model = Model::from_rows("people", people());
    model
        .set_filter(vec![
            Criteria::with_where(AndGroup::new().with("name", Condition::like("a%"))),
            Criteria::with_where(AndGroup::new().with("age", Condition::gt(50))),
        ])
        .unwrap();
    assert_eq!(names(&model), ["Ada", "Emeka"]);
}

proptest! {
    #[test]
    fn filter_is_idempotent(
        (rows, filter) in rows_strategy(12).prop_flat_map(|rows| {
            let columns: Vec<String> = rows
                .first()
                .map(|row| row.keys().cloned().collect())
                .unwrap_or_else(|| vec!["c".to_string()]);
            (Just(rows), equality_filter_strategy(columns))
        })
    ) {
        let mut model = Model::from_rows("t", rows.clone());
        model.set_filter(filter.clone()).unwrap();
        let once: Vec<_> = model.data().into_iter().cloned().collect();
        model.set_filter(filter).unwrap();
        let twice: Vec<_> = model.data().into_iter().cloned().collect();
        prop_assert_eq!(&once, &twice);

        model.clear_filter();
        prop_assert_eq!(model.data().into_iter().cloned().collect::<Vec<_>>(), rows);
    }

    #[test]
    fn diff_between_replays_to_target(
        before in rows_strategy(8),
        after in rows_strategy(8),
    ) {
        let diff = Diff::between(&before, &after);
        prop_assert!(diff.update.is_empty());

        let mut state = before.clone();
        for criteria in &diff.delete {
            // Rebuild the exact row from its equality / IS NULL conditions.
            let target: Row = criteria.where_clause().groups()[0]
                .iter()
                .map(|(column, conditions)| {
                    let operands = conditions[0].operands().values();
                    let value = operands.first().map_or(Value::Null, |v| (*v).clone());
                    (column.to_string(), value)
                })
                .collect();
            let pos = state.iter().position(|row| *row == target);
            prop_assert!(pos.is_some());
            if let Some(pos) = pos {
                state.remove(pos);
            }
        }
        for criteria in &diff.insert {
            state.push(criteria.value_row().cloned().unwrap_or_default());
        }

        let mut expected = after.clone();
        let key = |row: &Row| format!("{row:?}");
        state.sort_by_key(key);
        expected.sort_by_key(key);
        prop_assert_eq!(state, expected);
    }
}
