//! Property-based test generators using proptest.
//!
//! Strategies for values, rows, conditions, and criteria. The shape
//! strategies pair a fixed criterion shape with varying literals, which is
//! what the compiler's bucketing is keyed on.

use proptest::prelude::*;
use quarry_codec::{Row, Value};
use quarry_core::{AndGroup, Condition, Criteria, CriteriaSet, Operands, Operator};

/// Strategy for column names that pass identifier validation.
pub fn column_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,7}").expect("Invalid regex")
}

/// Strategy for scalar values, NULL included. Floats are finite.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        (-1.0e9..1.0e9f64).prop_map(Value::Float),
        prop::string::string_regex("[A-Za-z0-9 ]{0,12}")
            .expect("Invalid regex")
            .prop_map(Value::Text),
    ]
}

/// Strategy for non-null values, usable as comparison operands.
pub fn operand_strategy() -> impl Strategy<Value = Value> {
    value_strategy().prop_filter("operand must not be NULL", |v| !v.is_null())
}

/// Strategy for a row over exactly `columns`.
pub fn row_strategy(columns: Vec<String>) -> impl Strategy<Value = Row> {
    prop::collection::vec(value_strategy(), columns.len())
        .prop_map(move |values| columns.iter().cloned().zip(values).collect())
}

/// Strategy for up to `max` rows sharing one column set.
pub fn rows_strategy(max: usize) -> impl Strategy<Value = Vec<Row>> {
    prop::collection::btree_set(column_name_strategy(), 1..5).prop_flat_map(move |columns| {
        let columns: Vec<String> = columns.into_iter().collect();
        prop::collection::vec(row_strategy(columns), 0..=max)
    })
}

/// Operators together with the number of operand slots they take.
///
/// List operators get `1..=max_list` slots.
pub fn operator_strategy(max_list: usize) -> impl Strategy<Value = (Operator, usize)> {
    let max_list = max_list.max(1);
    prop::sample::select(Operator::ALL.to_vec()).prop_flat_map(move |operator| {
        let slots = match operator {
            Operator::IsNull | Operator::IsNotNull => Just(0usize).boxed(),
            Operator::Between | Operator::NotBetween => Just(2usize).boxed(),
            Operator::In | Operator::NotIn => (1..=max_list).boxed(),
            _ => Just(1usize).boxed(),
        };
        slots.prop_map(move |slots| (operator, slots))
    })
}

/// The literal-free part of a criterion: `(column, operator, slots)` per
/// condition, columns distinct.
pub type ShapeTemplate = Vec<(String, Operator, usize)>;

/// Strategy for shape templates with one to four conditions.
pub fn shape_template_strategy() -> impl Strategy<Value = ShapeTemplate> {
    prop::collection::btree_map(column_name_strategy(), operator_strategy(5), 1..5).prop_map(
        |conditions| {
            conditions
                .into_iter()
                .map(|(column, (operator, slots))| (column, operator, slots))
                .collect()
        },
    )
}

fn condition_for(operator: Operator, values: Vec<Value>) -> Condition {
    let operands = match values.len() {
        _ if matches!(operator, Operator::In | Operator::NotIn) => Operands::List(values),
        0 => Operands::None,
        1 => Operands::One(values.into_iter().next().unwrap_or(Value::Null)),
        _ => {
            let mut values = values.into_iter();
            let low = values.next().unwrap_or(Value::Null);
            let high = values.next().unwrap_or(Value::Null);
            Operands::Two(low, high)
        }
    };
    Condition::new(operator, operands).expect("template arity")
}

/// Strategy for a where-only criterion following `template`, with fresh
/// literals.
pub fn criteria_for_template(template: ShapeTemplate) -> impl Strategy<Value = Criteria> {
    let slots: usize = template.iter().map(|(_, _, n)| n).sum();
    prop::collection::vec(operand_strategy(), slots).prop_map(move |literals| {
        let mut literals = literals.into_iter();
        let mut group = AndGroup::new();
        for (column, operator, n) in &template {
            let values: Vec<Value> = literals.by_ref().take(*n).collect();
            group.push(column.clone(), condition_for(*operator, values));
        }
        Criteria::with_where(group)
    })
}

/// Strategy for `count` criteria that all share one shape.
pub fn same_shape_set_strategy(count: usize) -> impl Strategy<Value = CriteriaSet> {
    shape_template_strategy().prop_flat_map(move |template| {
        prop::collection::vec(criteria_for_template(template), count).prop_map(CriteriaSet::from)
    })
}

/// Strategy for single-group, equality-only filters over `columns`.
pub fn equality_filter_strategy(columns: Vec<String>) -> impl Strategy<Value = Criteria> {
    prop::sample::subsequence(columns.clone(), 1..=columns.len().max(1)).prop_flat_map(
        |chosen| {
            prop::collection::vec(operand_strategy(), chosen.len()).prop_map(move |values| {
                let group = chosen
                    .iter()
                    .zip(values)
                    .fold(AndGroup::new(), |group, (column, value)| {
                        group.with(column.clone(), Condition::eq(value))
                    });
                Criteria::with_where(group)
            })
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn template_criteria_share_a_shape() {
        let mut runner = TestRunner::default();
        let set = same_shape_set_strategy(4)
            .new_tree(&mut runner)
            .unwrap()
            .current();
        assert_eq!(set.len(), 4);

        let shapes: Vec<Vec<_>> = set
            .iter()
            .map(|criteria| {
                criteria.where_clause().groups()[0]
                    .iter()
                    .flat_map(|(_, conditions)| conditions.iter().map(Condition::shape))
                    .collect()
            })
            .collect();
        assert!(shapes.windows(2).all(|pair| pair[0] == pair[1]));
    }

    proptest! {
        #[test]
        fn rows_share_columns(rows in rows_strategy(6)) {
            if let Some(first) = rows.first() {
                for row in &rows {
                    prop_assert_eq!(row.keys().collect::<Vec<_>>(), first.keys().collect::<Vec<_>>());
                }
            }
        }

        #[test]
        fn operands_are_never_null(value in operand_strategy()) {
            prop_assert!(!value.is_null());
        }
    }
}
