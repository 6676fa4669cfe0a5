//! Pivoting a model into a new detached one.

use super::Model;
use crate::error::{CoreError, CoreResult};
use indexmap::{IndexMap, IndexSet};
use quarry_codec::{Row, Value};

/// Parameters of [`Model::pivot`].
#[derive(Debug, Clone, PartialEq)]
pub struct Pivot {
    pivot_column: String,
    index_column: String,
    value_column: String,
    values: Option<Vec<Value>>,
    invert: bool,
    suppress_missing: bool,
}

impl Pivot {
    /// Spreads the distinct values of `pivot_column` into columns, one
    /// output row per distinct `index_column` value, cells aggregated
    /// from `value_column`.
    pub fn new(
        pivot_column: impl Into<String>,
        index_column: impl Into<String>,
        value_column: impl Into<String>,
    ) -> Self {
        Self {
            pivot_column: pivot_column.into(),
            index_column: index_column.into(),
            value_column: value_column.into(),
            values: None,
            invert: false,
            suppress_missing: false,
        }
    }

    /// Restricts the output to these pivot values, in this order.
    #[must_use]
    pub fn values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Makes the value list an exclusion list instead.
    #[must_use]
    pub fn invert(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    /// Emits an all-NULL column for a listed value that never occurs,
    /// instead of failing.
    #[must_use]
    pub fn suppress_missing(mut self, suppress: bool) -> Self {
        self.suppress_missing = suppress;
        self
    }

    fn selected(&self, present: &IndexSet<Value>) -> CoreResult<Vec<Value>> {
        let Some(listed) = &self.values else {
            return Ok(present.iter().cloned().collect());
        };
        if self.invert {
            return Ok(present.iter().filter(|v| !listed.contains(v)).cloned().collect());
        }
        if !self.suppress_missing {
            if let Some(missing) = listed.iter().find(|v| !present.contains(*v)) {
                return Err(CoreError::PivotValueMissing {
                    value: missing.to_string(),
                });
            }
        }
        Ok(listed.clone())
    }
}

/// Sums numbers (integer while every input is an integer and the sum
/// fits), otherwise joins the text forms with commas. NULLs are skipped.
fn aggregate(values: &[Value]) -> Value {
    let present: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
    match present.as_slice() {
        [] => Value::Null,
        [only] => (*only).clone(),
        many if many.iter().all(|v| v.is_numeric()) => {
            let integers: Option<i64> = many
                .iter()
                .try_fold(0i64, |sum, v| v.as_integer().and_then(|n| sum.checked_add(n)));
            match integers {
                Some(total) if many.iter().all(|v| matches!(v, Value::Integer(_))) => {
                    Value::Integer(total)
                }
                _ => Value::Float(many.iter().filter_map(|v| v.as_f64()).sum()),
            }
        }
        many => Value::Text(
            many.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(","),
        ),
    }
}

impl Model {
    /// Builds a pivot table as a new detached model.
    ///
    /// Only rows passing the filter take part. Output columns are the
    /// index column followed by one column per selected pivot value,
    /// named by the value's text form. Index rows and pivot columns keep
    /// first-seen order unless a value list fixes the column order.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownColumn`] for a column the model lacks, or
    /// [`CoreError::PivotValueMissing`] for a listed value that never
    /// occurs (unless missing values are suppressed).
    pub fn pivot(&self, layout: &Pivot) -> CoreResult<Model> {
        for column in [&layout.pivot_column, &layout.index_column, &layout.value_column] {
            self.require_column(column)?;
        }

        let cell = |row: &Row, column: &str| row.get(column).cloned().unwrap_or(Value::Null);
        let mut present = IndexSet::new();
        let mut groups: IndexMap<Value, IndexMap<Value, Vec<Value>>> = IndexMap::new();
        for row in self.rows() {
            let key = cell(row, layout.pivot_column.as_str());
            present.insert(key.clone());
            groups
                .entry(cell(row, layout.index_column.as_str()))
                .or_default()
                .entry(key)
                .or_default()
                .push(cell(row, layout.value_column.as_str()));
        }

        let selected = layout.selected(&present)?;
        let mut columns = IndexSet::new();
        columns.insert(layout.index_column.clone());
        for value in &selected {
            columns.insert(value.to_string());
        }

        let rows: Vec<Row> = groups
            .into_iter()
            .map(|(index, cells)| {
                let mut row = Row::with_capacity(columns.len());
                row.insert(layout.index_column.clone(), index);
                for value in &selected {
                    let aggregated = cells.get(value).map_or(Value::Null, |v| aggregate(v));
                    row.insert(value.to_string(), aggregated);
                }
                row
            })
            .collect();

        tracing::debug!(model = %self.name, rows = rows.len(), columns = columns.len(), "pivoted");
        let mut pivoted =
            Model::new(format!("{}_pivot", self.name)).with_config(self.config.clone());
        pivoted.replace_rows(rows, columns);
        Ok(pivoted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_codec::row;

    fn sales() -> Model {
        Model::from_rows(
            "sales",
            vec![
                row! { "region" => "north", "quarter" => "q1", "amount" => 10 },
                row! { "region" => "north", "quarter" => "q2", "amount" => 20 },
                row! { "region" => "south", "quarter" => "q1", "amount" => 5 },
                row! { "region" => "north", "quarter" => "q1", "amount" => 1 },
            ],
        )
    }

    #[test]
    fn spreads_and_sums() {
        let table = sales().pivot(&Pivot::new("quarter", "region", "amount")).unwrap();
        assert_eq!(table.columns(), ["region", "q1", "q2"]);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.row(0).unwrap(),
            &row! { "region" => "north", "q1" => 11, "q2" => 20 }
        );
        assert_eq!(
            table.row(1).unwrap(),
            &row! { "region" => "south", "q1" => 5, "q2" => Value::Null }
        );
    }

    #[test]
    fn single_index_row() {
        let model = Model::from_rows(
            "m",
            vec![
                row! { "idx" => 1, "piv" => "c1", "val" => 10 },
                row! { "idx" => 1, "piv" => "c2", "val" => 20 },
            ],
        );
        let table = model.pivot(&Pivot::new("piv", "idx", "val")).unwrap();
        assert_eq!(table.data(), vec![&row! { "idx" => 1, "c1" => 10, "c2" => 20 }]);
    }

    #[test]
    fn value_list_orders_and_inverts() {
        let listed = sales()
            .pivot(&Pivot::new("quarter", "region", "amount").values(["q2", "q1"]))
            .unwrap();
        assert_eq!(listed.columns(), ["region", "q2", "q1"]);

        let inverted = sales()
            .pivot(&Pivot::new("quarter", "region", "amount").values(["q1"]).invert(true))
            .unwrap();
        assert_eq!(inverted.columns(), ["region", "q2"]);
    }

    #[test]
    fn missing_values_fail_unless_suppressed() {
        let layout = Pivot::new("quarter", "region", "amount").values(["q3"]);
        assert!(matches!(
            sales().pivot(&layout),
            Err(CoreError::PivotValueMissing { .. })
        ));

        let table = sales().pivot(&layout.suppress_missing(true)).unwrap();
        assert_eq!(table.row(0).unwrap()["q3"], Value::Null);
    }

    #[test]
    fn aggregation_rules() {
        assert_eq!(aggregate(&[]), Value::Null);
        assert_eq!(aggregate(&[Value::Null, Value::from("x")]), Value::from("x"));
        assert_eq!(aggregate(&[Value::from(1), Value::from(2.5)]), Value::Float(3.5));
        assert_eq!(aggregate(&[Value::from("a"), Value::from(2)]), Value::from("a,2"));
        assert_eq!(
            aggregate(&[Value::from(i64::MAX), Value::from(1)]),
            Value::Float(i64::MAX as f64 + 1.0)
        );
    }

    #[test]
    fn unknown_column() {
        assert!(matches!(
            sales().pivot(&Pivot::new("year", "region", "amount")),
            Err(CoreError::UnknownColumn { .. })
        ));
    }
}
