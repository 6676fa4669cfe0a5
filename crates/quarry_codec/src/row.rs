//! Rows: ordered column-to-value mappings.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use indexmap::IndexMap;

/// An ordered mapping of column name to scalar value.
///
/// Rows within one result need not share identical column sets.
pub type Row = IndexMap<String, Value>;

/// Builds a [`Row`] from `column => value` pairs.
///
/// ```
/// use quarry_codec::{row, Value};
///
/// let r = row! { "id" => 1, "name" => "Ada" };
/// assert_eq!(r["name"], Value::Text("Ada".into()));
/// ```
#[macro_export]
macro_rules! row {
    () => {
        $crate::Row::new()
    };
    ($($column:expr => $value:expr),+ $(,)?) => {{
        let mut row = $crate::Row::new();
        $(row.insert(::std::string::String::from($column), $crate::Value::from($value));)+
        row
    }};
}

/// Decodes one JSON object into a row.
///
/// # Errors
///
/// Fails when `json` is not an object or holds a non-scalar value.
pub fn row_from_json(json: &serde_json::Value) -> CodecResult<Row> {
    let object = json
        .as_object()
        .ok_or_else(|| CodecError::invalid_row(format!("expected object, found {json}")))?;

    let mut row = Row::with_capacity(object.len());
    for (column, value) in object {
        let value = Value::from_json(value).map_err(|_| {
            CodecError::invalid_row(format!("column `{column}` holds a non-scalar value"))
        })?;
        row.insert(column.clone(), value);
    }
    Ok(row)
}

/// Decodes a JSON array of objects into rows.
///
/// # Errors
///
/// Fails when `json` is not an array or any element is not a valid row.
pub fn rows_from_json(json: &serde_json::Value) -> CodecResult<Vec<Row>> {
    let array = json
        .as_array()
        .ok_or_else(|| CodecError::invalid_row("expected an array of rows"))?;
    array
        .iter()
        .enumerate()
        .map(|(i, element)| {
            row_from_json(element)
                .map_err(|e| CodecError::invalid_row(format!("row {i}: {e}")))
        })
        .collect()
}

/// Encodes a row as a JSON object, preserving column order.
pub fn row_to_json(row: &Row) -> serde_json::Value {
    serde_json::Value::Object(
        row.iter()
            .map(|(column, value)| (column.clone(), value.to_json()))
            .collect(),
    )
}

/// Canonical identity of a row, independent of column order.
///
/// Two rows have the same key exactly when they hold the same columns with
/// equal values.
pub fn row_key(row: &Row) -> Vec<(String, Value)> {
    let mut key: Vec<(String, Value)> = row
        .iter()
        .map(|(column, value)| (column.clone(), value.clone()))
        .collect();
    key.sort_by(|a, b| a.0.cmp(&b.0));
    key
}
