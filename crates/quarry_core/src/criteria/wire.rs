//! JSON wire shape for criteria and diffs.
//!
//! ```text
//! { "select": [ { "where": [ {col: [op, ...operands]}, ... ] }, ... ],
//!   "update": [ { "values": {col: val, ...}, "where": [...] }, ... ],
//!   "insert": [ { "values": {col: val, ...} }, ... ],
//!   "delete": [ { "where": [...] }, ... ] }
//! ```
//!
//! A column may carry a list of conditions instead of one:
//! `{col: [[">=", 18], ["<", 65]]}`. `IN` operands may be given inline
//! (`["IN", 1, 2, 3]`) or nested (`["IN", [1, 2, 3]]`); encoding always
//! nests.

use super::condition::{Arity, Condition, Operands, Operator};
use super::diff::Diff;
use super::set::{AndGroup, Criteria, CriteriaInput, CriteriaSet, WhereClause};
use crate::error::{CoreError, CoreResult};
use crate::types::Verb;
use quarry_codec::{row_from_json, row_to_json, Decode, Encode, Value};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value as Json};

fn scalar(path: &str, json: &Json) -> CoreResult<Value> {
    Value::from_json(json)
        .map_err(|_| CoreError::malformed(format!("{path}: operand must be a scalar, found {json}")))
}

fn condition_from_json(path: &str, items: &[Json]) -> CoreResult<Condition> {
    let (token, rest) = items
        .split_first()
        .ok_or_else(|| CoreError::malformed(format!("{path}: empty condition")))?;
    let token = token
        .as_str()
        .ok_or_else(|| CoreError::malformed(format!("{path}: operator must be a string")))?;
    let (operator, inverted) = Operator::parse(token)?;

    let operands = match operator.arity() {
        Arity::Nullary if rest.is_empty() => Operands::None,
        Arity::Unary if rest.len() == 1 => Operands::One(scalar(path, &rest[0])?),
        Arity::Binary if rest.len() == 2 => {
            Operands::Two(scalar(path, &rest[0])?, scalar(path, &rest[1])?)
        }
        Arity::List => {
            let list = match rest {
                [Json::Array(nested)] => nested.as_slice(),
                inline => inline,
            };
            Operands::List(
                list.iter()
                    .map(|item| scalar(path, item))
                    .collect::<CoreResult<_>>()?,
            )
        }
        expected => {
            return Err(CoreError::OperandArity {
                operator: token.to_string(),
                expected: match expected {
                    Arity::Nullary => "no operands",
                    Arity::Unary => "exactly one operand",
                    _ => "exactly two operands",
                },
                actual: rest.len(),
            })
        }
    };

    let condition = Condition::new(operator, operands)?;
    if inverted {
        condition.inverse()
    } else {
        Ok(condition)
    }
}

fn conditions_from_json(path: &str, json: &Json) -> CoreResult<Vec<Condition>> {
    let items = json
        .as_array()
        .ok_or_else(|| CoreError::malformed(format!("{path}: expected [operator, ...operands]")))?;

    if items.first().is_some_and(Json::is_array) {
        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let nested = item.as_array().ok_or_else(|| {
                    CoreError::malformed(format!("{path}[{i}]: expected [operator, ...operands]"))
                })?;
                condition_from_json(&format!("{path}[{i}]"), nested)
            })
            .collect()
    } else {
        Ok(vec![condition_from_json(path, items)?])
    }
}

fn condition_to_json(condition: &Condition) -> Json {
    let mut items = vec![Json::String(condition.token())];
    match condition.operands() {
        Operands::None => {}
        Operands::One(value) => items.push(value.to_json()),
        Operands::Two(low, high) => {
            items.push(low.to_json());
            items.push(high.to_json());
        }
        Operands::List(values) => items.push(Json::Array(values.iter().map(Value::to_json).collect())),
    }
    Json::Array(items)
}

impl AndGroup {
    fn from_json(path: &str, json: &Json) -> CoreResult<Self> {
        let object = json
            .as_object()
            .ok_or_else(|| CoreError::malformed(format!("{path}: expected an object of columns")))?;
        let mut group = AndGroup::new();
        for (column, conditions) in object {
            for condition in conditions_from_json(&format!("{path}.{column}"), conditions)? {
                group.push(column.clone(), condition);
            }
        }
        Ok(group)
    }

    fn to_json(&self) -> Json {
        let mut object = Map::new();
        for (column, conditions) in self.iter() {
            let encoded = match conditions {
                [single] => condition_to_json(single),
                many => Json::Array(many.iter().map(condition_to_json).collect()),
            };
            object.insert(column.to_string(), encoded);
        }
        Json::Object(object)
    }
}

impl WhereClause {
    /// Decodes a where clause: an array of AND-group objects, or a single
    /// object taken as one group.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedCriteria`] naming the offending path.
    pub fn from_json(json: &Json) -> CoreResult<Self> {
        Self::from_json_at("where", json)
    }

    fn from_json_at(path: &str, json: &Json) -> CoreResult<Self> {
        match json {
            Json::Array(groups) => groups
                .iter()
                .enumerate()
                .map(|(i, group)| AndGroup::from_json(&format!("{path}[{i}]"), group))
                .collect(),
            Json::Object(_) => Ok(WhereClause::single(AndGroup::from_json(path, json)?)),
            Json::Null => Ok(WhereClause::new()),
            other => Err(CoreError::malformed(format!(
                "{path}: expected an array of groups, found {other}"
            ))),
        }
    }

    /// Encodes as an array of AND-group objects.
    #[must_use]
    pub fn to_json(&self) -> Json {
        Json::Array(self.groups().iter().map(AndGroup::to_json).collect())
    }
}

impl Criteria {
    fn from_json_at(path: &str, json: &Json) -> CoreResult<Self> {
        let object = json
            .as_object()
            .ok_or_else(|| CoreError::malformed(format!("{path}: expected an object")))?;

        let mut criteria = Criteria::new();
        for (key, value) in object {
            match key.as_str() {
                "values" => {
                    let row = row_from_json(value)
                        .map_err(|e| CoreError::malformed(format!("{path}.values: {e}")))?;
                    criteria = criteria.values(row);
                }
                "where" => {
                    criteria =
                        criteria.filter(WhereClause::from_json_at(&format!("{path}.where"), value)?);
                }
                other => {
                    return Err(CoreError::malformed(format!("{path}: unknown key `{other}`")))
                }
            }
        }
        Ok(criteria)
    }

    /// Decodes one `{ "values": ..., "where": ... }` object.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedCriteria`] naming the offending path.
    pub fn from_json(json: &Json) -> CoreResult<Self> {
        Self::from_json_at("criteria", json)
    }

    /// Encodes as a `{ "values": ..., "where": ... }` object, omitting
    /// absent parts.
    #[must_use]
    pub fn to_json(&self) -> Json {
        let mut object = Map::new();
        if let Some(values) = self.value_row() {
            object.insert("values".into(), row_to_json(values));
        }
        if !self.where_clause().groups().is_empty() {
            object.insert("where".into(), self.where_clause().to_json());
        }
        Json::Object(object)
    }
}

impl CriteriaSet {
    fn from_json_at(path: &str, json: &Json) -> CoreResult<Self> {
        let items = json
            .as_array()
            .ok_or_else(|| CoreError::malformed(format!("{path}: expected an array of criteria")))?;
        items
            .iter()
            .enumerate()
            .map(|(i, item)| Criteria::from_json_at(&format!("{path}[{i}]"), item))
            .collect()
    }

    /// Decodes an array of criteria objects.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedCriteria`] naming the offending index.
    pub fn from_json(json: &Json) -> CoreResult<Self> {
        Self::from_json_at("criteria", json)
    }

    /// Encodes as an array of criteria objects.
    #[must_use]
    pub fn to_json(&self) -> Json {
        Json::Array(self.iter().map(Criteria::to_json).collect())
    }
}

impl Diff {
    /// Decodes a `{ "select": [...], "insert": [...], ... }` object.
    /// Missing verbs are empty.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedCriteria`] for unknown verbs or bad
    /// criteria, naming the offending path.
    pub fn from_json(json: &Json) -> CoreResult<Self> {
        let object = json
            .as_object()
            .ok_or_else(|| CoreError::malformed("diff: expected an object keyed by verb"))?;

        let mut diff = Diff::new();
        for (key, value) in object {
            let verb = key.parse::<Verb>()?;
            let list = CriteriaSet::from_json_at(key, value)?;
            match verb {
                Verb::Select => diff.select = list,
                Verb::Insert => diff.insert = list,
                Verb::Update => diff.update = list,
                Verb::Delete => diff.delete = list,
                Verb::Call => {
                    return Err(CoreError::malformed("diff: `call` is not a diff verb"))
                }
            }
        }
        Ok(diff)
    }

    /// Encodes with all four verbs present.
    #[must_use]
    pub fn to_json(&self) -> Json {
        json!({
            "select": self.select.to_json(),
            "insert": self.insert.to_json(),
            "update": self.update.to_json(),
            "delete": self.delete.to_json(),
        })
    }
}

impl CriteriaInput {
    /// Decodes either a criteria array or a diff object.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedCriteria`] for anything else.
    pub fn from_json(json: &Json) -> CoreResult<Self> {
        match json {
            Json::Array(_) => Ok(CriteriaInput::Set(CriteriaSet::from_json(json)?)),
            Json::Object(_) => Ok(CriteriaInput::Diff(Diff::from_json(json)?)),
            other => Err(CoreError::malformed(format!(
                "expected a criteria array or a diff object, found {other}"
            ))),
        }
    }
}

macro_rules! serde_via_json {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                self.to_json().serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let json = Json::deserialize(deserializer)?;
                <$ty>::from_json(&json).map_err(serde::de::Error::custom)
            }
        }

        impl Encode for $ty {}
        impl Decode for $ty {}
    };
}

serde_via_json!(Diff);
serde_via_json!(CriteriaSet);
serde_via_json!(Criteria);

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_codec::row;

    #[test]
    fn decodes_update_scenario() {
        let json = json!([{ "values": { "x": "y" }, "where": [{ "x": [["IS NULL"]] }] }]);
        let set = CriteriaSet::from_json(&json).unwrap();
        let criteria = set.iter().next().unwrap();

        assert_eq!(criteria.value_row().unwrap(), &row! { "x" => "y" });
        let (column, conditions) = criteria.where_clause().groups()[0].iter().next().unwrap();
        assert_eq!(column, "x");
        assert_eq!(conditions[0].operator(), Operator::IsNull);
    }

    #[test]
    fn in_operands_inline_or_nested() {
        let inline = conditions_from_json("c", &json!(["IN", 1, 2, 3])).unwrap();
        let nested = conditions_from_json("c", &json!(["IN", [1, 2, 3]])).unwrap();
        assert_eq!(inline, nested);
        assert_eq!(inline[0].operands().count(), 3);
    }

    #[test]
    fn multiple_conditions_per_column() {
        let conditions = conditions_from_json("age", &json!([[">=", 18], ["<", 65]])).unwrap();
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[1].operator(), Operator::Lt);
    }

    #[test]
    fn inverse_token() {
        let conditions = conditions_from_json("c", &json!(["INVERSE LIKE", "abc"])).unwrap();
        assert!(conditions[0].is_inverted());
    }

    #[test]
    fn errors_name_the_offending_index() {
        let json = json!({ "update": [{ "values": { "a": 1 } }, { "values": { "a": [1] } }] });
        let err = Diff::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("update[1].values"), "{err}");

        let err = CriteriaSet::from_json(&json!([{ "where": [{ "a": ["=", {}] }] }])).unwrap_err();
        assert!(err.to_string().contains("criteria[0].where[0].a"), "{err}");
    }

    #[test]
    fn rejects_bad_arity_and_unknown_keys() {
        assert!(matches!(
            conditions_from_json("c", &json!(["BETWEEN", 1])),
            Err(CoreError::OperandArity { .. })
        ));
        assert!(matches!(
            conditions_from_json("c", &json!(["IN"])),
            Err(CoreError::OperandArity { .. })
        ));
        assert!(Criteria::from_json(&json!({ "limit": 1 })).is_err());
        assert!(Diff::from_json(&json!({ "merge": [] })).is_err());
    }

    #[test]
    fn diff_survives_cbor() {
        let json = json!({
            "select": [{ "where": [{ "a": ["BETWEEN", 1, 5] }, { "b": ["IS NOT NULL"] }] }],
            "delete": [{ "where": [{ "id": ["IN", [1, 2]] }] }],
        });
        let diff = Diff::from_json(&json).unwrap();
        let bytes = diff.encode_cbor().unwrap();
        assert_eq!(Diff::decode_cbor(&bytes).unwrap(), diff);

        let text = diff.encode_json().unwrap();
        assert_eq!(Diff::decode_json(&text).unwrap(), diff);
    }

    #[test]
    fn input_dispatches_on_shape() {
        assert!(matches!(
            CriteriaInput::from_json(&json!([])).unwrap(),
            CriteriaInput::Set(_)
        ));
        assert!(matches!(
            CriteriaInput::from_json(&json!({})).unwrap(),
            CriteriaInput::Diff(_)
        ));
        assert!(CriteriaInput::from_json(&json!(3)).is_err());
    }
}
