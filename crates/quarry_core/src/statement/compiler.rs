//! Criteria-to-SQL compilation.
//!
//! A [`Skeleton`] is caller SQL with up to three markers:
//!
//! | marker          | renders as                                        |
//! |-----------------|---------------------------------------------------|
//! | `<<columns>>`   | projection from `values` keys, or `*`             |
//! | `<<values>>`    | `(a, b) VALUES (:v_a, :v_b)` / `a = :v_a, ...`    |
//! | `<<condition>>` | `(a = :w_a AND ...) OR (...)`, or `1=1` if empty  |
//!
//! Criteria are bucketed by [`ShapeKey`]; each bucket renders once and
//! every criterion in it becomes one parameter set.

use super::placeholders::{sanitize, validate_identifier};
use super::shape::ShapeKey;
use crate::criteria::{Condition, Criteria, CriteriaSet, Operands, WhereClause};
use crate::error::{CoreError, CoreResult};
use crate::types::Verb;
use indexmap::{IndexMap, IndexSet};
use quarry_connection::Params;
use quarry_codec::Row;

/// Projection marker.
pub const COLUMNS_MARKER: &str = "<<columns>>";
/// Values marker.
pub const VALUES_MARKER: &str = "<<values>>";
/// Where-clause marker.
pub const CONDITION_MARKER: &str = "<<condition>>";

const MARKERS: [&str; 3] = [COLUMNS_MARKER, VALUES_MARKER, CONDITION_MARKER];

/// A SQL template checked for known markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skeleton {
    text: String,
}

impl Skeleton {
    /// Checks `text` for unknown `<<name>>` markers.
    ///
    /// Only `<<` directly followed by an identifier and `>>` counts as a
    /// marker, so shifts like `a << 2` and text inside `'...'` literals
    /// pass through untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSkeleton`] for empty text or an unknown
    /// marker.
    pub fn parse(text: impl Into<String>) -> CoreResult<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(CoreError::invalid_skeleton("empty skeleton"));
        }

        let bytes = text.as_bytes();
        let mut in_literal = false;
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\'' => {
                    in_literal = !in_literal;
                    i += 1;
                }
                b'<' if !in_literal && bytes.get(i + 1) == Some(&b'<') => match marker_at(&text, i) {
                    Some(marker) => {
                        if !MARKERS.contains(&marker) {
                            return Err(CoreError::invalid_skeleton(format!("unknown marker `{marker}`")));
                        }
                        i += marker.len();
                    }
                    None => i += 2,
                },
                _ => i += 1,
            }
        }
        Ok(Self { text })
    }

    /// The template text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether `marker` occurs in the template.
    #[must_use]
    pub fn has(&self, marker: &str) -> bool {
        self.text.contains(marker)
    }
}

/// The `<<name>>` token starting at byte `start`, if there is one.
fn marker_at(text: &str, start: usize) -> Option<&str> {
    let tail = &text[start + 2..];
    let len = tail
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count();
    (len > 0 && tail[len..].starts_with(">>")).then(|| &text[start..start + len + 4])
}

/// One rendered statement and the parameter sets that execute it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    /// Rendered SQL.
    pub sql: String,
    /// The shape every criterion in this bucket shares.
    pub shape: ShapeKey,
    /// One parameter set per criterion, in input order.
    pub params: Vec<Params>,
    /// Index of each contributing criterion in the input set.
    pub sources: Vec<usize>,
}

fn value_name(column: &str) -> String {
    format!("v_{}", sanitize(column))
}

fn where_name(column: &str, group: usize, condition: usize) -> String {
    let mut name = format!("w_{}", sanitize(column));
    if group > 0 {
        name.push_str(&format!("_g{group}"));
    }
    if condition > 0 {
        name.push_str(&format!("_c{condition}"));
    }
    name
}

/// Slot of one where operand: group, column, condition, operand index.
type SlotKey = (usize, String, usize, usize);

/// Placeholder names for one criterion, unique by construction.
///
/// Names are claimed in shape order (sorted value columns, then groups with
/// sorted columns), so every criterion in a bucket gets the same names. A
/// wanted name that is already taken gets a `__{n}` suffix.
#[derive(Default)]
struct Placeholders {
    taken: IndexSet<String>,
    values: IndexMap<String, String>,
    slots: IndexMap<SlotKey, String>,
}

impl Placeholders {
    fn of(criteria: &Criteria) -> Self {
        let mut names = Self::default();

        if let Some(row) = criteria.value_row() {
            let mut columns: Vec<&String> = row.keys().collect();
            columns.sort_unstable();
            for column in columns {
                let name = names.claim(value_name(column));
                names.values.insert(column.clone(), name);
            }
        }

        for (g, group) in criteria.where_clause().groups().iter().enumerate() {
            let mut columns: Vec<_> = group.iter().collect();
            columns.sort_unstable_by(|a, b| a.0.cmp(b.0));
            for (column, conditions) in columns {
                for (c, condition) in conditions.iter().enumerate() {
                    let base = where_name(column, g, c);
                    match condition.operands() {
                        Operands::None => {}
                        Operands::One(_) => {
                            let name = names.claim(base);
                            names.slots.insert((g, column.to_string(), c, 0), name);
                        }
                        operands => {
                            for k in 0..operands.values().len() {
                                let name = names.claim(format!("{base}_{k}"));
                                names.slots.insert((g, column.to_string(), c, k), name);
                            }
                        }
                    }
                }
            }
        }
        names
    }

    fn claim(&mut self, wanted: String) -> String {
        let mut name = wanted.clone();
        let mut n = 1;
        while !self.taken.insert(name.clone()) {
            name = format!("{wanted}__{n}");
            n += 1;
        }
        name
    }

    fn value(&self, column: &str) -> CoreResult<&str> {
        self.values
            .get(column)
            .map(String::as_str)
            .ok_or_else(|| CoreError::InvalidIdentifier { name: column.to_string() })
    }

    fn slot(&self, group: usize, column: &str, condition: usize, k: usize) -> CoreResult<&str> {
        self.slots
            .get(&(group, column.to_string(), condition, k))
            .map(String::as_str)
            .ok_or_else(|| CoreError::InvalidIdentifier { name: column.to_string() })
    }
}

fn render_condition(
    column: &str,
    at: (usize, usize),
    condition: &Condition,
    names: &Placeholders,
) -> CoreResult<String> {
    let (g, c) = at;
    let op = condition.operator().sql();
    Ok(match condition.operands() {
        Operands::None => format!("{column} {op}"),
        Operands::One(_) => {
            let p = names.slot(g, column, c, 0)?;
            if condition.is_inverted() {
                format!(":{p} {op} {column}")
            } else {
                format!("{column} {op} :{p}")
            }
        }
        Operands::Two(..) => {
            let low = names.slot(g, column, c, 0)?;
            let high = names.slot(g, column, c, 1)?;
            format!("{column} {op} :{low} AND :{high}")
        }
        Operands::List(values) => {
            let slots = (0..values.len())
                .map(|k| names.slot(g, column, c, k).map(|p| format!(":{p}")))
                .collect::<CoreResult<Vec<_>>>()?;
            format!("{column} {op} ({})", slots.join(", "))
        }
    })
}

fn render_where(clause: &WhereClause, names: &Placeholders) -> CoreResult<String> {
    if clause.is_empty() {
        return Ok("1=1".to_string());
    }

    let groups = clause.groups();
    let mut rendered = Vec::with_capacity(groups.len());
    for (g, group) in groups.iter().enumerate() {
        let mut parts = Vec::new();
        for (column, conditions) in group.iter() {
            for (c, condition) in conditions.iter().enumerate() {
                parts.push(render_condition(column, (g, c), condition, names)?);
            }
        }
        rendered.push(if parts.is_empty() {
            "1=1".to_string()
        } else {
            parts.join(" AND ")
        });
    }

    Ok(if rendered.len() == 1 {
        rendered.remove(0)
    } else {
        rendered
            .into_iter()
            .map(|part| format!("({part})"))
            .collect::<Vec<_>>()
            .join(" OR ")
    })
}

fn render_values(verb: Verb, values: Option<&Row>, names: &Placeholders) -> CoreResult<String> {
    let columns: Vec<&str> = values
        .map(|row| row.keys().map(String::as_str).collect())
        .unwrap_or_default();
    let placeholders = columns
        .iter()
        .map(|column| names.value(column).map(|p| format!(":{p}")))
        .collect::<CoreResult<Vec<_>>>()?;

    match verb {
        Verb::Insert => Ok(format!(
            "({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        )),
        Verb::Update => Ok(columns
            .iter()
            .zip(&placeholders)
            .map(|(column, p)| format!("{column} = {p}"))
            .collect::<Vec<_>>()
            .join(", ")),
        Verb::Call => Ok(placeholders.join(", ")),
        Verb::Select | Verb::Delete => Err(CoreError::invalid_skeleton(format!(
            "{VALUES_MARKER} is not valid in a {verb} skeleton"
        ))),
    }
}

fn render_columns(values: Option<&Row>) -> String {
    match values {
        Some(row) if !row.is_empty() => row.keys().map(String::as_str).collect::<Vec<_>>().join(", "),
        _ => "*".to_string(),
    }
}

fn render(skeleton: &Skeleton, verb: Verb, criteria: &Criteria) -> CoreResult<String> {
    let names = Placeholders::of(criteria);
    let mut sql = skeleton.text().to_string();

    if skeleton.has(VALUES_MARKER) {
        let values = render_values(verb, criteria.value_row(), &names)?;
        sql = sql.replace(VALUES_MARKER, &values);
    }
    if skeleton.has(CONDITION_MARKER) {
        let condition = render_where(criteria.where_clause(), &names)?;
        sql = sql.replace(CONDITION_MARKER, &condition);
    }
    if skeleton.has(COLUMNS_MARKER) {
        sql = sql.replace(COLUMNS_MARKER, &render_columns(criteria.value_row()));
    }
    Ok(sql)
}

/// Binds one criterion under the names [`render`] produced for its bucket.
fn bind(skeleton: &Skeleton, verb: Verb, criteria: &Criteria) -> Params {
    let names = Placeholders::of(criteria);
    let mut params = Params::new();

    if skeleton.has(VALUES_MARKER) && matches!(verb, Verb::Insert | Verb::Update | Verb::Call) {
        if let Some(values) = criteria.value_row() {
            for (column, value) in values {
                if let Ok(name) = names.value(column) {
                    params.insert(name.to_string(), value.clone());
                }
            }
        }
    }

    if skeleton.has(CONDITION_MARKER) {
        for (g, group) in criteria.where_clause().groups().iter().enumerate() {
            for (column, conditions) in group.iter() {
                for (c, condition) in conditions.iter().enumerate() {
                    for (k, value) in condition.operands().values().into_iter().enumerate() {
                        if let Ok(name) = names.slot(g, column, c, k) {
                            params.insert(name.to_string(), value.clone());
                        }
                    }
                }
            }
        }
    }
    params
}

fn check(skeleton: &Skeleton, verb: Verb, index: usize, criteria: &Criteria) -> CoreResult<()> {
    let has_values = criteria.value_row().is_some_and(|row| !row.is_empty());
    let has_where = !criteria.where_clause().is_empty();

    match verb {
        Verb::Insert | Verb::Update if !has_values => {
            return Err(CoreError::MissingKey {
                index,
                verb,
                key: "values",
            })
        }
        Verb::Insert if has_where => {
            return Err(CoreError::UnexpectedKey {
                index,
                verb,
                key: "where",
            })
        }
        Verb::Delete if has_values => {
            return Err(CoreError::UnexpectedKey {
                index,
                verb,
                key: "values",
            })
        }
        _ => {}
    }

    if matches!(verb, Verb::Insert | Verb::Update) && !skeleton.has(VALUES_MARKER) {
        return Err(CoreError::invalid_skeleton(format!(
            "{verb} criteria need a {VALUES_MARKER} marker"
        )));
    }
    if has_where && !skeleton.has(CONDITION_MARKER) {
        return Err(CoreError::invalid_skeleton(format!(
            "criterion {index} has a where clause but the skeleton has no {CONDITION_MARKER} marker"
        )));
    }

    if let Some(values) = criteria.value_row() {
        for column in values.keys() {
            validate_identifier(column)?;
        }
    }
    for group in criteria.where_clause().groups() {
        for (column, conditions) in group.iter() {
            validate_identifier(column)?;
            for condition in conditions {
                condition.validate()?;
            }
        }
    }
    Ok(())
}

/// Compiles `criteria` against `skeleton` into the fewest statements that
/// cover every criterion.
///
/// Statements come out in the order their shape was first seen.
///
/// # Errors
///
/// Fails on the first invalid criterion (naming its index), on an unusable
/// skeleton, or on an identifier that cannot be rendered.
pub fn compile(skeleton: &Skeleton, verb: Verb, criteria: &CriteriaSet) -> CoreResult<Vec<CompiledStatement>> {
    let mut buckets: IndexMap<ShapeKey, CompiledStatement> = IndexMap::new();

    for (index, criterion) in criteria.iter().enumerate() {
        check(skeleton, verb, index, criterion)?;

        let shape = ShapeKey::of(criterion);
        let params = bind(skeleton, verb, criterion);
        match buckets.get_mut(&shape) {
            Some(bucket) => {
                bucket.params.push(params);
                bucket.sources.push(index);
            }
            None => {
                let sql = render(skeleton, verb, criterion)?;
                buckets.insert(
                    shape,
                    CompiledStatement {
                        sql,
                        shape,
                        params: vec![params],
                        sources: vec![index],
                    },
                );
            }
        }
    }

    tracing::debug!(
        verb = %verb,
        criteria = criteria.len(),
        statements = buckets.len(),
        "compiled criteria"
    );
    Ok(buckets.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{equals, AndGroup, Condition};
    use quarry_codec::{row, Value};

    fn skeleton(text: &str) -> Skeleton {
        Skeleton::parse(text).unwrap()
    }

    #[test]
    fn update_with_is_null() {
        let set: CriteriaSet = Criteria::with_values(row! { "x" => "y" })
            .filter(AndGroup::new().with("x", Condition::is_null()))
            .into();
        let compiled = compile(
            &skeleton("UPDATE t SET <<values>> WHERE <<condition>>"),
            Verb::Update,
            &set,
        )
        .unwrap();

        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].sql, "UPDATE t SET x = :v_x WHERE x IS NULL");
        assert_eq!(compiled[0].params, vec![row! { "v_x" => "y" }]);
    }

    #[test]
    fn same_shape_shares_a_statement() {
        let set: CriteriaSet = (0..10)
            .map(|i| Criteria::with_where(AndGroup::new().with("id", Condition::in_list(i..i + 5))))
            .collect();
        let compiled = compile(&skeleton("SELECT * FROM t WHERE <<condition>>"), Verb::Select, &set).unwrap();

        assert_eq!(compiled.len(), 1);
        assert_eq!(
            compiled[0].sql,
            "SELECT * FROM t WHERE id IN (:w_id_0, :w_id_1, :w_id_2, :w_id_3, :w_id_4)"
        );
        assert_eq!(compiled[0].params.len(), 10);
        assert_eq!(compiled[0].params[3]["w_id_0"], Value::Integer(3));
    }

    #[test]
    fn different_in_lengths_split() {
        let set: CriteriaSet = vec![
            Criteria::with_where(AndGroup::new().with("id", Condition::in_list([1, 2, 3]))),
            Criteria::with_where(AndGroup::new().with("id", Condition::in_list([1, 2, 3, 4, 5]))),
        ]
        .into();
        let compiled = compile(&skeleton("SELECT * FROM t WHERE <<condition>>"), Verb::Select, &set).unwrap();
        assert_eq!(compiled.len(), 2);
        assert_eq!(compiled[1].sources, vec![1]);
    }

    #[test]
    fn insert_renders_values() {
        let set: CriteriaSet = vec![
            Criteria::with_values(row! { "name" => "a", "age" => 1 }),
            Criteria::with_values(row! { "age" => 2, "name" => "b" }),
        ]
        .into();
        let compiled = compile(&skeleton("INSERT INTO people <<values>>"), Verb::Insert, &set).unwrap();

        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].sql, "INSERT INTO people (name, age) VALUES (:v_name, :v_age)");
        assert_eq!(compiled[0].params[1]["v_name"], Value::from("b"));
    }

    #[test]
    fn or_groups_and_operand_shapes() {
        let clause = WhereClause::single(
            AndGroup::new()
                .with("age", Condition::between(18, 65))
                .with("name", Condition::like("a%").inverse().unwrap()),
        )
        .or(AndGroup::new().with("age", Condition::gt(90)).with("age", Condition::lt(100)));
        let compiled = compile(
            &skeleton("SELECT <<columns>> FROM t WHERE <<condition>>"),
            Verb::Select,
            &Criteria::with_where(clause).into(),
        )
        .unwrap();

        assert_eq!(
            compiled[0].sql,
            "SELECT * FROM t WHERE (age BETWEEN :w_age_0 AND :w_age_1 AND :w_name LIKE name) \
             OR (age > :w_age_g1 AND age < :w_age_g1_c1)"
        );
        let names: Vec<&str> = compiled[0].params[0].keys().map(String::as_str).collect();
        assert_eq!(names, vec!["w_age_0", "w_age_1", "w_name", "w_age_g1", "w_age_g1_c1"]);
    }

    #[test]
    fn empty_where_is_tautology_and_projection_uses_values() {
        let compiled = compile(
            &skeleton("SELECT <<columns>> FROM t WHERE <<condition>>"),
            Verb::Select,
            &Criteria::with_values(row! { "id" => Value::Null, "t.name" => Value::Null }).into(),
        )
        .unwrap();
        assert_eq!(compiled[0].sql, "SELECT id, t.name FROM t WHERE 1=1");
        assert!(compiled[0].params[0].is_empty());
    }

    #[test]
    fn missing_and_unexpected_keys_name_the_index() {
        let set: CriteriaSet = vec![
            Criteria::with_values(row! { "x" => 1 }),
            Criteria::with_where(equals([("x", 1)])),
        ]
        .into();
        let err = compile(&skeleton("UPDATE t SET <<values>> WHERE <<condition>>"), Verb::Update, &set)
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingKey { index: 1, key: "values", .. }));

        let err = compile(
            &skeleton("DELETE FROM t WHERE <<condition>>"),
            Verb::Delete,
            &Criteria::with_values(row! { "x" => 1 }).into(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::UnexpectedKey { index: 0, key: "values", .. }));
    }

    #[test]
    fn rejects_bad_identifiers() {
        let err = compile(
            &skeleton("SELECT * FROM t WHERE <<condition>>"),
            Verb::Select,
            &Criteria::with_where(equals([("x; --", 1)])).into(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidIdentifier { .. }));
    }

    #[test]
    fn lookalike_columns_get_distinct_placeholders() {
        let compiled = compile(
            &skeleton("SELECT * FROM t WHERE <<condition>>"),
            Verb::Select,
            &Criteria::with_where(equals([("a.b", 1), ("a_b", 2)])).into(),
        )
        .unwrap();
        assert_eq!(compiled[0].sql, "SELECT * FROM t WHERE a.b = :w_a_b AND a_b = :w_a_b__1");
        assert_eq!(compiled[0].params[0]["w_a_b"], Value::Integer(1));
        assert_eq!(compiled[0].params[0]["w_a_b__1"], Value::Integer(2));

        let compiled = compile(
            &skeleton("SELECT * FROM t WHERE <<condition>>"),
            Verb::Select,
            &Criteria::with_where(
                WhereClause::single(AndGroup::new().with("a_g1", Condition::eq(1)))
                    .or(AndGroup::new().with("a", Condition::eq(2))),
            )
            .into(),
        )
        .unwrap();
        assert_eq!(
            compiled[0].sql,
            "SELECT * FROM t WHERE (a_g1 = :w_a_g1) OR (a = :w_a_g1__1)"
        );
        assert_eq!(compiled[0].params[0].len(), 2);
    }

    #[test]
    fn range_slots_do_not_clash_with_suffixed_columns() {
        let set: CriteriaSet = vec![
            Criteria::with_where(
                AndGroup::new()
                    .with("a_0", Condition::eq(5))
                    .with("a", Condition::between(1, 2)),
            ),
            Criteria::with_where(
                AndGroup::new()
                    .with("a", Condition::between(3, 4))
                    .with("a_0", Condition::eq(6)),
            ),
        ]
        .into();
        let compiled = compile(&skeleton("DELETE FROM t WHERE <<condition>>"), Verb::Delete, &set).unwrap();

        assert_eq!(compiled.len(), 1);
        assert_eq!(
            compiled[0].sql,
            "DELETE FROM t WHERE a_0 = :w_a_0__1 AND a BETWEEN :w_a_0 AND :w_a_1"
        );
        assert_eq!(
            compiled[0].params,
            vec![
                row! { "w_a_0" => 1, "w_a_1" => 2, "w_a_0__1" => 5 },
                row! { "w_a_0" => 3, "w_a_1" => 4, "w_a_0__1" => 6 },
            ]
        );
    }

    #[test]
    fn skeleton_markers() {
        assert!(Skeleton::parse("SELECT <<colums>> FROM t").is_err());
        assert!(Skeleton::parse("SELECT * FROM t WHERE <<nope>> AND <<condition>>").is_err());
        assert!(Skeleton::parse("  ").is_err());

        let err = compile(
            &skeleton("SELECT * FROM t <<values>>"),
            Verb::Select,
            &Criteria::new().into(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidSkeleton { .. }));
    }

    #[test]
    fn shifts_and_literals_are_not_markers() {
        assert!(Skeleton::parse("SELECT a << 2 FROM t").is_ok());
        assert!(Skeleton::parse("SELECT 1 << n, m >> 1 FROM t").is_ok());
        assert!(Skeleton::parse("SELECT '<<' || name FROM t WHERE <<condition>>").is_ok());
        assert!(Skeleton::parse("SELECT '<<draft>>' AS tag FROM t").is_ok());
        assert!(Skeleton::parse("SELECT a<<b>>c FROM t").is_err());

        let compiled = compile(
            &skeleton("SELECT flags << 1 FROM t WHERE <<condition>>"),
            Verb::Select,
            &Criteria::with_where(equals([("id", 7)])).into(),
        )
        .unwrap();
        assert_eq!(compiled[0].sql, "SELECT flags << 1 FROM t WHERE id = :w_id");
    }

    #[test]
    fn where_without_condition_marker_is_rejected() {
        let err = compile(
            &skeleton("SELECT * FROM t"),
            Verb::Select,
            &Criteria::with_where(equals([("a", 1)])).into(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidSkeleton { .. }));
    }

    #[test]
    fn call_binds_values_positionally() {
        let compiled = compile(
            &skeleton("CALL refresh(<<values>>)"),
            Verb::Call,
            &Criteria::with_values(row! { "since" => 5 }).into(),
        )
        .unwrap();
        assert_eq!(compiled[0].sql, "CALL refresh(:v_since)");
        assert_eq!(compiled[0].params[0]["v_since"], Value::Integer(5));
    }
}
