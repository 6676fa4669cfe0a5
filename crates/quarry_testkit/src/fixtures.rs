//! Test fixtures: a single-table fake database and ready-made models.
//!
//! [`TableConnection`] interprets the SQL the quarry compiler emits
//! (`SELECT`, `INSERT`, `UPDATE`, `DELETE` against one table, with a
//! `WHERE` clause running to the end of the statement) so that models,
//! statement groups, and transactions can be exercised end to end.

use quarry_codec::{row, Row, Value};
use quarry_connection::{
    Connection, ConnectionError, ConnectionResult, InMemoryConnection, Outcome, Params, Session,
};
use quarry_core::{
    AndGroup, Condition, CoreResult, Model, Operands, Operator, RowFilter, StatementGroup, Verb,
    WhereClause,
};
use regex::{Captures, Regex};
use std::sync::{Arc, OnceLock};

/// State behind a [`TableConnection`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    /// Rows in insertion order.
    pub rows: Vec<Row>,
    /// Key column, filled from a counter when an insert omits it.
    pub key: String,
    next_id: i64,
}

impl Table {
    /// Creates a table keyed on `key`.
    pub fn new(key: impl Into<String>, rows: Vec<Row>) -> Self {
        let key = key.into();
        let next_id = rows
            .iter()
            .filter_map(|row| row.get(&key).and_then(Value::as_integer))
            .max()
            .unwrap_or(0)
            + 1;
        Self { rows, key, next_id }
    }
}

/// An in-memory single-table database.
pub type TableConnection = InMemoryConnection<Table>;

/// Creates a shared [`TableConnection`] over `rows`.
///
/// SQL containing `fail` is rejected with a driver error, which makes it
/// easy to force a failing step.
pub fn table_connection(name: &str, key: &str, rows: Vec<Row>) -> Arc<TableConnection> {
    InMemoryConnection::new(name, Table::new(key, rows), interpret).shared()
}

/// Five people keyed by `id`.
pub fn people() -> Vec<Row> {
    vec![
        row! { "id" => 1, "name" => "Ada", "city" => "Oslo", "age" => 36 },
        row! { "id" => 2, "name" => "Brian", "city" => "Bergen", "age" => 41 },
        row! { "id" => 3, "name" => "Chidi", "city" => "Oslo", "age" => 29 },
        row! { "id" => 4, "name" => "Dana", "city" => "Lagos", "age" => Value::Null },
        row! { "id" => 5, "name" => "Emeka", "city" => "Lagos", "age" => 52 },
    ]
}

/// A model over `table` with select, insert, update, and delete statement
/// groups, keyed on the connection's key column.
///
/// # Errors
///
/// Fails only if `table` makes an invalid skeleton.
pub fn table_model(table: &str, conn: &Arc<TableConnection>) -> CoreResult<Model> {
    let shared: Arc<dyn Connection> = conn.clone();
    let group = |skeleton: String, verb| StatementGroup::new(shared.clone(), skeleton, verb);

    Ok(Model::new(table)
        .with_procedure(
            Verb::Select,
            group(format!("SELECT * FROM {table} WHERE <<condition>>"), Verb::Select)?,
        )
        .with_procedure(
            Verb::Insert,
            group(format!("INSERT INTO {table} <<values>>"), Verb::Insert)?,
        )
        .with_procedure(
            Verb::Update,
            group(format!("UPDATE {table} SET <<values>> WHERE <<condition>>"), Verb::Update)?,
        )
        .with_procedure(
            Verb::Delete,
            group(format!("DELETE FROM {table} WHERE <<condition>>"), Verb::Delete)?,
        )
        .with_key_columns([conn.state().key]))
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("fixture regex"))
}

fn statement(sql: &str) -> Option<(Verb, Captures<'_>)> {
    static SELECT: OnceLock<Regex> = OnceLock::new();
    static INSERT: OnceLock<Regex> = OnceLock::new();
    static UPDATE: OnceLock<Regex> = OnceLock::new();
    static DELETE: OnceLock<Regex> = OnceLock::new();

    let forms = [
        (
            Verb::Select,
            regex(&SELECT, r"(?is)^\s*SELECT\s+(.+?)\s+FROM\s+\w+(?:\s+WHERE\s+(.+?))?\s*$"),
        ),
        (
            Verb::Insert,
            regex(&INSERT, r"(?is)^\s*INSERT\s+INTO\s+\w+\s*\(([^)]*)\)\s*VALUES\s*\(([^)]*)\)\s*$"),
        ),
        (
            Verb::Update,
            regex(&UPDATE, r"(?is)^\s*UPDATE\s+\w+\s+SET\s+(.+?)(?:\s+WHERE\s+(.+?))?\s*$"),
        ),
        (
            Verb::Delete,
            regex(&DELETE, r"(?is)^\s*DELETE\s+FROM\s+\w+(?:\s+WHERE\s+(.+?))?\s*$"),
        ),
    ];
    forms
        .into_iter()
        .find_map(|(verb, re)| re.captures(sql).map(|caps| (verb, caps)))
}

fn param(params: &Params, name: &str) -> ConnectionResult<Value> {
    params
        .get(name.trim().trim_start_matches(':'))
        .cloned()
        .ok_or_else(|| ConnectionError::driver(format!("unbound parameter {name}")))
}

fn condition(caps: &Captures<'_>, params: &Params) -> ConnectionResult<(String, Condition)> {
    let invalid = |err: quarry_core::CoreError| ConnectionError::driver(err.to_string());
    let operator = |group: usize| -> ConnectionResult<Operator> {
        Operator::parse(&caps[group]).map(|(op, _)| op).map_err(invalid)
    };

    if let Some(column) = caps.get(1) {
        let operands = if caps.get(2).is_some() {
            (operator(2)?, Operands::None)
        } else if caps.get(3).is_some() {
            let low = param(params, &caps[4])?;
            let high = param(params, &caps[5])?;
            (operator(3)?, Operands::Two(low, high))
        } else if caps.get(6).is_some() {
            let values = caps[7]
                .split(',')
                .map(|slot| param(params, slot))
                .collect::<ConnectionResult<Vec<_>>>()?;
            (operator(6)?, Operands::List(values))
        } else {
            (operator(8)?, Operands::One(param(params, &caps[9])?))
        };
        let condition = Condition::new(operands.0, operands.1).map_err(invalid)?;
        return Ok((column.as_str().to_string(), condition));
    }

    // `:p OP column`
    let value = param(params, &caps[10])?;
    let condition = Condition::new(operator(11)?, Operands::One(value))
        .and_then(Condition::inverse)
        .map_err(invalid)?;
    Ok((caps[12].to_string(), condition))
}

fn where_clause(text: Option<&str>, params: &Params) -> ConnectionResult<WhereClause> {
    static PREDICATE: OnceLock<Regex> = OnceLock::new();
    let predicate = regex(
        &PREDICATE,
        r"(?ix)^\s*(?:
            ([A-Za-z_][\w.]*)\s+(?:
                (IS\s+NOT\s+NULL|IS\s+NULL)
                |(NOT\s+BETWEEN|BETWEEN)\s+(:\w+)\s+AND\s+(:\w+)
                |(NOT\s+IN|IN)\s*\(([^)]*)\)
                |(<>|<=|>=|=|<|>|NOT\s+RLIKE|RLIKE|NOT\s+LIKE|LIKE)\s+(:\w+)
            )
            |(:\w+)\s+(<>|<=|>=|=|<|>|NOT\s+RLIKE|RLIKE|NOT\s+LIKE|LIKE)\s+([A-Za-z_][\w.]*)
        )\s*(?:AND\b|$)",
    );

    let Some(text) = text.map(str::trim) else {
        return Ok(WhereClause::new());
    };
    let groups: Vec<&str> = match text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        Some(inner) => inner.split(") OR (").collect(),
        None => vec![text],
    };

    let mut clause = WhereClause::new();
    for group_text in groups {
        let mut group = AndGroup::new();
        let mut rest = group_text.trim();
        if rest == "1=1" {
            rest = "";
        }
        while !rest.trim().is_empty() {
            let caps = predicate
                .captures(rest)
                .ok_or_else(|| ConnectionError::driver(format!("cannot interpret `{rest}`")))?;
            let (column, condition) = condition(&caps, params)?;
            group.push(column, condition);
            rest = &rest[caps.get(0).map_or(rest.len(), |m| m.end())..];
        }
        clause.push(group);
    }
    Ok(clause)
}

fn selected(rows: &[Row], clause: &WhereClause) -> ConnectionResult<Vec<usize>> {
    let filter = RowFilter::new(clause).map_err(|err| ConnectionError::driver(err.to_string()))?;
    let mut hits = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        if filter
            .matches(row)
            .map_err(|err| ConnectionError::driver(err.to_string()))?
        {
            hits.push(i);
        }
    }
    Ok(hits)
}

fn split_list(text: &str) -> impl Iterator<Item = &str> {
    text.split(',').map(str::trim).filter(|part| !part.is_empty())
}

fn interpret(session: &mut Session<'_, Table>, sql: &str, params: &Params) -> ConnectionResult<Outcome> {
    if sql.contains("fail") {
        return Err(ConnectionError::driver(format!("forced failure: {sql}")));
    }
    let (verb, caps) =
        statement(sql).ok_or_else(|| ConnectionError::driver(format!("unsupported statement: {sql}")))?;

    match verb {
        Verb::Select => {
            let clause = where_clause(caps.get(2).map(|m| m.as_str()), params)?;
            let projection: Vec<&str> = split_list(&caps[1]).collect();
            let rows = selected(&session.state.rows, &clause)?
                .into_iter()
                .map(|i| {
                    let row = &session.state.rows[i];
                    if projection == ["*"] {
                        row.clone()
                    } else {
                        projection
                            .iter()
                            .map(|&column| {
                                (column.to_string(), row.get(column).cloned().unwrap_or(Value::Null))
                            })
                            .collect()
                    }
                })
                .collect();
            Ok(Outcome::rows(rows))
        }
        Verb::Insert => {
            let mut row = Row::new();
            for (column, slot) in split_list(&caps[1]).zip(split_list(&caps[2])) {
                row.insert(column.to_string(), param(params, slot)?);
            }

            let table = &mut *session.state;
            let id = match row.get(&table.key) {
                Some(Value::Integer(n)) => {
                    table.next_id = table.next_id.max(n + 1);
                    Value::Integer(*n)
                }
                Some(value) if !value.is_null() => value.clone(),
                _ => {
                    let id = Value::Integer(table.next_id);
                    table.next_id += 1;
                    row.insert(table.key.clone(), id.clone());
                    id
                }
            };
            table.rows.push(row);
            session.record_affected(id);
            Ok(Outcome::affected(1))
        }
        Verb::Update => {
            static ASSIGN: OnceLock<Regex> = OnceLock::new();
            let assign = regex(&ASSIGN, r"^\s*([A-Za-z_][\w.]*)\s*=\s*(:\w+)\s*$");

            let mut values = Row::new();
            for part in split_list(&caps[1]) {
                let pair = assign
                    .captures(part)
                    .ok_or_else(|| ConnectionError::driver(format!("cannot interpret `{part}`")))?;
                values.insert(pair[1].to_string(), param(params, &pair[2])?);
            }

            let clause = where_clause(caps.get(2).map(|m| m.as_str()), params)?;
            let hits = selected(&session.state.rows, &clause)?;
            let mut keys = Vec::with_capacity(hits.len());
            for &i in &hits {
                let row = &mut session.state.rows[i];
                row.extend(values.clone());
                keys.push(row.get(&session.state.key).cloned().unwrap_or(Value::Null));
            }
            for key in keys {
                session.record_affected(key);
            }
            Ok(Outcome::affected(hits.len() as u64))
        }
        Verb::Delete => {
            let clause = where_clause(caps.get(1).map(|m| m.as_str()), params)?;
            let hits = selected(&session.state.rows, &clause)?;
            let table = &mut *session.state;
            let mut keys = Vec::with_capacity(hits.len());
            for &i in hits.iter().rev() {
                let row = table.rows.remove(i);
                keys.push(row.get(&table.key).cloned().unwrap_or(Value::Null));
            }
            keys.reverse();
            for key in keys {
                session.record_affected(key);
            }
            Ok(Outcome::affected(hits.len() as u64))
        }
        Verb::Call => Err(ConnectionError::driver("procedures are not supported")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_connection::Connection;

    fn run(conn: &TableConnection, sql: &str, params: Params) -> Outcome {
        let handle = conn.prepare(sql).unwrap();
        conn.execute(&handle, &params).unwrap()
    }

    #[test]
    fn select_with_or_groups_and_lists() {
        let conn = table_connection("people", "id", people());
        let outcome = run(
            &conn,
            "SELECT name FROM people WHERE (city IN (:w_city_0, :w_city_1)) OR (age >= :w_age_g1)",
            row! { "w_city_0" => "Lagos", "w_city_1" => "Bergen", "w_age_g1" => 36 },
        );
        let names: Vec<String> = outcome
            .rows
            .unwrap()
            .iter()
            .map(|row| row["name"].to_string())
            .collect();
        assert_eq!(names, ["Ada", "Brian", "Dana", "Emeka"]);
    }

    #[test]
    fn between_and_null_checks() {
        let conn = table_connection("people", "id", people());
        let outcome = run(
            &conn,
            "SELECT * FROM people WHERE age BETWEEN :w_age_0 AND :w_age_1 AND city = :w_city",
            row! { "w_age_0" => 30, "w_age_1" => 45, "w_city" => "oslo" },
        );
        assert_eq!(outcome.rows.unwrap().len(), 1);

        let outcome = run(&conn, "SELECT * FROM people WHERE age IS NULL", Params::new());
        assert_eq!(outcome.rows.unwrap()[0]["name"], Value::from("Dana"));
    }

    #[test]
    fn inverted_like() {
        let conn = table_connection("patterns", "id", vec![row! { "id" => 1, "p" => "Ad%" }]);
        let outcome = run(
            &conn,
            "SELECT * FROM patterns WHERE :w_p LIKE p",
            row! { "w_p" => "Ada" },
        );
        assert_eq!(outcome.rows.unwrap().len(), 1);
    }

    #[test]
    fn insert_assigns_keys() {
        let conn = table_connection("people", "id", people());
        run(
            &conn,
            "INSERT INTO people (name) VALUES (:v_name)",
            row! { "v_name" => "Fola" },
        );
        assert_eq!(conn.take_last_affected(), vec![Value::Integer(6)]);
        assert_eq!(conn.state().rows[5]["id"], Value::Integer(6));
    }

    #[test]
    fn update_and_delete_report_keys() {
        let conn = table_connection("people", "id", people());
        run(
            &conn,
            "UPDATE people SET city = :v_city WHERE city = :w_city",
            row! { "v_city" => "Accra", "w_city" => "Lagos" },
        );
        assert_eq!(
            conn.take_last_affected(),
            vec![Value::Integer(4), Value::Integer(5)]
        );

        run(&conn, "DELETE FROM people WHERE city = :w_city", row! { "w_city" => "Accra" });
        assert_eq!(conn.state().rows.len(), 3);
    }

    #[test]
    fn forced_failure() {
        let conn = table_connection("people", "id", people());
        let handle = conn.prepare("INSERT fail").unwrap();
        assert!(conn.execute(&handle, &Params::new()).is_err());
    }
}
