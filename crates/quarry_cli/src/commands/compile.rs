//! Compile command implementation.

use super::{read_json, Format};
use quarry_core::{compile, CompiledStatement, CriteriaInput, Params, Skeleton, Verb};
use serde::Serialize;
use std::path::Path;

/// One compiled statement, as printed.
#[derive(Debug, Serialize)]
pub struct StatementReport {
    /// Rendered SQL.
    pub sql: String,
    /// Short shape fingerprint.
    pub shape: String,
    /// Input positions of the criteria bucketed here.
    pub sources: Vec<usize>,
    /// One parameter set per source.
    pub params: Vec<Params>,
}

impl From<CompiledStatement> for StatementReport {
    fn from(statement: CompiledStatement) -> Self {
        Self {
            sql: statement.sql,
            shape: statement.shape.to_string(),
            sources: statement.sources,
            params: statement.params,
        }
    }
}

/// Runs the compile command.
pub fn run(
    skeleton: &str,
    verb: Verb,
    criteria: &Path,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let reports = compile_file(skeleton, verb, criteria)?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        Format::Text => print_text_output(&reports),
    }
    Ok(())
}

/// Compiles the criteria in `criteria` against `skeleton`.
///
/// A diff envelope contributes only the list for `verb`.
pub fn compile_file(
    skeleton: &str,
    verb: Verb,
    criteria: &Path,
) -> Result<Vec<StatementReport>, Box<dyn std::error::Error>> {
    let skeleton = Skeleton::parse(skeleton)?;
    let json = read_json(criteria)?;
    let set = CriteriaInput::from_json(&json)?.into_set(verb);
    tracing::debug!(verb = %verb, criteria = set.len(), "compiling");

    let statements = compile(&skeleton, verb, &set)?;
    Ok(statements.into_iter().map(StatementReport::from).collect())
}

fn print_text_output(reports: &[StatementReport]) {
    for (i, report) in reports.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{}", report.sql);
        println!("  shape:   {}", report.shape);
        println!("  sources: {:?}", report.sources);
        for params in &report.params {
            let rendered: Vec<String> = params
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            println!("  - {}", rendered.join(", "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    fn write_temp(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn same_shape_criteria_share_a_statement() {
        let temp = tempdir().unwrap();
        let path = write_temp(
            &temp,
            "same_shape.json",
            r#"[{"where": [{"city": ["=", "Oslo"]}]}, {"where": [{"city": ["=", "Lagos"]}]}]"#,
        );
        let reports = compile_file("SELECT * FROM people WHERE <<condition>>", Verb::Select, &path)
            .unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].sql, "SELECT * FROM people WHERE city = :w_city");
        assert_eq!(reports[0].sources, vec![0, 1]);
    }

    #[test]
    fn diff_envelope_uses_the_verb_list() {
        let temp = tempdir().unwrap();
        let path = write_temp(
            &temp,
            "envelope.json",
            r#"{"insert": [{"values": {"name": "Ada"}}], "delete": [{"where": [{"id": ["=", 1]}]}]}"#,
        );
        let reports =
            compile_file("DELETE FROM people WHERE <<condition>>", Verb::Delete, &path).unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].sql, "DELETE FROM people WHERE id = :w_id");
    }

    #[test]
    fn bad_skeleton_is_reported() {
        let temp = tempdir().unwrap();
        let path = write_temp(&temp, "unused.json", "[]");
        assert!(compile_file("SELECT <<nope>>", Verb::Select, &path).is_err());
    }
}
