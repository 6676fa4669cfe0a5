//! Diff command implementation.

use super::{read_json, Format};
use quarry_codec::rows_from_json;
use quarry_core::{Diff, Verb};
use std::path::Path;

/// Runs the diff command.
pub fn run(before: &Path, after: &Path, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let diff = diff_files(before, after)?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&diff.to_json())?),
        Format::Text => print_text_output(&diff),
    }
    Ok(())
}

/// Reads two JSON row arrays and diffs them.
pub fn diff_files(before: &Path, after: &Path) -> Result<Diff, Box<dyn std::error::Error>> {
    let before = rows_from_json(&read_json(before)?)?;
    let after = rows_from_json(&read_json(after)?)?;
    let diff = Diff::between(&before, &after);
    tracing::debug!(
        before = before.len(),
        after = after.len(),
        deleted = diff.delete.len(),
        inserted = diff.insert.len(),
        "diffed rows"
    );
    Ok(diff)
}

fn print_text_output(diff: &Diff) {
    if diff.is_empty() {
        println!("No changes");
        return;
    }
    for verb in [Verb::Delete, Verb::Insert] {
        let list = diff.list(verb);
        if list.is_empty() {
            continue;
        }
        println!("{verb} ({}):", list.len());
        for criteria in list.iter() {
            println!("  {}", criteria.to_json());
        }
    }
}
