//! Named placeholder discovery and identifier checks.

use crate::error::{CoreError, CoreResult};
use indexmap::IndexSet;
use regex::Regex;
use std::sync::OnceLock;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
            .unwrap_or_else(|e| unreachable!("identifier pattern is valid: {e}"))
    })
}

/// Checks that `name` is safe to splice into SQL as a column reference.
///
/// # Errors
///
/// Returns [`CoreError::InvalidIdentifier`] otherwise.
pub fn validate_identifier(name: &str) -> CoreResult<()> {
    if identifier_pattern().is_match(name) {
        Ok(())
    } else {
        Err(CoreError::InvalidIdentifier {
            name: name.to_string(),
        })
    }
}

/// Turns a (possibly qualified) column name into a placeholder-safe stem.
#[must_use]
pub fn sanitize(column: &str) -> String {
    column.replace('.', "_")
}

/// Collects the `:name` placeholders in `sql`, first occurrence first.
///
/// Quoted strings, quoted identifiers, comments, and `::` casts are skipped.
#[must_use]
pub fn scan(sql: &str) -> IndexSet<String> {
    let bytes = sql.as_bytes();
    let mut found = IndexSet::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == quote {
                        // Doubled quote is an escaped quote.
                        if bytes.get(i + 1) == Some(&quote) {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i += 1;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 2;
            }
            b':' if bytes.get(i + 1) == Some(&b':') => i += 2,
            b':' => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
                {
                    end += 1;
                }
                if end > start && !bytes[start].is_ascii_digit() {
                    found.insert(sql[start..end].to_string());
                }
                i = end.max(i + 1);
            }
            _ => i += 1,
        }
    }
    found
}
