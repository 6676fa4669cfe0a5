//! Structural keys for criteria deduplication.

use crate::criteria::Criteria;
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 of a criterion's normalized shape.
///
/// Two criteria share a key exactly when they render to the same SQL:
/// same value columns, same where columns per group, same operators in the
/// same per-column order, same `IN` list lengths. Key order within a map
/// and literal values are ignored; the order of OR-groups is not.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeKey([u8; 32]);

impl ShapeKey {
    /// Computes the key for `criteria`.
    #[must_use]
    pub fn of(criteria: &Criteria) -> Self {
        let mut hasher = Sha256::new();

        let mut value_columns: Vec<&str> = criteria
            .value_row()
            .map(|row| row.keys().map(String::as_str).collect())
            .unwrap_or_default();
        value_columns.sort_unstable();

        write_len(&mut hasher, value_columns.len());
        for column in value_columns {
            write_str(&mut hasher, column);
        }

        let groups = criteria.where_clause().groups();
        write_len(&mut hasher, groups.len());
        for group in groups {
            let mut columns: Vec<_> = group.iter().collect();
            columns.sort_unstable_by(|a, b| a.0.cmp(b.0));

            write_len(&mut hasher, columns.len());
            for (column, conditions) in columns {
                write_str(&mut hasher, column);
                write_len(&mut hasher, conditions.len());
                for condition in conditions {
                    let shape = condition.shape();
                    write_str(&mut hasher, shape.operator.sql());
                    hasher.update([u8::from(shape.inverted)]);
                    write_len(&mut hasher, shape.slots);
                }
            }
        }

        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hasher.finalize());
        Self(digest)
    }

    /// The raw digest.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

fn write_len(hasher: &mut Sha256, len: usize) {
    hasher.update((len as u64).to_le_bytes());
}

fn write_str(hasher: &mut Sha256, s: &str) {
    write_len(hasher, s.len());
    hasher.update(s.as_bytes());
}

impl fmt::Display for ShapeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ShapeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShapeKey({self})")
    }
}
