//! In-place multi-column sorting.

use super::Model;
use crate::error::CoreResult;
use quarry_codec::{Row, Value};
use std::cmp::Ordering;

/// Sort direction for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Smallest first; NULLs lead.
    #[default]
    Ascending,
    /// Largest first; NULLs trail.
    Descending,
}

/// One column of a sort order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    column: String,
    direction: SortDirection,
    case_insensitive: bool,
}

impl SortKey {
    /// Ascending on `column`.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Ascending,
            case_insensitive: false,
        }
    }

    /// Descending on `column`.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            direction: SortDirection::Descending,
            ..Self::asc(column)
        }
    }

    /// Compares text ignoring case.
    #[must_use]
    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    /// The sorted column.
    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    /// The direction.
    #[must_use]
    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    fn compare(&self, a: &Row, b: &Row) -> Ordering {
        let left = a.get(&self.column).unwrap_or(&Value::Null);
        let right = b.get(&self.column).unwrap_or(&Value::Null);

        let ordering = match (left, right) {
            (Value::Text(x), Value::Text(y)) if self.case_insensitive => {
                x.to_lowercase().cmp(&y.to_lowercase())
            }
            _ => left.cmp_total(right),
        };
        match self.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

impl Model {
    /// Reorders the rows by `keys`, first key most significant.
    ///
    /// The sort is stable and permanent: it reorders the model's own rows,
    /// and the filter is reapplied afterwards. Mixed types order as NULL,
    /// booleans, numbers, then text.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownColumn`](crate::CoreError::UnknownColumn)
    /// for a key the model does not have.
    pub fn sort(&mut self, keys: &[SortKey]) -> CoreResult<()> {
        for key in keys {
            self.require_column(&key.column)?;
        }
        if keys.is_empty() {
            return Ok(());
        }

        self.rows.sort_by(|a, b| {
            keys.iter()
                .map(|key| key.compare(a, b))
                .find(|ordering| ordering.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        self.refresh_visible()
    }
}
