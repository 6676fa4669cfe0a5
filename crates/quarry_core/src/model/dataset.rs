//! The in-memory dataset and its remote synchronization.

use crate::config::Config;
use crate::criteria::{AndGroup, Criteria, CriteriaInput, CriteriaSet, Diff, RowFilter, WhereClause};
use crate::error::{CoreError, CoreResult};
use crate::procedure::{Output, Payload, Procedure};
use crate::types::Verb;
use indexmap::{IndexMap, IndexSet};
use quarry_codec::{Row, Value};
use std::time::SystemTime;

/// Rows handed to [`Model::insert`], [`Model::update`], or
/// [`Model::delete`].
#[derive(Debug, Clone, PartialEq)]
pub enum Changes {
    /// Whole rows. Converted to parameter sets or criteria to suit the
    /// procedure.
    Rows(Vec<Row>),
    /// Criteria, passed through.
    Criteria(CriteriaInput),
    /// A payload passed through untouched.
    Payload(Payload),
}

impl From<Vec<Row>> for Changes {
    fn from(rows: Vec<Row>) -> Self {
        Changes::Rows(rows)
    }
}

impl From<Row> for Changes {
    fn from(row: Row) -> Self {
        Changes::Rows(vec![row])
    }
}

impl From<CriteriaSet> for Changes {
    fn from(criteria: CriteriaSet) -> Self {
        Changes::Criteria(criteria.into())
    }
}

impl From<Criteria> for Changes {
    fn from(criteria: Criteria) -> Self {
        Changes::Criteria(criteria.into())
    }
}

impl From<Diff> for Changes {
    fn from(diff: Diff) -> Self {
        Changes::Criteria(diff.into())
    }
}

impl From<Payload> for Changes {
    fn from(payload: Payload) -> Self {
        Changes::Payload(payload)
    }
}

/// An in-memory table, optionally bound to select, insert, update, and
/// delete procedures.
///
/// A model without procedures is a detached table. Models produced by
/// [`join`](Self::join) and [`pivot`](Self::pivot) are always detached.
///
/// # Filtering
///
/// [`set_filter`](Self::set_filter) replaces the active filter; filters
/// never stack. Accessors such as [`data`](Self::data), [`row`](Self::row),
/// and [`len`](Self::len) see only rows that pass it. Filters are
/// evaluated locally and are not sent to the select procedure.
///
/// # Synchronization
///
/// Each data-changing call re-selects afterwards unless
/// `Config::auto_select` is off or the call is part of
/// [`synchronize`](Self::synchronize), which re-selects once at the end.
#[derive(Debug, Clone)]
pub struct Model {
    pub(super) name: String,
    pub(super) config: Config,
    pub(super) rows: Vec<Row>,
    pub(super) columns: IndexSet<String>,
    filter: Option<CriteriaSet>,
    pub(super) visible: Vec<usize>,
    procedures: IndexMap<Verb, Procedure>,
    key_columns: Vec<String>,
    last_query: Option<SystemTime>,
    last_diff: Option<Diff>,
    last_affected: Vec<Value>,
    batching: bool,
}

impl Model {
    /// Creates an empty, detached model.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Config::default(),
            rows: Vec::new(),
            columns: IndexSet::new(),
            filter: None,
            visible: Vec::new(),
            procedures: IndexMap::new(),
            key_columns: Vec::new(),
            last_query: None,
            last_diff: None,
            last_affected: Vec::new(),
            batching: false,
        }
    }

    /// Creates a detached model holding `rows`.
    pub fn from_rows(name: impl Into<String>, rows: Vec<Row>) -> Self {
        let mut model = Self::new(name);
        let columns = rows.iter().flat_map(|row| row.keys().cloned()).collect();
        model.replace_rows(rows, columns);
        model
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Binds a procedure for `verb`.
    #[must_use]
    pub fn with_procedure(mut self, verb: Verb, procedure: impl Into<Procedure>) -> Self {
        self.procedures.insert(verb, procedure.into());
        self
    }

    /// Names the identity columns used when rows feed a statement group:
    /// updates set the other columns where the keys match, deletes match
    /// on the keys alone.
    #[must_use]
    pub fn with_key_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Instance name, used to qualify ambiguous join columns.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The procedure bound to `verb`.
    #[must_use]
    pub fn procedure(&self, verb: Verb) -> Option<&Procedure> {
        self.procedures.get(&verb)
    }

    /// Identity columns.
    #[must_use]
    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    /// Column names, first-seen order.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        self.columns.iter().map(String::as_str).collect()
    }

    /// Whether `column` is known.
    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    pub(super) fn require_column(&self, column: &str) -> CoreResult<()> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(CoreError::unknown_column(column))
        }
    }

    /// Rows passing the filter, in order.
    #[must_use]
    pub fn data(&self) -> Vec<&Row> {
        self.visible.iter().map(|&i| &self.rows[i]).collect()
    }

    /// Iterates rows passing the filter.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.visible.iter().map(move |&i| &self.rows[i])
    }

    /// The `index`-th row passing the filter.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RowOutOfRange`] past the end.
    pub fn row(&self, index: usize) -> CoreResult<&Row> {
        self.visible
            .get(index)
            .map(|&i| &self.rows[i])
            .ok_or(CoreError::RowOutOfRange {
                index,
                len: self.visible.len(),
            })
    }

    /// Number of rows passing the filter.
    #[must_use]
    pub fn len(&self) -> usize {
        self.visible.len()
    }

    /// Whether no row passes the filter.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    /// Number of rows regardless of filter.
    #[must_use]
    pub fn total_len(&self) -> usize {
        self.rows.len()
    }

    /// When the last successful select finished.
    #[must_use]
    pub fn last_query(&self) -> Option<SystemTime> {
        self.last_query
    }

    /// The diff computed by the last `select(true)`.
    #[must_use]
    pub fn last_diff(&self) -> Option<&Diff> {
        self.last_diff.as_ref()
    }

    /// Identifiers reported by the last insert, update, or delete.
    #[must_use]
    pub fn last_affected(&self) -> &[Value] {
        &self.last_affected
    }

    /// The active filter.
    #[must_use]
    pub fn filter(&self) -> Option<&CriteriaSet> {
        self.filter.as_ref()
    }

    pub(super) fn replace_rows(&mut self, rows: Vec<Row>, columns: IndexSet<String>) {
        self.rows = rows;
        self.columns = columns;
        for row in &self.rows {
            for column in row.keys() {
                if !self.columns.contains(column) {
                    self.columns.insert(column.clone());
                }
            }
        }
        self.visible = (0..self.rows.len()).collect();
    }

    pub(super) fn refresh_visible(&mut self) -> CoreResult<()> {
        let clause = self
            .filter
            .as_ref()
            .map(CriteriaSet::combined_where)
            .unwrap_or_default();
        let filter = RowFilter::new(&clause)?;

        let mut visible = Vec::with_capacity(self.rows.len());
        for (i, row) in self.rows.iter().enumerate() {
            if filter.matches(row)? {
                visible.push(i);
            }
        }
        self.visible = visible;
        Ok(())
    }

    /// Replaces the active filter.
    ///
    /// Every OR-group of every criterion is evaluated against each row
    /// with SQL comparison semantics. A diff contributes its select list.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownColumn`] for a column the model does not
    /// have (checked once the model knows its columns), or
    /// [`CoreError::InvalidPattern`]. The previous filter stays on error.
    pub fn set_filter(&mut self, filter: impl Into<CriteriaInput>) -> CoreResult<()> {
        let input: CriteriaInput = filter.into();
        let set = input.into_set(Verb::Select);
        if !self.columns.is_empty() {
            for column in set.combined_where().columns() {
                self.require_column(column)?;
            }
        }

        let previous = self.filter.replace(set);
        if let Err(err) = self.refresh_visible() {
            self.filter = previous;
            self.refresh_visible()?;
            return Err(err);
        }
        tracing::trace!(model = %self.name, visible = self.visible.len(), "filter applied");
        Ok(())
    }

    /// Removes the filter; every row becomes visible.
    pub fn clear_filter(&mut self) {
        self.filter = None;
        self.visible = (0..self.rows.len()).collect();
    }

    fn bound(&self, verb: Verb) -> CoreResult<Procedure> {
        self.procedures
            .get(&verb)
            .cloned()
            .ok_or(CoreError::ProcedureUndefined { verb })
    }

    /// Runs the select procedure and replaces the local rows.
    ///
    /// With `want_diff`, the incoming rows are compared to the current
    /// ones by full-row equality and the difference is returned (and kept
    /// as [`last_diff`](Self::last_diff)). A row changed remotely shows up
    /// as a delete plus an insert, never as an update.
    ///
    /// # Errors
    ///
    /// [`CoreError::ProcedureUndefined`] without a select procedure,
    /// [`CoreError::MultipleResultSets`] if it yields several result sets,
    /// or the execution failure.
    pub fn select(&mut self, want_diff: bool) -> CoreResult<Option<Diff>> {
        let mut procedure = self.bound(Verb::Select)?;
        procedure.invoke()?;

        let set = procedure
            .take_output()
            .map(Output::into_single)
            .transpose()?
            .unwrap_or_default();
        let columns: IndexSet<String> = set.columns().into_iter().map(String::from).collect();
        let incoming = set.into_rows();

        let diff = want_diff.then(|| Diff::between(&self.rows, &incoming));
        self.replace_rows(incoming, columns);
        self.last_query = Some(SystemTime::now());
        if let Some(diff) = &diff {
            self.last_diff = Some(diff.clone());
        }
        self.refresh_visible()?;

        tracing::debug!(model = %self.name, rows = self.rows.len(), "selected");
        Ok(diff)
    }

    fn payload_for(&self, verb: Verb, procedure: &Procedure, changes: Changes) -> CoreResult<Payload> {
        match (procedure, changes) {
            (_, Changes::Payload(payload)) => Ok(payload),
            (Procedure::Group(_), Changes::Rows(rows)) => {
                let criteria = rows
                    .iter()
                    .map(|row| self.row_criteria(verb, row))
                    .collect::<CoreResult<CriteriaSet>>()?;
                Ok(Payload::Criteria(criteria.into()))
            }
            (Procedure::Statement(_), Changes::Rows(rows)) => Ok(Payload::Params(rows)),
            (_, Changes::Criteria(criteria)) => Ok(Payload::Criteria(criteria)),
            (Procedure::Transaction(_), Changes::Rows(_)) => Err(CoreError::payload_mismatch(
                "rows cannot feed a nested transaction; pass an iteration payload",
            )),
        }
    }

    fn key_group(&self, row: &Row) -> CoreResult<AndGroup> {
        let mut keys = Row::new();
        for column in &self.key_columns {
            let value = row
                .get(column)
                .ok_or_else(|| CoreError::unknown_column(column.clone()))?;
            keys.insert(column.clone(), value.clone());
        }
        Ok(AndGroup::matching_row(&keys))
    }

    fn row_criteria(&self, verb: Verb, row: &Row) -> CoreResult<Criteria> {
        match verb {
            Verb::Update => {
                if self.key_columns.is_empty() {
                    return Err(CoreError::KeyColumnsRequired { verb });
                }
                let values: Row = row
                    .iter()
                    .filter(|(column, _)| !self.key_columns.contains(column))
                    .map(|(column, value)| (column.clone(), value.clone()))
                    .collect();
                Ok(Criteria::with_values(values).filter(self.key_group(row)?))
            }
            Verb::Delete => {
                let group = if self.key_columns.is_empty() {
                    AndGroup::matching_row(row)
                } else {
                    self.key_group(row)?
                };
                Ok(Criteria::with_where(WhereClause::single(group)))
            }
            _ => Ok(Criteria::with_values(row.clone())),
        }
    }

    fn apply(&mut self, verb: Verb, changes: Changes) -> CoreResult<()> {
        let mut procedure = self.bound(verb)?;
        let payload = self.payload_for(verb, &procedure, changes)?;
        procedure.set_payload(payload)?;
        procedure.invoke()?;
        self.last_affected = procedure.affected();
        tracing::debug!(model = %self.name, verb = %verb, affected = self.last_affected.len(), "applied changes");

        if self.config.auto_select && !self.batching && self.procedures.contains_key(&Verb::Select) {
            self.select(false)?;
        }
        Ok(())
    }

    /// Inserts rows through the insert procedure.
    ///
    /// # Errors
    ///
    /// [`CoreError::ProcedureUndefined`], a payload or compile error, or
    /// the execution failure.
    pub fn insert(&mut self, changes: impl Into<Changes>) -> CoreResult<()> {
        self.apply(Verb::Insert, changes.into())
    }

    /// Updates rows through the update procedure.
    ///
    /// # Errors
    ///
    /// As for [`insert`](Self::insert); rows fed to a statement group also
    /// need [`key columns`](Self::with_key_columns).
    pub fn update(&mut self, changes: impl Into<Changes>) -> CoreResult<()> {
        self.apply(Verb::Update, changes.into())
    }

    /// Deletes rows through the delete procedure.
    ///
    /// # Errors
    ///
    /// As for [`insert`](Self::insert).
    pub fn delete(&mut self, changes: impl Into<Changes>) -> CoreResult<()> {
        self.apply(Verb::Delete, changes.into())
    }

    /// Applies a diff: update, then delete, then insert, then one select,
    /// then the diff's select list becomes the filter.
    ///
    /// Empty lists are skipped, so their procedures need not exist.
    ///
    /// # Errors
    ///
    /// Stops at the first failure; earlier lists stay applied.
    pub fn synchronize(&mut self, diff: Diff) -> CoreResult<()> {
        self.batching = true;
        let applied = self.apply_lists(&diff);
        self.batching = false;
        applied?;

        if self.procedures.contains_key(&Verb::Select) {
            self.select(false)?;
        }
        if diff.select.is_empty() {
            self.clear_filter();
            Ok(())
        } else {
            self.set_filter(diff.select)
        }
    }

    fn apply_lists(&mut self, diff: &Diff) -> CoreResult<()> {
        for verb in [Verb::Update, Verb::Delete, Verb::Insert] {
            let list = diff.list(verb);
            if !list.is_empty() {
                self.apply(verb, Changes::Criteria(list.clone().into()))?;
            }
        }
        Ok(())
    }
}
