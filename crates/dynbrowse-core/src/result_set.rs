//! In-memory result set: the rows of the last read plus local row state.
//!
//! Rows carry four flags. `marked` feeds the `marked()` built-in, `hidden`
//! is set by the quick text filter, `dirty` tracks unsaved local edits and
//! `new` tracks rows created locally that the store has never seen.

use std::cmp::Ordering;

use dynbrowse_model::{AttributeValue, Item, TableSchema};
use tracing::debug;

use crate::config::BrowseConfig;
use crate::error::QueryError;
use crate::item::{remove_path, set_path};
use crate::query::{EvalContext, ExecContext, Ir, NamePath, ResultContext};

/// How [`ResultSet::mark`] changes a row's mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOp {
    /// Set the mark.
    Mark,
    /// Clear the mark.
    Unmark,
    /// Flip the mark.
    Toggle,
}

impl MarkOp {
    fn apply(self, marked: bool) -> bool {
        match self {
            Self::Mark => true,
            Self::Unmark => false,
            Self::Toggle => !marked,
        }
    }
}

/// Per-row state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowFlags {
    /// Selected by the user.
    pub marked: bool,
    /// Hidden by the text filter.
    pub hidden: bool,
    /// Edited locally and not yet saved.
    pub dirty: bool,
    /// Created locally.
    pub new: bool,
}

#[derive(Debug, Clone)]
struct Row {
    item: Item,
    flags: RowFlags,
}

/// The rows of one table read.
#[derive(Debug, Clone)]
pub struct ResultSet {
    schema: TableSchema,
    query: Option<String>,
    rows: Vec<Row>,
    read_only: bool,
}

impl ResultSet {
    /// Creates an empty result set for a table.
    #[must_use]
    pub fn new(schema: TableSchema, config: &BrowseConfig) -> Self {
        Self {
            schema,
            query: None,
            rows: Vec::new(),
            read_only: config.read_only,
        }
    }

    /// The table schema.
    #[must_use]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// The expression that produced the rows, `None` for a full scan.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Records the expression that produced the rows.
    pub fn set_query(&mut self, query: Option<String>) {
        self.query = query;
    }

    /// Replaces all rows, clearing every flag.
    pub fn set_items(&mut self, items: Vec<Item>) {
        debug!(table = %self.schema.table_name, rows = items.len(), "loaded result set");
        self.rows = items
            .into_iter()
            .map(|item| Row {
                item,
                flags: RowFlags::default(),
            })
            .collect();
    }

    /// Appends a locally created row and returns its index.
    ///
    /// # Errors
    ///
    /// Fails with [`QueryError::ReadOnly`] when edits are disabled.
    pub fn add_new_item(&mut self, item: Item) -> Result<usize, QueryError> {
        self.check_writable()?;
        self.rows.push(Row {
            item,
            flags: RowFlags {
                dirty: true,
                new: true,
                ..RowFlags::default()
            },
        });
        Ok(self.rows.len() - 1)
    }

    /// Number of rows, hidden ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` when there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The item at `idx`.
    #[must_use]
    pub fn item(&self, idx: usize) -> Option<&Item> {
        self.rows.get(idx).map(|row| &row.item)
    }

    /// The flags of the row at `idx`.
    #[must_use]
    pub fn flags(&self, idx: usize) -> Option<RowFlags> {
        self.rows.get(idx).map(|row| row.flags)
    }

    /// Indexes of rows not hidden by the text filter.
    pub fn visible_rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| !row.flags.hidden)
            .map(|(idx, _)| idx)
    }

    /// Indexes of rows with unsaved edits.
    pub fn dirty_rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.flags.dirty)
            .map(|(idx, _)| idx)
    }

    // -----------------------------------------------------------------------
    // Marking and filtering
    // -----------------------------------------------------------------------

    /// Changes the mark of the given rows. Hidden rows are skipped.
    ///
    /// # Errors
    ///
    /// Fails with [`QueryError::RowOutOfRange`] for an unknown row; rows
    /// before it have already been changed.
    pub fn mark(&mut self, rows: &[usize], op: MarkOp) -> Result<(), QueryError> {
        for &idx in rows {
            let row = self.row_mut(idx)?;
            if !row.flags.hidden {
                row.flags.marked = op.apply(row.flags.marked);
            }
        }
        Ok(())
    }

    /// Changes the mark of every visible row.
    pub fn mark_visible(&mut self, op: MarkOp) {
        for row in self.rows.iter_mut().filter(|row| !row.flags.hidden) {
            row.flags.marked = op.apply(row.flags.marked);
        }
    }

    /// Clears every mark, hidden rows included.
    pub fn unmark_all(&mut self) {
        for row in &mut self.rows {
            row.flags.marked = false;
        }
    }

    /// Hides rows where no attribute's cell text contains `text`. An empty
    /// text shows every row.
    pub fn apply_text_filter(&mut self, text: &str) {
        for row in &mut self.rows {
            row.flags.hidden =
                !text.is_empty() && !row.item.values().any(|v| v.to_string().contains(text));
        }
    }

    /// Visible rows for which `ir` evaluates to `true`.
    ///
    /// # Errors
    ///
    /// Stops at the first evaluation error.
    pub fn matching_rows(&self, ir: &Ir, exec: ExecContext<'_>) -> Result<Vec<usize>, QueryError> {
        self.visible_rows()
            .filter_map(|idx| {
                EvalContext::new(&self.rows[idx].item, exec)
                    .matches(ir)
                    .map(|hit| hit.then_some(idx))
                    .transpose()
            })
            .collect()
    }

    /// Marks the visible rows matching `ir` and returns how many matched.
    /// `marked()` inside the expression sees this result set.
    ///
    /// # Errors
    ///
    /// Stops at the first evaluation error without marking anything.
    pub fn mark_matching(&mut self, ir: &Ir, exec: ExecContext<'_>) -> Result<usize, QueryError> {
        let hits = self.matching_rows(ir, exec.with_result_set(&*self))?;
        for &idx in &hits {
            self.rows[idx].flags.marked = true;
        }
        debug!(rows = hits.len(), "marked matching rows");
        Ok(hits.len())
    }

    /// Orders rows by partition key then sort key, in store order. Rows
    /// missing a key sort last.
    pub fn sort_by_key(&mut self) {
        let partition = self.schema.primary.partition_key.name.clone();
        let sort = self.schema.primary.sort_key.as_ref().map(|k| k.name.clone());
        self.rows.sort_by(|a, b| {
            compare_key(a.item.get(&partition), b.item.get(&partition)).then_with(|| {
                sort.as_ref().map_or(Ordering::Equal, |name| {
                    compare_key(a.item.get(name), b.item.get(name))
                })
            })
        });
    }

    // -----------------------------------------------------------------------
    // Editing
    // -----------------------------------------------------------------------

    /// Stores `value` at `path` in the row and flags it dirty.
    ///
    /// # Errors
    ///
    /// Fails when edits are disabled, the row does not exist or the path
    /// cannot be written.
    pub fn set_value(
        &mut self,
        idx: usize,
        path: &NamePath,
        value: AttributeValue,
    ) -> Result<(), QueryError> {
        self.check_writable()?;
        let row = self.row_mut(idx)?;
        set_path(&mut row.item, path, value)?;
        row.flags.dirty = true;
        Ok(())
    }

    /// Removes the value at `path` from the row and flags it dirty.
    ///
    /// # Errors
    ///
    /// Fails when edits are disabled, the row does not exist or the path does
    /// not resolve.
    pub fn delete_attribute(
        &mut self,
        idx: usize,
        path: &NamePath,
    ) -> Result<AttributeValue, QueryError> {
        self.check_writable()?;
        let row = self.row_mut(idx)?;
        let removed = remove_path(&mut row.item, path)?;
        row.flags.dirty = true;
        Ok(removed)
    }

    /// Clears the dirty and new flags after the row was saved.
    ///
    /// # Errors
    ///
    /// Fails with [`QueryError::RowOutOfRange`] for an unknown row.
    pub fn clear_dirty(&mut self, idx: usize) -> Result<(), QueryError> {
        let row = self.row_mut(idx)?;
        row.flags.dirty = false;
        row.flags.new = false;
        Ok(())
    }

    fn check_writable(&self) -> Result<(), QueryError> {
        if self.read_only {
            Err(QueryError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn row_mut(&mut self, idx: usize) -> Result<&mut Row, QueryError> {
        self.rows.get_mut(idx).ok_or(QueryError::RowOutOfRange(idx))
    }
}

fn compare_key(a: Option<&AttributeValue>, b: Option<&AttributeValue>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.compare_scalar(y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl ResultContext for ResultSet {
    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn row(&self, idx: usize) -> Option<&Item> {
        self.item(idx)
    }

    fn is_marked(&self, idx: usize) -> bool {
        self.rows.get(idx).is_some_and(|row| row.flags.marked)
    }
}
