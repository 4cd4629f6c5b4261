use std::sync::Arc;

use crate::error::StoreError;
use crate::table::Table;
use crate::value::Row;

use super::change::Change;

/// Holds staged changes for a single table.
///
/// Changes are isolated from the committed rows until commit.
#[derive(Debug)]
pub struct StagingBuffer {
    /// Name of the table this buffer belongs to
    pub table_name: String,
    /// Committed snapshot the staged rows were copied from
    pub base: Arc<Vec<Row>>,
    /// Copy of the committed rows with staged changes applied
    pub rows: Vec<Row>,
    /// List of changes staged in this transaction
    pub changes: Vec<Change>,
}

impl StagingBuffer {
    /// Creates a new staging buffer from a table's current state.
    pub fn new(table: &Table) -> Self {
        let base = table.snapshot();
        let rows = base.as_ref().clone();
        Self {
            table_name: table.name.clone(),
            base,
            rows,
            changes: Vec::new(),
        }
    }

    /// Stages a row insertion.
    ///
    /// # Returns
    /// Position of the inserted row.
    pub fn stage_insert(&mut self, row: Row) -> usize {
        let index = self.rows.len();
        self.rows.push(row.clone());
        self.changes.push(Change::Insert { index, row });
        index
    }

    /// Stages a row update.
    ///
    /// # Arguments
    /// * `index` - Position of the row in the staged rows
    /// * `row` - Replacement row
    ///
    /// # Returns
    /// `Result<(), StoreError>` indicating success or failure.
    pub fn stage_update(&mut self, index: usize, row: Row) -> Result<(), StoreError> {
        let slot = self.rows.get_mut(index).ok_or_else(|| StoreError::RowNotFound {
            table: self.table_name.clone(),
            id: row.first().and_then(|v| v.as_int()).unwrap_or_default(),
        })?;

        let old = std::mem::replace(slot, row.clone());
        self.changes.push(Change::Update { index, old, new: row });
        Ok(())
    }

    /// Position of the staged row with the given key.
    pub fn position_of(&self, id: i64) -> Option<usize> {
        Table::position_of(&self.rows, id)
    }

    /// Returns the number of staged rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if no change has been staged.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
