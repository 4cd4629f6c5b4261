//! Table schema and row storage.
//!
//! Each table has:
//! - Fixed schema with column definitions (the generated key first)
//! - Copy-on-write row snapshot swapped atomically on commit
//! - Key sequence generator
//! - Optional relations to other tables

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::error::StoreError;
use crate::schema::{ColumnSchema, RelationSchema, TableSchema};
use crate::value::{ColumnType, Row};

use super::column::Column;
use super::query::CompiledFilter;
use super::relation::Relation;
use super::validation;

/// Name of the generated primary key column present in every table.
pub const ID_COLUMN: &str = "id";

/// Table schema and row storage.
#[derive(Debug)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Column definitions; index 0 is always the generated key
    pub columns: Vec<Column>,
    /// Foreign key relations to other tables
    pub relations: Vec<Relation>,
    /// Committed rows, replaced wholesale on commit
    rows: ArcSwap<Vec<Row>>,
    /// Next key to hand out (the sequence is not rolled back)
    next_id: AtomicI64,
    /// Maximum number of rows
    max_rows: usize,
}

impl Table {
    /// Creates a new table with the given name and column definitions.
    ///
    /// # Arguments
    /// * `name` - Table name
    /// * `columns` - Declared columns, without the generated key
    /// * `initial_capacity` - Initial row capacity (default: 64)
    /// * `max_rows` - Maximum number of rows
    ///
    /// # Returns
    /// `Result<Table, StoreError>` containing the created table or an error.
    pub fn create(
        name: String,
        columns: Vec<Column>,
        initial_capacity: Option<usize>,
        max_rows: usize,
    ) -> Result<Self, StoreError> {
        validation::validate_columns(&name, &columns)?;

        let capacity = initial_capacity.unwrap_or(64).min(max_rows);

        let mut all_columns = Vec::with_capacity(columns.len() + 1);
        all_columns.push(Column::new(ID_COLUMN, ColumnType::Int8, false));
        all_columns.extend(columns);

        Ok(Self {
            name,
            columns: all_columns,
            relations: Vec::new(),
            rows: ArcSwap::from_pointee(Vec::with_capacity(capacity)),
            next_id: AtomicI64::new(1), // Start IDs at 1
            max_rows,
        })
    }

    /// Adds a foreign key relation originating from this table.
    ///
    /// The source column must exist and hold `int8` values.
    pub fn add_relation(&mut self, relation: Relation) -> Result<(), StoreError> {
        let column = self
            .column(&relation.from_column)
            .ok_or_else(|| StoreError::ColumnNotFound {
                table: self.name.clone(),
                column: relation.from_column.clone(),
            })?;
        if column.column_type != ColumnType::Int8 {
            return Err(StoreError::TypeMismatch {
                table: self.name.clone(),
                column: relation.from_column.clone(),
                expected: ColumnType::Int8.to_string(),
                got: column.column_type.to_string(),
            });
        }
        self.relations.push(relation);
        Ok(())
    }

    /// Looks up a column definition by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns the position of a column within a row.
    pub fn column_index(&self, name: &str) -> Result<usize, StoreError> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| StoreError::ColumnNotFound {
                table: self.name.clone(),
                column: name.to_string(),
            })
    }

    /// Declared columns, without the generated key.
    pub fn declared_columns(&self) -> &[Column] {
        &self.columns[1..]
    }

    /// Atomically increments and returns the next key.
    pub fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Returns the current next key value without incrementing.
    pub fn current_next_id(&self) -> i64 {
        self.next_id.load(Ordering::Acquire)
    }

    /// Returns the number of committed rows.
    pub fn row_count(&self) -> usize {
        self.rows.load().len()
    }

    /// Returns the committed rows.
    pub fn snapshot(&self) -> Arc<Vec<Row>> {
        self.rows.load_full()
    }

    /// Returns `true` if `base` is still the committed snapshot.
    pub(crate) fn is_current(&self, base: &Arc<Vec<Row>>) -> bool {
        Arc::ptr_eq(&self.rows.load(), base)
    }

    /// Checks that `row_count` rows fit under the row limit.
    pub(crate) fn check_row_limit(&self, row_count: usize) -> Result<(), StoreError> {
        if row_count > self.max_rows {
            return Err(StoreError::RowLimitExceeded {
                table: self.name.clone(),
                limit: self.max_rows,
            });
        }
        Ok(())
    }

    /// Replaces the committed rows.
    pub(crate) fn store(&self, rows: Vec<Row>) {
        self.rows.store(Arc::new(rows));
    }

    /// Finds the position of the row with the given key.
    pub fn position_of(rows: &[Row], id: i64) -> Option<usize> {
        rows.iter().position(|row| row[0].as_int() == Some(id))
    }

    /// Returns the rows matching a compiled filter, in insertion order.
    pub(crate) fn select(&self, rows: &[Row], filter: &CompiledFilter, limit: Option<usize>) -> Vec<Row> {
        let matching = rows.iter().filter(|row| filter.matches(row)).cloned();
        match limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }

    /// DDL description of this table.
    pub fn schema(&self) -> TableSchema {
        TableSchema {
            columns: self
                .declared_columns()
                .iter()
                .map(|c| ColumnSchema {
                    name: c.name.clone(),
                    r#type: c.column_type,
                    nullable: c.nullable,
                })
                .collect(),
            relations: self
                .relations
                .iter()
                .map(|r| RelationSchema {
                    from_column: r.from_column.clone(),
                    to_table: r.to_table.clone(),
                    to_column: r.to_column.clone(),
                })
                .collect(),
        }
    }
}
