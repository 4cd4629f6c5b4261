//! Filter compilation and evaluation.

use std::collections::HashSet;
use std::ops::Deref;
use std::sync::Arc;

use super::Table;
use crate::error::StoreError;
use crate::statement::Filter;
use crate::value::{Row, Value};

/// Rows visible to a reader: staged rows inside a transaction, otherwise
/// the committed snapshot.
pub(crate) enum RowsRef<'a> {
    Staged(&'a [Row]),
    Committed(Arc<Vec<Row>>),
}

impl Deref for RowsRef<'_> {
    type Target = [Row];

    fn deref(&self) -> &Self::Target {
        match self {
            RowsRef::Staged(rows) => rows,
            RowsRef::Committed(rows) => rows.as_slice(),
        }
    }
}

/// Resolves table definitions and the rows a reader is allowed to see.
pub(crate) trait RowSource {
    fn table(&self, name: &str) -> Result<&Table, StoreError>;
    fn rows(&self, table: &Table) -> RowsRef<'_>;
}

/// Filter with column names resolved to row positions and semi-joins
/// evaluated up front.
#[derive(Debug)]
pub(crate) enum CompiledFilter {
    All,
    Eq(usize, Value),
    In(usize, HashSet<Value>),
    And(Vec<CompiledFilter>),
}

impl CompiledFilter {
    /// SQL comparison semantics: `null` never matches.
    pub(crate) fn matches(&self, row: &[Value]) -> bool {
        match self {
            CompiledFilter::All => true,
            CompiledFilter::Eq(index, value) => !row[*index].is_null() && &row[*index] == value,
            CompiledFilter::In(index, values) => !row[*index].is_null() && values.contains(&row[*index]),
            CompiledFilter::And(parts) => parts.iter().all(|part| part.matches(row)),
        }
    }
}

/// Compiles a filter against `table`.
///
/// `Exists` is turned into a key set: the keys of `table` referenced by
/// matching rows of the inner table.
pub(crate) fn compile_filter(
    source: &dyn RowSource,
    table: &Table,
    filter: &Filter,
) -> Result<CompiledFilter, StoreError> {
    Ok(match filter {
        Filter::All => CompiledFilter::All,
        Filter::Eq { column, value } => CompiledFilter::Eq(table.column_index(column)?, value.clone()),
        Filter::In { column, values } => {
            CompiledFilter::In(table.column_index(column)?, values.iter().cloned().collect())
        }
        Filter::Exists {
            table: inner_name,
            column,
            filter: inner_filter,
        } => {
            let inner = source.table(inner_name)?;
            let reference_index = inner.column_index(column)?;
            let inner_compiled = compile_filter(source, inner, inner_filter)?;
            let keys = source
                .rows(inner)
                .iter()
                .filter(|row| inner_compiled.matches(row))
                .map(|row| row[reference_index].clone())
                .filter(|value| !value.is_null())
                .collect();
            CompiledFilter::In(0, keys)
        }
        Filter::InSelect {
            column,
            table: inner_name,
            filter: inner_filter,
        } => {
            let inner = source.table(inner_name)?;
            let inner_compiled = compile_filter(source, inner, inner_filter)?;
            let keys = source
                .rows(inner)
                .iter()
                .filter(|row| inner_compiled.matches(row))
                .map(|row| row[0].clone())
                .collect();
            CompiledFilter::In(table.column_index(column)?, keys)
        }
        Filter::And(parts) => CompiledFilter::And(
            parts
                .iter()
                .map(|part| compile_filter(source, table, part))
                .collect::<Result<_, _>>()?,
        ),
    })
}
