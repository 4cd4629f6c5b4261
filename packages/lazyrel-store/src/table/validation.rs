//! Validation methods for table schema and rows.

use std::collections::HashSet;

use super::column::Column;
use super::table::ID_COLUMN;
use crate::error::StoreError;
use crate::value::Value;

/// Validates that column names are unique and do not clash with the
/// generated key column.
pub(crate) fn validate_columns(table: &str, columns: &[Column]) -> Result<(), StoreError> {
    let mut seen_names = HashSet::new();
    seen_names.insert(ID_COLUMN);
    for column in columns {
        if !seen_names.insert(column.name.as_str()) {
            return Err(StoreError::ColumnAlreadyExists {
                table: table.to_string(),
                column: column.name.clone(),
            });
        }
    }
    Ok(())
}

/// Validates a full row (including the key at index 0) against the columns.
///
/// # Returns
/// `Result<(), StoreError>` with `TypeMismatch` or a NOT NULL
/// `ConstraintViolation` on failure.
pub(crate) fn validate_row(table: &str, columns: &[Column], row: &[Value]) -> Result<(), StoreError> {
    if row.len() != columns.len() {
        return Err(StoreError::TypeMismatch {
            table: table.to_string(),
            column: "*".to_string(),
            expected: format!("{} values", columns.len()),
            got: format!("{} values", row.len()),
        });
    }

    for (column, value) in columns.iter().zip(row) {
        if !column.column_type.accepts(value) {
            return Err(StoreError::TypeMismatch {
                table: table.to_string(),
                column: column.name.clone(),
                expected: column.column_type.to_string(),
                got: value.kind().to_string(),
            });
        }
        if value.is_null() && !column.nullable {
            return Err(StoreError::ConstraintViolation {
                table: table.to_string(),
                constraint: column.not_null_constraint(table),
                detail: format!("null value in column \"{}\"", column.name),
            });
        }
    }

    Ok(())
}
