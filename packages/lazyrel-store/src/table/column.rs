//! Column definition within a table.

use crate::value::ColumnType;

/// Column definition within a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Column type
    pub column_type: ColumnType,
    /// Whether `Null` may be stored
    pub nullable: bool,
}

impl Column {
    /// Creates a new column with the given parameters.
    pub fn new(name: impl Into<String>, column_type: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable,
        }
    }

    /// Name of the NOT NULL constraint guarding this column.
    pub fn not_null_constraint(&self, table: &str) -> String {
        format!("{}_{}_not_null", table, self.name)
    }
}
