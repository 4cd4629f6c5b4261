//! Relation between tables for foreign key references.

/// Foreign key from a column of one table to a column of another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Column holding the reference in the source table
    pub from_column: String,
    /// Name of the target table
    pub to_table: String,
    /// Referenced column in the target table
    pub to_column: String,
}

impl Relation {
    pub fn new(
        from_column: impl Into<String>,
        to_table: impl Into<String>,
        to_column: impl Into<String>,
    ) -> Self {
        Self {
            from_column: from_column.into(),
            to_table: to_table.into(),
            to_column: to_column.into(),
        }
    }

    /// Constraint name reported on violations, e.g. `child_parent_id_fkey`.
    pub fn constraint_name(&self, table: &str) -> String {
        format!("{}_{}_fkey", table, self.from_column)
    }
}
