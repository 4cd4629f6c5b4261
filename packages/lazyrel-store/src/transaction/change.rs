use crate::value::Row;

/// Represents a single change staged against a table.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Insert a new row
    Insert {
        /// Position of the row in the staged rows
        index: usize,
        /// Full row, key included
        row: Row,
    },
    /// Update an existing row
    Update {
        /// Position of the row in the staged rows
        index: usize,
        /// Row before the update
        old: Row,
        /// Row after the update
        new: Row,
    },
}
