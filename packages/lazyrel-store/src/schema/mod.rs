//! Schema description (DDL) and schema initialization.

mod ddl;
mod validation;

use serde::{Deserialize, Serialize};

pub use ddl::{ColumnSchema, RelationSchema, SchemaFile, TableSchema, SCHEMA_VERSION};
pub use validation::{validate_against, validate_schema};

/// What to do with the mapped tables when a client connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaAction {
    /// Check that the mapped tables exist and match
    Validate,
    /// Drop the mapped tables and create them afresh
    Create,
}

impl std::fmt::Display for SchemaAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaAction::Validate => f.write_str("validate"),
            SchemaAction::Create => f.write_str("create"),
        }
    }
}
