//! Schema validation.

use std::collections::{HashMap, HashSet};

use crate::error::StoreError;
use crate::table::{Table, ID_COLUMN};

use super::ddl::{SchemaFile, TableSchema};

/// Validates a schema description before tables are created from it.
///
/// # Returns
/// `Result<(), StoreError>` with `InvalidSchema` on duplicate columns,
/// unknown relation columns, or unresolvable relations.
pub fn validate_schema(schema: &SchemaFile) -> Result<(), StoreError> {
    for (table_name, table_schema) in &schema.tables {
        validate_table_schema(table_name, table_schema)?;
    }

    for (table_name, table_schema) in &schema.tables {
        for relation in &table_schema.relations {
            let Some(target) = schema.tables.get(&relation.to_table) else {
                continue; // reported by creation_order
            };
            let target_has_column = relation.to_column == ID_COLUMN
                || target.columns.iter().any(|c| c.name == relation.to_column);
            if !target_has_column {
                return Err(StoreError::InvalidSchema(format!(
                    "relation target column '{}' not found in table '{}' (from '{}')",
                    relation.to_column, relation.to_table, table_name
                )));
            }
        }
    }

    schema.creation_order().map(|_| ())
}

fn validate_table_schema(table_name: &str, table_schema: &TableSchema) -> Result<(), StoreError> {
    let mut seen_names = HashSet::new();
    seen_names.insert(ID_COLUMN);
    for column in &table_schema.columns {
        if !seen_names.insert(column.name.as_str()) {
            return Err(StoreError::InvalidSchema(format!(
                "duplicate column '{}' in table '{}'",
                column.name, table_name
            )));
        }
    }

    for relation in &table_schema.relations {
        if !seen_names.contains(relation.from_column.as_str()) {
            return Err(StoreError::InvalidSchema(format!(
                "relation source column '{}' not found in table '{}'",
                relation.from_column, table_name
            )));
        }
    }

    Ok(())
}

/// Checks existing tables against the expected schema.
///
/// Every expected table must exist, and every expected column must exist
/// with the same type and nullability. Extra tables and columns are allowed.
pub fn validate_against(schema: &SchemaFile, tables: &HashMap<String, Table>) -> Result<(), StoreError> {
    for (table_name, expected) in &schema.tables {
        let table = tables.get(table_name).ok_or_else(|| {
            StoreError::SchemaValidation(format!("missing table [{}]", table_name))
        })?;

        for column in &expected.columns {
            let existing = table.column(&column.name).ok_or_else(|| {
                StoreError::SchemaValidation(format!(
                    "missing column [{}] in table [{}]",
                    column.name, table_name
                ))
            })?;
            if existing.column_type != column.r#type {
                return Err(StoreError::SchemaValidation(format!(
                    "wrong column type encountered in column [{}] in table [{}]; found [{}], but expecting [{}]",
                    column.name, table_name, existing.column_type, column.r#type
                )));
            }
            if existing.nullable != column.nullable {
                return Err(StoreError::SchemaValidation(format!(
                    "nullability mismatch in column [{}] in table [{}]",
                    column.name, table_name
                )));
            }
        }
    }
    Ok(())
}
