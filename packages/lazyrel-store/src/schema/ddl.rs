//! Serializable schema description.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::value::ColumnType;

/// Current schema format version.
pub const SCHEMA_VERSION: u32 = 1;

/// Set of table definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaFile {
    /// Schema version
    pub version: u32,
    /// Table definitions by name
    pub tables: BTreeMap<String, TableSchema>,
}

/// Table definition. The generated `id int8` key is implicit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Declared columns
    pub columns: Vec<ColumnSchema>,
    /// Foreign key relations
    #[serde(default)]
    pub relations: Vec<RelationSchema>,
}

/// Column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Column name
    pub name: String,
    /// Column type
    pub r#type: ColumnType,
    /// Whether `null` is allowed
    pub nullable: bool,
}

/// Foreign key definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationSchema {
    /// Source column
    pub from_column: String,
    /// Target table
    pub to_table: String,
    /// Target column
    pub to_column: String,
}

impl SchemaFile {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self {
            version: SCHEMA_VERSION,
            tables: BTreeMap::new(),
        }
    }

    /// Serializes the schema as pretty JSON.
    pub fn to_json(&self) -> Result<String, StoreError> {
        serde_json::to_string_pretty(self).map_err(|e| StoreError::SerializationError(e.to_string()))
    }

    /// Parses a schema from JSON.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        serde_json::from_str(json).map_err(|e| StoreError::SerializationError(e.to_string()))
    }

    /// Table names ordered so that every relation target precedes the
    /// tables referencing it.
    ///
    /// # Returns
    /// `Result<Vec<&str>, StoreError>`, `InvalidSchema` on a reference cycle
    /// or a target outside this schema.
    pub fn creation_order(&self) -> Result<Vec<&str>, StoreError> {
        let mut ordered: Vec<&str> = Vec::with_capacity(self.tables.len());
        let mut placed: HashSet<&str> = HashSet::new();

        while ordered.len() < self.tables.len() {
            let before = ordered.len();
            for (name, table) in &self.tables {
                if placed.contains(name.as_str()) {
                    continue;
                }
                let mut ready = true;
                for relation in &table.relations {
                    if relation.to_table == *name {
                        continue;
                    }
                    if !self.tables.contains_key(&relation.to_table) {
                        return Err(StoreError::InvalidSchema(format!(
                            "relation from '{}.{}' targets unknown table '{}'",
                            name, relation.from_column, relation.to_table
                        )));
                    }
                    if !placed.contains(relation.to_table.as_str()) {
                        ready = false;
                    }
                }
                if ready {
                    placed.insert(name.as_str());
                    ordered.push(name.as_str());
                }
            }
            if ordered.len() == before {
                return Err(StoreError::InvalidSchema(
                    "relation cycle between tables".to_string(),
                ));
            }
        }

        Ok(ordered)
    }
}

impl Default for SchemaFile {
    fn default() -> Self {
        Self::new()
    }
}
