//! Database container managing tables.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::schema::{self, SchemaAction, SchemaFile};
use crate::table::{Column, Relation, Table};
use crate::transaction::Transaction;

/// Database container holding all tables of one named database.
#[derive(Debug)]
pub struct Database {
    /// Database name
    name: String,
    /// Map of table name to table instance
    tables: RwLock<HashMap<String, Table>>,
    /// Serializes commits so multi-table swaps are all-or-nothing
    commit_lock: Mutex<()>,
    /// Table sizing
    config: StoreConfig,
}

impl Database {
    /// Creates a new empty database.
    pub fn new(name: impl Into<String>, config: StoreConfig) -> Self {
        Self {
            name: name.into(),
            tables: RwLock::new(HashMap::new()),
            commit_lock: Mutex::new(()),
            config,
        }
    }

    /// Returns the database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creates a new table with the given name, columns and relations.
    ///
    /// # Arguments
    /// * `name` - Table name
    /// * `columns` - Declared columns (the `id` key is added automatically)
    /// * `relations` - Foreign keys originating from the new table
    ///
    /// # Returns
    /// `Result<(), StoreError>` indicating success or failure.
    pub fn create_table(
        &self,
        name: String,
        columns: Vec<Column>,
        relations: Vec<Relation>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        if tables.contains_key(&name) {
            return Err(StoreError::TableAlreadyExists(name));
        }
        let table = self.build_table(&tables, name.clone(), columns, relations)?;
        tables.insert(name, table);
        Ok(())
    }

    fn build_table(
        &self,
        tables: &HashMap<String, Table>,
        name: String,
        columns: Vec<Column>,
        relations: Vec<Relation>,
    ) -> Result<Table, StoreError> {
        let mut table = Table::create(
            name,
            columns,
            Some(self.config.initial_table_capacity),
            self.config.max_rows_per_table,
        )?;
        for relation in relations {
            let target_exists = relation.to_table == table.name
                || tables.contains_key(&relation.to_table);
            if !target_exists {
                return Err(StoreError::TableNotFound {
                    table: relation.to_table.clone(),
                });
            }
            table.add_relation(relation)?;
        }
        Ok(table)
    }

    /// Deletes a table by name.
    pub fn drop_table(&self, name: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        tables.remove(name).ok_or_else(|| StoreError::TableNotFound {
            table: name.to_string(),
        })?;
        Ok(())
    }

    /// Runs a closure against one table.
    pub fn with_table<F, R>(&self, name: &str, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Table) -> R,
    {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        let table = tables.get(name).ok_or_else(|| StoreError::TableNotFound {
            table: name.to_string(),
        })?;
        Ok(f(table))
    }

    /// Runs a closure against the table map.
    ///
    /// The read lock is held for the duration of the closure.
    pub fn with_tables<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&HashMap<String, Table>) -> R,
    {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&tables))
    }

    /// Returns all table names, sorted.
    pub fn table_names(&self) -> Result<Vec<String>, StoreError> {
        let mut names = self.with_tables(|tables| tables.keys().cloned().collect::<Vec<_>>())?;
        names.sort();
        Ok(names)
    }

    /// Returns the number of tables in the database.
    pub fn table_count(&self) -> Result<usize, StoreError> {
        self.with_tables(|tables| tables.len())
    }

    /// Commits a transaction against this database's tables.
    pub fn commit(&self, tx: &mut Transaction) -> Result<(), StoreError> {
        let _guard = self.commit_lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        self.with_tables(|tables| tx.commit(tables))?
    }

    /// Applies a schema description.
    ///
    /// `Create` drops every table named in the schema and recreates them in
    /// dependency order; `Validate` only checks the existing tables.
    pub fn apply_schema(&self, schema: &SchemaFile, action: SchemaAction) -> Result<(), StoreError> {
        match action {
            SchemaAction::Validate => {
                self.with_tables(|tables| schema::validate_against(schema, tables))??;
                tracing::debug!(database = %self.name, "schema validated");
            }
            SchemaAction::Create => {
                schema::validate_schema(schema)?;
                let order = schema.creation_order()?;

                let _guard = self.commit_lock.lock().map_err(|_| StoreError::LockPoisoned)?;
                let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
                for name in schema.tables.keys() {
                    if tables.remove(name).is_some() {
                        tracing::debug!(database = %self.name, table = %name, "dropped table");
                    }
                }
                for name in order {
                    let table_schema = &schema.tables[name];
                    let columns = table_schema
                        .columns
                        .iter()
                        .map(|c| Column::new(c.name.clone(), c.r#type, c.nullable))
                        .collect();
                    let relations = table_schema
                        .relations
                        .iter()
                        .map(|r| Relation::new(r.from_column.clone(), r.to_table.clone(), r.to_column.clone()))
                        .collect();
                    let table = self.build_table(&tables, name.to_string(), columns, relations)?;
                    tables.insert(name.to_string(), table);
                    tracing::debug!(database = %self.name, table = %name, "created table");
                }
            }
        }
        Ok(())
    }

    /// Describes the current tables as a schema.
    pub fn describe(&self) -> Result<SchemaFile, StoreError> {
        self.with_tables(|tables| {
            let mut schema = SchemaFile::new();
            for (name, table) in tables {
                schema.tables.insert(name.clone(), table.schema());
            }
            schema
        })
    }
}
