//! A single client connection to a hosted database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::database::Database;
use crate::error::StoreError;
use crate::statement::{Filter, Statement};
use crate::table::{compile_filter, validation, RowSource, RowsRef, Table, ID_COLUMN};
use crate::transaction::{StagingBuffer, Transaction};
use crate::value::{Row, Value};

/// Outcome of one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementResult {
    /// Generated key of the inserted row
    Inserted(i64),
    /// Number of updated rows
    Updated(usize),
    /// Selected rows
    Rows(Vec<Row>),
}

impl StatementResult {
    pub fn inserted_id(&self) -> Option<i64> {
        match self {
            StatementResult::Inserted(id) => Some(*id),
            _ => None,
        }
    }

    pub fn into_rows(self) -> Vec<Row> {
        match self {
            StatementResult::Rows(rows) => rows,
            _ => Vec::new(),
        }
    }
}

/// Read view of a connection: staged rows for tables the open transaction
/// touched, committed rows otherwise.
struct TxView<'a> {
    tables: &'a HashMap<String, Table>,
    transaction: Option<&'a Transaction>,
}

impl RowSource for TxView<'_> {
    fn table(&self, name: &str) -> Result<&Table, StoreError> {
        table_of(self.tables, name)
    }

    fn rows(&self, table: &Table) -> RowsRef<'_> {
        match self.transaction.and_then(|tx| tx.staging_buffer(&table.name)) {
            Some(staged) => RowsRef::Staged(&staged.rows),
            None => RowsRef::Committed(table.snapshot()),
        }
    }
}

/// A client connection.
///
/// Statements run inside the open transaction if there is one, otherwise
/// each statement commits on its own. Dropping the connection aborts any
/// open transaction and releases the connection slot.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    database: Arc<Database>,
    transaction: Option<Transaction>,
    statements: u64,
    show_sql: bool,
    format_sql: bool,
    open_connections: Arc<AtomicUsize>,
}

impl Connection {
    pub(crate) fn new(id: u64, database: Arc<Database>, open_connections: Arc<AtomicUsize>) -> Self {
        Self {
            id,
            database,
            transaction: None,
            statements: 0,
            show_sql: false,
            format_sql: false,
            open_connections,
        }
    }

    /// Connection number, unique per server.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The database this connection talks to.
    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    /// Echo every statement at `info` level, optionally one clause per line.
    pub fn set_sql_echo(&mut self, show_sql: bool, format_sql: bool) {
        self.show_sql = show_sql;
        self.format_sql = format_sql;
    }

    /// Number of statements executed so far (round-trips).
    pub fn statement_count(&self) -> u64 {
        self.statements
    }

    /// Returns whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Opens a transaction.
    pub fn begin(&mut self) -> Result<(), StoreError> {
        if self.transaction.is_some() {
            return Err(StoreError::TransactionConflict(
                "transaction already in progress".to_string(),
            ));
        }
        self.transaction = Some(Transaction::new());
        tracing::debug!(connection = self.id, "begin");
        Ok(())
    }

    /// Commits the open transaction.
    pub fn commit(&mut self) -> Result<(), StoreError> {
        let mut tx = self.transaction.take().ok_or_else(|| {
            StoreError::TransactionConflict("no transaction in progress".to_string())
        })?;
        let staged_tables = tx.staged_table_count();
        let result = self.database.commit(&mut tx);
        if result.is_err() {
            tx.abort();
        }
        tracing::debug!(connection = self.id, staged_tables, ok = result.is_ok(), "commit");
        result
    }

    /// Discards the open transaction, if any.
    pub fn rollback(&mut self) {
        if let Some(mut tx) = self.transaction.take() {
            tx.abort();
            tracing::debug!(connection = self.id, "rollback");
        }
    }

    /// Executes one statement.
    pub fn execute(&mut self, statement: &Statement) -> Result<StatementResult, StoreError> {
        self.statements += 1;
        if self.show_sql {
            tracing::info!(target: "lazyrel::sql", "{}", statement.to_sql(self.format_sql));
        } else {
            tracing::debug!(target: "lazyrel::sql", connection = self.id, "{}", statement);
        }

        let autocommit = self.transaction.is_none();
        if autocommit {
            self.transaction = Some(Transaction::new());
        }

        let database = Arc::clone(&self.database);
        let result = database
            .with_tables(|tables| self.execute_in(tables, statement))
            .and_then(|inner| inner);

        if autocommit {
            if let Some(mut tx) = self.transaction.take() {
                match &result {
                    Ok(_) if tx.has_staged_changes() => database.commit(&mut tx)?,
                    _ => tx.abort(),
                }
            }
        }
        result
    }

    /// Runs a `Select` of every column and returns its rows.
    pub fn select(&mut self, table: &str, filter: Filter) -> Result<Vec<Row>, StoreError> {
        self.execute(&Statement::select(table, filter))
            .map(StatementResult::into_rows)
    }

    /// Runs an `Insert` and returns the generated key.
    pub fn insert(&mut self, table: &str, columns: Vec<String>, values: Vec<Value>) -> Result<i64, StoreError> {
        let result = self.execute(&Statement::Insert {
            table: table.to_string(),
            columns,
            values,
        })?;
        result.inserted_id().ok_or_else(|| StoreError::TableNotFound {
            table: table.to_string(),
        })
    }

    fn view<'a>(&'a self, tables: &'a HashMap<String, Table>) -> TxView<'a> {
        TxView {
            tables,
            transaction: self.transaction.as_ref(),
        }
    }

    fn execute_in(
        &mut self,
        tables: &HashMap<String, Table>,
        statement: &Statement,
    ) -> Result<StatementResult, StoreError> {
        match statement {
            Statement::Select {
                table,
                columns,
                filter,
                limit,
            } => {
                let view = self.view(tables);
                let table = table_of(tables, table)?;
                let projection = columns
                    .iter()
                    .map(|c| table.column_index(c))
                    .collect::<Result<Vec<_>, _>>()?;
                let compiled = compile_filter(&view, table, filter)?;
                let rows = table.select(&view.rows(table), &compiled, *limit);
                if projection.is_empty() {
                    return Ok(StatementResult::Rows(rows));
                }
                Ok(StatementResult::Rows(
                    rows.into_iter()
                        .map(|row| projection.iter().map(|&i| row[i].clone()).collect())
                        .collect(),
                ))
            }
            Statement::Insert { table, columns, values } => {
                let table = table_of(tables, table)?;
                if columns.len() != values.len() {
                    return Err(StoreError::TypeMismatch {
                        table: table.name.clone(),
                        column: "*".to_string(),
                        expected: format!("{} values", columns.len()),
                        got: format!("{} values", values.len()),
                    });
                }

                let mut row = vec![Value::Null; table.columns.len()];
                for (column, value) in columns.iter().zip(values) {
                    let index = table.column_index(column)?;
                    if index == 0 {
                        return Err(generated_key_violation(table));
                    }
                    row[index] = value.clone();
                }
                let id = table.next_id();
                row[0] = Value::Int(id);

                validation::validate_row(&table.name, &table.columns, &row)?;
                check_references(&self.view(tables), table, &row)?;

                self.staging(table)?.stage_insert(row);
                Ok(StatementResult::Inserted(id))
            }
            Statement::Update { table, id, assignments } => {
                let table = table_of(tables, table)?;
                let index = self
                    .staging(table)?
                    .position_of(*id)
                    .ok_or_else(|| StoreError::RowNotFound {
                        table: table.name.clone(),
                        id: *id,
                    })?;

                let mut row = self.view(tables).rows(table)[index].clone();
                for (column, value) in assignments {
                    let column_index = table.column_index(column)?;
                    if column_index == 0 {
                        return Err(generated_key_violation(table));
                    }
                    row[column_index] = value.clone();
                }

                validation::validate_row(&table.name, &table.columns, &row)?;
                check_references(&self.view(tables), table, &row)?;

                self.staging(table)?.stage_update(index, row)?;
                Ok(StatementResult::Updated(1))
            }
        }
    }

    fn staging(&mut self, table: &Table) -> Result<&mut StagingBuffer, StoreError> {
        self.transaction
            .as_mut()
            .ok_or_else(|| StoreError::TransactionConflict("no transaction in progress".to_string()))?
            .get_or_create_staging_buffer(table)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(mut tx) = self.transaction.take() {
            tx.abort();
            tracing::debug!(connection = self.id, "open transaction rolled back on close");
        }
        self.open_connections.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!(connection = self.id, statements = self.statements, "connection closed");
    }
}

fn table_of<'t>(tables: &'t HashMap<String, Table>, name: &str) -> Result<&'t Table, StoreError> {
    tables.get(name).ok_or_else(|| StoreError::TableNotFound {
        table: name.to_string(),
    })
}

fn generated_key_violation(table: &Table) -> StoreError {
    StoreError::ConstraintViolation {
        table: table.name.clone(),
        constraint: format!("{}_pkey", table.name),
        detail: format!("column \"{}\" is generated", ID_COLUMN),
    }
}

/// Checks every foreign key of `row` against the rows visible in `view`.
fn check_references(view: &TxView<'_>, table: &Table, row: &[Value]) -> Result<(), StoreError> {
    for relation in &table.relations {
        let value = &row[table.column_index(&relation.from_column)?];
        if value.is_null() {
            continue;
        }
        // A row may reference itself through a self-relation.
        if relation.to_table == table.name && relation.to_column == ID_COLUMN && *value == row[0] {
            continue;
        }

        let target = view.table(&relation.to_table)?;
        let target_index = target.column_index(&relation.to_column)?;
        let present = view.rows(target).iter().any(|r| &r[target_index] == value);
        if !present {
            return Err(StoreError::ConstraintViolation {
                table: table.name.clone(),
                constraint: relation.constraint_name(&table.name),
                detail: format!(
                    "Key ({})=({}) is not present in table \"{}\"",
                    relation.from_column,
                    value.to_sql_literal(),
                    relation.to_table
                ),
            });
        }
    }
    Ok(())
}
