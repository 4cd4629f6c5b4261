//! Store error types.

use thiserror::Error;

/// Store operation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Table not found
    #[error("Table '{table}' not found")]
    TableNotFound { table: String },

    /// Column not found in table
    #[error("Column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    /// Column declared twice, or clashing with the generated key
    #[error("Column '{column}' already exists in table '{table}'")]
    ColumnAlreadyExists { table: String, column: String },

    /// Table already exists
    #[error("Table '{0}' already exists")]
    TableAlreadyExists(String),

    /// Value does not fit the column type
    #[error("Type mismatch for '{table}.{column}': expected {expected}, got {got}")]
    TypeMismatch {
        table: String,
        column: String,
        expected: String,
        got: String,
    },

    /// NOT NULL or foreign key constraint rejected a write
    #[error("Constraint '{constraint}' violated on table '{table}': {detail}")]
    ConstraintViolation {
        table: String,
        constraint: String,
        detail: String,
    },

    /// Row with the given key does not exist
    #[error("Row with id {id} not found in table '{table}'")]
    RowNotFound { table: String, id: i64 },

    /// Table would grow past its configured row limit
    #[error("Row limit exceeded for table '{table}': limit {limit} rows")]
    RowLimitExceeded { table: String, limit: usize },

    /// Transaction conflict or misuse
    #[error("Transaction conflict: {0}")]
    TransactionConflict(String),

    /// Lock poisoned (RwLock poisoned)
    #[error("Lock poisoned")]
    LockPoisoned,

    /// DDL description is malformed
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Existing tables do not match the expected schema
    #[error("Schema validation failed: {0}")]
    SchemaValidation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Connection string could not be parsed
    #[error("Invalid connection string '{0}'")]
    InvalidConnectionString(String),

    /// Nothing accepts connections at the target
    #[error("Connection refused: {target}")]
    ConnectionRefused { target: String },

    /// Credentials rejected
    #[error("Authentication failed for user '{user}' on database '{database}'")]
    AuthenticationFailed { user: String, database: String },

    /// Database name already hosted by the server
    #[error("Database '{0}' already exists")]
    DatabaseAlreadyExists(String),
}

impl StoreError {
    /// Returns `true` for constraint violations.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StoreError::ConstraintViolation { .. })
    }
}
