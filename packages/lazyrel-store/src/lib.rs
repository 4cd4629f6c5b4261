//! In-process relational store backing the lazyrel persistence core.
//!
//! Provides named databases behind a connection string, typed tables with
//! generated keys and foreign keys, staged transactions with atomic commit,
//! and schema creation/validation from a serializable DDL description.

pub mod config;
pub mod connection;
pub mod database;
pub mod error;
pub mod schema;
pub mod server;
pub mod statement;
pub mod table;
pub mod transaction;
pub mod value;

pub use config::{ConnectionConfig, ConnectionTarget, StoreConfig};
pub use connection::{Connection, StatementResult};
pub use database::Database;
pub use error::StoreError;
pub use schema::{SchemaAction, SchemaFile};
pub use server::StoreServer;
pub use statement::{Filter, Statement};
pub use value::{ColumnType, Row, Value};
