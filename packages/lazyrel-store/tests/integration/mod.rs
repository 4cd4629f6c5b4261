//! Integration test suite for the store.
//!
//! 1. Connections and credentials
//! 2. Statements and transactions
//! 3. Schema creation and validation

pub mod connection_tests;
pub mod helpers;
pub mod schema_tests;
pub mod transaction_tests;
