//! Integration test suite for sessions and fetch graphs.
//!
//! 1. Unit of work, identity map and connection release
//! 2. Fetch graphs across one or two session factories

pub mod fetch_graph_tests;
pub mod helpers;
pub mod session_tests;
