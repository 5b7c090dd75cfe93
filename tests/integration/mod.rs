//! Integration tests for the SQL sandbox.
//!
//! Most tests run against a temporary SQLite database. MySQL tests are
//! skipped unless MYSQL_TEST_URL is set.

pub mod common;
pub mod generator_test;
pub mod history_test;
pub mod mysql_test;
pub mod sandbox_test;
