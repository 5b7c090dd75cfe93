//! sql-sandbox - admission control and bounded execution for ad-hoc SQL.
//!
//! This library exposes the core modules for the binary and for
//! integration tests.

pub mod config;
pub mod db;
pub mod error;
pub mod generator;
pub mod persistence;
pub mod query;
pub mod safety;
