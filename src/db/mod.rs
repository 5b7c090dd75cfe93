//! Database abstraction layer for the SQL sandbox.
//!
//! Provides a trait-based interface over the sqlx backends so that the
//! executor never depends on a concrete driver. Every sandboxed call runs
//! inside a transaction that is rolled back, whatever the statement did.

mod decode;
mod mock;
mod mysql;
mod sandbox;
mod sqlite;
mod types;

pub use decode::{column_labels, decode_record, DecodeRow};
pub use mock::{MockDatabaseClient, MockResponse};
pub use mysql::MySqlClient;
pub use sandbox::materialize;
pub use sqlite::SqliteClient;
pub use types::{PlanRow, Record, RowSet, SandboxRun, Value};

use std::sync::Arc;
use std::time::Duration;

use crate::config::ConnectionConfig;
use crate::error::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    MySql,
    Sqlite,
}

impl DatabaseBackend {
    /// Returns the backend as a string for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => Some(Self::MySql),
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            _ => None,
        }
    }

    /// Returns the default port for this backend, if it listens on one.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::MySql => Some(3306),
            Self::Sqlite => None,
        }
    }

    /// Returns the URL scheme for this backend.
    pub fn url_scheme(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }

    /// Keyword(s) that turn a statement into a plan-only request.
    pub fn explain_prefix(&self) -> &'static str {
        match self {
            Self::MySql => "EXPLAIN",
            Self::Sqlite => "EXPLAIN QUERY PLAN",
        }
    }

    /// Builds the plan probe for `sql`.
    pub fn plan_probe(&self, sql: &str) -> String {
        format!("{} {}", self.explain_prefix(), sql)
    }
}

/// Creates a database client for the given backend and configuration.
///
/// This is the central factory function for database connections.
pub async fn connect(config: &ConnectionConfig) -> Result<Arc<dyn DatabaseClient>> {
    match config.backend {
        DatabaseBackend::MySql => {
            let client = MySqlClient::connect(config).await?;
            Ok(Arc::new(client))
        }
        DatabaseBackend::Sqlite => {
            let client = SqliteClient::connect(config).await?;
            Ok(Arc::new(client))
        }
    }
}

/// Trait defining the interface for database clients.
///
/// Sandboxed methods acquire their own pooled connection, begin a
/// transaction and always roll it back. When `abandon` fires they stop
/// waiting and discard the connection instead of returning it to the pool.
/// Database faults are reported as `SandboxError::Query` carrying the
/// driver's message.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Backend this client talks to.
    fn backend(&self) -> DatabaseBackend;

    /// Probes the plan of `sql`, then runs it and materializes its rows.
    async fn run_sandboxed(
        &self,
        sql: &str,
        statement_timeout: Duration,
        abandon: &CancellationToken,
    ) -> Result<SandboxRun>;

    /// Probes the plan of `sql` without running the statement.
    async fn probe_plan(
        &self,
        sql: &str,
        statement_timeout: Duration,
        abandon: &CancellationToken,
    ) -> Result<Vec<PlanRow>>;

    /// Executes a committed administrative statement, returning rows affected.
    ///
    /// Bypasses the sandbox entirely; only trusted internal callers use it.
    async fn execute_admin(&self, sql: &str) -> Result<u64>;

    /// Closes the connection pool.
    async fn close(&self) -> Result<()>;
}
