//! SQLite database client implementation.
//!
//! Backs local runs and the test suite with a file database. Plans come from
//! `EXPLAIN QUERY PLAN`, whose rows carry no `key`/`rows` columns, so plan
//! summaries on this backend are always absent.

use crate::config::ConnectionConfig;
use crate::db::sandbox::{close_detached, column_names, materialize, ABANDONED};
use crate::db::{decode_record, DatabaseBackend, DatabaseClient, PlanRow, SandboxRun};
use crate::error::{Result, SandboxError};
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::{Connection, Executor, Sqlite};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// SQLite database client.
#[derive(Debug)]
pub struct SqliteClient {
    pool: SqlitePool,
}

impl SqliteClient {
    /// Creates a new SqliteClient from an existing connection pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if missing) the database file named by `config.database`.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let path = config
            .database
            .as_deref()
            .ok_or_else(|| SandboxError::config("SQLite database path is required"))?;

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| SandboxError::connection(format!("Cannot open SQLite database {path}: {e}")))?;

        debug!("Opened SQLite database at {path}");
        Ok(Self { pool })
    }

    async fn acquire(&self, abandon: &CancellationToken) -> Result<PoolConnection<Sqlite>> {
        tokio::select! {
            biased;

            _ = abandon.cancelled() => Err(SandboxError::query(ABANDONED)),
            acquired = self.pool.acquire() => acquired.map_err(|e| {
                SandboxError::connection(format!("Failed to acquire connection: {e}"))
            }),
        }
    }
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    // SQLite has no server-side statement deadline or interrupt. An
    // abandoned unit keeps its worker until the statement has finished.
    async fn run_sandboxed(
        &self,
        sql: &str,
        _statement_timeout: Duration,
        abandon: &CancellationToken,
    ) -> Result<SandboxRun> {
        let mut conn = self.acquire(abandon).await?;

        let outcome = tokio::select! {
            biased;

            _ = abandon.cancelled() => None,
            outcome = run_unit(&mut conn, sql) => Some(outcome),
        };

        match outcome {
            Some(outcome) => outcome,
            None => Err(discard(conn).await),
        }
    }

    async fn probe_plan(
        &self,
        sql: &str,
        _statement_timeout: Duration,
        abandon: &CancellationToken,
    ) -> Result<Vec<PlanRow>> {
        let mut conn = self.acquire(abandon).await?;

        let outcome = tokio::select! {
            biased;

            _ = abandon.cancelled() => None,
            outcome = probe_unit(&mut conn, sql) => Some(outcome),
        };

        match outcome {
            Some(outcome) => outcome,
            None => Err(discard(conn).await),
        }
    }

    async fn execute_admin(&self, sql: &str) -> Result<u64> {
        let result = (&self.pool)
            .execute(sql)
            .await
            .map_err(|e| SandboxError::query(format_query_error(e)))?;
        Ok(result.rows_affected())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

async fn run_unit(conn: &mut SqliteConnection, sql: &str) -> Result<SandboxRun> {
    let mut tx = conn
        .begin()
        .await
        .map_err(|e| SandboxError::query(format_query_error(e)))?;

    let outcome = async {
        let plan = inspect_plan(&mut *tx, sql).await?;
        let rows = (&mut *tx).fetch_all(sql).await?;
        let described = if rows.is_empty() {
            describe_labels(&mut *tx, sql).await
        } else {
            Vec::new()
        };
        Ok::<_, sqlx::Error>(SandboxRun {
            plan,
            result: materialize(&rows, described),
        })
    }
    .await;

    if let Err(e) = tx.rollback().await {
        warn!("Rollback failed: {e}");
    }

    outcome.map_err(|e| SandboxError::query(format_query_error(e)))
}

async fn probe_unit(conn: &mut SqliteConnection, sql: &str) -> Result<Vec<PlanRow>> {
    let mut tx = conn
        .begin()
        .await
        .map_err(|e| SandboxError::query(format_query_error(e)))?;

    let outcome = inspect_plan(&mut *tx, sql).await;

    if let Err(e) = tx.rollback().await {
        warn!("Rollback failed: {e}");
    }

    outcome.map_err(|e| SandboxError::query(format_query_error(e)))
}

/// Runs `EXPLAIN QUERY PLAN` for `sql`, one record per plan step.
async fn inspect_plan(
    conn: &mut SqliteConnection,
    sql: &str,
) -> std::result::Result<Vec<PlanRow>, sqlx::Error> {
    let probe = DatabaseBackend::Sqlite.plan_probe(sql);
    let rows = (&mut *conn).fetch_all(probe.as_str()).await?;
    debug!(steps = rows.len(), "Plan probe completed");
    Ok(rows.iter().map(decode_record).collect())
}

/// Output labels of `sql`, or none when it cannot be described.
async fn describe_labels(conn: &mut SqliteConnection, sql: &str) -> Vec<String> {
    match (&mut *conn).describe(sql).await {
        Ok(description) => column_names(description.columns()),
        Err(e) => {
            debug!("Could not describe statement: {e}");
            Vec::new()
        }
    }
}

/// Detaches an abandoned connection and waits for it to close.
///
/// The SQLite worker finishes its current statement before it shuts down,
/// so the unit (and its worker permit) lives until then.
async fn discard(conn: PoolConnection<Sqlite>) -> SandboxError {
    warn!("Discarding connection of an abandoned unit of work");
    close_detached(conn.detach()).await;
    SandboxError::query(ABANDONED)
}

/// Returns the engine's own message for database errors.
fn format_query_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => db_error.message().to_string(),
        None => error.to_string(),
    }
}
