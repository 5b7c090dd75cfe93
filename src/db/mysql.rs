//! MySQL database client implementation.
//!
//! Provides the `MySqlClient` struct that implements the `DatabaseClient` trait
//! for MySQL databases using sqlx.

use crate::config::ConnectionConfig;
use crate::db::sandbox::{close_detached, column_names, materialize, ABANDONED};
use crate::db::{decode_record, DatabaseBackend, DatabaseClient, PlanRow, SandboxRun};
use crate::error::{Result, SandboxError};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnection, MySqlDatabaseError, MySqlPool, MySqlPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::{Connection, Executor, MySql};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// MySQL database client.
#[derive(Debug)]
pub struct MySqlClient {
    pool: MySqlPool,
}

impl MySqlClient {
    /// Creates a new MySqlClient from an existing connection pool.
    ///
    /// This is primarily useful for testing.
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Connects to MySQL, retrying transient failures with exponential backoff.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let conn_str = config.to_connection_string()?;

        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            let result = MySqlPoolOptions::new()
                .max_connections(config.pool_size)
                .acquire_timeout(Duration::from_secs(10))
                .connect(&conn_str)
                .await;

            match result {
                Ok(pool) => {
                    debug!("Successfully connected to database");
                    return Ok(Self { pool });
                }
                Err(e) => {
                    let is_transient = is_transient_error(&e);

                    if attempt < MAX_RETRY_ATTEMPTS && is_transient {
                        warn!(
                            "Connection attempt {} failed (transient error), retrying in {:?}",
                            attempt, delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                        last_error = Some(e);
                        continue;
                    }

                    return Err(map_connection_error(e, config));
                }
            }
        }

        Err(match last_error {
            Some(e) => map_connection_error(e, config),
            None => SandboxError::connection("No connection attempt was made"),
        })
    }

    /// Acquires a pooled connection with the server-side statement deadline
    /// set, along with the server's id for that connection.
    async fn acquire(
        &self,
        statement_timeout: Duration,
        abandon: &CancellationToken,
    ) -> Result<(PoolConnection<MySql>, u64)> {
        let mut conn = tokio::select! {
            biased;

            _ = abandon.cancelled() => return Err(SandboxError::query(ABANDONED)),
            acquired = self.pool.acquire() => acquired.map_err(|e| {
                SandboxError::connection(format!("Failed to acquire connection: {e}"))
            })?,
        };

        // MAX_EXECUTION_TIME only applies to SELECT; other statements are
        // stopped with KILL QUERY once abandoned.
        let millis = statement_timeout.as_millis().min(u128::from(u32::MAX));
        let set_deadline = format!("SET SESSION MAX_EXECUTION_TIME = {millis}");
        (&mut *conn)
            .execute(set_deadline.as_str())
            .await
            .map_err(|e| SandboxError::query(format_query_error(e)))?;

        let connection_id: u64 = sqlx::query_scalar("SELECT CONNECTION_ID()")
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| SandboxError::query(format_query_error(e)))?;

        Ok((conn, connection_id))
    }

    /// Stops the statement of an abandoned unit and closes its connection.
    ///
    /// The kill goes out on another pooled connection. The abandoned
    /// connection is detached so it never returns to the pool, and the unit
    /// (with its worker permit) lives until the server has let it go.
    async fn discard(&self, conn: PoolConnection<MySql>, connection_id: u64) -> SandboxError {
        warn!(connection_id, "Killing statement of an abandoned unit of work");
        let kill = format!("KILL QUERY {connection_id}");
        if let Err(e) = (&self.pool).execute(kill.as_str()).await {
            warn!(connection_id, "Could not kill abandoned statement: {e}");
        }
        close_detached(conn.detach()).await;
        SandboxError::query(ABANDONED)
    }
}

#[async_trait]
impl DatabaseClient for MySqlClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::MySql
    }

    async fn run_sandboxed(
        &self,
        sql: &str,
        statement_timeout: Duration,
        abandon: &CancellationToken,
    ) -> Result<SandboxRun> {
        let (mut conn, connection_id) = self.acquire(statement_timeout, abandon).await?;

        let outcome = tokio::select! {
            biased;

            _ = abandon.cancelled() => None,
            outcome = run_unit(&mut conn, sql) => Some(outcome),
        };

        match outcome {
            Some(outcome) => outcome,
            None => Err(self.discard(conn, connection_id).await),
        }
    }

    async fn probe_plan(
        &self,
        sql: &str,
        statement_timeout: Duration,
        abandon: &CancellationToken,
    ) -> Result<Vec<PlanRow>> {
        let (mut conn, connection_id) = self.acquire(statement_timeout, abandon).await?;

        let outcome = tokio::select! {
            biased;

            _ = abandon.cancelled() => None,
            outcome = probe_unit(&mut conn, sql) => Some(outcome),
        };

        match outcome {
            Some(outcome) => outcome,
            None => Err(self.discard(conn, connection_id).await),
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

/// Plan probe, statement and materialization inside a rolled-back transaction.
async fn run_unit(conn: &mut MySqlConnection, sql: &str) -> Result<SandboxRun> {
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

/// Plan probe alone inside a rolled-back transaction.
async fn probe_unit(conn: &mut MySqlConnection, sql: &str) -> Result<Vec<PlanRow>> {
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

/// Runs `EXPLAIN` for `sql` and returns one record per plan step, in
/// planner order.
///
/// Runs on the unit's own transaction so the plan describes the same
/// session state as the statement.
async fn inspect_plan(
    conn: &mut MySqlConnection,
    sql: &str,
) -> std::result::Result<Vec<PlanRow>, sqlx::Error> {
    let probe = DatabaseBackend::MySql.plan_probe(sql);
    let rows = (&mut *conn).fetch_all(probe.as_str()).await?;
    debug!(steps = rows.len(), "Plan probe completed");
    Ok(rows.iter().map(decode_record).collect())
}

/// Output labels of `sql`; best-effort, so undescribable statements give none.
async fn describe_labels(conn: &mut MySqlConnection, sql: &str) -> Vec<String> {
    match (&mut *conn).describe(sql).await {
        Ok(description) => column_names(description.columns()),
        Err(e) => {
            debug!("Could not describe statement: {e}");
            Vec::new()
        }
    }
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    if matches!(error, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) {
        return true;
    }

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
        || error_str.contains("too many connections")
    {
        return true;
    }

    false
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> SandboxError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.port_or_default();
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        SandboxError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("access denied") {
        SandboxError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("unknown database") {
        SandboxError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        SandboxError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        SandboxError::connection(error.to_string())
    }
}

/// Formats a query error the way the MySQL client prints it.
///
/// Server errors render as `ERROR <code> (<sqlstate>): <message>`; anything
/// else falls back to the driver's description.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    match db_error.try_downcast_ref::<MySqlDatabaseError>() {
        Some(mysql_error) => match mysql_error.code() {
            Some(state) => format!(
                "ERROR {} ({}): {}",
                mysql_error.number(),
                state,
                mysql_error.message()
            ),
            None => format!("ERROR {}: {}", mysql_error.number(), mysql_error.message()),
        },
        None => db_error.message().to_string(),
    }
}
