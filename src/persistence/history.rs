//! Query history persistence.
//!
//! Records every execution attempt per user with retention management.
//! Recording is best-effort: callers spawn it and only log failures.

use std::sync::Arc;

use crate::error::{Result, SandboxError};
use crate::query::ExecutionResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;
use tracing::debug;

use super::StateDb;

/// Largest page returned by [`list_for_user`].
pub const MAX_PAGE_SIZE: i64 = 100;

/// Entries kept per user when no retention is configured.
pub const DEFAULT_KEEP_PER_USER: u32 = 1000;

/// Query execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryStatus {
    Success,
    Error,
    Timeout,
}

impl QueryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
            Self::Timeout => "TIMEOUT",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "SUCCESS" => Self::Success,
            "TIMEOUT" => Self::Timeout,
            _ => Self::Error,
        }
    }
}

/// A query history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub user_id: i64,
    pub sql_text: String,
    pub status: QueryStatus,
    pub execution_time_ms: Option<i64>,
    pub rows_scanned: Option<i64>,
    pub rows_returned: Option<i64>,
    pub index_used: Option<String>,
    pub explain_result: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
}

/// Raw database row for history entry.
#[derive(Debug, Clone, FromRow)]
struct HistoryEntryRow {
    id: i64,
    user_id: i64,
    sql_text: String,
    status: String,
    execution_time_ms: Option<i64>,
    rows_scanned: Option<i64>,
    rows_returned: Option<i64>,
    index_used: Option<String>,
    explain_result: Option<String>,
    error_message: Option<String>,
    created_at: String,
}

impl From<HistoryEntryRow> for HistoryEntry {
    fn from(row: HistoryEntryRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            sql_text: row.sql_text,
            status: QueryStatus::from_str(&row.status),
            execution_time_ms: row.execution_time_ms,
            rows_scanned: row.rows_scanned,
            rows_returned: row.rows_returned,
            index_used: row.index_used,
            explain_result: row.explain_result,
            error_message: row.error_message,
            created_at: row.created_at,
        }
    }
}

/// An execution attempt about to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryEntry {
    pub user_id: i64,
    pub sql_text: String,
    pub status: QueryStatus,
    pub execution_time_ms: Option<i64>,
    pub rows_scanned: Option<i64>,
    pub rows_returned: Option<i64>,
    pub index_used: Option<String>,
    pub explain_result: Option<String>,
    pub error_message: Option<String>,
}

impl NewHistoryEntry {
    /// Builds the entry for `result` as submitted by `user_id`.
    ///
    /// The submitted (unprocessed) SQL is what gets recorded.
    pub fn from_result(user_id: i64, result: &ExecutionResult) -> Self {
        let mut entry = Self {
            user_id,
            sql_text: result.original_sql().to_string(),
            status: result.status(),
            execution_time_ms: result.elapsed_ms().map(to_i64),
            rows_scanned: None,
            rows_returned: None,
            index_used: None,
            explain_result: None,
            error_message: result.error_message().map(str::to_string),
        };

        if let ExecutionResult::Success {
            rows_returned,
            rows_scanned,
            index_used,
            plan_json,
            ..
        } = result
        {
            entry.rows_returned = Some(to_i64(*rows_returned));
            entry.rows_scanned = rows_scanned.map(to_i64);
            entry.index_used = index_used.clone();
            entry.explain_result = Some(plan_json.clone());
        }

        entry
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Records a new execution attempt, returning its id.
pub async fn record(pool: &SqlitePool, entry: &NewHistoryEntry) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO query_history
        (user_id, sql_text, status, execution_time_ms, rows_scanned, rows_returned,
         index_used, explain_result, error_message)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.user_id)
    .bind(&entry.sql_text)
    .bind(entry.status.as_str())
    .bind(entry.execution_time_ms)
    .bind(entry.rows_scanned)
    .bind(entry.rows_returned)
    .bind(&entry.index_used)
    .bind(&entry.explain_result)
    .bind(&entry.error_message)
    .execute(pool)
    .await
    .map_err(|e| SandboxError::persistence(format!("Failed to record query: {e}")))?;

    Ok(result.last_insert_rowid())
}

/// Lists a user's entries, newest first.
///
/// `limit` is clamped to `1..=MAX_PAGE_SIZE`.
pub async fn list_for_user(
    pool: &SqlitePool,
    user_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<HistoryEntry>> {
    let rows: Vec<HistoryEntryRow> = sqlx::query_as(
        r#"
        SELECT id, user_id, sql_text, status, execution_time_ms, rows_scanned,
               rows_returned, index_used, explain_result, error_message, created_at
        FROM query_history
        WHERE user_id = ?
        ORDER BY created_at DESC, id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(user_id)
    .bind(limit.clamp(1, MAX_PAGE_SIZE))
    .bind(offset.max(0))
    .fetch_all(pool)
    .await
    .map_err(|e| SandboxError::persistence(format!("Failed to list history: {e}")))?;

    Ok(rows.into_iter().map(HistoryEntry::from).collect())
}

/// Gets a single entry, only if it belongs to `user_id`.
pub async fn get_for_user(pool: &SqlitePool, user_id: i64, id: i64) -> Result<Option<HistoryEntry>> {
    let row: Option<HistoryEntryRow> = sqlx::query_as(
        r#"
        SELECT id, user_id, sql_text, status, execution_time_ms, rows_scanned,
               rows_returned, index_used, explain_result, error_message, created_at
        FROM query_history
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| SandboxError::persistence(format!("Failed to get history entry: {e}")))?;

    Ok(row.map(HistoryEntry::from))
}

/// Returns the number of entries recorded for a user.
pub async fn count_for_user(pool: &SqlitePool, user_id: i64) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM query_history WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .map_err(|e| SandboxError::persistence(format!("Failed to count history: {e}")))?;

    Ok(count)
}

/// Deletes all but the newest `keep` entries of a user, returning rows removed.
pub async fn prune_for_user(pool: &SqlitePool, user_id: i64, keep: u32) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM query_history
        WHERE user_id = ?
          AND id NOT IN (
              SELECT id FROM query_history
              WHERE user_id = ?
              ORDER BY created_at DESC, id DESC
              LIMIT ?
          )
        "#,
    )
    .bind(user_id)
    .bind(user_id)
    .bind(i64::from(keep))
    .execute(pool)
    .await
    .map_err(|e| SandboxError::persistence(format!("Failed to prune history: {e}")))?;

    Ok(result.rows_affected())
}

/// Destination for execution records.
///
/// Implementations may fail; callers treat every failure as non-fatal.
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn record(&self, entry: NewHistoryEntry) -> Result<()>;
}

/// History sink and reader backed by the state database.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    db: Arc<StateDb>,
    keep_per_user: u32,
}

impl HistoryStore {
    pub fn new(db: Arc<StateDb>) -> Self {
        Self {
            db,
            keep_per_user: DEFAULT_KEEP_PER_USER,
        }
    }

    /// Sets how many entries are kept per user after each write.
    pub fn with_keep_per_user(mut self, keep: u32) -> Self {
        self.keep_per_user = keep;
        self
    }

    pub async fn list(&self, user_id: i64, limit: i64, offset: i64) -> Result<Vec<HistoryEntry>> {
        list_for_user(self.db.pool(), user_id, limit, offset).await
    }

    pub async fn get(&self, user_id: i64, id: i64) -> Result<Option<HistoryEntry>> {
        get_for_user(self.db.pool(), user_id, id).await
    }

    pub async fn count(&self, user_id: i64) -> Result<i64> {
        count_for_user(self.db.pool(), user_id).await
    }
}

#[async_trait]
impl HistorySink for HistoryStore {
    async fn record(&self, entry: NewHistoryEntry) -> Result<()> {
        let pool = self.db.pool();
        let id = record(pool, &entry).await?;
        let pruned = prune_for_user(pool, entry.user_id, self.keep_per_user).await?;
        debug!(id, user_id = entry.user_id, pruned, "Recorded query history");
        Ok(())
    }
}
