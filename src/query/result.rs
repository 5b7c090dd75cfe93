//! Uniform result contract for sandboxed statements.

use serde::Serialize;

use crate::db::{PlanRow, Record, SandboxRun};
use crate::persistence::QueryStatus;

use super::plan::{plan_json, PlanSummary};

/// Message reported for statements that exceed their deadline.
pub const TIMEOUT_MESSAGE: &str = "Query execution timed out";

/// Outcome of one statement, whatever stage it stopped at.
///
/// Serializes with a `status` tag of `SUCCESS`, `ERROR` or `TIMEOUT`. Rows
/// and columns exist only on success.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "UPPERCASE")]
pub enum ExecutionResult {
    Success {
        original_sql: String,
        processed_sql: String,
        columns: Vec<String>,
        rows: Vec<Record>,
        elapsed_ms: u64,
        rows_returned: u64,
        rows_scanned: Option<u64>,
        index_used: Option<String>,
        plan_json: String,
    },
    Error {
        original_sql: String,
        message: String,
        /// Absent when the statement was rejected before reaching the database.
        elapsed_ms: Option<u64>,
    },
    Timeout {
        original_sql: String,
        elapsed_ms: u64,
    },
}

impl ExecutionResult {
    /// Builds a success result from a completed unit of work.
    pub fn success(
        original_sql: impl Into<String>,
        processed_sql: impl Into<String>,
        run: SandboxRun,
        elapsed_ms: u64,
    ) -> Self {
        let summary = PlanSummary::from_plan(&run.plan);
        Self::Success {
            original_sql: original_sql.into(),
            processed_sql: processed_sql.into(),
            rows_returned: run.result.rows.len() as u64,
            columns: run.result.columns,
            rows: run.result.rows,
            elapsed_ms,
            rows_scanned: summary.rows_scanned,
            index_used: summary.index_used,
            plan_json: plan_json(&run.plan),
        }
    }

    /// A statement refused by validation.
    pub fn rejected(original_sql: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Error {
            original_sql: original_sql.into(),
            message: reason.into(),
            elapsed_ms: None,
        }
    }

    /// A statement the database failed, with the native message.
    pub fn fault(original_sql: impl Into<String>, native_message: &str, elapsed_ms: u64) -> Self {
        Self::Error {
            original_sql: original_sql.into(),
            message: format!("SQL Error: {native_message}"),
            elapsed_ms: Some(elapsed_ms),
        }
    }

    pub fn timeout(original_sql: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::Timeout {
            original_sql: original_sql.into(),
            elapsed_ms,
        }
    }

    pub fn status(&self) -> QueryStatus {
        match self {
            Self::Success { .. } => QueryStatus::Success,
            Self::Error { .. } => QueryStatus::Error,
            Self::Timeout { .. } => QueryStatus::Timeout,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The SQL exactly as the caller submitted it.
    pub fn original_sql(&self) -> &str {
        match self {
            Self::Success { original_sql, .. }
            | Self::Error { original_sql, .. }
            | Self::Timeout { original_sql, .. } => original_sql,
        }
    }

    /// Wall-clock time measured from dispatch, when the statement was dispatched.
    pub fn elapsed_ms(&self) -> Option<u64> {
        match self {
            Self::Success { elapsed_ms, .. } | Self::Timeout { elapsed_ms, .. } => Some(*elapsed_ms),
            Self::Error { elapsed_ms, .. } => *elapsed_ms,
        }
    }

    /// Human-readable failure message; `None` on success.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Error { message, .. } => Some(message),
            Self::Timeout { .. } => Some(TIMEOUT_MESSAGE),
        }
    }
}

/// Result of a plan-only request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplainResult {
    pub success: bool,
    pub plan_rows: Vec<PlanRow>,
    pub index_used: Option<String>,
    pub rows_scanned: Option<u64>,
    pub error_message: Option<String>,
}

impl ExplainResult {
    pub fn success(plan_rows: Vec<PlanRow>) -> Self {
        let summary = PlanSummary::from_plan(&plan_rows);
        Self {
            success: true,
            plan_rows,
            index_used: summary.index_used,
            rows_scanned: summary.rows_scanned,
            error_message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            plan_rows: Vec::new(),
            index_used: None,
            rows_scanned: None,
            error_message: Some(message.into()),
        }
    }
}
