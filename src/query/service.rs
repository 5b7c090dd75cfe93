//! Caller-facing sandbox operations.
//!
//! Wraps a [`QueryExecutor`] with per-caller history recording. Recording
//! happens on background tasks: a slow or failing history store never delays
//! or alters the result a caller receives.

use std::sync::Arc;

use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::error::{Result, SandboxError};
use crate::persistence::{HistorySink, NewHistoryEntry};
use crate::safety::Privilege;

use super::executor::QueryExecutor;
use super::result::{ExecutionResult, ExplainResult};

/// Default cap on statements in one compare request.
pub const DEFAULT_MAX_COMPARE: usize = 5;

/// Identity of whoever submitted a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: i64,
    pub privilege: Privilege,
}

impl Caller {
    pub fn new(user_id: i64, privilege: Privilege) -> Self {
        Self { user_id, privilege }
    }

    pub fn admin(user_id: i64) -> Self {
        Self::new(user_id, Privilege::Admin)
    }

    pub fn standard(user_id: i64) -> Self {
        Self::new(user_id, Privilege::Standard)
    }
}

/// Executes, explains and compares statements on behalf of callers.
pub struct SandboxService {
    executor: QueryExecutor,
    history: Option<Arc<dyn HistorySink>>,
    recorders: TaskTracker,
    max_compare: usize,
}

impl SandboxService {
    pub fn new(executor: QueryExecutor) -> Self {
        Self {
            executor,
            history: None,
            recorders: TaskTracker::new(),
            max_compare: DEFAULT_MAX_COMPARE,
        }
    }

    /// Records every executed or compared statement to `sink`.
    pub fn with_history(mut self, sink: Arc<dyn HistorySink>) -> Self {
        self.history = Some(sink);
        self
    }

    pub fn with_max_compare(mut self, max_compare: usize) -> Self {
        self.max_compare = max_compare.max(1);
        self
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    pub fn max_compare(&self) -> usize {
        self.max_compare
    }

    /// Runs one statement and records the attempt.
    pub async fn execute_query(&self, sql: &str, caller: Caller) -> ExecutionResult {
        let result = self.executor.execute(sql, caller.privilege).await;
        self.record(caller.user_id, &result);
        result
    }

    /// Returns the plan for a statement without running it. Not recorded.
    pub async fn explain_only(&self, sql: &str, caller: Caller) -> ExplainResult {
        self.executor.explain_only(sql, caller.privilege).await
    }

    /// Runs up to `max_compare` statements concurrently.
    ///
    /// Results come back in input order and each one is recorded
    /// individually.
    pub async fn compare_queries<S>(&self, sqls: &[S], caller: Caller) -> Result<Vec<ExecutionResult>>
    where
        S: AsRef<str>,
    {
        if sqls.is_empty() {
            return Err(SandboxError::invalid_request(
                "At least one SQL query is required",
            ));
        }
        if sqls.len() > self.max_compare {
            return Err(SandboxError::invalid_request(format!(
                "At most {} queries can be compared at once",
                self.max_compare
            )));
        }

        let results = self.executor.compare_many(sqls, caller.privilege).await;
        for result in &results {
            self.record(caller.user_id, result);
        }
        Ok(results)
    }

    /// Spawns a best-effort history write for `result`.
    fn record(&self, user_id: i64, result: &ExecutionResult) {
        let Some(sink) = self.history.clone() else {
            return;
        };

        let entry = NewHistoryEntry::from_result(user_id, result);
        self.recorders.spawn(async move {
            if let Err(e) = sink.record(entry).await {
                warn!(user_id, "Failed to record query history: {e}");
            }
        });
    }

    /// Waits for pending history writes, then closes the database.
    pub async fn shutdown(&self) -> Result<()> {
        self.recorders.close();
        self.recorders.wait().await;
        debug!("History writers drained");
        self.executor.database().close().await
    }
}
