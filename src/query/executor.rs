//! Bounded execution of validated statements.
//!
//! Every accepted statement becomes a unit of work on the [`WorkerPool`],
//! raced against the configured deadline. When the deadline wins, the
//! caller gets [`ExecutionResult::Timeout`] immediately and the unit is told
//! to abandon its connection.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::db::{DatabaseClient, PlanRow, RowSet, SandboxRun};
use crate::error::{Result, SandboxError};
use crate::safety::{split_explain, Privilege, SqlValidator, ValidationOutcome};

use super::pool::WorkerPool;
use super::result::{ExecutionResult, ExplainResult, TIMEOUT_MESSAGE};

/// Default deadline for one statement.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How a bounded unit of work ended.
#[derive(Debug)]
pub enum Bounded<T> {
    /// The unit finished (successfully or not) before the deadline.
    Completed(Result<T>),
    /// The deadline passed first.
    TimedOut,
}

/// Validates, bounds and runs statements against one database.
pub struct QueryExecutor {
    db: Arc<dyn DatabaseClient>,
    validator: SqlValidator,
    workers: WorkerPool,
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(
        db: Arc<dyn DatabaseClient>,
        validator: SqlValidator,
        workers: WorkerPool,
        timeout: Duration,
    ) -> Self {
        Self {
            db,
            validator,
            workers,
            timeout,
        }
    }

    pub fn validator(&self) -> &SqlValidator {
        &self.validator
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn database(&self) -> &Arc<dyn DatabaseClient> {
        &self.db
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    /// Validates and runs one statement.
    ///
    /// Never fails: rejections, database faults and timeouts are all
    /// reported through the returned [`ExecutionResult`].
    pub async fn execute(&self, sql: &str, privilege: Privilege) -> ExecutionResult {
        let processed_sql = match self.validator.validate(sql, privilege) {
            ValidationOutcome::Accepted { processed_sql } => processed_sql,
            ValidationOutcome::Rejected { reason } => {
                return ExecutionResult::rejected(sql, reason);
            }
        };

        let start = Instant::now();
        let outcome = self.run_statement(processed_sql.clone()).await;
        let elapsed_ms = elapsed_millis(start);

        match outcome {
            Bounded::Completed(Ok(run)) => {
                debug!(elapsed_ms, rows = run.result.row_count(), "Statement completed");
                ExecutionResult::success(sql, processed_sql, run, elapsed_ms)
            }
            Bounded::Completed(Err(e)) => {
                ExecutionResult::fault(sql, &native_message(e), elapsed_ms)
            }
            Bounded::TimedOut => {
                warn!(elapsed_ms, "Statement exceeded its {:?} deadline", self.timeout);
                ExecutionResult::timeout(sql, elapsed_ms)
            }
        }
    }

    /// Validates a statement and probes its plan without running it.
    pub async fn explain_only(&self, sql: &str, privilege: Privilege) -> ExplainResult {
        let processed_sql = match self.validator.validate(sql, privilege) {
            ValidationOutcome::Accepted { processed_sql } => processed_sql,
            ValidationOutcome::Rejected { reason } => return ExplainResult::error(reason),
        };

        let target = match split_explain(&processed_sql) {
            Some((_, inner)) => inner.to_string(),
            None => processed_sql,
        };

        match self.run_plan_probe(target).await {
            Bounded::Completed(Ok(plan)) => ExplainResult::success(plan),
            Bounded::Completed(Err(e)) => {
                ExplainResult::error(format!("SQL Error: {}", native_message(e)))
            }
            Bounded::TimedOut => {
                warn!("Plan probe exceeded its {:?} deadline", self.timeout);
                ExplainResult::error(TIMEOUT_MESSAGE)
            }
        }
    }

    /// Runs every statement concurrently, returning results in input order.
    ///
    /// One failing or slow statement never affects the others.
    pub async fn compare_many<S>(&self, sqls: &[S], privilege: Privilege) -> Vec<ExecutionResult>
    where
        S: AsRef<str>,
    {
        join_all(sqls.iter().map(|sql| self.execute(sql.as_ref(), privilege))).await
    }

    /// Runs an accepted statement, or only its plan when it is an `EXPLAIN`.
    async fn run_statement(&self, processed_sql: String) -> Bounded<SandboxRun> {
        if let Some((_, inner)) = split_explain(&processed_sql) {
            let inner = inner.to_string();
            return match self.run_plan_probe(inner).await {
                Bounded::Completed(result) => Bounded::Completed(result.map(plan_as_run)),
                Bounded::TimedOut => Bounded::TimedOut,
            };
        }

        let db = Arc::clone(&self.db);
        let statement_timeout = self.timeout;
        self.run_bounded(move |abandon| async move {
            db.run_sandboxed(&processed_sql, statement_timeout, &abandon)
                .await
        })
        .await
    }

    async fn run_plan_probe(&self, sql: String) -> Bounded<Vec<PlanRow>> {
        let db = Arc::clone(&self.db);
        let statement_timeout = self.timeout;
        self.run_bounded(move |abandon| async move {
            db.probe_plan(&sql, statement_timeout, &abandon).await
        })
        .await
    }

    /// Dispatches a unit of work to the pool and races it against the deadline.
    ///
    /// The unit receives a token that is cancelled once this call returns.
    /// A unit still running at that point must stop its statement and release
    /// nothing back to shared pools. It keeps its worker until that cleanup
    /// is done, so abandoned units still count against the pool size.
    pub async fn run_bounded<F, Fut, T>(&self, unit: F) -> Bounded<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let abandon = CancellationToken::new();
        let _abandon_on_return = abandon.clone().drop_guard();

        let handle = self.workers.spawn(unit(abandon.clone()));

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(result)) => Bounded::Completed(result),
            Ok(Err(join_error)) => Bounded::Completed(Err(SandboxError::internal(format!(
                "Unit of work failed: {join_error}"
            )))),
            Err(_) => Bounded::TimedOut,
        }
    }
}

/// Presents plan rows as the result of an `EXPLAIN` statement.
fn plan_as_run(plan: Vec<PlanRow>) -> SandboxRun {
    let columns = plan
        .first()
        .map(|row| row.labels().map(str::to_string).collect())
        .unwrap_or_default();

    SandboxRun {
        result: RowSet::new(columns, plan.clone()),
        plan,
    }
}

/// The database's own message for a fault, without our category prefix.
fn native_message(error: SandboxError) -> String {
    match error {
        SandboxError::Query(message) => message,
        other => other.to_string(),
    }
}

fn elapsed_millis(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
