//! Mock database client for testing.
//!
//! Returns scripted responses keyed by SQL fragments, can delay them to
//! exercise deadlines, and records every call so tests can assert whether
//! the database was touched at all.

use super::sandbox::ABANDONED;
use super::{DatabaseBackend, DatabaseClient, PlanRow, Record, RowSet, SandboxRun, Value};
use crate::error::{Result, SandboxError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Scripted answer to a sandboxed call.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Plan and rows to return.
    Run(SandboxRun),
    /// Database fault carrying this native message.
    Fail(String),
    /// Waits before answering; abandoned waits end early.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    /// A delayed version of `response`.
    pub fn delayed(delay: Duration, response: MockResponse) -> Self {
        Self::Delay(delay, Box::new(response))
    }

    /// A fault with the given message.
    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }
}

/// A mock database client that returns predefined results.
#[derive(Debug)]
pub struct MockDatabaseClient {
    backend: DatabaseBackend,
    rules: Vec<(String, MockResponse)>,
    calls: Mutex<Vec<String>>,
    abandoned: AtomicUsize,
    abandon_cleanup: Duration,
}

impl MockDatabaseClient {
    /// Creates a mock answering every statement with one echo row.
    pub fn new() -> Self {
        Self {
            backend: DatabaseBackend::MySql,
            rules: Vec::new(),
            calls: Mutex::new(Vec::new()),
            abandoned: AtomicUsize::new(0),
            abandon_cleanup: Duration::ZERO,
        }
    }

    /// Makes abandoned calls linger for `cleanup` before they return, like a
    /// backend waiting for its discarded connection to close.
    pub fn with_abandon_cleanup(mut self, cleanup: Duration) -> Self {
        self.abandon_cleanup = cleanup;
        self
    }

    /// Answers statements containing `fragment` with `response`.
    ///
    /// Rules are checked in the order they were added.
    pub fn respond_to(mut self, fragment: impl Into<String>, response: MockResponse) -> Self {
        self.rules.push((fragment.into(), response));
        self
    }

    /// Statements received so far, in arrival order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of calls that stopped waiting because they were abandoned.
    pub fn abandoned_count(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }

    /// A MySQL-shaped plan with a single step.
    pub fn sample_plan() -> Vec<PlanRow> {
        vec![Record::new()
            .with("id", 1i64)
            .with("select_type", "SIMPLE")
            .with("table", "sample_customers")
            .with("type", "ALL")
            .with("key", Value::Null)
            .with("rows", Value::UInt(1000))
            .with("Extra", Value::Null)]
    }

    fn echo(sql: &str) -> SandboxRun {
        SandboxRun {
            plan: Self::sample_plan(),
            result: RowSet::new(
                vec!["result".to_string()],
                vec![Record::new().with("result", format!("Mock result for: {sql}"))],
            ),
        }
    }

    fn response_for(&self, sql: &str) -> MockResponse {
        self.rules
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| MockResponse::Run(Self::echo(sql)))
    }

    async fn answer(&self, sql: &str, abandon: &CancellationToken) -> Result<SandboxRun> {
        // Real clients give up before acquiring a connection.
        if abandon.is_cancelled() {
            return Err(SandboxError::query(ABANDONED));
        }

        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sql.to_string());

        let mut response = self.response_for(sql);
        loop {
            match response {
                MockResponse::Run(run) => return Ok(run),
                MockResponse::Fail(message) => return Err(SandboxError::query(message)),
                MockResponse::Delay(delay, next) => {
                    tokio::select! {
                        biased;

                        _ = abandon.cancelled() => {
                            tokio::time::sleep(self.abandon_cleanup).await;
                            self.abandoned.fetch_add(1, Ordering::SeqCst);
                            return Err(SandboxError::query(ABANDONED));
                        }
                        _ = tokio::time::sleep(delay) => response = *next,
                    }
                }
            }
        }
    }
}

impl Default for MockDatabaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    async fn run_sandboxed(
        &self,
        sql: &str,
        _statement_timeout: Duration,
        abandon: &CancellationToken,
    ) -> Result<SandboxRun> {
        self.answer(sql, abandon).await
    }

    async fn probe_plan(
        &self,
        sql: &str,
        _statement_timeout: Duration,
        abandon: &CancellationToken,
    ) -> Result<Vec<PlanRow>> {
        self.answer(sql, abandon).await.map(|run| run.plan)
    }

    async fn execute_admin(&self, sql: &str) -> Result<u64> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sql.to_string());
        Ok(0)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
