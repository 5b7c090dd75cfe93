//! Shared fixtures: a throwaway SQLite sandbox filled with sample data.

use std::sync::Arc;
use std::time::Duration;

use sql_sandbox::config::ConnectionConfig;
use sql_sandbox::db::{self, DatabaseBackend, DatabaseClient};
use sql_sandbox::generator::{GenerationRequest, GenerationState, SampleDataGenerator};
use sql_sandbox::query::{QueryExecutor, WorkerPool};
use sql_sandbox::safety::SqlValidator;
use tempfile::TempDir;

pub fn small_request() -> GenerationRequest {
    GenerationRequest {
        customers: 1500,
        products: 40,
        orders: 300,
        items_per_order: 2,
    }
}

/// Opens an empty SQLite sandbox inside `dir`.
pub async fn sandbox_db(dir: &TempDir) -> Arc<dyn DatabaseClient> {
    let config = ConnectionConfig {
        backend: DatabaseBackend::Sqlite,
        database: Some(dir.path().join("sandbox.db").display().to_string()),
        ..Default::default()
    };
    db::connect(&config).await.unwrap()
}

/// Opens a SQLite sandbox with the sample tables filled.
pub async fn seeded_db(dir: &TempDir) -> Arc<dyn DatabaseClient> {
    let db = sandbox_db(dir).await;
    SampleDataGenerator::new(Arc::clone(&db), GenerationState::new())
        .generate(small_request())
        .await
        .unwrap();
    db
}

pub fn executor(db: Arc<dyn DatabaseClient>, timeout: Duration) -> QueryExecutor {
    QueryExecutor::new(db, SqlValidator::default(), WorkerPool::new(4), timeout)
}
