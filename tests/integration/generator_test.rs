//! Sample data generation against SQLite.

use std::sync::Arc;
use std::time::Duration;

use sql_sandbox::db::Value;
use sql_sandbox::error::SandboxError;
use sql_sandbox::generator::{GenerationRequest, GenerationState, SampleDataGenerator};
use sql_sandbox::query::ExecutionResult;
use sql_sandbox::safety::Privilege;
use tempfile::tempdir;

use super::common::{executor, sandbox_db, small_request};

async fn count(executor: &sql_sandbox::query::QueryExecutor, table: &str) -> Value {
    let sql = format!("SELECT COUNT(*) AS n FROM {table}");
    match executor.execute(&sql, Privilege::Standard).await {
        ExecutionResult::Success { rows, .. } => rows[0].get("n").cloned().unwrap(),
        other => panic!("Expected Success, got {other:?}"),
    }
}

#[tokio::test]
async fn test_generate_creates_and_fills_tables() {
    let dir = tempdir().unwrap();
    let db = sandbox_db(&dir).await;
    let state = GenerationState::new();
    let generator = SampleDataGenerator::new(Arc::clone(&db), state.clone());

    let report = generator.generate(small_request()).await.unwrap();
    assert_eq!(report.customers, 1500);

    let executor = executor(db, Duration::from_secs(30));
    assert_eq!(count(&executor, "sample_customers").await, Value::Int(1500));
    assert_eq!(count(&executor, "sample_products").await, Value::Int(40));
    assert_eq!(count(&executor, "sample_orders").await, Value::Int(300));
    assert_eq!(
        count(&executor, "sample_order_items").await,
        Value::Int(report.order_items as i64)
    );

    let status = state.status();
    assert!(!status.is_generating);
    assert_eq!(status.progress, 100);
}

#[tokio::test]
async fn test_regenerating_replaces_existing_rows() {
    let dir = tempdir().unwrap();
    let db = sandbox_db(&dir).await;
    let generator = SampleDataGenerator::new(Arc::clone(&db), GenerationState::new());

    generator.generate(small_request()).await.unwrap();
    let smaller = GenerationRequest {
        customers: 10,
        products: 5,
        orders: 20,
        items_per_order: 1,
    };
    generator.generate(smaller).await.unwrap();

    let executor = executor(db, Duration::from_secs(30));
    assert_eq!(count(&executor, "sample_customers").await, Value::Int(10));
    assert_eq!(count(&executor, "sample_orders").await, Value::Int(20));
}

#[tokio::test]
async fn test_generation_is_single_writer() {
    let dir = tempdir().unwrap();
    let db = sandbox_db(&dir).await;
    let state = GenerationState::new();
    let generator = SampleDataGenerator::new(db, state.clone());

    let running = state.begin().unwrap();
    let err = generator.generate(small_request()).await.unwrap_err();
    assert!(matches!(err, SandboxError::Conflict(_)));

    drop(running);
    assert!(generator.generate(small_request()).await.is_ok());
}
