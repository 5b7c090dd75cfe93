//! End-to-end sandbox behavior against a seeded SQLite database.

use std::time::{Duration, Instant};

use sql_sandbox::db::Value;
use sql_sandbox::persistence::QueryStatus;
use sql_sandbox::query::{ExecutionResult, QueryExecutor, WorkerPool};
use sql_sandbox::safety::{Privilege, SqlValidator};
use tempfile::tempdir;

use super::common::{executor, seeded_db};

const DEADLINE: Duration = Duration::from_secs(30);

fn single_value(result: &ExecutionResult) -> Value {
    match result {
        ExecutionResult::Success { rows, .. } => rows[0].iter().next().unwrap().1.clone(),
        other => panic!("Expected Success, got {other:?}"),
    }
}

#[tokio::test]
async fn test_select_is_capped_at_forced_limit() {
    let dir = tempdir().unwrap();
    let executor = executor(seeded_db(&dir).await, DEADLINE);

    let result = executor
        .execute("SELECT id, city FROM sample_customers", Privilege::Standard)
        .await;

    match result {
        ExecutionResult::Success {
            processed_sql,
            columns,
            rows_returned,
            plan_json,
            ..
        } => {
            assert_eq!(processed_sql, "SELECT id, city FROM sample_customers LIMIT 1000");
            assert_eq!(columns, vec!["id", "city"]);
            assert_eq!(rows_returned, 1000);
            assert!(plan_json.contains("sample_customers"));
        }
        other => panic!("Expected Success, got {other:?}"),
    }
}

#[tokio::test]
async fn test_forbidden_and_multi_statement_sql_never_runs() {
    let dir = tempdir().unwrap();
    let executor = executor(seeded_db(&dir).await, DEADLINE);

    let dropped = executor.execute("DROP DATABASE prod", Privilege::Admin).await;
    assert_eq!(dropped.error_message(), Some("Forbidden SQL command detected"));
    assert_eq!(dropped.elapsed_ms(), None);

    let chained = executor
        .execute(
            "SELECT * FROM sample_orders; DELETE FROM sample_order_items",
            Privilege::Admin,
        )
        .await;
    assert_eq!(chained.error_message(), Some("Multiple statements are not allowed"));

    let count = executor
        .execute("SELECT COUNT(*) FROM sample_order_items", Privilege::Standard)
        .await;
    assert_ne!(single_value(&count), Value::Int(0));
}

#[tokio::test]
async fn test_admin_writes_are_rolled_back() {
    let dir = tempdir().unwrap();
    let executor = executor(seeded_db(&dir).await, DEADLINE);
    let count_sql = "SELECT COUNT(*) FROM sample_order_items";

    let before = single_value(&executor.execute(count_sql, Privilege::Standard).await);

    let deleted = executor
        .execute("DELETE FROM sample_order_items", Privilege::Admin)
        .await;
    assert_eq!(deleted.status(), QueryStatus::Success);

    let after = single_value(&executor.execute(count_sql, Privilege::Standard).await);
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_explain_returns_plan_rows_only() {
    let dir = tempdir().unwrap();
    let executor = executor(seeded_db(&dir).await, DEADLINE);

    let result = executor
        .execute(
            "EXPLAIN SELECT * FROM sample_orders WHERE customer_id = 3",
            Privilege::Standard,
        )
        .await;

    match result {
        ExecutionResult::Success {
            processed_sql,
            columns,
            rows,
            ..
        } => {
            assert_eq!(
                processed_sql,
                "EXPLAIN SELECT * FROM sample_orders WHERE customer_id = 3 LIMIT 1000"
            );
            assert!(columns.contains(&"detail".to_string()));
            let details: Vec<String> = rows
                .iter()
                .filter_map(|row| row.get("detail").map(Value::to_display_string))
                .collect();
            assert!(
                details.iter().any(|d| d.contains("idx_orders_customer")),
                "unexpected plan: {details:?}"
            );
        }
        other => panic!("Expected Success, got {other:?}"),
    }
}

#[tokio::test]
async fn test_explain_only_reports_plan() {
    let dir = tempdir().unwrap();
    let executor = executor(seeded_db(&dir).await, DEADLINE);

    let explained = executor
        .explain_only("SELECT * FROM sample_products", Privilege::Standard)
        .await;
    assert!(explained.success);
    assert!(!explained.plan_rows.is_empty());

    let broken = executor
        .explain_only("SELECT * FROM sample_products WHERE", Privilege::Standard)
        .await;
    assert!(!broken.success);
    assert!(broken.error_message.unwrap().starts_with("SQL Error: "));
}

#[tokio::test]
async fn test_compare_keeps_input_order_and_isolates_failures() {
    let dir = tempdir().unwrap();
    let executor = executor(seeded_db(&dir).await, DEADLINE);

    let results = executor
        .compare_many(
            &[
                "SELECT COUNT(*) AS n FROM sample_orders",
                "SELECT nope FROM sample_orders",
                "SELECT * FROM users",
            ],
            Privilege::Standard,
        )
        .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].status(), QueryStatus::Success);
    assert_eq!(single_value(&results[0]), Value::Int(300));

    let fault = results[1].error_message().unwrap();
    assert!(fault.starts_with("SQL Error: "), "{fault}");
    assert!(fault.contains("no such column"), "{fault}");
    assert!(results[1].elapsed_ms().is_some());

    assert!(results[2]
        .error_message()
        .unwrap()
        .starts_with("Access denied to table: users"));
    assert_eq!(results[2].elapsed_ms(), None);
}

#[tokio::test]
async fn test_slow_statement_times_out() {
    let dir = tempdir().unwrap();
    let executor = executor(seeded_db(&dir).await, Duration::from_millis(200));

    let start = Instant::now();
    let result = executor
        .execute(
            "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 50000000) \
             SELECT COUNT(*) FROM c",
            Privilege::Admin,
        )
        .await;

    assert_eq!(result.status(), QueryStatus::Timeout);
    assert_eq!(result.error_message(), Some("Query execution timed out"));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_abandoned_statement_holds_its_worker_until_it_stops() {
    let dir = tempdir().unwrap();
    let executor = QueryExecutor::new(
        seeded_db(&dir).await,
        SqlValidator::default(),
        WorkerPool::new(1),
        Duration::from_millis(150),
    );
    let slow = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 10000000) \
                SELECT COUNT(*) FROM c";

    for _ in 0..3 {
        let result = executor.execute(slow, Privilege::Admin).await;
        assert_eq!(result.status(), QueryStatus::Timeout);
        assert_eq!(executor.workers().available(), 0);
    }

    let start = Instant::now();
    while executor.workers().available() == 0 {
        assert!(start.elapsed() < Duration::from_secs(60), "worker never released");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let executor = QueryExecutor::new(
        executor.database().clone(),
        SqlValidator::default(),
        WorkerPool::new(1),
        DEADLINE,
    );
    let count = executor
        .execute("SELECT COUNT(*) FROM sample_orders", Privilege::Standard)
        .await;
    assert_eq!(single_value(&count), Value::Int(300));
}
