//! History recording through the service layer.

use std::sync::Arc;
use std::time::Duration;

use sql_sandbox::persistence::{HistoryStore, QueryStatus, StateDb};
use sql_sandbox::query::{Caller, SandboxService};
use tempfile::tempdir;

use super::common::{executor, seeded_db};

async fn history_store(dir: &tempfile::TempDir) -> Arc<HistoryStore> {
    let state_db = StateDb::open(&dir.path().join("history.db")).await.unwrap();
    Arc::new(HistoryStore::new(Arc::new(state_db)))
}

#[tokio::test]
async fn test_executions_are_recorded_per_user() {
    let dir = tempdir().unwrap();
    let store = history_store(&dir).await;
    let service = SandboxService::new(executor(seeded_db(&dir).await, Duration::from_secs(30)))
        .with_history(store.clone());

    let alice = Caller::standard(1);
    let bob = Caller::standard(2);

    service
        .execute_query("SELECT * FROM sample_products", alice)
        .await;
    service
        .execute_query("DELETE FROM sample_orders", alice)
        .await;
    service
        .execute_query("SELECT * FROM sample_customers", bob)
        .await;
    service
        .explain_only("SELECT * FROM sample_orders", alice)
        .await;
    service.shutdown().await.unwrap();

    assert_eq!(store.count(1).await.unwrap(), 2);
    assert_eq!(store.count(2).await.unwrap(), 1);

    let mut entries = store.list(1, 10, 0).await.unwrap();
    entries.sort_by_key(|e| e.id);

    let success = &entries[0];
    assert_eq!(success.sql_text, "SELECT * FROM sample_products");
    assert_eq!(success.status, QueryStatus::Success);
    assert_eq!(success.rows_returned, Some(40));
    assert!(success.execution_time_ms.is_some());
    assert!(success.explain_result.is_some());

    let rejected = &entries[1];
    assert_eq!(rejected.status, QueryStatus::Error);
    assert_eq!(rejected.execution_time_ms, None);
    assert_eq!(
        rejected.error_message.as_deref(),
        Some("Only SELECT statements are allowed for non-admin users")
    );

    assert!(store.get(2, success.id).await.unwrap().is_none());
    assert!(store.get(1, success.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_compare_records_every_statement() {
    let dir = tempdir().unwrap();
    let store = history_store(&dir).await;
    let service = SandboxService::new(executor(seeded_db(&dir).await, Duration::from_secs(30)))
        .with_history(store.clone());

    let results = service
        .compare_queries(
            &[
                "SELECT * FROM sample_orders WHERE customer_id = 1",
                "SELECT * FROM sample_orders WHERE order_status = 'SHIPPED'",
            ],
            Caller::standard(9),
        )
        .await
        .unwrap();
    assert!(results.iter().all(|r| r.is_success()));
    service.shutdown().await.unwrap();

    let entries = store.list(9, 10, 0).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.status == QueryStatus::Success));
}
