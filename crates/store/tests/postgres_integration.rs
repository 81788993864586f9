//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::OrderId;
use domain::{DedupeKey, Order, OrderStatus, Step, StepResult, WorkflowState, WorkflowStatus};
use sqlx::PgPool;
use store::{
    AgentRepository, ExecutionLedger, OrderRepository, PostgresStore, RecordOutcome,
    WorkflowRepository,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_saga_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE workflows, orders, step_executions, agents")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

#[tokio::test]
async fn save_and_update_order() {
    let store = get_test_store().await;
    let mut order = Order::new(OrderId::new("A"));

    store.save_order(&order).await.unwrap();
    order.fail().unwrap();
    store.save_order(&order).await.unwrap();

    let loaded = store.get_order(&order.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, OrderStatus::Failed);
    assert!(store.get_order(&OrderId::new("missing")).await.unwrap().is_none());
}

#[tokio::test]
async fn create_order_inserts_once() {
    let store = get_test_store().await;
    let order = Order::new(OrderId::new("A"));
    let mut failed = order.clone();
    failed.fail().unwrap();

    assert!(store.create_order(&order).await.unwrap());
    assert!(!store.create_order(&failed).await.unwrap());

    let loaded = store.get_order(&order.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, OrderStatus::Pending);
}

#[tokio::test]
async fn workflow_state_upsert_keeps_one_row() {
    let store = get_test_store().await;
    let order = Order::new(OrderId::new("A"));
    store.save_order(&order).await.unwrap();

    let mut wf = WorkflowState::start(order.id.clone());
    store.save_workflow_state(&wf).await.unwrap();
    wf.advance(Step::ReserveSlot).unwrap();
    store.save_workflow_state(&wf).await.unwrap();

    let loaded = store.get_workflow_state(&order.id).await.unwrap().unwrap();
    assert_eq!(loaded.current_step, Step::AssignAgent);
    assert_eq!(loaded.status, WorkflowStatus::Pending);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workflows")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn stalled_workflows_by_age() {
    let store = get_test_store().await;

    for (id, minutes) in [("old", 6), ("recent", 4)] {
        let order = Order::new(OrderId::new(id));
        store.save_order(&order).await.unwrap();
        let mut wf = WorkflowState::start(order.id.clone());
        wf.updated_at = Utc::now() - chrono::Duration::minutes(minutes);
        store.save_workflow_state(&wf).await.unwrap();
    }

    let stalled = store
        .get_stalled_workflows(Duration::from_secs(5 * 60))
        .await
        .unwrap();
    assert_eq!(stalled.len(), 1);
    assert_eq!(stalled[0].order_id.as_str(), "old");
    assert_eq!(stalled[0].current_step, Step::ReserveSlot);
}

#[tokio::test]
async fn ledger_insert_if_absent() {
    let store = get_test_store().await;
    let key = DedupeKey::new(&OrderId::new("A"), Step::NotifyCustomer);

    assert_eq!(store.is_executed(&key).await.unwrap(), None);
    assert_eq!(
        store.save_execution(&key, StepResult::Failed).await.unwrap(),
        RecordOutcome::Recorded
    );
    assert_eq!(
        store.save_execution(&key, StepResult::Success).await.unwrap(),
        RecordOutcome::AlreadyRecorded(StepResult::Failed)
    );
    assert_eq!(
        store.is_executed(&key).await.unwrap(),
        Some(StepResult::Failed)
    );
}

#[tokio::test]
async fn concurrent_ledger_writes_record_once() {
    let store = get_test_store().await;
    let key = DedupeKey::new(&OrderId::new("B"), Step::ReserveSlot);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            store.save_execution(&key, StepResult::Success).await
        }));
    }

    let mut recorded = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() == RecordOutcome::Recorded {
            recorded += 1;
        }
    }
    assert_eq!(recorded, 1);
}

#[tokio::test]
async fn agents_assign_and_unassign() {
    let store = get_test_store().await;
    let order_id = OrderId::new("A");

    store.assign_agent(&order_id, "agent-1").await.unwrap();
    store.assign_agent(&order_id, "agent-1").await.unwrap();
    store.assign_agent(&order_id, "agent-2").await.unwrap();

    let agents = store.get_agents_by_order_id(&order_id).await.unwrap();
    assert_eq!(agents.len(), 2);

    store.unassign_agents(&order_id).await.unwrap();
    assert!(store.get_agents_by_order_id(&order_id).await.unwrap().is_empty());
}
