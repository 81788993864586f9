use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{DedupeKey, Order, StepResult, WorkflowState};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::Result;
use crate::repository::{
    AgentRepository, ExecutionLedger, OrderRepository, RecordOutcome, WorkflowRepository,
    stall_cutoff,
};

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url).await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        Ok(Order {
            id: OrderId::new(row.try_get::<String, _>("id")?),
            status: status.parse()?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }

    fn row_to_workflow(row: PgRow) -> Result<WorkflowState> {
        let current_step: String = row.try_get("current_step")?;
        let status: String = row.try_get("status")?;
        Ok(WorkflowState {
            order_id: OrderId::new(row.try_get::<String, _>("order_id")?),
            current_step: current_step.parse()?,
            status: status.parse()?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }
}

#[async_trait]
impl OrderRepository for PostgresStore {
    async fn create_order(&self, order: &Order) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders (id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(order.id.as_str())
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn save_order(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(order.id.as_str())
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, status, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }
}

#[async_trait]
impl WorkflowRepository for PostgresStore {
    async fn save_workflow_state(&self, state: &WorkflowState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workflows (order_id, current_step, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id) DO UPDATE SET
                current_step = EXCLUDED.current_step,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(state.order_id.as_str())
        .bind(state.current_step.as_str())
        .bind(state.status.as_str())
        .bind(state.created_at)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_workflow_state(&self, order_id: &OrderId) -> Result<Option<WorkflowState>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT order_id, current_step, status, created_at, updated_at
            FROM workflows
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_workflow).transpose()
    }

    async fn get_stalled_workflows(&self, timeout: Duration) -> Result<Vec<WorkflowState>> {
        let cutoff = stall_cutoff(timeout)?;

        let rows = sqlx::query(
            r#"
            SELECT order_id, current_step, status, created_at, updated_at
            FROM workflows
            WHERE status = 'pending' AND updated_at < $1
            ORDER BY updated_at ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_workflow).collect()
    }
}

#[async_trait]
impl ExecutionLedger for PostgresStore {
    async fn is_executed(&self, key: &DedupeKey) -> Result<Option<StepResult>> {
        let result: Option<String> =
            sqlx::query_scalar("SELECT result FROM step_executions WHERE dedupe_key = $1")
                .bind(key.as_str())
                .fetch_optional(&self.pool)
                .await?;

        Ok(result.map(|r| r.parse::<StepResult>()).transpose()?)
    }

    async fn save_execution(&self, key: &DedupeKey, result: StepResult) -> Result<RecordOutcome> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO step_executions (dedupe_key, result)
            VALUES ($1, $2)
            ON CONFLICT (dedupe_key) DO NOTHING
            "#,
        )
        .bind(key.as_str())
        .bind(result.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 1 {
            return Ok(RecordOutcome::Recorded);
        }

        let existing: String =
            sqlx::query_scalar("SELECT result FROM step_executions WHERE dedupe_key = $1")
                .bind(key.as_str())
                .fetch_one(&self.pool)
                .await?;

        tracing::debug!(dedupe_key = %key, %existing, "ledger record already present");
        Ok(RecordOutcome::AlreadyRecorded(existing.parse()?))
    }
}

#[async_trait]
impl AgentRepository for PostgresStore {
    async fn assign_agent(&self, order_id: &OrderId, agent_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agents (order_id, agent_id, assigned_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (order_id, agent_id) DO NOTHING
            "#,
        )
        .bind(order_id.as_str())
        .bind(agent_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_agents_by_order_id(&self, order_id: &OrderId) -> Result<Vec<String>> {
        let agents: Vec<String> = sqlx::query_scalar(
            "SELECT agent_id FROM agents WHERE order_id = $1 ORDER BY assigned_at ASC, agent_id ASC",
        )
        .bind(order_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(agents)
    }

    async fn unassign_agents(&self, order_id: &OrderId) -> Result<()> {
        sqlx::query("DELETE FROM agents WHERE order_id = $1")
            .bind(order_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
