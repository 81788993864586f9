use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::OrderId;
use domain::{DedupeKey, Order, StepResult, WorkflowState, WorkflowStatus};
use tokio::sync::RwLock;

use crate::Result;
use crate::repository::{
    AgentRepository, ExecutionLedger, OrderRepository, RecordOutcome, WorkflowRepository,
    stall_cutoff,
};

#[derive(Debug, Default)]
struct InMemoryState {
    orders: HashMap<OrderId, Order>,
    workflows: HashMap<OrderId, WorkflowState>,
    executions: HashMap<DedupeKey, StepResult>,
    agents: HashMap<OrderId, Vec<String>>,
}

/// In-memory store implementation for tests and local runs.
///
/// Provides the same semantics as the PostgreSQL implementation, including
/// first-write-wins on the execution ledger.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<InMemoryState>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of ledger records.
    pub async fn execution_count(&self) -> usize {
        self.state.read().await.executions.len()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Clears all data.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        *state = InMemoryState::default();
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn create_order(&self, order: &Order) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.orders.entry(order.id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(order.clone());
                Ok(true)
            }
        }
    }

    async fn save_order(&self, order: &Order) -> Result<()> {
        let mut state = self.state.write().await;
        state.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.get(order_id).cloned())
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryStore {
    async fn save_workflow_state(&self, workflow: &WorkflowState) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .workflows
            .insert(workflow.order_id.clone(), workflow.clone());
        Ok(())
    }

    async fn get_workflow_state(&self, order_id: &OrderId) -> Result<Option<WorkflowState>> {
        let state = self.state.read().await;
        Ok(state.workflows.get(order_id).cloned())
    }

    async fn get_stalled_workflows(&self, timeout: Duration) -> Result<Vec<WorkflowState>> {
        let cutoff = stall_cutoff(timeout)?;
        let state = self.state.read().await;

        let mut stalled: Vec<WorkflowState> = state
            .workflows
            .values()
            .filter(|wf| wf.status == WorkflowStatus::Pending && wf.updated_at < cutoff)
            .cloned()
            .collect();
        stalled.sort_by_key(|wf| wf.updated_at);
        Ok(stalled)
    }
}

#[async_trait]
impl ExecutionLedger for InMemoryStore {
    async fn is_executed(&self, key: &DedupeKey) -> Result<Option<StepResult>> {
        let state = self.state.read().await;
        Ok(state.executions.get(key).copied())
    }

    async fn save_execution(&self, key: &DedupeKey, result: StepResult) -> Result<RecordOutcome> {
        // The write lock spans the check and the insert.
        let mut state = self.state.write().await;
        match state.executions.get(key) {
            Some(existing) => Ok(RecordOutcome::AlreadyRecorded(*existing)),
            None => {
                state.executions.insert(key.clone(), result);
                Ok(RecordOutcome::Recorded)
            }
        }
    }
}

#[async_trait]
impl AgentRepository for InMemoryStore {
    async fn assign_agent(&self, order_id: &OrderId, agent_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let agents = state.agents.entry(order_id.clone()).or_default();
        if !agents.iter().any(|a| a == agent_id) {
            agents.push(agent_id.to_string());
        }
        Ok(())
    }

    async fn get_agents_by_order_id(&self, order_id: &OrderId) -> Result<Vec<String>> {
        let state = self.state.read().await;
        Ok(state.agents.get(order_id).cloned().unwrap_or_default())
    }

    async fn unassign_agents(&self, order_id: &OrderId) -> Result<()> {
        let mut state = self.state.write().await;
        state.agents.remove(order_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::Step;

    fn workflow_updated_ago(id: &str, minutes: i64) -> WorkflowState {
        let mut wf = WorkflowState::start(OrderId::new(id));
        wf.updated_at = Utc::now() - chrono::Duration::minutes(minutes);
        wf
    }

    #[tokio::test]
    async fn save_and_get_order() {
        let store = InMemoryStore::new();
        let order = Order::new(OrderId::new("A"));

        store.save_order(&order).await.unwrap();

        let loaded = store.get_order(&order.id).await.unwrap();
        assert_eq!(loaded, Some(order));
        assert!(store.get_order(&OrderId::new("B")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_order_keeps_first_insert() {
        let store = InMemoryStore::new();
        let first = Order::new(OrderId::new("A"));
        let mut second = first.clone();
        second.fail().unwrap();

        assert!(store.create_order(&first).await.unwrap());
        assert!(!store.create_order(&second).await.unwrap());

        let loaded = store.get_order(&first.id).await.unwrap();
        assert_eq!(loaded, Some(first));
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn workflow_state_is_upserted() {
        let store = InMemoryStore::new();
        let mut wf = WorkflowState::start(OrderId::new("A"));
        store.save_workflow_state(&wf).await.unwrap();

        wf.advance(Step::ReserveSlot).unwrap();
        store.save_workflow_state(&wf).await.unwrap();

        let loaded = store
            .get_workflow_state(&wf.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.current_step, Step::AssignAgent);
    }

    #[tokio::test]
    async fn stalled_workflows_respect_timeout() {
        let store = InMemoryStore::new();
        store
            .save_workflow_state(&workflow_updated_ago("old", 6))
            .await
            .unwrap();
        store
            .save_workflow_state(&workflow_updated_ago("recent", 4))
            .await
            .unwrap();

        let stalled = store
            .get_stalled_workflows(Duration::from_secs(5 * 60))
            .await
            .unwrap();

        let ids: Vec<&str> = stalled.iter().map(|wf| wf.order_id.as_str()).collect();
        assert_eq!(ids, vec!["old"]);
    }

    #[tokio::test]
    async fn stalled_workflows_exclude_terminal_states() {
        let store = InMemoryStore::new();
        let mut completed = workflow_updated_ago("done", 30);
        completed.complete().unwrap();
        completed.updated_at = Utc::now() - chrono::Duration::minutes(30);
        store.save_workflow_state(&completed).await.unwrap();

        let stalled = store
            .get_stalled_workflows(Duration::from_secs(60))
            .await
            .unwrap();
        assert!(stalled.is_empty());
    }

    #[tokio::test]
    async fn ledger_first_write_wins() {
        let store = InMemoryStore::new();
        let key = DedupeKey::new(&OrderId::new("A"), Step::ReserveSlot);

        assert_eq!(store.is_executed(&key).await.unwrap(), None);

        let first = store
            .save_execution(&key, StepResult::Success)
            .await
            .unwrap();
        let second = store
            .save_execution(&key, StepResult::Failed)
            .await
            .unwrap();

        assert_eq!(first, RecordOutcome::Recorded);
        assert_eq!(
            second,
            RecordOutcome::AlreadyRecorded(StepResult::Success)
        );
        assert_eq!(
            store.is_executed(&key).await.unwrap(),
            Some(StepResult::Success)
        );
        assert_eq!(store.execution_count().await, 1);
    }

    #[tokio::test]
    async fn concurrent_ledger_writes_record_once() {
        let store = InMemoryStore::new();
        let key = DedupeKey::new(&OrderId::new("A"), Step::AssignAgent);

        let mut handles = Vec::new();
        for _ in 0..16 {
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
        let store = InMemoryStore::new();
        let order_id = OrderId::new("A");

        store.assign_agent(&order_id, "agent-1").await.unwrap();
        store.assign_agent(&order_id, "agent-2").await.unwrap();
        store.assign_agent(&order_id, "agent-1").await.unwrap();

        assert_eq!(
            store.get_agents_by_order_id(&order_id).await.unwrap(),
            vec!["agent-1", "agent-2"]
        );

        store.unassign_agents(&order_id).await.unwrap();
        assert!(
            store
                .get_agents_by_order_id(&order_id)
                .await
                .unwrap()
                .is_empty()
        );
    }
}
