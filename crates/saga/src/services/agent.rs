//! Agent assignment service backed by the agent repository.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::OrderId;
use store::AgentRepository;
use uuid::Uuid;

use crate::error::SagaError;

/// Number of agents assigned to every order.
pub const AGENTS_PER_ORDER: usize = 2;

/// Trait for agent assignment operations.
#[async_trait]
pub trait AgentService: Send + Sync {
    /// Assigns agents to the order and returns their IDs.
    async fn assign(&self, order_id: &OrderId) -> Result<Vec<String>, SagaError>;

    /// Removes every agent assigned to the order.
    async fn unassign(&self, order_id: &OrderId) -> Result<(), SagaError>;
}

/// Agent service that records assignments through an [`AgentRepository`].
#[derive(Clone)]
pub struct StoreAgentService<R: AgentRepository> {
    repository: R,
    fail_on_assign: Arc<AtomicBool>,
}

impl<R: AgentRepository> StoreAgentService<R> {
    pub fn new(repository: R) -> Self {
        Self {
            repository,
            fail_on_assign: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Configures the service to fail every assign call.
    pub fn set_fail_on_assign(&self, fail: bool) {
        self.fail_on_assign.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl<R: AgentRepository> AgentService for StoreAgentService<R> {
    async fn assign(&self, order_id: &OrderId) -> Result<Vec<String>, SagaError> {
        if self.fail_on_assign.load(Ordering::SeqCst) {
            return Err(SagaError::AgentService("No agents available".to_string()));
        }

        let mut agents = Vec::with_capacity(AGENTS_PER_ORDER);
        for _ in 0..AGENTS_PER_ORDER {
            let agent_id = Uuid::new_v4().to_string();
            self.repository.assign_agent(order_id, &agent_id).await?;
            agents.push(agent_id);
        }

        tracing::debug!(%order_id, ?agents, "agents assigned");
        Ok(agents)
    }

    async fn unassign(&self, order_id: &OrderId) -> Result<(), SagaError> {
        self.repository.unassign_agents(order_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::InMemoryStore;

    #[tokio::test]
    async fn test_assign_two_agents() {
        let store = InMemoryStore::new();
        let service = StoreAgentService::new(store.clone());
        let order_id = OrderId::new("A");

        let agents = service.assign(&order_id).await.unwrap();
        assert_eq!(agents.len(), AGENTS_PER_ORDER);
        assert_ne!(agents[0], agents[1]);
        assert_eq!(store.get_agents_by_order_id(&order_id).await.unwrap(), agents);
    }

    #[tokio::test]
    async fn test_unassign_removes_all_agents() {
        let store = InMemoryStore::new();
        let service = StoreAgentService::new(store.clone());
        let order_id = OrderId::new("A");

        service.assign(&order_id).await.unwrap();
        service.unassign(&order_id).await.unwrap();
        assert!(store.get_agents_by_order_id(&order_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fail_on_assign() {
        let store = InMemoryStore::new();
        let service = StoreAgentService::new(store.clone());
        service.set_fail_on_assign(true);

        let result = service.assign(&OrderId::new("A")).await;
        assert!(matches!(result, Err(SagaError::AgentService(_))));
        assert!(
            store
                .get_agents_by_order_id(&OrderId::new("A"))
                .await
                .unwrap()
                .is_empty()
        );
    }
}
