//! Customer notification service trait and in-memory implementation.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use tokio::sync::RwLock;

use crate::error::SagaError;

/// Trait for customer notification operations.
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Tells the customer the order is ready for pickup.
    async fn notify(&self, order_id: &OrderId) -> Result<(), SagaError>;

    /// Withdraws a notification sent earlier.
    async fn cancel(&self, order_id: &OrderId) -> Result<(), SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryNotificationState {
    sent: HashSet<OrderId>,
    fail_on_notify: bool,
}

/// In-memory notification service.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationService {
    state: Arc<RwLock<InMemoryNotificationState>>,
}

impl InMemoryNotificationService {
    /// Creates a new in-memory notification service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail every notify call.
    pub async fn set_fail_on_notify(&self, fail: bool) {
        self.state.write().await.fail_on_notify = fail;
    }

    /// Returns the number of outstanding notifications.
    pub async fn sent_count(&self) -> usize {
        self.state.read().await.sent.len()
    }

    /// Returns true if the order's customer has been notified.
    pub async fn was_notified(&self, order_id: &OrderId) -> bool {
        self.state.read().await.sent.contains(order_id)
    }
}

#[async_trait]
impl NotificationService for InMemoryNotificationService {
    async fn notify(&self, order_id: &OrderId) -> Result<(), SagaError> {
        let mut state = self.state.write().await;

        if state.fail_on_notify {
            return Err(SagaError::NotificationService(
                "Notification gateway unavailable".to_string(),
            ));
        }
        if !state.sent.insert(order_id.clone()) {
            return Err(SagaError::NotificationService(format!(
                "Customer already notified for order {order_id}"
            )));
        }

        Ok(())
    }

    async fn cancel(&self, order_id: &OrderId) -> Result<(), SagaError> {
        let mut state = self.state.write().await;
        if !state.sent.remove(order_id) {
            return Err(SagaError::NotificationService(format!(
                "No notification to cancel for order {order_id}"
            )));
        }
        Ok(())
    }
}
