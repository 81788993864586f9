//! Pickup slot service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use tokio::sync::RwLock;

use crate::error::SagaError;

/// Trait for pickup slot operations.
#[async_trait]
pub trait SlotService: Send + Sync {
    /// Reserves a pickup slot for the order and returns its ID.
    async fn reserve(&self, order_id: &OrderId) -> Result<String, SagaError>;

    /// Releases the slot held by the order.
    async fn release(&self, order_id: &OrderId) -> Result<(), SagaError>;
}

#[derive(Debug, Default)]
struct InMemorySlotState {
    slots: HashMap<OrderId, String>,
    next_id: u32,
    fail_on_reserve: bool,
    fail_on_release: bool,
}

/// In-memory slot service.
///
/// An order holds at most one slot: reserving twice or releasing a slot that
/// is not held is an error.
#[derive(Debug, Clone, Default)]
pub struct InMemorySlotService {
    state: Arc<RwLock<InMemorySlotState>>,
}

impl InMemorySlotService {
    /// Creates a new in-memory slot service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail every reserve call.
    pub async fn set_fail_on_reserve(&self, fail: bool) {
        self.state.write().await.fail_on_reserve = fail;
    }

    /// Configures the service to fail every release call.
    pub async fn set_fail_on_release(&self, fail: bool) {
        self.state.write().await.fail_on_release = fail;
    }

    /// Returns the number of slots currently held.
    pub async fn reserved_count(&self) -> usize {
        self.state.read().await.slots.len()
    }

    /// Returns the slot held by the order, if any.
    pub async fn slot_for(&self, order_id: &OrderId) -> Option<String> {
        self.state.read().await.slots.get(order_id).cloned()
    }
}

#[async_trait]
impl SlotService for InMemorySlotService {
    async fn reserve(&self, order_id: &OrderId) -> Result<String, SagaError> {
        let mut state = self.state.write().await;

        if state.fail_on_reserve {
            return Err(SagaError::SlotService("No pickup slot available".to_string()));
        }
        if state.slots.contains_key(order_id) {
            return Err(SagaError::SlotService(format!(
                "Slot already reserved for order {order_id}"
            )));
        }

        state.next_id += 1;
        let slot_id = format!("SLOT-{:04}", state.next_id);
        state.slots.insert(order_id.clone(), slot_id.clone());

        tracing::debug!(%order_id, %slot_id, "pickup slot reserved");
        Ok(slot_id)
    }

    async fn release(&self, order_id: &OrderId) -> Result<(), SagaError> {
        let mut state = self.state.write().await;

        if state.fail_on_release {
            return Err(SagaError::SlotService("Slot release rejected".to_string()));
        }

        state
            .slots
            .remove(order_id)
            .map(|_| ())
            .ok_or_else(|| SagaError::SlotService(format!("No slot held by order {order_id}")))
    }
}
