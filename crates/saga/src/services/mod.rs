//! Downstream services invoked by saga steps, with in-memory implementations.

pub mod agent;
pub mod notification;
pub mod slot;

pub use agent::{AGENTS_PER_ORDER, AgentService, StoreAgentService};
pub use notification::{InMemoryNotificationService, NotificationService};
pub use slot::{InMemorySlotService, SlotService};
