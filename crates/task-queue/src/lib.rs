//! Task queue plumbing for the saga orchestrator.
//!
//! This crate provides:
//! - `Task` and the `{order_id, step}` wire payload shared by step and
//!   compensation tasks
//! - `TaskQueue`, the enqueue contract the saga engine depends on
//! - `InMemoryTaskQueue`, an at-least-once in-process queue
//! - `TaskRouter` and `WorkerPool` for consuming tasks with bounded
//!   concurrency, exponential-backoff retries and graceful shutdown

pub mod error;
pub mod queue;
pub mod task;
pub mod worker;

pub use error::{HandlerError, QueueError, Result};
pub use queue::{DEFAULT_HISTORY_CAPACITY, Delivery, InMemoryTaskQueue, TaskQueue};
pub use task::{StepPayload, Task, TaskType};
pub use worker::{TaskHandler, TaskRouter, WorkerConfig, WorkerPool};
