//! Queue contract and the in-process implementation.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock, mpsc};

use crate::error::{QueueError, Result};
use crate::task::Task;

/// Enqueue side of a task queue.
///
/// Delivery is at-least-once: a handler may see the same task more than once.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Adds a task to the queue.
    async fn enqueue(&self, task: Task) -> Result<()>;
}

/// A task together with the number of times it was already attempted.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub task: Task,
    pub attempt: u32,
}

/// Number of recently enqueued tasks a queue keeps for inspection by default.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1024;

/// In-process task queue backed by an unbounded channel.
///
/// The most recently enqueued tasks are also kept in a bounded history for
/// inspection. Cloning the queue shares the underlying channel.
#[derive(Clone)]
pub struct InMemoryTaskQueue {
    sender: mpsc::UnboundedSender<Delivery>,
    receiver: Arc<Mutex<Option<mpsc::UnboundedReceiver<Delivery>>>>,
    history: Arc<RwLock<VecDeque<Task>>>,
    history_capacity: usize,
    fail_on_enqueue: Arc<AtomicBool>,
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTaskQueue {
    /// Creates a new empty queue.
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Creates a new empty queue remembering at most `capacity` enqueued
    /// tasks. Zero disables the history.
    pub fn with_history_capacity(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(Mutex::new(Some(receiver))),
            history: Arc::new(RwLock::new(VecDeque::new())),
            history_capacity: capacity,
            fail_on_enqueue: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Configures the queue to refuse enqueues, simulating an outage.
    pub fn set_fail_on_enqueue(&self, fail: bool) {
        self.fail_on_enqueue.store(fail, Ordering::SeqCst);
    }

    /// Returns the most recently enqueued tasks, oldest first.
    pub async fn enqueued(&self) -> Vec<Task> {
        self.history.read().await.iter().cloned().collect()
    }

    async fn remember(&self, task: &Task) {
        if self.history_capacity == 0 {
            return;
        }
        let mut history = self.history.write().await;
        if history.len() == self.history_capacity {
            history.pop_front();
        }
        history.push_back(task.clone());
    }

    /// Pops the next pending task without blocking.
    ///
    /// Returns None when nothing is pending or a worker pool owns the
    /// consuming side.
    pub async fn try_next(&self) -> Option<Task> {
        let mut guard = self.receiver.lock().await;
        let receiver = guard.as_mut()?;
        receiver.try_recv().ok().map(|delivery| delivery.task)
    }

    /// Hands the consuming side to a single consumer.
    pub(crate) async fn take_receiver(&self) -> Result<mpsc::UnboundedReceiver<Delivery>> {
        self.receiver
            .lock()
            .await
            .take()
            .ok_or(QueueError::AlreadyConsumed)
    }

    /// Puts a task back on the queue for another attempt.
    pub(crate) fn redeliver(&self, delivery: Delivery) -> Result<()> {
        self.sender.send(delivery).map_err(|_| QueueError::Closed)
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, task: Task) -> Result<()> {
        if self.fail_on_enqueue.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("enqueue refused".to_string()));
        }

        let task_type = task.task_type.as_str();
        self.remember(&task).await;
        self.sender
            .send(Delivery { task, attempt: 0 })
            .map_err(|_| QueueError::Closed)?;

        metrics::counter!("task_queue_enqueued_total", "task_type" => task_type).increment(1);
        Ok(())
    }
}
