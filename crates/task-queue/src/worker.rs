//! Worker pool consuming tasks from the in-process queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::error::{HandlerError, Result};
use crate::queue::{Delivery, InMemoryTaskQueue};
use crate::task::{Task, TaskType};

/// Handles tasks delivered by the worker pool.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    async fn handle(&self, task: &Task) -> std::result::Result<(), HandlerError>;
}

/// Routes each task to the handler registered for its type.
#[derive(Default, Clone)]
pub struct TaskRouter {
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
}

impl TaskRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for tasks of `task_type`, replacing any previous one.
    pub fn route(mut self, task_type: TaskType, handler: impl TaskHandler) -> Self {
        self.handlers.insert(task_type, Arc::new(handler));
        self
    }
}

#[async_trait]
impl TaskHandler for TaskRouter {
    async fn handle(&self, task: &Task) -> std::result::Result<(), HandlerError> {
        match self.handlers.get(&task.task_type) {
            Some(handler) => handler.handle(task).await,
            None => Err(HandlerError::fatal(format!(
                "no handler registered for task type {}",
                task.task_type
            ))),
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum number of tasks handled at once.
    pub concurrency: usize,
    /// Retries allowed for a retryable failure before the task is dropped.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub retry_base: Duration,
    /// How long shutdown waits for in-flight tasks.
    pub shutdown_grace: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            max_retries: 5,
            retry_base: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl WorkerConfig {
    /// Delay before redelivering a task that failed on `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.retry_base.saturating_mul(factor)
    }
}

/// Fixed-size pool of workers pulling from an [`InMemoryTaskQueue`].
pub struct WorkerPool<H: TaskHandler> {
    queue: InMemoryTaskQueue,
    handler: Arc<H>,
    config: WorkerConfig,
}

impl<H: TaskHandler> WorkerPool<H> {
    pub fn new(queue: InMemoryTaskQueue, handler: H, config: WorkerConfig) -> Self {
        Self {
            queue,
            handler: Arc::new(handler),
            config,
        }
    }

    /// Consumes tasks until `shutdown` flips to true or its sender is dropped.
    ///
    /// On shutdown no new task is started; in-flight tasks get
    /// `shutdown_grace` to finish and are abandoned afterwards, to be
    /// redelivered by whoever owns durability.
    #[tracing::instrument(skip_all, fields(concurrency = self.config.concurrency))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut receiver = self.queue.take_receiver().await?;
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut in_flight = JoinSet::new();

        tracing::info!("worker pool started");

        while !*shutdown.borrow() {
            while in_flight.try_join_next().is_some() {}

            let permit = tokio::select! {
                _ = shutdown.changed() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let delivery = tokio::select! {
                _ = shutdown.changed() => break,
                delivery = receiver.recv() => match delivery {
                    Some(delivery) => delivery,
                    None => break,
                },
            };

            let handler = Arc::clone(&self.handler);
            let queue = self.queue.clone();
            let config = self.config.clone();
            in_flight.spawn(async move {
                let _permit = permit;
                process(handler.as_ref(), &queue, &config, delivery).await;
            });
        }

        tracing::info!(in_flight = in_flight.len(), "worker pool draining");
        let drained = tokio::time::timeout(self.config.shutdown_grace, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                abandoned = in_flight.len(),
                "shutdown grace period elapsed, abandoning in-flight tasks"
            );
            in_flight.abort_all();
        }

        tracing::info!("worker pool stopped");
        Ok(())
    }
}

async fn process<H: TaskHandler>(
    handler: &H,
    queue: &InMemoryTaskQueue,
    config: &WorkerConfig,
    delivery: Delivery,
) {
    let task_type = delivery.task.task_type;
    // Handlers fill in order_id and step once the payload is decoded.
    let span = tracing::info_span!(
        "task",
        task_type = %task_type,
        attempt = delivery.attempt,
        order_id = tracing::field::Empty,
        step = tracing::field::Empty,
    );

    async {
        let started = Instant::now();
        let result = handler.handle(&delivery.task).await;
        metrics::histogram!("task_duration_seconds", "task_type" => task_type.as_str())
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(()) => tracing::debug!("task handled"),
            Err(err) if err.retryable && delivery.attempt < config.max_retries => {
                let delay = config.backoff(delivery.attempt);
                metrics::counter!("task_queue_retries_total", "task_type" => task_type.as_str())
                    .increment(1);
                tracing::warn!(error = %err, ?delay, "task failed, scheduling retry");

                let queue = queue.clone();
                let retry = Delivery {
                    task: delivery.task.clone(),
                    attempt: delivery.attempt + 1,
                };
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = queue.redeliver(retry) {
                        tracing::error!(error = %e, "failed to redeliver task");
                    }
                });
            }
            Err(err) => {
                metrics::counter!("task_queue_dead_letter_total", "task_type" => task_type.as_str())
                    .increment(1);
                tracing::error!(
                    error = %err,
                    retryable = err.retryable,
                    "task failed permanently"
                );
            }
        }
    }
    .instrument(span)
    .await
}
