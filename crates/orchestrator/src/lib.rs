//! HTTP front end and worker wiring for the order saga orchestrator.
//!
//! Starts sagas over REST, exposes order status, stall recovery and load
//! simulation, and serves Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    CompensationHandler, CompensationTaskHandler, EngineConfig, InMemoryNotificationService,
    InMemorySlotService, SagaEngine, StallRecovery, StepRegistry, StepTaskHandler,
    StoreAgentService, WorkflowManager,
};
use store::SagaStore;
use task_queue::{InMemoryTaskQueue, TaskRouter, TaskType};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: SagaStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::start::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/recover", post(routes::recovery::run::<S>))
        .route("/simulate", post(routes::simulate::run::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the in-memory services, step registry and saga engine over `store`
/// and `queue`.
///
/// Returns the HTTP state and the task router the worker pool dispatches to.
pub fn create_default_state<S: SagaStore + Clone + 'static>(
    store: S,
    queue: InMemoryTaskQueue,
    engine_config: EngineConfig,
    stall_timeout: Duration,
) -> (Arc<AppState<S>>, TaskRouter) {
    let registry = Arc::new(StepRegistry::standard(
        InMemorySlotService::new(),
        StoreAgentService::new(store.clone()),
        InMemoryNotificationService::new(),
    ));

    let engine = Arc::new(SagaEngine::new(
        store.clone(),
        queue.clone(),
        registry.clone(),
        engine_config,
    ));

    let router = TaskRouter::new()
        .route(TaskType::Step, StepTaskHandler::new(engine))
        .route(
            TaskType::Compensation,
            CompensationTaskHandler::new(CompensationHandler::new(registry)),
        );

    let state = Arc::new(AppState {
        workflows: WorkflowManager::new(store.clone(), queue.clone()),
        recovery: StallRecovery::new(store.clone(), queue),
        store,
        stall_timeout,
    });

    (state, router)
}
