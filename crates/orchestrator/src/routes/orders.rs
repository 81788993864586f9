//! Saga start and order status endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::OrderId;
use saga::{StallRecovery, WorkflowManager};
use serde::{Deserialize, Serialize};
use store::SagaStore;
use task_queue::InMemoryTaskQueue;

use crate::error::ApiError;

/// Shared application state for order and saga handlers.
pub struct AppState<S> {
    pub store: S,
    pub workflows: WorkflowManager<S, InMemoryTaskQueue>,
    pub recovery: StallRecovery<S, InMemoryTaskQueue>,
    pub stall_timeout: Duration,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartSagaRequest {
    /// Caller-chosen order ID; one is generated when absent.
    #[serde(default)]
    pub order_id: Option<String>,
}

#[derive(Serialize)]
pub struct SagaStartedResponse {
    pub order_id: String,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct OrderStatusResponse {
    pub order_id: String,
    pub status: String,
    pub workflow_status: Option<String>,
    pub current_step: Option<String>,
    pub agents: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// POST /orders: start a fulfillment saga.
#[tracing::instrument(skip(state))]
pub async fn start<S: SagaStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<StartSagaRequest>,
) -> Result<(StatusCode, Json<SagaStartedResponse>), ApiError> {
    let order_id = match req.order_id {
        Some(id) if id.trim().is_empty() => {
            return Err(ApiError::BadRequest("order_id must not be empty".to_string()));
        }
        Some(id) => Some(OrderId::new(id)),
        None => None,
    };

    let order_id = state.workflows.start_saga(order_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SagaStartedResponse {
            order_id: order_id.into_inner(),
            status: "pending",
        }),
    ))
}

/// GET /orders/{id}: order status, workflow progress and assigned agents.
#[tracing::instrument(skip(state))]
pub async fn get<S: SagaStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    let order_id = OrderId::new(id);
    let order = state
        .store
        .get_order(&order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {order_id} not found")))?;
    let workflow = state.store.get_workflow_state(&order_id).await?;
    let agents = state.store.get_agents_by_order_id(&order_id).await?;

    Ok(Json(OrderStatusResponse {
        order_id: order.id.into_inner(),
        status: order.status.to_string(),
        workflow_status: workflow.as_ref().map(|wf| wf.status.to_string()),
        current_step: workflow.as_ref().map(|wf| wf.current_step.to_string()),
        agents,
        created_at: order.created_at,
        updated_at: order.updated_at,
    }))
}
