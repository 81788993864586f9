//! Load simulation endpoint: starts a batch of sagas in the background.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::OrderId;
use serde::{Deserialize, Serialize};
use store::SagaStore;

use super::orders::AppState;
use crate::error::ApiError;

pub const DEFAULT_COUNT: usize = 10;
pub const MAX_COUNT: usize = 1000;
pub const DEFAULT_DELAY_MS: u64 = 500;

#[derive(Debug, Default, Deserialize)]
pub struct SimulateRequest {
    #[serde(default)]
    pub count: Option<usize>,
    /// Pause between consecutive saga starts.
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct SimulateResponse {
    pub count: usize,
    pub delay_ms: u64,
    pub order_ids: Vec<String>,
}

/// POST /simulate: start `count` sagas, `delay_ms` apart.
///
/// Returns immediately with the generated order IDs; starts happen on a
/// background task and failures are only logged.
#[tracing::instrument(skip(state))]
pub async fn run<S: SagaStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<SimulateRequest>,
) -> Result<(StatusCode, Json<SimulateResponse>), ApiError> {
    let count = req.count.unwrap_or(DEFAULT_COUNT);
    if count == 0 || count > MAX_COUNT {
        return Err(ApiError::BadRequest(format!(
            "count must be between 1 and {MAX_COUNT}"
        )));
    }
    let delay_ms = req.delay_ms.unwrap_or(DEFAULT_DELAY_MS);

    let order_ids: Vec<OrderId> = (0..count).map(|_| OrderId::generate()).collect();
    let response = SimulateResponse {
        count,
        delay_ms,
        order_ids: order_ids.iter().map(ToString::to_string).collect(),
    };

    let workflows = state.workflows.clone();
    tokio::spawn(async move {
        let delay = Duration::from_millis(delay_ms);
        for (i, order_id) in order_ids.into_iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = workflows.start_saga(Some(order_id.clone())).await {
                tracing::warn!(%order_id, error = %e, "simulated saga failed to start");
            }
        }
        tracing::info!(count, "simulation batch started");
    });

    Ok((StatusCode::ACCEPTED, Json(response)))
}
