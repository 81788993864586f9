//! Manual stalled-workflow recovery endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use store::SagaStore;

use super::orders::AppState;
use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct RecoverRequest {
    /// Overrides the configured stall timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Serialize)]
pub struct RecoverResponse {
    pub timeout_secs: u64,
    pub stalled: usize,
    pub requeued: usize,
}

/// POST /recover: re-enqueue the current step of every stalled workflow.
#[tracing::instrument(skip(state))]
pub async fn run<S: SagaStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<RecoverRequest>,
) -> Result<Json<RecoverResponse>, ApiError> {
    let timeout = req
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(state.stall_timeout);
    let representable = chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|delta| chrono::Utc::now().checked_sub_signed(delta))
        .is_some();
    if !representable {
        return Err(ApiError::BadRequest(format!(
            "timeout_secs {} is out of range",
            timeout.as_secs()
        )));
    }

    let stalled = state.recovery.find_stalled(timeout).await?;
    let requeued = state.recovery.recover(&stalled).await?;

    Ok(Json(RecoverResponse {
        timeout_secs: timeout.as_secs(),
        stalled: stalled.len(),
        requeued,
    }))
}
