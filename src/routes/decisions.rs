//! Decision Routes
//!
//! Boundary-reachable decision requests. The same engine the pipeline
//! stages call, exposed so operators can force a decision for a stuck item
//! or feed in externally computed scores.

use crate::error::ApiResult;
use crate::models::SuccessResponse;
use crate::pipeline::{DecisionRequest, DecisionResponse};
use crate::state::SharedState;
use axum::{extract::State, Json};

/// Compute and persist a decision from submitted scores
pub async fn request_decision(
    State(state): State<SharedState>,
    Json(payload): Json<DecisionRequest>,
) -> ApiResult<Json<SuccessResponse<DecisionResponse>>> {
    let response = state.engine.decide(payload).await?;
    Ok(Json(SuccessResponse::with_data(
        "Decision recorded",
        response,
    )))
}
