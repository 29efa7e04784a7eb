//! Audit Routes
//!
//! Read-only observability over the append-only audit log. No pipeline
//! stage consults this data; it exists for operators and dispute handling.

use crate::error::ApiResult;
use crate::models::SuccessResponse;
use crate::state::SharedState;
use crate::store::AuditEvent;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub item_id: Option<Uuid>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditListResponse {
    pub events: Vec<AuditEvent>,
}

/// Query audit events, newest first
pub async fn query_audit(
    State(state): State<SharedState>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<SuccessResponse<AuditListResponse>>> {
    let events = state
        .audit
        .query(query.item_id, query.limit.unwrap_or(DEFAULT_LIMIT))
        .await?;

    Ok(Json(SuccessResponse::with_data(
        "Audit events retrieved",
        AuditListResponse { events },
    )))
}
