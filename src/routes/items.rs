//! Item Routes
//!
//! Ingestion, lookup, and human review of moderation items.

use crate::error::{not_found_error, validation_error, ApiResult, AppError};
use crate::models::{
    IntakeMessage, ItemRecord, ItemStatus, SuccessResponse,
};
use crate::state::SharedState;
use crate::store::{AuditEvent, AuditEventType};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use std::time::Duration;
use uuid::Uuid;
use validator::Validate;

/// Lifetime of the presigned content URL returned with an item
const CONTENT_URL_TTL: Duration = Duration::from_secs(900);

// =============================================================================
// REQUEST/RESPONSE TYPES
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    #[validate(length(min = 1, message = "filename must not be empty"))]
    pub filename: String,
    /// Base64-encoded raw content
    #[validate(length(min = 1, message = "content must not be empty"))]
    pub content: String,
    pub callback_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub item_id: Uuid,
    pub status: ItemStatus,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub approved: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ItemListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResponse {
    pub item: ItemRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemListResponse {
    pub items: Vec<ItemRecord>,
}

// =============================================================================
// HANDLERS
// =============================================================================

/// Accept a new item: store its content, create the record, and publish the
/// intake message that starts the pipeline.
pub async fn ingest_item(
    State(state): State<SharedState>,
    Json(payload): Json<IngestRequest>,
) -> ApiResult<Json<SuccessResponse<IngestResponse>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&payload.content)
        .map_err(|e| validation_error(format!("content is not valid base64: {}", e)))?;

    let item_id = Uuid::new_v4();
    let content_key = format!("media/{}/{}", item_id, payload.filename);
    let size_bytes = bytes.len() as u64;
    state
        .objects
        .put(&content_key, bytes, "application/octet-stream")
        .await?;

    let mut record = ItemRecord::new(item_id, content_key.clone());
    record.filename = Some(payload.filename.clone());
    record.size_bytes = size_bytes;
    record.callback_url = payload.callback_url;
    state.records.put_item(record).await?;

    if let Err(e) = state
        .audit
        .append(AuditEvent::new(
            item_id,
            AuditEventType::Upload,
            serde_json::json!({
                "filename": payload.filename,
                "contentKey": content_key,
            }),
        ))
        .await
    {
        warn!("Failed to log upload event (non-critical): {}", e);
    }

    let message = IntakeMessage {
        item_id,
        content_key,
    };
    let body =
        serde_json::to_string(&message).map_err(|e| AppError::Internal(e.to_string()))?;
    state.intake.send(body).await?;

    info!("📥 Item {} accepted for moderation", item_id);
    Ok(Json(SuccessResponse::with_data(
        "Item accepted for moderation",
        IngestResponse {
            item_id,
            status: ItemStatus::Uploaded,
        },
    )))
}

/// Fetch the current record for one item, with a time-limited content URL
/// for the review surface
pub async fn get_item(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<ItemResponse>>> {
    let item = state
        .records
        .get_item(id)
        .await?
        .ok_or_else(|| not_found_error(format!("Item {} not found", id)))?;

    let content_url = state
        .objects
        .presigned_read_url(&item.content_key, CONTENT_URL_TTL)
        .await
        .ok();

    Ok(Json(SuccessResponse::with_data(
        "Item retrieved",
        ItemResponse { item, content_url },
    )))
}

/// List items, optionally filtered by status. This is how a human-review
/// surface finds the items awaiting review.
pub async fn list_items(
    State(state): State<SharedState>,
    Query(query): Query<ItemListQuery>,
) -> ApiResult<Json<SuccessResponse<ItemListResponse>>> {
    let status = match query.status {
        Some(s) => Some(
            serde_json::from_value::<ItemStatus>(serde_json::Value::String(s.clone()))
                .map_err(|_| validation_error(format!("unknown status '{}'", s)))?,
        ),
        None => None,
    };

    let mut items = state
        .records
        .scan(&move |record| status.map_or(true, |s| record.status == s))
        .await?;
    items.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));

    Ok(Json(SuccessResponse::with_data(
        "Items retrieved",
        ItemListResponse { items },
    )))
}

/// Record a human review outcome for an item
pub async fn review_item(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewRequest>,
) -> ApiResult<Json<SuccessResponse<crate::pipeline::DecisionResponse>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let response = state
        .engine
        .apply_override(id, payload.approved, payload.notes)
        .await?;

    Ok(Json(SuccessResponse::with_data(
        "Review recorded",
        response,
    )))
}
