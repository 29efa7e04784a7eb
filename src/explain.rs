//! Explanation collaborator boundary
//!
//! An optional natural-language assistant can produce human-readable
//! summaries of an analysis result. The pipeline only ever fires it through
//! `tokio::spawn` after its own writes have succeeded; the result is never
//! awaited and never affects an item's outcome. Disabled by default.

use crate::error::AppError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Inputs handed to the explanation collaborator
#[derive(Debug, Clone)]
pub struct ExplanationRequest {
    pub item_id: Uuid,
    pub nsfw_score: f64,
    pub violence_score: f64,
    pub frames_analyzed: u32,
}

#[async_trait]
pub trait ExplanationClient: Send + Sync {
    async fn request_explanation(&self, request: ExplanationRequest) -> Result<(), AppError>;
}

/// Default implementation when no assistant is deployed
pub struct DisabledExplanations;

#[async_trait]
impl ExplanationClient for DisabledExplanations {
    async fn request_explanation(&self, request: ExplanationRequest) -> Result<(), AppError> {
        debug!(
            "Explanation generation disabled; skipping item {}",
            request.item_id
        );
        Ok(())
    }
}

/// Fire the explanation request without awaiting it or tying its fate to the
/// caller's. Errors are logged and dropped.
pub fn fire_and_forget(client: Arc<dyn ExplanationClient>, request: ExplanationRequest) {
    tokio::spawn(async move {
        let item_id = request.item_id;
        if let Err(e) = client.request_explanation(request).await {
            warn!(
                "Explanation generation failed for item {} (non-critical): {}",
                item_id, e
            );
        }
    });
}
