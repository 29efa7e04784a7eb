//! Policy decision engine
//!
//! A pure function of the scores currently stored for an item, made
//! side-effect-bearing only by persisting its output. Idempotent: any number
//! of invocations with identical inputs converge on the same decision, which
//! is what makes races between the normal invocation path and the
//! reconciliation sweep safe without locks.

use crate::config::DecisionConfig;
use crate::error::AppError;
use crate::models::{Decision, ItemPatch, ItemRecord};
use crate::notify::{Notifier, NotifyRequest};
use crate::store::{AuditEvent, AuditEventType, AuditLog, RecordStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

/// Boundary-reachable decision request. All scores live in [0, 1]; a
/// malformed request is rejected at this boundary and the item is left
/// unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    pub item_id: Uuid,
    #[validate(range(min = 0.0, max = 1.0, message = "riskScore must be within [0, 1]"))]
    pub risk_score: f64,
    #[validate(range(min = 0.0, max = 1.0, message = "nsfwScore must be within [0, 1]"))]
    #[serde(default)]
    pub nsfw_score: f64,
    #[validate(range(min = 0.0, max = 1.0, message = "violenceScore must be within [0, 1]"))]
    #[serde(default)]
    pub violence_score: f64,
    /// Accepted at the boundary; no producer exists in this core
    #[validate(range(min = 0.0, max = 1.0, message = "hateScore must be within [0, 1]"))]
    #[serde(default)]
    pub hate_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResponse {
    pub item_id: Uuid,
    pub decision: Decision,
    pub final_score: f64,
    pub requires_review: bool,
}

/// Deterministic score combination.
///
/// The effective risk is recomputed as the max of the content scores and the
/// screening heuristic, so it reflects actual content risk rather than
/// motion/color features alone.
pub fn compute_final_score(
    risk_score: f64,
    nsfw_score: f64,
    violence_score: f64,
    hate_score: f64,
) -> (f64, f64) {
    let effective_risk = nsfw_score.max(violence_score).max(risk_score);
    let final_score =
        effective_risk * 0.4 + nsfw_score * 0.3 + violence_score * 0.2 + hate_score * 0.1;
    (effective_risk, final_score)
}

/// The decision engine
pub struct DecisionEngine {
    records: Arc<dyn RecordStore>,
    audit: Arc<dyn AuditLog>,
    notifier: Arc<dyn Notifier>,
    config: DecisionConfig,
    default_webhook: Option<String>,
}

impl DecisionEngine {
    pub fn new(
        records: Arc<dyn RecordStore>,
        audit: Arc<dyn AuditLog>,
        notifier: Arc<dyn Notifier>,
        config: DecisionConfig,
        default_webhook: Option<String>,
    ) -> Self {
        Self {
            records,
            audit,
            notifier,
            config,
            default_webhook,
        }
    }

    fn decision_for(&self, final_score: f64) -> Decision {
        if final_score < self.config.approve_threshold {
            Decision::Approved
        } else if final_score > self.config.reject_threshold {
            Decision::Rejected
        } else {
            Decision::Review
        }
    }

    /// Decide an item from the supplied scores.
    ///
    /// A terminal decision already on the record wins: automated re-scoring
    /// never supersedes an earlier approve/reject, only a human override
    /// does (see [`DecisionEngine::apply_override`]).
    pub async fn decide(&self, request: DecisionRequest) -> Result<DecisionResponse, AppError> {
        request
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let record = self
            .records
            .get_item(request.item_id)
            .await?
            .ok_or_else(|| {
                warn!("Decision requested for unknown item {}", request.item_id);
                AppError::NotFound(format!("Item {} not found", request.item_id))
            })?;

        if record.decision.is_terminal() {
            debug!(
                "Item {} already decided ({:?}); keeping stored outcome",
                record.id, record.decision
            );
            return Ok(DecisionResponse {
                item_id: record.id,
                decision: record.decision,
                final_score: record.final_score,
                requires_review: false,
            });
        }

        let (effective_risk, final_score) = compute_final_score(
            request.risk_score,
            request.nsfw_score,
            request.violence_score,
            request.hate_score,
        );
        let decision = self.decision_for(final_score);

        let patch = ItemPatch::new()
            .status(decision.as_status())
            .decision(decision)
            .final_score(final_score)
            .risk_score(effective_risk)
            .nsfw_score(request.nsfw_score)
            .violence_score(request.violence_score)
            .decided_at(Utc::now());
        let updated = self.records.update_item(record.id, patch).await?;

        if let Err(e) = self
            .audit
            .append(AuditEvent::new(
                record.id,
                AuditEventType::Decide,
                serde_json::json!({
                    "decision": decision,
                    "finalScore": final_score,
                    "riskScore": effective_risk,
                    "originalRiskScore": request.risk_score,
                    "nsfwScore": request.nsfw_score,
                    "violenceScore": request.violence_score,
                }),
            ))
            .await
        {
            warn!("Failed to log decide event (non-critical): {}", e);
        }

        info!(
            "Decision for item {}: {:?} (final_score={:.3})",
            record.id, decision, final_score
        );

        // Review defers notification until a human decision is recorded.
        if decision.is_terminal() {
            self.dispatch_notification(&updated, decision);
        } else if let Err(e) = self
            .audit
            .append(AuditEvent::new(
                record.id,
                AuditEventType::ReviewQueued,
                serde_json::json!({ "finalScore": final_score }),
            ))
            .await
        {
            warn!("Failed to log review-queued event (non-critical): {}", e);
        }

        Ok(DecisionResponse {
            item_id: record.id,
            decision,
            final_score,
            requires_review: decision == Decision::Review,
        })
    }

    /// Record a human review outcome through the same decision-update path.
    ///
    /// The override is terminal regardless of score and is the only way an
    /// existing automated approve/reject may be superseded.
    pub async fn apply_override(
        &self,
        item_id: Uuid,
        approved: bool,
        notes: Option<String>,
    ) -> Result<DecisionResponse, AppError> {
        if self.records.get_item(item_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Item {} not found", item_id)));
        }

        let decision = if approved {
            Decision::Approved
        } else {
            Decision::Rejected
        };
        let now = Utc::now();

        let mut patch = ItemPatch::new()
            .status(decision.as_status())
            .decision(decision)
            .human_reviewed(true)
            .reviewed_at(now)
            .decided_at(now);
        if let Some(notes) = &notes {
            patch = patch.reviewer_notes(notes.clone());
        }
        let updated = self.records.update_item(item_id, patch).await?;

        if let Err(e) = self
            .audit
            .append(AuditEvent::new(
                item_id,
                AuditEventType::ReviewCompleted,
                serde_json::json!({
                    "decision": decision,
                    "humanReviewed": true,
                    "notes": notes,
                }),
            ))
            .await
        {
            warn!("Failed to log review event (non-critical): {}", e);
        }

        info!("Human review for item {}: {:?}", item_id, decision);
        self.dispatch_notification(&updated, decision);

        Ok(DecisionResponse {
            item_id,
            decision,
            final_score: updated.final_score,
            requires_review: false,
        })
    }

    /// Fire-and-forget webhook delivery; failure is logged and audited, never
    /// surfaced to the caller.
    fn dispatch_notification(&self, record: &ItemRecord, decision: Decision) {
        let callback_url = match record
            .callback_url
            .clone()
            .or_else(|| self.default_webhook.clone())
        {
            Some(url) => url,
            None => {
                debug!("No callback registered for item {}; skipping notify", record.id);
                return;
            }
        };

        let notifier = Arc::clone(&self.notifier);
        let audit = Arc::clone(&self.audit);
        let item_id = record.id;
        tokio::spawn(async move {
            let result = match notifier
                .notify(NotifyRequest {
                    item_id,
                    decision,
                    callback_url: callback_url.clone(),
                })
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    warn!("Notification failed for item {} (non-critical): {}", item_id, e);
                    return;
                }
            };

            let _ = audit
                .append(AuditEvent::new(
                    item_id,
                    AuditEventType::Notify,
                    serde_json::json!({
                        "decision": decision,
                        "callbackUrl": callback_url,
                        "status": result.status,
                        "responseCode": result.code,
                    }),
                ))
                .await;
        });
    }
}
