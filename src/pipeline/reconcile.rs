//! Reconciliation worker
//!
//! Periodic sweep that drives stuck items to a terminal decision. This is
//! the only liveness mechanism in the pipeline: screening's non-escalated
//! branch never calls the decision engine, and escalation messages or the
//! deep-analysis worker can be lost. Every stuck item reaches a decision
//! within one sweep interval, or is logged when no score exists to decide
//! from.

use crate::config::ReconcileConfig;
use crate::error::AppError;
use crate::models::{Decision, ItemRecord, ItemStatus};
use crate::pipeline::decision::{DecisionEngine, DecisionRequest};
use crate::store::{AuditEvent, AuditEventType, AuditLog, RecordStore};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Why the sweep considered a record stuck
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StuckReason {
    /// Analyzed but the decision call was lost
    AnalyzedWithoutDecision,
    /// Screening's intentional dead end
    ScreenedPending,
    /// Non-terminal and older than the staleness bound
    Stale,
}

impl StuckReason {
    fn as_str(&self) -> &'static str {
        match self {
            StuckReason::AnalyzedWithoutDecision => "analyzed_without_decision",
            StuckReason::ScreenedPending => "screened_pending",
            StuckReason::Stale => "stale",
        }
    }
}

pub struct ReconciliationWorker {
    records: Arc<dyn RecordStore>,
    engine: Arc<DecisionEngine>,
    audit: Arc<dyn AuditLog>,
    config: ReconcileConfig,
}

impl ReconciliationWorker {
    pub fn new(
        records: Arc<dyn RecordStore>,
        engine: Arc<DecisionEngine>,
        audit: Arc<dyn AuditLog>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            records,
            engine,
            audit,
            config,
        }
    }

    fn classify(&self, record: &ItemRecord) -> Option<StuckReason> {
        if record.status == ItemStatus::Analyzed && record.decision == Decision::Pending {
            return Some(StuckReason::AnalyzedWithoutDecision);
        }
        if record.status == ItemStatus::Screened && record.decision == Decision::Pending {
            return Some(StuckReason::ScreenedPending);
        }
        let stale = matches!(
            record.status,
            ItemStatus::Uploaded | ItemStatus::Screened | ItemStatus::EscalationQueued
        );
        if stale {
            let age = Utc::now().signed_duration_since(record.uploaded_at);
            if age.num_seconds() >= 0 && age.to_std().unwrap_or_default() > self.config.staleness {
                return Some(StuckReason::Stale);
            }
        }
        None
    }

    /// Run one sweep over every record. Per-item failures are logged and
    /// never abort the sweep.
    pub async fn sweep(&self) -> Result<usize, AppError> {
        let stuck: Vec<(ItemRecord, StuckReason)> = self
            .records
            .scan(&|record| !record.decision.is_terminal())
            .await?
            .into_iter()
            .filter_map(|record| self.classify(&record).map(|reason| (record, reason)))
            .collect();

        let mut reconciled = 0usize;
        for (record, reason) in stuck {
            match self.remediate(&record, reason).await {
                Ok(true) => reconciled += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Reconciliation of item {} failed: {}", record.id, e);
                }
            }
        }

        if reconciled > 0 {
            info!("Reconciliation sweep forced {} decision(s)", reconciled);
        }
        Ok(reconciled)
    }

    async fn remediate(&self, record: &ItemRecord, reason: StuckReason) -> Result<bool, AppError> {
        // A stale item with no score at all cannot be decided; leave it
        // pending and log it for operators.
        let has_score =
            record.risk_score > 0.0 || record.nsfw_score > 0.0 || record.violence_score > 0.0;
        if reason == StuckReason::Stale && !has_score {
            warn!(
                "Item {} is stale with no scores; leaving pending",
                record.id
            );
            return Ok(false);
        }

        info!(
            "Reconciling stuck item {} ({}): risk={:.3}, nsfw={:.3}, violence={:.3}",
            record.id, reason.as_str(), record.risk_score, record.nsfw_score, record.violence_score
        );

        let response = self
            .engine
            .decide(DecisionRequest {
                item_id: record.id,
                risk_score: record.risk_score,
                nsfw_score: record.nsfw_score,
                violence_score: record.violence_score,
                hate_score: 0.0,
            })
            .await?;

        if let Err(e) = self
            .audit
            .append(AuditEvent::new(
                record.id,
                AuditEventType::Reconcile,
                serde_json::json!({
                    "reason": reason.as_str(),
                    "decision": response.decision,
                    "finalScore": response.final_score,
                }),
            ))
            .await
        {
            warn!("Failed to log reconcile event (non-critical): {}", e);
        }

        Ok(true)
    }

    /// Sweep forever at the configured cadence
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep().await {
                warn!("Reconciliation sweep failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecisionConfig;
    use crate::notify::{NotifyRequest, NotifyResult, Notifier};
    use crate::store::{MemoryAuditLog, MemoryRecordStore};
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    struct NullNotifier;

    #[async_trait]
    impl Notifier for NullNotifier {
        async fn notify(&self, _request: NotifyRequest) -> Result<NotifyResult, AppError> {
            Ok(NotifyResult::sent(200))
        }
    }

    struct Harness {
        records: Arc<MemoryRecordStore>,
        worker: ReconciliationWorker,
    }

    fn harness() -> Harness {
        let records = Arc::new(MemoryRecordStore::new());
        let audit = Arc::new(MemoryAuditLog::new());
        let engine = Arc::new(DecisionEngine::new(
            records.clone(),
            audit.clone(),
            Arc::new(NullNotifier),
            DecisionConfig::default(),
            None,
        ));
        let worker =
            ReconciliationWorker::new(records.clone(), engine, audit, ReconcileConfig::default());
        Harness { records, worker }
    }

    async fn seed(h: &Harness, status: ItemStatus, risk: f64, age: ChronoDuration) -> Uuid {
        let id = Uuid::new_v4();
        let mut record = ItemRecord::new(id, "media/t.raw");
        record.status = status;
        record.risk_score = risk;
        record.uploaded_at = Utc::now() - age;
        h.records.put_item(record).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_screened_dead_end_reaches_decision() {
        let h = harness();
        let id = seed(&h, ItemStatus::Screened, 0.3, ChronoDuration::minutes(5)).await;

        let reconciled = h.worker.sweep().await.unwrap();
        assert_eq!(reconciled, 1);

        let record = h.records.get_item(id).await.unwrap().unwrap();
        // risk 0.3 only: final = 0.4*0.3 = 0.12 -> approve.
        assert_eq!(record.decision, Decision::Approved);
        assert_eq!(record.status, ItemStatus::Approved);
    }

    #[tokio::test]
    async fn test_analyzed_without_decision_is_forced() {
        let h = harness();
        let id = seed(&h, ItemStatus::Analyzed, 0.0, ChronoDuration::minutes(1)).await;
        h.records
            .update_item(
                id,
                crate::models::ItemPatch::new()
                    .nsfw_score(0.95)
                    .violence_score(0.9),
            )
            .await
            .unwrap();

        assert_eq!(h.worker.sweep().await.unwrap(), 1);
        let record = h.records.get_item(id).await.unwrap().unwrap();
        // effective 0.95, final 0.4*0.95 + 0.3*0.95 + 0.2*0.9 = 0.845.
        assert_eq!(record.decision, Decision::Rejected);
    }

    #[tokio::test]
    async fn test_stale_item_with_score_is_forced() {
        let h = harness();
        let id = seed(
            &h,
            ItemStatus::EscalationQueued,
            0.65,
            ChronoDuration::hours(2),
        )
        .await;

        assert_eq!(h.worker.sweep().await.unwrap(), 1);
        let record = h.records.get_item(id).await.unwrap().unwrap();
        // final = 0.4*0.65 = 0.26 -> review.
        assert_eq!(record.decision, Decision::Review);
        assert_eq!(record.status, ItemStatus::Review);
    }

    #[tokio::test]
    async fn test_stale_item_without_scores_is_left_pending() {
        let h = harness();
        let id = seed(&h, ItemStatus::Uploaded, 0.0, ChronoDuration::hours(2)).await;

        assert_eq!(h.worker.sweep().await.unwrap(), 0);
        let record = h.records.get_item(id).await.unwrap().unwrap();
        assert_eq!(record.decision, Decision::Pending);
        assert_eq!(record.status, ItemStatus::Uploaded);
    }

    #[tokio::test]
    async fn test_fresh_and_terminal_items_are_untouched() {
        let h = harness();
        let fresh = seed(&h, ItemStatus::Uploaded, 0.0, ChronoDuration::minutes(5)).await;
        let queued = seed(
            &h,
            ItemStatus::EscalationQueued,
            0.7,
            ChronoDuration::minutes(5),
        )
        .await;
        let decided = seed(&h, ItemStatus::Approved, 0.1, ChronoDuration::hours(3)).await;
        h.records
            .update_item(
                decided,
                crate::models::ItemPatch::new().decision(Decision::Approved),
            )
            .await
            .unwrap();

        assert_eq!(h.worker.sweep().await.unwrap(), 0);
        for id in [fresh, queued] {
            let record = h.records.get_item(id).await.unwrap().unwrap();
            assert_eq!(record.decision, Decision::Pending);
        }
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let h = harness();
        let id = seed(&h, ItemStatus::Screened, 0.3, ChronoDuration::minutes(5)).await;

        assert_eq!(h.worker.sweep().await.unwrap(), 1);
        // Terminal now; the next sweep skips it.
        assert_eq!(h.worker.sweep().await.unwrap(), 0);
        let record = h.records.get_item(id).await.unwrap().unwrap();
        assert_eq!(record.decision, Decision::Approved);
    }
}
