//! Deep-analysis stage
//!
//! Model-backed scoring off the escalation queue. Each sampled frame goes
//! through a content-style gate, a zero-shot semantic classifier, and
//! optionally a pair of hosted custom scorers. Per-item scores are the 90th
//! percentile of the frame series, which leans toward the worst frames
//! while tolerating isolated scoring noise. The stage then invokes the
//! decision engine synchronously with the fresh scores.

use crate::config::{AnalysisConfig, QueueConfig};
use crate::error::AppError;
use crate::explain::{self, ExplanationClient, ExplanationRequest};
use crate::media::{Frame, FrameSource};
use crate::models::{EscalationMessage, ItemPatch, ItemStatus};
use crate::pipeline::decision::{DecisionEngine, DecisionRequest};
use crate::scorers::{CustomScorer, ZeroShotClassifier, NSFW_LABELS, STYLE_LABELS, VIOLENCE_LABELS};
use crate::store::{AuditEvent, AuditEventType, AuditLog, RecordStore, WorkQueue};
use chrono::Utc;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{info, warn};

/// Confidence above which the style gate marks a frame as synthetic
const ANIMATED_CONFIDENCE: f64 = 0.5;

/// Down-weight factors for synthetic frames; animated content trips the
/// semantic classifiers far more often than it should.
const ANIMATED_NSFW_FACTOR: f64 = 0.2;
const ANIMATED_VIOLENCE_FACTOR: f64 = 0.25;

/// Blend weights when a custom model score is available
const CUSTOM_WEIGHT: f64 = 0.7;
const ZERO_SHOT_WEIGHT: f64 = 0.3;

/// Calibration discount when scoring from the zero-shot classifier alone
const ZERO_SHOT_ONLY_FACTOR: f64 = 0.85;

/// Further discount applied to an aggregated series that never saw a
/// custom model score
const NO_CUSTOM_AGGREGATE_FACTOR: f64 = 0.75;

/// Scores for one analyzed frame
#[derive(Debug, Clone, Copy)]
struct FrameScores {
    nsfw: f64,
    violence: f64,
    custom_nsfw: bool,
    custom_violence: bool,
}

/// 90th percentile of a score series, linear interpolation between ranks.
/// Deterministic for a given series.
pub fn percentile_90(series: &[f64]) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    let mut sorted = series.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (sorted.len() - 1) as f64 * 0.9;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        sorted[lower] + (rank - lower as f64) * (sorted[upper] - sorted[lower])
    }
}

/// Blend a custom model score with the zero-shot score. A custom score of
/// zero means the scorer was absent or failed open, so the zero-shot path
/// applies with its calibration discount.
fn combine_scores(custom: f64, zero_shot: f64) -> f64 {
    if custom > 0.0 {
        custom * CUSTOM_WEIGHT + zero_shot * ZERO_SHOT_WEIGHT
    } else {
        zero_shot * ZERO_SHOT_ONLY_FACTOR
    }
}

/// The deep-analysis stage worker
pub struct DeepAnalysisStage {
    records: Arc<dyn RecordStore>,
    escalation: Arc<dyn WorkQueue>,
    frames: Arc<dyn FrameSource>,
    classifier: Arc<dyn ZeroShotClassifier>,
    nsfw_scorer: Option<Arc<dyn CustomScorer>>,
    violence_scorer: Option<Arc<dyn CustomScorer>>,
    engine: Arc<DecisionEngine>,
    explanations: Arc<dyn ExplanationClient>,
    audit: Arc<dyn AuditLog>,
    config: AnalysisConfig,
    queue_config: QueueConfig,
}

impl DeepAnalysisStage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        records: Arc<dyn RecordStore>,
        escalation: Arc<dyn WorkQueue>,
        frames: Arc<dyn FrameSource>,
        classifier: Arc<dyn ZeroShotClassifier>,
        nsfw_scorer: Option<Arc<dyn CustomScorer>>,
        violence_scorer: Option<Arc<dyn CustomScorer>>,
        engine: Arc<DecisionEngine>,
        explanations: Arc<dyn ExplanationClient>,
        audit: Arc<dyn AuditLog>,
        config: AnalysisConfig,
        queue_config: QueueConfig,
    ) -> Self {
        Self {
            records,
            escalation,
            frames,
            classifier,
            nsfw_scorer,
            violence_scorer,
            engine,
            explanations,
            audit,
            config,
            queue_config,
        }
    }

    /// Pull one batch from the escalation queue and handle it. Leases are
    /// acknowledged only once the record write and the decision call have
    /// both succeeded.
    pub async fn poll_once(&self) -> Result<(), AppError> {
        let batch = self
            .escalation
            .receive(
                1,
                self.queue_config.wait,
                self.queue_config.escalation_lease,
            )
            .await?;

        for message in batch {
            if message.delivery_count > 1 {
                warn!(
                    "Reprocessing escalation message (delivery {})",
                    message.delivery_count
                );
            }
            match self.process(&message.body).await {
                Ok(()) => {
                    self.escalation.ack(message.lease_handle).await?;
                }
                Err(AppError::Validation(msg)) => {
                    warn!("Dropping malformed escalation message: {}", msg);
                    self.escalation.ack(message.lease_handle).await?;
                }
                Err(e) => {
                    warn!("Deep analysis failed, leaving message for redelivery: {}", e);
                }
            }
        }
        Ok(())
    }

    /// Analyze a single escalated item
    pub async fn process(&self, body: &str) -> Result<(), AppError> {
        let message: EscalationMessage = serde_json::from_str(body)
            .map_err(|e| AppError::Validation(format!("bad escalation message: {}", e)))?;

        let frames = self
            .frames
            .sample(&message.content_key, self.config.sample_fps)
            .await?;
        if frames.is_empty() {
            warn!("No frames sampled for item {}; skipping", message.item_id);
            return Ok(());
        }

        let mut scores = Vec::with_capacity(frames.len());
        for frame in &frames {
            scores.push(self.analyze_frame(frame).await?);
        }

        let nsfw_series: Vec<f64> = scores.iter().map(|s| s.nsfw).collect();
        let violence_series: Vec<f64> = scores.iter().map(|s| s.violence).collect();
        let mut nsfw_score = percentile_90(&nsfw_series).clamp(0.0, 1.0);
        let mut violence_score = percentile_90(&violence_series).clamp(0.0, 1.0);
        if !scores.iter().any(|s| s.custom_nsfw) {
            nsfw_score *= NO_CUSTOM_AGGREGATE_FACTOR;
        }
        if !scores.iter().any(|s| s.custom_violence) {
            violence_score *= NO_CUSTOM_AGGREGATE_FACTOR;
        }

        let record = self
            .records
            .update_item(
                message.item_id,
                ItemPatch::new()
                    .status(ItemStatus::Analyzed)
                    .nsfw_score(nsfw_score)
                    .violence_score(violence_score)
                    .frames_analyzed(scores.len() as u32)
                    .model_version(self.config.model_version.clone())
                    .analyzed_at(Utc::now()),
            )
            .await?;

        if let Err(e) = self
            .audit
            .append(AuditEvent::new(
                message.item_id,
                AuditEventType::Analyze,
                serde_json::json!({
                    "nsfwScore": nsfw_score,
                    "violenceScore": violence_score,
                    "framesAnalyzed": scores.len(),
                    "modelVersion": self.config.model_version,
                }),
            ))
            .await
        {
            warn!("Failed to log analyze event (non-critical): {}", e);
        }

        info!(
            "Analyzed item {}: nsfw={:.3}, violence={:.3}, frames={}",
            message.item_id,
            nsfw_score,
            violence_score,
            scores.len()
        );

        // Decision runs on this path, with the screening risk already on
        // the record.
        self.engine
            .decide(DecisionRequest {
                item_id: message.item_id,
                risk_score: record.risk_score,
                nsfw_score,
                violence_score,
                hate_score: 0.0,
            })
            .await?;

        explain::fire_and_forget(
            self.explanations.clone(),
            ExplanationRequest {
                item_id: message.item_id,
                nsfw_score,
                violence_score,
                frames_analyzed: scores.len() as u32,
            },
        );

        Ok(())
    }

    async fn analyze_frame(&self, frame: &Frame) -> Result<FrameScores, AppError> {
        let style = self.classifier.classify(frame, STYLE_LABELS).await?;
        let is_animated = style.get(1).copied().unwrap_or(0.0) > ANIMATED_CONFIDENCE;

        // One semantic pass over every category label plus a neutral
        // anchor, summed per category.
        let mut labels: Vec<&str> = Vec::new();
        labels.extend_from_slice(NSFW_LABELS);
        labels.extend_from_slice(VIOLENCE_LABELS);
        labels.push("safe content");
        let probs = self.classifier.classify(frame, &labels).await?;
        let zs_nsfw: f64 = probs.iter().take(NSFW_LABELS.len()).sum();
        let zs_violence: f64 = probs
            .iter()
            .skip(NSFW_LABELS.len())
            .take(VIOLENCE_LABELS.len())
            .sum();

        let custom_nsfw = self.call_custom(&self.nsfw_scorer, frame).await;
        let custom_violence = self.call_custom(&self.violence_scorer, frame).await;

        let mut nsfw = combine_scores(custom_nsfw, zs_nsfw);
        let mut violence = combine_scores(custom_violence, zs_violence);
        if is_animated {
            nsfw *= ANIMATED_NSFW_FACTOR;
            violence *= ANIMATED_VIOLENCE_FACTOR;
        }

        Ok(FrameScores {
            nsfw,
            violence,
            custom_nsfw: custom_nsfw > 0.0,
            custom_violence: custom_violence > 0.0,
        })
    }

    /// Call a custom model endpoint, substituting 0 on timeout or error.
    /// Scoring fails open on the input; pipeline progress never blocks on
    /// a model endpoint.
    async fn call_custom(&self, scorer: &Option<Arc<dyn CustomScorer>>, frame: &Frame) -> f64 {
        let Some(scorer) = scorer else {
            return 0.0;
        };
        match timeout(self.config.scorer_timeout, scorer.score(frame)).await {
            Ok(Ok(score)) => score.clamp(0.0, 1.0),
            Ok(Err(e)) => {
                warn!("Custom scorer error, substituting 0: {}", e);
                0.0
            }
            Err(_) => {
                warn!(
                    "Custom scorer timed out after {:?}, substituting 0",
                    self.config.scorer_timeout
                );
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecisionConfig;
    use crate::explain::DisabledExplanations;
    use crate::models::{Decision, ItemRecord, Priority};
    use crate::notify::{NotifyRequest, NotifyResult, Notifier};
    use crate::store::{MemoryAuditLog, MemoryQueue, MemoryRecordStore};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    struct NullNotifier;

    #[async_trait]
    impl Notifier for NullNotifier {
        async fn notify(&self, _request: NotifyRequest) -> Result<NotifyResult, AppError> {
            Ok(NotifyResult::sent(200))
        }
    }

    struct FixedFrames(usize);

    #[async_trait]
    impl FrameSource for FixedFrames {
        async fn sample(&self, _key: &str, _fps: f64) -> Result<Vec<Frame>, AppError> {
            Ok((0..self.0).map(|_| Frame::solid(4, 4, [50, 50, 50])).collect())
        }
    }

    /// Classifier returning fixed probabilities: `style` for the two-label
    /// style gate and `semantic` for the six-label semantic pass.
    struct StubClassifier {
        style: Vec<f64>,
        semantic: Vec<f64>,
    }

    #[async_trait]
    impl ZeroShotClassifier for StubClassifier {
        async fn classify(&self, _frame: &Frame, labels: &[&str]) -> Result<Vec<f64>, AppError> {
            if labels.len() == 2 {
                Ok(self.style.clone())
            } else {
                Ok(self.semantic.clone())
            }
        }
    }

    struct FixedScorer(f64);

    #[async_trait]
    impl CustomScorer for FixedScorer {
        async fn score(&self, _frame: &Frame) -> Result<f64, AppError> {
            Ok(self.0)
        }
    }

    struct FailingScorer;

    #[async_trait]
    impl CustomScorer for FailingScorer {
        async fn score(&self, _frame: &Frame) -> Result<f64, AppError> {
            Err(AppError::Scorer("endpoint unreachable".to_string()))
        }
    }

    #[test]
    fn test_percentile_90_interpolates() {
        let series: Vec<f64> = (1..=10).map(|i| i as f64 / 10.0).collect();
        assert!((percentile_90(&series) - 0.91).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_90_is_deterministic() {
        let series = vec![0.3, 0.9, 0.1, 0.7, 0.5];
        assert_eq!(percentile_90(&series), percentile_90(&series));
        assert_eq!(percentile_90(&[]), 0.0);
        assert_eq!(percentile_90(&[0.42]), 0.42);
    }

    #[test]
    fn test_combine_prefers_custom_score() {
        assert!((combine_scores(0.8, 0.4) - (0.8 * 0.7 + 0.4 * 0.3)).abs() < 1e-9);
        assert!((combine_scores(0.0, 0.4) - 0.4 * 0.85).abs() < 1e-9);
    }

    struct Harness {
        records: Arc<MemoryRecordStore>,
        stage: DeepAnalysisStage,
    }

    fn harness(
        classifier: StubClassifier,
        nsfw_scorer: Option<Arc<dyn CustomScorer>>,
        frames: usize,
    ) -> Harness {
        let records = Arc::new(MemoryRecordStore::new());
        let audit = Arc::new(MemoryAuditLog::new());
        let engine = Arc::new(DecisionEngine::new(
            records.clone(),
            audit.clone(),
            Arc::new(NullNotifier),
            DecisionConfig::default(),
            None,
        ));
        let stage = DeepAnalysisStage::new(
            records.clone(),
            Arc::new(MemoryQueue::new()),
            Arc::new(FixedFrames(frames)),
            Arc::new(classifier),
            nsfw_scorer,
            None,
            engine,
            Arc::new(DisabledExplanations),
            audit,
            AnalysisConfig::default(),
            QueueConfig::default(),
        );
        Harness { records, stage }
    }

    async fn seed_item(h: &Harness, risk_score: f64) -> EscalationMessage {
        let id = Uuid::new_v4();
        let mut record = ItemRecord::new(id, "media/t.raw");
        record.risk_score = risk_score;
        h.records.put_item(record).await.unwrap();
        EscalationMessage {
            item_id: id,
            content_key: "media/t.raw".to_string(),
            risk_score,
            priority: Priority::Normal,
        }
    }

    #[tokio::test]
    async fn test_analysis_writes_scores_and_decides() {
        // Semantic mass concentrated on the risky labels, real footage.
        // Label order: two nsfw, three violence, one neutral anchor.
        let h = harness(
            StubClassifier {
                style: vec![0.9, 0.1],
                semantic: vec![0.45, 0.35, 0.3, 0.3, 0.3, 0.05],
            },
            Some(Arc::new(FixedScorer(0.9))),
            3,
        );
        let message = seed_item(&h, 0.65).await;
        h.stage
            .process(&serde_json::to_string(&message).unwrap())
            .await
            .unwrap();

        let record = h.records.get_item(message.item_id).await.unwrap().unwrap();
        // nsfw per frame: 0.9*0.7 + (0.45+0.35)*0.3 = 0.87; custom used so
        // no aggregate discount.
        assert!((record.nsfw_score - 0.87).abs() < 1e-9);
        // violence per frame: zero-shot only, (0.3+0.3+0.3)*0.85 then the
        // 0.75 no-custom discount.
        assert!((record.violence_score - 0.9 * 0.85 * 0.75).abs() < 1e-9);
        assert_eq!(record.frames_analyzed, 3);
        assert_eq!(record.model_version.as_deref(), Some("v1.0.0"));
        assert!(record.analyzed_at.is_some());
        // Decision ran synchronously: effective risk 0.87, final
        // 0.4*0.87 + 0.3*0.87 + 0.2*0.57375 = 0.72375 -> review.
        assert_eq!(record.decision, Decision::Review);
        assert_eq!(record.status, ItemStatus::Review);
    }

    #[tokio::test]
    async fn test_animated_content_is_down_weighted() {
        let h = harness(
            StubClassifier {
                style: vec![0.2, 0.8],
                semantic: vec![0.45, 0.35, 0.3, 0.3, 0.3, 0.05],
            },
            Some(Arc::new(FixedScorer(0.9))),
            1,
        );
        let message = seed_item(&h, 0.0).await;
        h.stage
            .process(&serde_json::to_string(&message).unwrap())
            .await
            .unwrap();

        let record = h.records.get_item(message.item_id).await.unwrap().unwrap();
        assert!((record.nsfw_score - 0.87 * 0.2).abs() < 1e-9);
        assert!((record.violence_score - 0.9 * 0.85 * 0.25 * 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failed_custom_scorer_fails_open() {
        let h = harness(
            StubClassifier {
                style: vec![0.9, 0.1],
                semantic: vec![0.2, 0.1, 0.1, 0.1, 0.1, 0.4],
            },
            Some(Arc::new(FailingScorer)),
            2,
        );
        let message = seed_item(&h, 0.1).await;
        h.stage
            .process(&serde_json::to_string(&message).unwrap())
            .await
            .unwrap();

        let record = h.records.get_item(message.item_id).await.unwrap().unwrap();
        // Custom substituted 0, so the zero-shot-only path and the
        // aggregate discount both apply.
        assert!((record.nsfw_score - 0.3 * 0.85 * 0.75).abs() < 1e-9);
        // All scores land at 0.191, final 0.172 -> approve.
        assert_eq!(record.decision, Decision::Approved);
        assert_eq!(record.status, ItemStatus::Approved);
    }

    #[tokio::test]
    async fn test_malformed_message_is_validation_error() {
        let h = harness(
            StubClassifier {
                style: vec![0.5, 0.5],
                semantic: vec![0.0; 6],
            },
            None,
            0,
        );
        let err = h.stage.process("{}").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
