//! Screening stage
//!
//! Cheap, CPU-only risk screening off the intake queue. Samples frames at a
//! coarse rate, extracts classical features (no model inference on this
//! path), and escalates risky items to the deep-analysis queue. The
//! non-escalated branch deliberately stops at `screened`: only the
//! reconciliation sweep later drives those items to a decision.

use crate::config::{QueueConfig, ScreeningConfig};
use crate::error::AppError;
use crate::media::{rgb_to_hsv, Frame, FrameSource};
use crate::models::{EscalationMessage, IntakeMessage, ItemPatch, ItemStatus, Priority};
use crate::store::{AuditEvent, AuditEventType, AuditLog, RecordStore, WorkQueue};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Luma gradient above which a pixel counts as an edge
const EDGE_THRESHOLD: f64 = 100.0;

/// Empirical scale keeping color variance in a reasonable range
const COLOR_VARIANCE_SCALE: f64 = 0.5;

/// Normalized [0, 1] features for one sampled frame
#[derive(Debug, Clone, Copy)]
pub struct FrameFeatures {
    /// Edge-density motion proxy
    pub motion: f64,
    /// Skin-tone pixel ratio
    pub skin_ratio: f64,
    /// Std-dev of the normalized 8x8x8 color histogram
    pub color_variance: f64,
    /// Mean brightness; reported but not scored
    pub brightness: f64,
}

/// Extract the screening features for a single frame
pub fn extract_frame_features(frame: &Frame) -> FrameFeatures {
    let pixel_count = frame.pixel_count() as f64;

    // Edge density: fraction of pixels whose luma gradient to the right or
    // down neighbor exceeds the threshold.
    let mut edges = 0usize;
    for y in 0..frame.height {
        for x in 0..frame.width {
            let here = frame.luma(x, y);
            let right = if x + 1 < frame.width {
                (frame.luma(x + 1, y) - here).abs()
            } else {
                0.0
            };
            let down = if y + 1 < frame.height {
                (frame.luma(x, y + 1) - here).abs()
            } else {
                0.0
            };
            if right.max(down) > EDGE_THRESHOLD {
                edges += 1;
            }
        }
    }
    let motion = edges as f64 / pixel_count;

    // Skin-tone ratio over an HSV window
    let mut skin = 0usize;
    let mut brightness_sum = 0.0;
    for (r, g, b) in frame.pixels() {
        let (h, s, v) = rgb_to_hsv(r, g, b);
        if h <= 40.0 && s >= 20.0 / 255.0 && v >= 70.0 / 255.0 {
            skin += 1;
        }
        brightness_sum += 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
    }
    let skin_ratio = skin as f64 / pixel_count;
    let brightness = brightness_sum / pixel_count / 255.0;

    // 8x8x8 RGB histogram, L2-normalized, summarized by its std-dev
    let mut hist = [0.0f64; 512];
    for (r, g, b) in frame.pixels() {
        let idx =
            ((r as usize) >> 5) * 64 + ((g as usize) >> 5) * 8 + ((b as usize) >> 5);
        hist[idx] += 1.0;
    }
    let norm = hist.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in hist.iter_mut() {
            *v /= norm;
        }
    }
    let mean = hist.iter().sum::<f64>() / hist.len() as f64;
    let color_variance =
        (hist.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / hist.len() as f64).sqrt();

    FrameFeatures {
        motion,
        skin_ratio,
        color_variance,
        brightness,
    }
}

/// Aggregate per-frame features into the item risk score.
///
/// Weighted combination calibrated to reduce false positives:
/// `risk = 0.35*motion + 0.35*skin + 0.30*color_variance`, clamped to [0, 1].
pub fn calculate_risk_score(features: &[FrameFeatures]) -> f64 {
    let n = features.len() as f64;
    let motion = (features.iter().map(|f| f.motion).sum::<f64>() / n).clamp(0.0, 1.0);
    let skin = (features.iter().map(|f| f.skin_ratio).sum::<f64>() / n).clamp(0.0, 1.0);
    let color = (features.iter().map(|f| f.color_variance).sum::<f64>() / n
        / COLOR_VARIANCE_SCALE)
        .clamp(0.0, 1.0);

    (motion * 0.35 + skin * 0.35 + color * 0.30).clamp(0.0, 1.0)
}

/// The screening stage worker
pub struct ScreeningStage {
    records: Arc<dyn RecordStore>,
    intake: Arc<dyn WorkQueue>,
    escalation: Arc<dyn WorkQueue>,
    frames: Arc<dyn FrameSource>,
    audit: Arc<dyn AuditLog>,
    config: ScreeningConfig,
    queue_config: QueueConfig,
}

impl ScreeningStage {
    pub fn new(
        records: Arc<dyn RecordStore>,
        intake: Arc<dyn WorkQueue>,
        escalation: Arc<dyn WorkQueue>,
        frames: Arc<dyn FrameSource>,
        audit: Arc<dyn AuditLog>,
        config: ScreeningConfig,
        queue_config: QueueConfig,
    ) -> Self {
        Self {
            records,
            intake,
            escalation,
            frames,
            audit,
            config,
            queue_config,
        }
    }

    /// Pull one batch from the intake queue and handle it. Messages are
    /// acknowledged only after every write has succeeded; on failure the
    /// lease simply lapses and the platform redelivers.
    pub async fn poll_once(&self) -> Result<(), AppError> {
        let batch = self
            .intake
            .receive(1, self.queue_config.wait, self.queue_config.intake_lease)
            .await?;

        for message in batch {
            if message.delivery_count > 1 {
                warn!(
                    "Reprocessing intake message (delivery {})",
                    message.delivery_count
                );
            }
            match self.process(&message.body).await {
                Ok(()) => {
                    self.intake.ack(message.lease_handle).await?;
                }
                Err(AppError::Validation(msg)) => {
                    // Malformed messages would never succeed; drop them.
                    warn!("Dropping malformed intake message: {}", msg);
                    self.intake.ack(message.lease_handle).await?;
                }
                Err(e) => {
                    warn!("Screening failed, leaving message for redelivery: {}", e);
                }
            }
        }
        Ok(())
    }

    /// Screen a single item from its intake message
    pub async fn process(&self, body: &str) -> Result<(), AppError> {
        let message: IntakeMessage = serde_json::from_str(body)
            .map_err(|e| AppError::Validation(format!("bad intake message: {}", e)))?;

        let frames = self
            .frames
            .sample(&message.content_key, self.config.sample_fps)
            .await?;
        if frames.is_empty() {
            warn!("No frames sampled for item {}; skipping", message.item_id);
            return Ok(());
        }

        let features: Vec<FrameFeatures> = frames.iter().map(extract_frame_features).collect();
        let risk_score = calculate_risk_score(&features);
        let escalate = risk_score > self.config.escalation_threshold;

        let status = if escalate {
            ItemStatus::EscalationQueued
        } else {
            ItemStatus::Screened
        };

        self.records
            .update_item(
                message.item_id,
                ItemPatch::new()
                    .status(status)
                    .risk_score(risk_score)
                    .screening_type("cpu")
                    .frames_analyzed(features.len() as u32)
                    .screened_at(Utc::now()),
            )
            .await?;

        if let Err(e) = self
            .audit
            .append(AuditEvent::new(
                message.item_id,
                AuditEventType::Screen,
                serde_json::json!({
                    "riskScore": risk_score,
                    "screeningType": "cpu",
                    "framesAnalyzed": features.len(),
                    "escalated": escalate,
                }),
            ))
            .await
        {
            warn!("Failed to log screen event (non-critical): {}", e);
        }

        if escalate {
            let priority = if risk_score > self.config.high_priority_threshold {
                Priority::High
            } else {
                Priority::Normal
            };
            let escalation = EscalationMessage {
                item_id: message.item_id,
                content_key: message.content_key.clone(),
                risk_score,
                priority,
            };
            let body = serde_json::to_string(&escalation)
                .map_err(|e| AppError::Internal(e.to_string()))?;
            self.escalation.send(body).await?;

            if let Err(e) = self
                .audit
                .append(AuditEvent::new(
                    message.item_id,
                    AuditEventType::Escalate,
                    serde_json::json!({
                        "riskScore": risk_score,
                        "priority": priority,
                    }),
                ))
                .await
            {
                warn!("Failed to log escalate event (non-critical): {}", e);
            }
        }

        info!(
            "Screened item {}: risk_score={:.3}, escalated={}",
            message.item_id, risk_score, escalate
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Decision, ItemRecord};
    use crate::store::{MemoryAuditLog, MemoryQueue, MemoryRecordStore};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use uuid::Uuid;

    struct FixedFrames(Vec<Frame>);

    #[async_trait]
    impl FrameSource for FixedFrames {
        async fn sample(&self, _key: &str, _fps: f64) -> Result<Vec<Frame>, AppError> {
            Ok(self.0.clone())
        }
    }

    /// High-contrast checkerboard of a skin tone and black
    fn skin_checkerboard(size: u32) -> Frame {
        let mut data = Vec::with_capacity((size * size * 3) as usize);
        for y in 0..size {
            for x in 0..size {
                if (x + y) % 2 == 0 {
                    data.extend_from_slice(&[229, 151, 113]);
                } else {
                    data.extend_from_slice(&[0, 0, 0]);
                }
            }
        }
        Frame::new(size, size, data).unwrap()
    }

    #[test]
    fn test_solid_black_frame_scores_zero() {
        let features = extract_frame_features(&Frame::solid(8, 8, [0, 0, 0]));
        assert_eq!(features.motion, 0.0);
        assert_eq!(features.skin_ratio, 0.0);
        assert_eq!(features.brightness, 0.0);
    }

    #[test]
    fn test_skin_tone_frame_has_full_skin_ratio() {
        let features = extract_frame_features(&Frame::solid(8, 8, [229, 151, 113]));
        assert_eq!(features.skin_ratio, 1.0);
        assert_eq!(features.motion, 0.0);
    }

    #[test]
    fn test_checkerboard_has_high_motion() {
        let features = extract_frame_features(&skin_checkerboard(8));
        assert!(features.motion > 0.8, "motion was {}", features.motion);
        assert!((features.skin_ratio - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_risk_weights() {
        // Hand-built features: motion 0.6, skin 0.7, color variance already
        // at the scale cap.
        let features = [FrameFeatures {
            motion: 0.6,
            skin_ratio: 0.7,
            color_variance: 0.5,
            brightness: 0.5,
        }];
        let risk = calculate_risk_score(&features);
        // 0.35*0.6 + 0.35*0.7 + 0.30*1.0 = 0.755
        assert!((risk - 0.755).abs() < 1e-9);
    }

    #[test]
    fn test_risk_is_clamped() {
        let features = [FrameFeatures {
            motion: 1.0,
            skin_ratio: 1.0,
            color_variance: 10.0,
            brightness: 1.0,
        }];
        assert_eq!(calculate_risk_score(&features), 1.0);
    }

    struct Harness {
        records: Arc<MemoryRecordStore>,
        escalation: Arc<MemoryQueue>,
        stage: ScreeningStage,
    }

    fn harness(frames: Vec<Frame>, escalation_threshold: f64) -> Harness {
        let records = Arc::new(MemoryRecordStore::new());
        let intake = Arc::new(MemoryQueue::new());
        let escalation = Arc::new(MemoryQueue::new());
        let config = ScreeningConfig {
            escalation_threshold,
            ..ScreeningConfig::default()
        };
        let stage = ScreeningStage::new(
            records.clone(),
            intake,
            escalation.clone(),
            Arc::new(FixedFrames(frames)),
            Arc::new(MemoryAuditLog::new()),
            config,
            QueueConfig::default(),
        );
        Harness {
            records,
            escalation,
            stage,
        }
    }

    async fn seed_item(h: &Harness) -> IntakeMessage {
        let id = Uuid::new_v4();
        h.records
            .put_item(ItemRecord::new(id, "media/t.raw"))
            .await
            .unwrap();
        IntakeMessage {
            item_id: id,
            content_key: "media/t.raw".to_string(),
        }
    }

    #[tokio::test]
    async fn test_risky_item_is_escalation_queued_without_decision() {
        let h = harness(vec![skin_checkerboard(8)], 0.3);
        let message = seed_item(&h).await;
        h.stage
            .process(&serde_json::to_string(&message).unwrap())
            .await
            .unwrap();

        let record = h.records.get_item(message.item_id).await.unwrap().unwrap();
        assert_eq!(record.status, ItemStatus::EscalationQueued);
        assert!(record.risk_score > 0.3);
        assert_eq!(record.screening_type.as_deref(), Some("cpu"));
        assert_eq!(record.frames_analyzed, 1);
        assert!(record.screened_at.is_some());
        // No decision on the screening path, ever.
        assert_eq!(record.decision, Decision::Pending);

        let published = h
            .escalation
            .receive(1, Duration::ZERO, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(published.len(), 1);
        let escalation: EscalationMessage = serde_json::from_str(&published[0].body).unwrap();
        assert_eq!(escalation.item_id, message.item_id);
    }

    #[tokio::test]
    async fn test_calm_item_dead_ends_at_screened() {
        let h = harness(vec![Frame::solid(8, 8, [10, 10, 10])], 0.6);
        let message = seed_item(&h).await;
        h.stage
            .process(&serde_json::to_string(&message).unwrap())
            .await
            .unwrap();

        let record = h.records.get_item(message.item_id).await.unwrap().unwrap();
        assert_eq!(record.status, ItemStatus::Screened);
        assert_eq!(record.decision, Decision::Pending);
        assert_eq!(h.escalation.depth().await, 0);
    }

    #[tokio::test]
    async fn test_reprocessing_same_message_is_idempotent() {
        let h = harness(vec![Frame::solid(8, 8, [10, 10, 10])], 0.6);
        let message = seed_item(&h).await;
        let body = serde_json::to_string(&message).unwrap();

        h.stage.process(&body).await.unwrap();
        let first = h.records.get_item(message.item_id).await.unwrap().unwrap();
        h.stage.process(&body).await.unwrap();
        let second = h.records.get_item(message.item_id).await.unwrap().unwrap();

        assert_eq!(first.status, second.status);
        assert_eq!(first.risk_score, second.risk_score);
        assert_eq!(first.frames_analyzed, second.frames_analyzed);
    }

    #[tokio::test]
    async fn test_malformed_message_is_validation_error() {
        let h = harness(vec![], 0.6);
        let err = h.stage.process("not json").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
