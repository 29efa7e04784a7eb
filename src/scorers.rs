//! Content scorer seams
//!
//! The deep-analysis ensemble is built from black-box scoring functions: a
//! zero-shot label classifier (semantic categories and the content-style
//! gate) and optional custom model endpoints reached over HTTP. Each returns
//! values in [0, 1] for a frame; everything else about the models is outside
//! this core.

use crate::error::AppError;
use crate::media::Frame;
use async_trait::async_trait;
use base64::Engine;
use std::time::Duration;

/// Semantic labels whose probabilities sum into the NSFW score
pub const NSFW_LABELS: &[&str] = &["explicit content", "nudity"];

/// Semantic labels whose probabilities sum into the violence score
pub const VIOLENCE_LABELS: &[&str] = &["violence", "weapons", "blood"];

/// Content-style gate labels: index 1 is the synthetic class
pub const STYLE_LABELS: &[&str] = &["real-world footage", "animated or rendered content"];

/// Zero-shot classifier over an open label set.
///
/// Returns one probability per label; implementations normalize so the
/// probabilities sum to 1 across the given labels.
#[async_trait]
pub trait ZeroShotClassifier: Send + Sync {
    async fn classify(&self, frame: &Frame, labels: &[&str]) -> Result<Vec<f64>, AppError>;
}

/// External custom model endpoint returning a single [0, 1] score
#[async_trait]
pub trait CustomScorer: Send + Sync {
    async fn score(&self, frame: &Frame) -> Result<f64, AppError>;
}

/// Stand-in classifier wired when no model runtime is deployed: uniform
/// probability mass across the labels, so nothing ever escalates on its
/// account alone.
pub struct FlatClassifier;

#[async_trait]
impl ZeroShotClassifier for FlatClassifier {
    async fn classify(&self, _frame: &Frame, labels: &[&str]) -> Result<Vec<f64>, AppError> {
        if labels.is_empty() {
            return Err(AppError::Scorer("empty label set".to_string()));
        }
        Ok(vec![1.0 / labels.len() as f64; labels.len()])
    }
}

/// Custom scorer backed by a hosted model endpoint
pub struct HttpCustomScorer {
    client: reqwest::Client,
    endpoint: String,
    endpoint_key: Option<String>,
}

impl HttpCustomScorer {
    pub fn new(
        endpoint: impl Into<String>,
        endpoint_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Scorer(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            endpoint_key,
        })
    }
}

#[async_trait]
impl CustomScorer for HttpCustomScorer {
    async fn score(&self, frame: &Frame) -> Result<f64, AppError> {
        let payload = serde_json::json!({
            "image": base64::engine::general_purpose::STANDARD.encode(&frame.data),
            "width": frame.width,
            "height": frame.height,
        });

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.endpoint_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Scorer(format!("scorer call failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Scorer(format!(
                "scorer returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::Scorer(format!("scorer returned malformed body: {}", e)))?;

        let score = body
            .get("score")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| AppError::Scorer("scorer response missing 'score'".to_string()))?;

        Ok(score.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_flat_classifier_is_uniform() {
        let classifier = FlatClassifier;
        let frame = Frame::solid(2, 2, [0, 0, 0]);
        let probs = classifier.classify(&frame, VIOLENCE_LABELS).await.unwrap();
        assert_eq!(probs.len(), 3);
        for p in &probs {
            assert!((p - 1.0 / 3.0).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_flat_classifier_rejects_empty_labels() {
        let classifier = FlatClassifier;
        let frame = Frame::solid(2, 2, [0, 0, 0]);
        assert!(classifier.classify(&frame, &[]).await.is_err());
    }
}
