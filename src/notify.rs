//! Notification collaborator
//!
//! Delivers decision webhooks. Strictly best-effort: a failed delivery is
//! logged and audited, never propagated to the stage that triggered it.

use crate::error::AppError;
use crate::models::Decision;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    pub item_id: Uuid,
    pub decision: Decision,
    pub callback_url: String,
}

/// Delivery outcome: either the downstream status code or the failure text
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NotifyResult {
    pub fn sent(code: u16) -> Self {
        Self {
            status: "sent".to_string(),
            code: Some(code),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: "failed".to_string(),
            code: None,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Attempt delivery. The error path is reserved for local faults; a
    /// downstream refusal is reported inside the `NotifyResult`.
    async fn notify(&self, request: NotifyRequest) -> Result<NotifyResult, AppError>;
}

/// Webhook notifier posting `{itemId, decision}` to the callback URL
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Notification(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, request: NotifyRequest) -> Result<NotifyResult, AppError> {
        let body = serde_json::json!({
            "itemId": request.item_id,
            "decision": request.decision,
        });

        match self
            .client
            .post(&request.callback_url)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => Ok(NotifyResult::sent(response.status().as_u16())),
            Err(e) => {
                warn!(
                    "Webhook delivery failed for item {} (non-critical): {}",
                    request.item_id, e
                );
                Ok(NotifyResult::failed(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_webhook_reports_failed_not_err() {
        let notifier = WebhookNotifier::new(Duration::from_millis(200)).unwrap();
        let result = notifier
            .notify(NotifyRequest {
                item_id: Uuid::new_v4(),
                decision: Decision::Approved,
                callback_url: "http://127.0.0.1:1/notify".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(result.status, "failed");
        assert!(result.error.is_some());
    }
}
