//! Append-only audit trail
//!
//! Every stage appends one immutable event per transition. Nothing in the
//! core reads the trail to make decisions; it exists for observability and
//! dispute resolution. Duplicate events under queue redelivery are accepted.

use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Events are kept for 90 days before the external retention policy reaps them
const RETENTION_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Upload,
    Screen,
    Escalate,
    Analyze,
    Decide,
    ReviewQueued,
    ReviewCompleted,
    Reconcile,
    Notify,
}

/// One immutable record per stage transition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub item_id: Uuid,
    pub event_type: AuditEventType,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub retention_horizon: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(item_id: Uuid, event_type: AuditEventType, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            event_id: Uuid::new_v4(),
            item_id,
            event_type,
            payload,
            timestamp: now,
            retention_horizon: now + ChronoDuration::days(RETENTION_DAYS),
        }
    }
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append an event. Failures are the caller's to log; audit writes are
    /// never allowed to fail an item's progress.
    async fn append(&self, event: AuditEvent) -> Result<(), AppError>;

    /// Query events, newest first, optionally filtered by item
    async fn query(&self, item_id: Option<Uuid>, limit: usize) -> Result<Vec<AuditEvent>, AppError>;
}

/// In-memory append-only audit log
pub struct MemoryAuditLog {
    events: RwLock<Vec<AuditEvent>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, event: AuditEvent) -> Result<(), AppError> {
        let mut events = self.events.write().await;
        events.push(event);
        Ok(())
    }

    async fn query(&self, item_id: Option<Uuid>, limit: usize) -> Result<Vec<AuditEvent>, AppError> {
        let events = self.events.read().await;
        let mut matched: Vec<AuditEvent> = events
            .iter()
            .filter(|e| item_id.map(|id| e.item_id == id).unwrap_or(true))
            .cloned()
            .collect();
        // Ordering is a query-time sort; the log itself is append-order.
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matched.truncate(limit);
        Ok(matched)
    }
}
