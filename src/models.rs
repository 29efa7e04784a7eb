//! Core data model for the moderation pipeline
//!
//! One mutable `ItemRecord` per submitted media object, advanced through the
//! status state machine by the pipeline stages. Field ownership is per-stage:
//! every stage writes its own fields with SET semantics (overwrites, never
//! appends), so re-running a stage on the same item is safe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Processing status of an item.
///
/// Transitions:
/// `uploaded -> {screened | escalation-queued} -> analyzed ->
/// {approved | rejected | review} -> [human override] -> approved | rejected`
///
/// `screened` is a dead end on the hot path; only the reconciliation sweep
/// drives such items onwards.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Uploaded,
    Screened,
    EscalationQueued,
    Analyzed,
    Approved,
    Rejected,
    Review,
}

impl ItemStatus {
    /// Whether the pipeline considers this status final for automated work.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Approved | ItemStatus::Rejected)
    }
}

/// Moderation decision for an item
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Pending,
    Approved,
    Rejected,
    Review,
}

impl Decision {
    /// Terminal decisions must not be superseded by automated re-scoring.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Decision::Approved | Decision::Rejected)
    }

    /// The item status that mirrors this decision
    pub fn as_status(&self) -> ItemStatus {
        match self {
            Decision::Pending => ItemStatus::Uploaded,
            Decision::Approved => ItemStatus::Approved,
            Decision::Rejected => ItemStatus::Rejected,
            Decision::Review => ItemStatus::Review,
        }
    }
}

/// One mutable record per submitted media object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub id: Uuid,
    pub filename: Option<String>,
    /// Key of the raw content in the object store
    pub content_key: String,
    pub size_bytes: u64,
    pub status: ItemStatus,

    pub risk_score: f64,
    pub nsfw_score: f64,
    pub violence_score: f64,
    pub final_score: f64,

    // Provenance
    pub screening_type: Option<String>,
    pub frames_analyzed: u32,
    pub model_version: Option<String>,

    pub decision: Decision,
    pub human_reviewed: bool,
    pub reviewer_notes: Option<String>,

    pub uploaded_at: DateTime<Utc>,
    pub screened_at: Option<DateTime<Utc>>,
    pub analyzed_at: Option<DateTime<Utc>>,
    pub decided_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,

    /// Webhook for decision notifications, when the submitter registered one
    pub callback_url: Option<String>,
}

impl ItemRecord {
    /// A freshly ingested record with zeroed scores and a pending decision
    pub fn new(id: Uuid, content_key: impl Into<String>) -> Self {
        Self {
            id,
            filename: None,
            content_key: content_key.into(),
            size_bytes: 0,
            status: ItemStatus::Uploaded,
            risk_score: 0.0,
            nsfw_score: 0.0,
            violence_score: 0.0,
            final_score: 0.0,
            screening_type: None,
            frames_analyzed: 0,
            model_version: None,
            decision: Decision::Pending,
            human_reviewed: false,
            reviewer_notes: None,
            uploaded_at: Utc::now(),
            screened_at: None,
            analyzed_at: None,
            decided_at: None,
            reviewed_at: None,
            callback_url: None,
        }
    }
}

/// Attribute-level update set for an item record.
///
/// Mirrors partial `update_item` semantics: only the populated fields are
/// written, everything else is left untouched. Concurrent writers touching
/// disjoint fields therefore never conflict.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPatch {
    pub status: Option<ItemStatus>,
    pub risk_score: Option<f64>,
    pub nsfw_score: Option<f64>,
    pub violence_score: Option<f64>,
    pub final_score: Option<f64>,
    pub screening_type: Option<String>,
    pub frames_analyzed: Option<u32>,
    pub model_version: Option<String>,
    pub decision: Option<Decision>,
    pub human_reviewed: Option<bool>,
    pub reviewer_notes: Option<String>,
    pub screened_at: Option<DateTime<Utc>>,
    pub analyzed_at: Option<DateTime<Utc>>,
    pub decided_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl ItemPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: ItemStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn risk_score(mut self, score: f64) -> Self {
        self.risk_score = Some(score);
        self
    }

    pub fn nsfw_score(mut self, score: f64) -> Self {
        self.nsfw_score = Some(score);
        self
    }

    pub fn violence_score(mut self, score: f64) -> Self {
        self.violence_score = Some(score);
        self
    }

    pub fn final_score(mut self, score: f64) -> Self {
        self.final_score = Some(score);
        self
    }

    pub fn screening_type(mut self, kind: impl Into<String>) -> Self {
        self.screening_type = Some(kind.into());
        self
    }

    pub fn frames_analyzed(mut self, count: u32) -> Self {
        self.frames_analyzed = Some(count);
        self
    }

    pub fn model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = Some(version.into());
        self
    }

    pub fn decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        self
    }

    pub fn human_reviewed(mut self, reviewed: bool) -> Self {
        self.human_reviewed = Some(reviewed);
        self
    }

    pub fn reviewer_notes(mut self, notes: impl Into<String>) -> Self {
        self.reviewer_notes = Some(notes.into());
        self
    }

    pub fn screened_at(mut self, at: DateTime<Utc>) -> Self {
        self.screened_at = Some(at);
        self
    }

    pub fn analyzed_at(mut self, at: DateTime<Utc>) -> Self {
        self.analyzed_at = Some(at);
        self
    }

    pub fn decided_at(mut self, at: DateTime<Utc>) -> Self {
        self.decided_at = Some(at);
        self
    }

    pub fn reviewed_at(mut self, at: DateTime<Utc>) -> Self {
        self.reviewed_at = Some(at);
        self
    }

    /// Apply the populated fields onto a record (SET semantics)
    pub fn apply(&self, record: &mut ItemRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(score) = self.risk_score {
            record.risk_score = score;
        }
        if let Some(score) = self.nsfw_score {
            record.nsfw_score = score;
        }
        if let Some(score) = self.violence_score {
            record.violence_score = score;
        }
        if let Some(score) = self.final_score {
            record.final_score = score;
        }
        if let Some(kind) = &self.screening_type {
            record.screening_type = Some(kind.clone());
        }
        if let Some(count) = self.frames_analyzed {
            record.frames_analyzed = count;
        }
        if let Some(version) = &self.model_version {
            record.model_version = Some(version.clone());
        }
        if let Some(decision) = self.decision {
            record.decision = decision;
        }
        if let Some(reviewed) = self.human_reviewed {
            record.human_reviewed = reviewed;
        }
        if let Some(notes) = &self.reviewer_notes {
            record.reviewer_notes = Some(notes.clone());
        }
        if let Some(at) = self.screened_at {
            record.screened_at = Some(at);
        }
        if let Some(at) = self.analyzed_at {
            record.analyzed_at = Some(at);
        }
        if let Some(at) = self.decided_at {
            record.decided_at = Some(at);
        }
        if let Some(at) = self.reviewed_at {
            record.reviewed_at = Some(at);
        }
    }
}

/// Priority tag carried on escalation messages
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Normal,
}

/// Message published by ingestion onto the intake queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeMessage {
    pub item_id: Uuid,
    pub content_key: String,
}

/// Message published by screening onto the escalation queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationMessage {
    pub item_id: Uuid,
    pub content_key: String,
    pub risk_score: f64,
    pub priority: Priority,
}

/// Generic success response
#[derive(Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub data: Option<T>,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_patch_applies_only_populated_fields() {
        let mut record = ItemRecord::new(Uuid::new_v4(), "media/a.mp4");
        record.nsfw_score = 0.4;

        let patch = ItemPatch::new()
            .status(ItemStatus::Screened)
            .risk_score(0.3)
            .screening_type("cpu");
        patch.apply(&mut record);

        assert_eq!(record.status, ItemStatus::Screened);
        assert_eq!(record.risk_score, 0.3);
        assert_eq!(record.screening_type.as_deref(), Some("cpu"));
        // Untouched fields survive
        assert_eq!(record.nsfw_score, 0.4);
        assert_eq!(record.decision, Decision::Pending);
    }

    #[test]
    fn test_patch_reapplication_is_idempotent() {
        let mut record = ItemRecord::new(Uuid::new_v4(), "media/b.mp4");
        let patch = ItemPatch::new()
            .status(ItemStatus::Analyzed)
            .nsfw_score(0.7)
            .violence_score(0.2);

        patch.apply(&mut record);
        let first = record.clone();
        patch.apply(&mut record);

        assert_eq!(record.status, first.status);
        assert_eq!(record.nsfw_score, first.nsfw_score);
        assert_eq!(record.violence_score, first.violence_score);
    }

    #[test]
    fn test_terminal_decisions() {
        assert!(Decision::Approved.is_terminal());
        assert!(Decision::Rejected.is_terminal());
        assert!(!Decision::Review.is_terminal());
        assert!(!Decision::Pending.is_terminal());
    }
}
