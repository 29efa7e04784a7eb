//! Application state management
//!
//! Contains shared state accessible across all handlers and workers.

use crate::config::Settings;
use crate::pipeline::DecisionEngine;
use crate::policy::PolicyInterpreter;
use crate::store::{AuditLog, ObjectStore, RecordStore, WorkQueue};
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Item record store
    pub records: Arc<dyn RecordStore>,

    /// Raw content store
    pub objects: Arc<dyn ObjectStore>,

    /// Intake queue feeding the screening stage
    pub intake: Arc<dyn WorkQueue>,

    /// Escalation queue feeding the deep-analysis stage
    pub escalation: Arc<dyn WorkQueue>,

    /// Append-only audit log
    pub audit: Arc<dyn AuditLog>,

    /// Decision engine shared by handlers and workers
    pub engine: Arc<DecisionEngine>,

    /// Policy-interpretation strategy
    pub policy: Arc<dyn PolicyInterpreter>,

    /// Loaded settings
    pub settings: Settings,
}

/// Shared application state type
pub type SharedState = Arc<AppState>;
