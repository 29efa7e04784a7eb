//! Pipeline orchestration
//!
//! The moderation pipeline in stage order:
//! - `screening`: cheap risk screening off the intake queue
//! - `analysis`: deep ensemble scoring off the escalation queue
//! - `decision`: deterministic policy decision engine
//! - `reconcile`: periodic sweep forcing stuck items to a terminal decision
//! - `worker`: supervised consumer-loop plumbing shared by the stages

pub mod analysis;
pub mod decision;
pub mod reconcile;
pub mod screening;
pub mod worker;

pub use analysis::DeepAnalysisStage;
pub use decision::{DecisionEngine, DecisionRequest, DecisionResponse};
pub use reconcile::ReconciliationWorker;
pub use screening::ScreeningStage;
pub use worker::spawn_supervised;
