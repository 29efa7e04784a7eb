//! Stage worker supervision
//!
//! Stage loops run as long-lived tokio tasks. A failing tick is logged and
//! retried with exponential backoff plus a small random jitter so that
//! several workers hitting the same broken dependency do not hammer it in
//! lockstep.

use crate::error::AppError;
use crate::pipeline::{DeepAnalysisStage, ScreeningStage};
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_MAX: Duration = Duration::from_secs(30);
const JITTER_MAX_MS: u64 = 250;

/// One queue-consuming stage loop
#[async_trait]
pub trait StageWorker: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// One poll iteration; long-polls the queue internally
    async fn tick(&self) -> Result<(), AppError>;
}

#[async_trait]
impl StageWorker for ScreeningStage {
    fn name(&self) -> &'static str {
        "screening"
    }

    async fn tick(&self) -> Result<(), AppError> {
        self.poll_once().await
    }
}

#[async_trait]
impl StageWorker for DeepAnalysisStage {
    fn name(&self) -> &'static str {
        "deep-analysis"
    }

    async fn tick(&self) -> Result<(), AppError> {
        self.poll_once().await
    }
}

/// Run a stage worker forever, restarting its loop after failures
pub fn spawn_supervised(worker: Arc<dyn StageWorker>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("🚀 {} worker started", worker.name());
        let mut backoff = BACKOFF_BASE;
        loop {
            match worker.tick().await {
                Ok(()) => {
                    backoff = BACKOFF_BASE;
                }
                Err(e) => {
                    let jitter =
                        Duration::from_millis(rand::thread_rng().gen_range(0..=JITTER_MAX_MS));
                    warn!(
                        "{} worker tick failed ({}), retrying in {:?}",
                        worker.name(),
                        e,
                        backoff + jitter
                    );
                    tokio::time::sleep(backoff + jitter).await;
                    backoff = (backoff * 2).min(BACKOFF_MAX);
                }
            }
        }
    })
}
