//! Guardian Pipeline - Staged Content Moderation Service
//!
//! A staged moderation pipeline for user-submitted media:
//! - Screening: cheap CPU-only risk screening off the intake queue
//! - Deep analysis: model-backed ensemble scoring for escalated items
//! - Decision engine: deterministic, idempotent approve/reject/review
//! - Reconciliation: periodic sweep guaranteeing every item a decision
//!
//! All collaborators (record store, queues, object store, audit log,
//! scorers, notifier) sit behind trait seams; this binary wires the
//! in-memory reference implementations.

mod config;
mod error;
mod explain;
mod media;
mod models;
mod notify;
mod pipeline;
mod policy;
mod routes;
mod scorers;
mod state;
mod store;

use crate::config::Settings;
use crate::explain::DisabledExplanations;
use crate::media::RawFrameSource;
use crate::pipeline::{
    spawn_supervised, DecisionEngine, DeepAnalysisStage, ReconciliationWorker, ScreeningStage,
};
use crate::policy::DisabledInterpreter;
use crate::routes::create_router;
use crate::scorers::{CustomScorer, FlatClassifier, HttpCustomScorer};
use crate::state::AppState;
use crate::store::{
    MemoryAuditLog, MemoryObjectStore, MemoryQueue, MemoryRecordStore, WorkQueue,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("🚀 Starting Guardian Pipeline - Content Moderation Service...");

    // Load configuration
    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");

    // Collaborators behind their trait seams
    let records = Arc::new(MemoryRecordStore::new());
    let objects = Arc::new(MemoryObjectStore::new());
    let intake: Arc<dyn WorkQueue> = Arc::new(MemoryQueue::new());
    let escalation: Arc<dyn WorkQueue> = Arc::new(MemoryQueue::new());
    let audit = Arc::new(MemoryAuditLog::new());

    let notifier = Arc::new(notify::WebhookNotifier::new(settings.notify.timeout)?);
    let engine = Arc::new(DecisionEngine::new(
        records.clone(),
        audit.clone(),
        notifier,
        settings.decision.clone(),
        settings.notify.default_webhook.clone(),
    ));

    let frames = Arc::new(RawFrameSource::new(objects.clone()));
    let screening = Arc::new(ScreeningStage::new(
        records.clone(),
        intake.clone(),
        escalation.clone(),
        frames.clone(),
        audit.clone(),
        settings.screening.clone(),
        settings.queue.clone(),
    ));

    let nsfw_scorer = build_custom_scorer(&settings, settings.analysis.nsfw_endpoint.as_deref())?;
    let violence_scorer =
        build_custom_scorer(&settings, settings.analysis.violence_endpoint.as_deref())?;
    if nsfw_scorer.is_none() && violence_scorer.is_none() {
        info!("🔌 No custom scorer endpoints configured; zero-shot-only scoring");
    }

    let analysis = Arc::new(DeepAnalysisStage::new(
        records.clone(),
        escalation.clone(),
        frames,
        Arc::new(FlatClassifier),
        nsfw_scorer,
        violence_scorer,
        engine.clone(),
        Arc::new(DisabledExplanations),
        audit.clone(),
        settings.analysis.clone(),
        settings.queue.clone(),
    ));

    let reconciler = ReconciliationWorker::new(
        records.clone(),
        engine.clone(),
        audit.clone(),
        settings.reconcile.clone(),
    );

    // Spawn the background workers
    spawn_supervised(screening);
    spawn_supervised(analysis);
    tokio::spawn(async move { reconciler.run().await });
    info!("⚙️  Pipeline workers started (screening, deep-analysis, reconciliation)");

    let state = Arc::new(AppState {
        records,
        objects,
        intake,
        escalation,
        audit,
        engine,
        policy: Arc::new(DisabledInterpreter),
        settings: settings.clone(),
    });

    // Build the router
    let app = create_router(state);

    let addr = SocketAddr::from((settings.server.host, settings.server.port));
    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   ─── Moderation Items ───");
    info!("   POST /api/items              - Submit content for moderation");
    info!("   GET  /api/items              - List items (optional ?status=)");
    info!("   GET  /api/items/{{id}}         - Get one item record");
    info!("   POST /api/items/{{id}}/review  - Record a human review");
    info!("");
    info!("   ─── Decisions & Audit ───");
    info!("   POST /api/decisions          - Decide from submitted scores");
    info!("   GET  /api/audit              - Query audit events");
    info!("");
    info!("   ─── Policy ───");
    info!("   POST /api/policy/validate    - Validate structured rules");
    info!("   POST /api/policy/interpret   - Interpret natural-language policy");
    info!("");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,guardian_pipeline=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

fn build_custom_scorer(
    settings: &Settings,
    endpoint: Option<&str>,
) -> anyhow::Result<Option<Arc<dyn CustomScorer>>> {
    match endpoint {
        Some(url) => {
            let scorer = HttpCustomScorer::new(
                url,
                settings.analysis.endpoint_key.clone(),
                settings.analysis.scorer_timeout,
            )?;
            Ok(Some(Arc::new(scorer)))
        }
        None => Ok(None),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
