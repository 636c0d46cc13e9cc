//! TraceVault service binary - composition root.
//!
//! Ties the crates together into one process:
//! 1. Load configuration from TOML (CLI overrides applied)
//! 2. Open the SQLite Evidence Store
//! 3. Initialize long-lived collaborator handles (metadata, frames,
//!    vision, candidate registry) once at startup
//! 4. Start the job queue, pipeline workers, and stalled-job watchdog
//! 5. Serve the ingress API
//!
//! The face-detection and scene-classification backends here are the mock
//! handles; deployments with real model services swap them behind the same
//! traits at this one wiring point.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use tracevault_api::{create_router, AppState};
use tracevault_core::config::TraceVaultConfig;
use tracevault_extract::{ExifToolExtractor, FfmpegFrameExtractor};
use tracevault_match::StaticCandidateSource;
use tracevault_pipeline::{FrameProcessor, InMemoryJobQueue, Orchestrator, Watchdog, Worker};
use tracevault_storage::Database;
use tracevault_vision::{MockFaceDetector, MockSceneClassifier};

mod cli;
use cli::{expand_home, CliArgs};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = TraceVaultConfig::load_or_default(&config_file);
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    if let Some(workers) = args.workers {
        config.queue.workers = workers;
    }

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting TraceVault v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Storage.
    let data_dir = expand_home(&config.general.data_dir);
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("tracevault.db");
    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "Evidence store opened");

    // Long-lived collaborator handles, initialized once per process.
    let metadata_extractor = Arc::new(ExifToolExtractor::new(&config.extract));
    let frame_extractor = Arc::new(FfmpegFrameExtractor::new(&config.extract));
    let face_detector = Arc::new(MockFaceDetector::empty());
    let scene_classifier = Arc::new(MockSceneClassifier::empty());
    let candidate_source = Arc::new(StaticCandidateSource::demo_registry(
        config.pipeline.embedding_dim,
    ));
    tracing::info!(
        embedding_dim = config.pipeline.embedding_dim,
        threshold = config.pipeline.match_threshold,
        "Analysis services initialized"
    );

    let processor = FrameProcessor::new(
        Arc::clone(&db),
        face_detector,
        scene_classifier,
        candidate_source,
        &config.pipeline,
    );

    let frame_base_dir = expand_home(&config.extract.frame_dir);
    std::fs::create_dir_all(&frame_base_dir)?;
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&db),
        metadata_extractor,
        frame_extractor,
        processor,
        frame_base_dir,
    ));

    // Job queue + workers. Each worker processes one job at a time;
    // parallelism across Evidence comes only from the worker count.
    let (queue, job_receiver) = InMemoryJobQueue::new();
    let worker_count = config.queue.workers.max(1);
    for index in 0..worker_count {
        let worker = Worker::new(
            Arc::clone(&orchestrator),
            Arc::clone(&queue),
            Arc::clone(&job_receiver),
        );
        tokio::spawn(async move {
            worker.run().await;
        });
        tracing::debug!(worker = index, "Pipeline worker started");
    }
    tracing::info!(workers = worker_count, "Pipeline workers running");

    // Stalled-job watchdog.
    let watchdog = Watchdog::new(
        Arc::clone(&db),
        Duration::from_secs(config.queue.watchdog_grace_secs),
        Duration::from_secs(config.queue.watchdog_interval_secs),
    );
    tokio::spawn(async move {
        watchdog.run().await;
    });

    // API server.
    let port = args.resolve_port(config.api.port);
    let upload_dir = expand_home(&config.api.upload_dir);
    std::fs::create_dir_all(&upload_dir)?;

    let state = AppState::new(config, Arc::clone(&db), queue, upload_dir);
    let router = create_router(state);

    let addr = format!("127.0.0.1:{}", port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind — is another instance running?");
            return Err(e.into());
        }
    };

    tracing::info!(addr = %addr, "API server listening");
    axum::serve(listener, router).await?;

    Ok(())
}
