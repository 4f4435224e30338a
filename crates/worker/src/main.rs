use std::sync::Arc;

use anyhow::Context;
use mediaq_pipeline::blob::S3BlobStore;
use mediaq_pipeline::detector::SidecarDetector;
use mediaq_pipeline::queue::PgJobQueue;
use mediaq_pipeline::stager::ResourceStager;
use mediaq_pipeline::store::PgRecordStore;
use mediaq_pipeline::tools::{FfmpegTranscoder, FfprobeProber};
use mediaq_pipeline::{Collaborators, JobDispatcher};
use mediaq_worker::config::WorkerConfig;
use mediaq_worker::pool::WorkerPool;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mediaq_worker=debug,mediaq_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    tracing::info!(
        worker = %config.worker_name,
        concurrency = config.concurrency,
        bucket = %config.engine.bucket,
        temp_dir = %config.engine.temp_dir.display(),
        "Loaded worker configuration",
    );

    // --- Database ---
    let pool = mediaq_db::create_pool(&config.database_url, config.db_max_connections)
        .await
        .context("Failed to connect to database")?;
    mediaq_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tracing::info!("Database health check passed");

    if config.run_migrations {
        mediaq_db::run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;
    }

    // --- Collaborators ---
    let blobs = Arc::new(S3BlobStore::connect(&config.s3).await);
    let deps = Collaborators {
        store: Arc::new(PgRecordStore::new(pool.clone())),
        prober: Arc::new(FfprobeProber::new(&config.tools.ffprobe_path)),
        transcoder: Arc::new(FfmpegTranscoder::new(&config.tools.ffmpeg_path)),
        detector: Arc::new(SidecarDetector::new(&config.tools.detector_path)),
    };
    let stager = ResourceStager::new(blobs, config.engine.bucket.clone(), config.engine.temp_dir.clone());
    let dispatcher = Arc::new(JobDispatcher::new(deps, stager));

    // --- Worker pool ---
    let queue = Arc::new(PgJobQueue::new(pool.clone()));
    let worker_pool = WorkerPool::new(queue, dispatcher, config.pool_config());

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    worker_pool.run(shutdown).await;

    pool.close().await;
    tracing::info!("Worker shut down");
    Ok(())
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), finishing in-flight jobs");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, finishing in-flight jobs");
        }
    }
}
