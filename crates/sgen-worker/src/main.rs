//! Shorts generation worker binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sgen_queue::{JobQueue, QueueConfig};
use sgen_store::JobStore;
use sgen_worker::{JobExecutor, JobService, ProcessingContext, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("sgen=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    info!("Starting sgen-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Err(e) = sgen_media::check_ffmpeg() {
        warn!("FFmpeg is not available, jobs will fail: {}", e);
    }

    tokio::fs::create_dir_all(config.jobs_dir())
        .await
        .with_context(|| format!("creating {}", config.jobs_dir().display()))?;

    let store = Arc::new(
        JobStore::open_in(&config.storage_path)
            .await
            .context("opening job store")?,
    );
    let queue = Arc::new(JobQueue::new(QueueConfig {
        capacity: config.queue_capacity,
    }));

    let ctx = Arc::new(
        ProcessingContext::from_config(config, Arc::clone(&store), Arc::clone(&queue))
            .context("building processing context")?,
    );
    if !ctx.segmenter.has_ai() {
        info!("GEMINI_API_KEY not set, subtitles use rule-based segmentation");
    }

    let service = JobService::for_context(&ctx);
    let executor = Arc::new(JobExecutor::new(ctx));

    let runner = {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move { executor.run().await })
    };

    // Runs after the executor starts so a full queue cannot block startup
    match service.requeue_pending().await {
        Ok(n) => info!("Recovered {} pending jobs", n),
        Err(e) => error!("Failed to recover pending jobs: {}", e),
    }

    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal");
    executor.shutdown();

    runner.await.context("executor task")??;
    info!("Worker shutdown complete");
    Ok(())
}
