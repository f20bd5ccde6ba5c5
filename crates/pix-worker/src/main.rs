//! Job worker binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pix_queue::JobQueue;
use pix_worker::{JobExecutor, PublicationScheduler, WorkerConfig, WorkerContext};

fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("pix=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing()?;

    info!("Starting pix-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing Prometheus exporter")?;
        info!("Serving metrics on {}", addr);
    }

    if let Err(e) = pix_media::check_ffmpeg() {
        warn!("FFmpeg unavailable, transcode and video jobs will fail: {}", e);
    }

    let ctx = WorkerContext::from_env(config.clone())
        .await
        .context("connecting worker dependencies")?;
    ctx.db.migrate().await.context("running migrations")?;

    let queue = JobQueue::from_env().context("creating job queue")?;
    let executor = Arc::new(JobExecutor::new(ctx, queue));

    let scheduler = PublicationScheduler::new(
        executor.context().db.publications(),
        config.scheduler_interval,
    );
    let scheduler_handle = tokio::spawn(scheduler.run(executor.shutdown_signal()));

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            signal_executor.shutdown();
        }
    });

    executor.run().await.context("executor failed")?;
    scheduler_handle.await.ok();

    info!("Worker shutdown complete");
    Ok(())
}
