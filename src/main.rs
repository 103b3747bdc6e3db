//! Live object detection streamed as MJPEG over HTTP

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rpi_detect_streamer::cli::StreamArgs;
use rpi_detect_streamer::worker::{WorkerConfig, WorkerExit};
use rpi_detect_streamer::{
    camera, detection, telemetry, DetectionWorker, FrameStore, StreamServer, StreamServerConfig,
};
use tokio::sync::Notify;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = StreamArgs::parse();
    telemetry::init(args.verbose);

    info!("Detection streamer starting");

    let config = args
        .resolve_config()
        .with_context(|| format!("failed to load config {:?}", args.config))?;

    info!(
        source = ?config.camera.source,
        resolution = %format!("{}x{}", config.camera.width, config.camera.height),
        backend = ?config.detector.backend,
        model = %config.detector.model.display(),
        bind = %config.bind_address(),
        "Configuration loaded"
    );

    let detector =
        detection::load(&config.detector.options()).context("failed to load detector")?;
    let camera = camera::open(&config.camera).context("failed to open camera")?;

    let store = Arc::new(FrameStore::new());
    let running = Arc::new(AtomicBool::new(true));

    let handle = DetectionWorker::new(
        camera,
        detector,
        Arc::clone(&store),
        WorkerConfig::from(&config),
    )
    .spawn(Arc::clone(&running))
    .context("failed to spawn detection worker")?;

    let server = StreamServer::bind(&StreamServerConfig::from(&config.server), Arc::clone(&store))
        .await
        .context("failed to start HTTP server")?;

    let shutdown = Arc::new(Notify::new());
    let server_shutdown = Arc::clone(&shutdown);
    let mut server_task =
        tokio::spawn(server.serve(async move { server_shutdown.notified().await }));
    let mut worker_task = tokio::task::spawn_blocking(move || handle.join());

    let mut worker_done = None;
    let mut server_done = None;

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for Ctrl+C")?;
            info!("Shutdown requested");
        }
        joined = &mut worker_task => {
            let exit = joined.context("detection worker task failed")?;
            if matches!(exit, Ok(WorkerExit::Exhausted)) {
                info!("Camera exhausted, serving last frame until Ctrl+C");
                tokio::signal::ctrl_c()
                    .await
                    .context("failed to listen for Ctrl+C")?;
            }
            worker_done = Some(exit);
        }
        served = &mut server_task => {
            server_done = Some(served.context("HTTP server task failed")?);
        }
    }

    // Stop the producer, end every client stream, then let axum drain
    running.store(false, Ordering::Relaxed);
    store.close();
    shutdown.notify_one();

    let worker_result = match worker_done {
        Some(result) => result,
        None => worker_task.await.context("detection worker task failed")?,
    };
    let server_result = match server_done {
        Some(result) => result,
        None => server_task.await.context("HTTP server task failed")?,
    };

    if let Err(e) = &server_result {
        error!(error = %e, "HTTP server failed");
    }

    let exit = worker_result.context("detection worker failed")?;
    server_result.context("HTTP server failed")?;

    info!(exit = ?exit, frames = store.published_count(), "Shutdown complete");
    Ok(())
}
