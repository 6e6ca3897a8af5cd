use anyhow::{Context, Result};
use facelensd::capture::V4l2Capture;
use facelensd::config::Config;
use facelensd::loader::OnnxModelLoader;
use facelensd::overlay::ImageOverlay;
use facelensd::reference::FsImageSource;
use facelensd::session::Session;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facelensd starting");

    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!(
        camera = %config.camera_device,
        models = %config.model_dir.display(),
        images = %config.images_root.display(),
        identities = config.identities.len(),
        threshold = config.distance_threshold,
        "configuration loaded"
    );

    let session = Session::start(
        &config,
        Arc::new(OnnxModelLoader::new(config.model_dir.clone())),
        V4l2Capture::new(config.camera_device.clone()),
        Arc::new(FsImageSource::new(config.images_root.clone())),
    )
    .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let overlay = ImageOverlay::new(config.overlay_path.clone());
    let live = session.run(overlay, shutdown_rx);
    tokio::pin!(live);

    tracing::info!("facelensd ready");

    let stats = tokio::select! {
        stats = &mut live => stats?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("facelensd shutting down");
            // Let the in-flight pass finish.
            let _ = shutdown_tx.send(true);
            live.await?
        }
    };

    tracing::info!(
        ticks = stats.ticks,
        failed = stats.failed_ticks,
        skipped = stats.skipped_ticks,
        faces = stats.faces,
        "facelensd stopped"
    );
    Ok(())
}
