use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facelens_core::models::model_inventory;
use facelens_hw::{Camera, Frame};
use facelensd::config::Config;
use facelensd::engine::{spawn_engine, EngineHandle};
use facelensd::loader::{load_models, OnnxModelLoader};
use facelensd::reference::{build_reference_set, FsImageSource, ReferenceReport};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "facelens", about = "facelens face recognition CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List V4L2 capture devices
    Devices,
    /// Show which model files are present
    Models,
    /// Build the labeled reference set and print a JSON report
    References,
    /// Identify every face in a still image
    Identify {
        /// Image file to analyze
        image: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;

    match cli.command {
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No capture devices found");
            }
            for device in devices {
                println!("{}  {} ({}, {})", device.path, device.name, device.driver, device.bus);
            }
        }
        Commands::Models => {
            println!("Model directory: {}", config.model_dir.display());
            let mut missing = 0;
            for (kind, path, present) in model_inventory(&config.model_dir) {
                let status = if present { "ok" } else { "missing" };
                missing += usize::from(!present);
                println!("  {:<20} {status:<8} {}", kind.to_string(), path.display());
            }
            if missing > 0 {
                bail!("{missing} model file(s) missing");
            }
        }
        Commands::References => {
            let engine = start_engine(&config).await?;
            let report = enroll(&config, engine).await?;
            let out = json!({
                "labels": report.summary(),
                "warnings": report.warnings,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Identify { image } => {
            let frame = Frame::load(&image)
                .with_context(|| format!("failed to read {}", image.display()))?;
            let engine = start_engine(&config).await?;
            let matcher = enroll(&config, engine.clone())
                .await?
                .into_matcher(config.distance_threshold)?;

            let faces = engine.detect_all(Arc::new(frame), config.live_detector).await?;
            let matches: Vec<_> = faces
                .iter()
                .map(|face| {
                    let best = matcher.find_best_match(&face.descriptor);
                    json!({
                        "box": face.detection,
                        "label": best.label,
                        "distance": best.distance,
                        "display": best.to_string(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&matches)?);
        }
    }

    Ok(())
}

async fn start_engine(config: &Config) -> Result<EngineHandle> {
    let loader = Arc::new(OnnxModelLoader::new(config.model_dir.clone()));
    let api = load_models(loader).await?;
    tracing::info!(models = %config.model_dir.display(), "models loaded");
    Ok(spawn_engine(api)?)
}

async fn enroll(config: &Config, engine: EngineHandle) -> Result<ReferenceReport> {
    let images = Arc::new(FsImageSource::new(config.images_root.clone()));
    let report =
        build_reference_set(&config.identities, images, engine, config.reference_detector).await?;
    tracing::info!(
        labels = report.sets.len(),
        warnings = report.warnings.len(),
        "reference set built"
    );
    Ok(report)
}
