use anyhow::{Context, Result};
use bonkscan_core::JsonCatalog;
use bonkscan_cv::DetectionConfig;
use bonkscan_cv::detection::DetectionPipeline;
use bonkscan_cv::utils::ImageUtils;
use clap::Parser;
use std::path::PathBuf;

mod report;

/// Identify catalog icons in a gameplay screenshot
#[derive(Debug, Parser)]
#[command(name = "bonkscan", version)]
struct Args {
    /// Screenshot to analyse
    screenshot: PathBuf,

    /// Catalog JSON listing entities and their icon paths
    #[arg(long)]
    catalog: PathBuf,

    /// Directory icon paths are resolved against (overrides the config)
    #[arg(long)]
    templates: Option<PathBuf>,

    /// Detection config JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write a debug overlay PNG here
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Split scans across this many worker threads
    #[arg(long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DetectionConfig::load(path)?,
        None => DetectionConfig::default(),
    };
    if let Some(root) = args.templates {
        config.template_root = root;
    }
    if args.workers.is_some() {
        config.workers = args.workers;
    }

    let catalog = JsonCatalog::load(&args.catalog)?;
    let screenshot = std::fs::read(&args.screenshot)
        .with_context(|| format!("Failed to read screenshot: {:?}", args.screenshot))?;

    let pipeline = DetectionPipeline::new(config, &catalog);
    let detections = pipeline.detect(&screenshot).await?;
    tracing::info!(
        screenshot = %args.screenshot.display(),
        detections = detections.len(),
        "detection finished"
    );

    println!("{}", serde_json::to_string_pretty(&detections)?);
    report::print_summary(&detections);

    if let Some(path) = &args.overlay {
        let image = ImageUtils::decode(&screenshot)?;
        let regions = pipeline.regions(image.width(), image.height());
        let overlay = bonkscan_cv::overlay::render_overlay(&image, &regions, &detections);
        overlay
            .save(path)
            .with_context(|| format!("Failed to save overlay: {:?}", path))?;
        eprintln!("Overlay saved: {:?}", path);
    }

    Ok(())
}
