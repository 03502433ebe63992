use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use moodcam_hw::{Camera, CaptureSurface};
use moodcam_models::ModelStore;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod engine;
mod session;
mod view;

use config::Config;

#[derive(Parser)]
#[command(
    name = "moodcam",
    version,
    about = "Capture a webcam frame and show the dominant facial expression"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the interactive capture session (default)
    Run,
    /// Classify a still image file instead of a camera frame
    Classify {
        /// Image to classify (any format the `image` crate decodes)
        path: PathBuf,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Download the model artifacts into the model directory
    Fetch,
    /// List V4L2 capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the view; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    tracing::debug!(?config, "configuration loaded");

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => session::run(config).await?,
        Commands::Classify { path, json } => classify(&config, path, json).await?,
        Commands::Fetch => {
            let store = ModelStore::new(
                &config.model_dir,
                config.model_base_url.as_str(),
                config.download_timeout(),
            )?;
            let paths = store.fetch_all().await?;
            println!("face detector:         {}", paths.face_detector.display());
            println!("expression classifier: {}", paths.expression_classifier.display());
        }
        Commands::Devices => {
            println!("{}", serde_json::to_string_pretty(&Camera::list_devices())?);
        }
    }

    Ok(())
}

async fn classify(config: &Config, path: PathBuf, json: bool) -> Result<()> {
    let mut analyzer = session::load_analyzer(config).await?;
    let image = image::open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .into_rgb8();

    let result = tokio::task::spawn_blocking(move || {
        let mut surface = CaptureSurface::new();
        let snapshot = surface.draw(&image);
        analyzer.analyze(snapshot)
    })
    .await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for line in view::result_lines(&result) {
            println!("{line}");
        }
    }

    Ok(())
}
