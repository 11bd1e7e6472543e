//! detect_image - single-shot proximity detection on one image file.
//!
//! Prints the same JSON body as `POST /detect`.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;

use proximity_guard::{DetectionsResponse, Frame, Pipeline, PipelineConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image to analyse.
    image: PathBuf,
    /// Config file (.toml or JSON). Overrides GUARD_CONFIG.
    #[arg(long, env = "GUARD_CONFIG")]
    config: Option<PathBuf>,
    /// Write the annotated frame as JPEG here.
    #[arg(long)]
    annotated: Option<PathBuf>,
    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let config = PipelineConfig::load_from(args.config.as_deref())
        .context("failed to load pipeline configuration")?;
    let pipeline = Pipeline::from_config(config);
    if !pipeline.has_detector() {
        return Err(anyhow!("object detector is not available"));
    }

    let bytes = fs::read(&args.image)
        .with_context(|| format!("failed to read {}", args.image.display()))?;
    let frame = Frame::decode(&bytes)?;
    let analysis = pipeline.analyze(&frame)?;

    let response = DetectionsResponse::success(&analysis);
    let json = if args.pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{json}");

    if let Some(path) = &args.annotated {
        let jpeg = pipeline.render(&frame, &analysis, None)?;
        fs::write(path, jpeg).with_context(|| format!("failed to write {}", path.display()))?;
        log::info!("annotated frame written to {}", path.display());
    }
    if analysis.warning() {
        log::warn!("near-object warning raised");
    }
    Ok(())
}
