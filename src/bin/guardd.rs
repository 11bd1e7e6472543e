//! guardd - proximity guard daemon
//!
//! This daemon:
//! 1. Resolves the pipeline configuration (file + environment)
//! 2. Loads the detector and depth models once
//! 3. Serves `/health`, `/stream` and `/detect` until Ctrl-C

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;

use proximity_guard::{api::ApiServer, Pipeline, PipelineConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (.toml or JSON). Overrides GUARD_CONFIG.
    #[arg(long, env = "GUARD_CONFIG")]
    config: Option<PathBuf>,
    /// Listen address. Overrides the configured api address.
    #[arg(long)]
    addr: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = PipelineConfig::load_from(args.config.as_deref())
        .context("failed to load pipeline configuration")?;
    let addr = args.addr.unwrap_or_else(|| config.api_addr.clone());
    log::info!(
        "guardd {} source={} threshold={:.2} blur={}",
        env!("CARGO_PKG_VERSION"),
        config.source.describe(),
        config.confidence_threshold,
        config.blur_kernel
    );

    let pipeline = Pipeline::from_config(config);
    if let Err(err) = pipeline.ensure_stream_ready() {
        log::warn!("streaming unavailable until models load: {}", err);
    }

    let api_handle = ApiServer::new(addr, pipeline).spawn()?;
    log::info!("stream at http://{}/stream", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("guardd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;

    Ok(())
}
