//! DFTL simulation driver (dftl-simd).
//!
//! Loads a device geometry, formats a [`DftlEngine`] over an in-memory mock
//! flash backend, and exposes a REST control surface for submitting host
//! events and driving trace replay. Default bind: 127.0.0.1:8870.

mod api;
mod config_loader;
mod mock_backend;
mod replay;
mod tracing_setup;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use dftl_core::DftlEngine;
use tokio::sync::Mutex;
use tracing::info;

use mock_backend::{LatencyModel, MockFlashBackend};
use replay::ReplayManager;

#[derive(Parser, Debug)]
#[command(name = "dftl-simd", version, about = "Demand-based FTL simulation driver")]
struct Cli {
    /// Path to a TOML config file describing device geometry. Falls back to
    /// `DftlConfig::default()` when omitted.
    #[arg(long)]
    config: Option<String>,

    /// Total addressable LPNs exposed to the host.
    #[arg(long, default_value_t = 1 << 16)]
    total_lpns: u64,

    /// Address to bind the control surface to.
    #[arg(long, default_value = "127.0.0.1:8870")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_setup::init();

    info!("Starting DFTL simulation driver (dftl-simd)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => config_loader::load(path).await?,
        None => dftl_core::DftlConfig::default(),
    };

    let geo = dftl_core::Geometry::from_config(&cfg, cli.total_lpns);
    let backend = Box::new(MockFlashBackend::new(geo, LatencyModel::default()));
    let engine = DftlEngine::format(cfg, cli.total_lpns, backend)?;
    let engine = Arc::new(Mutex::new(engine));

    let replay_manager = Arc::new(ReplayManager::new());

    let app = api::create_router(engine, replay_manager);

    let listener = tokio::net::TcpListener::bind(&cli.bind).await?;
    info!("dftl-simd listening on http://{}", cli.bind);

    axum::serve(listener, app).await?;

    Ok(())
}
