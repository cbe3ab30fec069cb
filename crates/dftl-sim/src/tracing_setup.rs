//! Tracing-subscriber init for the simulation driver. No WebSocket event
//! layer: this driver has no event-stream surface.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,dftl_sim=debug")))
        .init();
}
