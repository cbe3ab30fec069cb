//! Deterministic host-event trace replay, with cancellation and progress,
//! driving DFTL host events read from a newline-delimited JSON file instead
//! of a live log transport.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dftl_core::{DftlEngine, HostEvent};
use tokio::sync::{Mutex, RwLock};
use tokio::time::sleep;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayState {
    Idle,
    Running,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ReplayStatus {
    pub state: ReplayState,
    pub source: Option<String>,
    pub progress: u8,
    pub events_submitted: u64,
}

/// Pacing between replayed events. `Instant` lets the mock backend's own
/// per-channel latency be the only source of delay; the others add replay
/// pacing on top for interactive/demo use.
#[derive(Debug, Clone, Copy, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplaySpeed {
    RealTime,
    Fast,
    Instant,
}

impl ReplaySpeed {
    fn delay(&self) -> Option<Duration> {
        match self {
            Self::RealTime => Some(Duration::from_millis(10)),
            Self::Fast => Some(Duration::from_millis(1)),
            Self::Instant => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplayManager {
    status: Arc<RwLock<ReplayStatus>>,
    cancel: Arc<AtomicBool>,
}

impl ReplayManager {
    pub fn new() -> Self {
        ReplayManager {
            status: Arc::new(RwLock::new(ReplayStatus {
                state: ReplayState::Idle,
                source: None,
                progress: 0,
                events_submitted: 0,
            })),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn get_status(&self) -> ReplayStatus {
        self.status.read().await.clone()
    }

    async fn start(&self, source: String) {
        let mut status = self.status.write().await;
        status.state = ReplayState::Running;
        status.source = Some(source);
        status.progress = 0;
        status.events_submitted = 0;
        self.cancel.store(false, Ordering::SeqCst);
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    fn is_canceled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    async fn update_progress(&self, progress: u8, events_submitted: u64) {
        let mut status = self.status.write().await;
        status.progress = progress.min(100);
        status.events_submitted = events_submitted;
    }

    async fn complete(&self) {
        let mut status = self.status.write().await;
        status.state = ReplayState::Idle;
        status.progress = 100;
    }
}

impl Default for ReplayManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Replays a newline-delimited JSON trace of [`HostEvent`]s against `engine`,
/// one event at a time under the engine's single-writer lock (§5): replay
/// never holds the lock across events, only for the duration of one
/// `submit`.
pub async fn replay_file(
    engine: Arc<Mutex<DftlEngine>>,
    manager: Arc<ReplayManager>,
    path: impl AsRef<Path>,
    speed: ReplaySpeed,
) -> Result<()> {
    let path = path.as_ref();
    info!("starting replay from {}", path.display());
    manager.start(path.display().to_string()).await;

    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading replay trace: {}", path.display()))?;

    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    let total = lines.len();
    let mut submitted = 0u64;

    for (i, line) in lines.iter().enumerate() {
        if manager.is_canceled() {
            info!("replay canceled at event {}/{}", i, total);
            return Ok(());
        }

        let event: HostEvent =
            serde_json::from_str(line).with_context(|| format!("parsing trace line {}", i))?;
        {
            let mut engine = engine.lock().await;
            engine.submit(event).await?;
        }
        submitted += 1;

        if (i + 1) % 10 == 0 || i + 1 == total {
            let progress = (((i + 1) as f64 / total.max(1) as f64) * 100.0) as u8;
            manager.update_progress(progress, submitted).await;
        }

        if let Some(delay) = speed.delay() {
            sleep(delay).await;
        }
    }

    manager.complete().await;
    debug!(submitted, "replay complete");
    Ok(())
}
