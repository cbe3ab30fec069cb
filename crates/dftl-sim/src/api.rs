//! REST control surface: submit host events, inspect engine state, drive
//! trace replay. A shared-state-tuple router, trimmed to this engine's
//! surface (no OpenAPI docs, no WebSocket event stream).

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use dftl_core::{DftlEngine, HostEvent, PipelineOutcome};
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::replay::{self, ReplayManager, ReplaySpeed, ReplayStatus};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Mutex<DftlEngine>>,
    pub replay: Arc<ReplayManager>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct EngineStatus {
    pub total_lpns: u64,
    pub cmt_len: u64,
    pub cmt_max_entries: u64,
    pub total_used_blocks: u64,
    pub total_free_blocks: u64,
    pub gc_in_cycle: bool,
    pub cur_timestamp: u64,
}

#[derive(Serialize)]
pub struct InvariantReport {
    pub ok: bool,
    pub violation: Option<String>,
}

pub async fn health() -> &'static str {
    "ok"
}

async fn status(State(state): State<AppState>) -> Json<EngineStatus> {
    let engine = state.engine.lock().await;
    Json(EngineStatus {
        total_lpns: engine.total_lpns(),
        cmt_len: engine.cmt_len(),
        cmt_max_entries: engine.cmt_max_entries(),
        total_used_blocks: engine.total_used_blocks(),
        total_free_blocks: engine.total_free_blocks(),
        gc_in_cycle: engine.is_gc_in_cycle(),
        cur_timestamp: engine.cur_timestamp(),
    })
}

async fn invariants(State(state): State<AppState>) -> Json<InvariantReport> {
    let engine = state.engine.lock().await;
    match dftl_testing::invariants::check_all(&engine) {
        Ok(()) => Json(InvariantReport { ok: true, violation: None }),
        Err(message) => Json(InvariantReport { ok: false, violation: Some(message) }),
    }
}

async fn submit(
    State(state): State<AppState>,
    Json(event): Json<HostEvent>,
) -> Result<Json<PipelineOutcomeJson>, (StatusCode, Json<ErrorResponse>)> {
    let mut engine = state.engine.lock().await;
    engine
        .submit(event)
        .await
        .map(|outcome| Json(PipelineOutcomeJson::from(outcome)))
        .map_err(|e| {
            error!(error = %e, "submit failed");
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse { message: e.to_string() }),
            )
        })
}

/// `PipelineOutcome` carries a `FlashOp` enum that isn't itself
/// `Serialize` (it's a pure in-process op log, not a wire type), this is
/// the JSON-facing projection used only at the API boundary.
#[derive(Serialize)]
pub struct PipelineOutcomeJson {
    pub ppns: Vec<u64>,
    pub op_count: usize,
    pub gc_ran: bool,
}

impl From<PipelineOutcome> for PipelineOutcomeJson {
    fn from(outcome: PipelineOutcome) -> Self {
        PipelineOutcomeJson {
            ppns: outcome.ppns,
            op_count: outcome.ops.len(),
            gc_ran: outcome.gc_ran,
        }
    }
}

#[derive(serde::Deserialize)]
pub struct ReplayRequest {
    pub path: String,
    #[serde(default = "default_speed")]
    pub speed: ReplaySpeed,
}

fn default_speed() -> ReplaySpeed {
    ReplaySpeed::RealTime
}

#[derive(Serialize)]
pub struct ReplayStartResponse {
    pub message: String,
}

async fn replay_start(
    State(state): State<AppState>,
    Json(request): Json<ReplayRequest>,
) -> Result<Json<ReplayStartResponse>, (StatusCode, Json<ErrorResponse>)> {
    if state.replay.get_status().await.state == replay::ReplayState::Running {
        return Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                message: "replay already running".to_string(),
            }),
        ));
    }

    let engine = Arc::clone(&state.engine);
    let manager = Arc::clone(&state.replay);
    let path = request.path.clone();
    tokio::spawn(async move {
        if let Err(e) = replay::replay_file(engine, Arc::clone(&manager), &path, request.speed).await {
            error!(error = %e, "replay failed");
        }
    });

    Ok(Json(ReplayStartResponse {
        message: format!("replay started: {}", request.path),
    }))
}

async fn replay_stop(State(state): State<AppState>) -> Json<ReplayStartResponse> {
    state.replay.cancel();
    Json(ReplayStartResponse {
        message: "replay canceled".to_string(),
    })
}

async fn replay_status(State(state): State<AppState>) -> Json<ReplayStatus> {
    Json(state.replay.get_status().await)
}

pub fn create_router(engine: Arc<Mutex<DftlEngine>>, replay: Arc<ReplayManager>) -> Router {
    let state = AppState { engine, replay };
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/invariants", get(invariants))
        .route("/submit", post(submit))
        .route("/replay", post(replay_start))
        .route("/replay/stop", post(replay_stop))
        .route("/replay/status", get(replay_status))
        .with_state(state)
        .layer(CorsLayer::permissive())
}
