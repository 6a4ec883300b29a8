// HTTP API routes (narration, conversation memory, scene data).

pub mod ws;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Json, Path, State},
    http::{header, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::config::Config;
use crate::llm::{self, LlmClient, LlmError};
use crate::memory::ConversationMemory;
use crate::metrics;
use crate::protocol::{AiReply, AiRequest, ClearMemoryReply, ClearMemoryRequest, ErrorBody};
use crate::scene::{self, SceneSettings};

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub llm: Arc<dyn LlmClient>,
    pub memory: ConversationMemory,
}

impl AppState {
    pub fn new(llm: Arc<dyn LlmClient>, memory: ConversationMemory) -> Self {
        Self { llm, memory }
    }
}

/// Where static front-end files and GLB models are served from.
#[derive(Debug, Clone)]
pub struct StaticDirs {
    pub public: PathBuf,
    pub views: PathBuf,
    pub models: PathBuf,
}

impl From<&Config> for StaticDirs {
    fn from(config: &Config) -> Self {
        Self {
            public: config.static_dir.clone(),
            views: config.views_dir.clone(),
            models: config.models_dir.clone(),
        }
    }
}

// ── Error helpers ─────────────────────────────────────────────────────

fn json_error(status: StatusCode, msg: &str) -> impl IntoResponse {
    (
        status,
        Json(ErrorBody {
            error: msg.to_string(),
            details: None,
        }),
    )
}

fn bad_body(rejection: JsonRejection) -> impl IntoResponse {
    (
        rejection.status(),
        Json(ErrorBody {
            error: "invalid request body".to_string(),
            details: Some(rejection.body_text()),
        }),
    )
}

fn llm_error(e: LlmError) -> impl IntoResponse {
    tracing::error!("LLM vendor error: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: "Failed to generate AI response".to_string(),
            details: Some(e.to_string()),
        }),
    )
}

// ── Router ────────────────────────────────────────────────────────────

/// API routes only, without static file serving.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ai_response", post(ai_response))
        .route("/clear_memory", post(clear_memory))
        .route("/memory_stats", get(memory_stats))
        .route("/api/scenes", get(list_scenes))
        .route("/api/scenes/{map}", get(get_scene))
        .route("/metrics", get(get_metrics))
        .route("/ws", get(ws::ws_narrate))
        .route_layer(middleware::from_fn(metrics::track_requests))
        .with_state(state)
}

/// The full application: API routes, GLB models under `/models`, and the
/// static front end as the fallback.
pub fn app(state: AppState, dirs: &StaticDirs) -> Router {
    let static_files = ServeDir::new(&dirs.public).fallback(ServeDir::new(&dirs.views));
    router(state)
        .nest_service(scene::MODELS_PREFIX, ServeDir::new(&dirs.models))
        .fallback_service(static_files)
        .layer(CorsLayer::permissive())
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "rpg-narrator" }))
}

async fn ai_response(
    State(state): State<AppState>,
    body: Result<Json<AiRequest>, JsonRejection>,
) -> impl IntoResponse {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => return bad_body(rejection).into_response(),
    };
    let Some(prompt) = req.prompt() else {
        return json_error(StatusCode::BAD_REQUEST, "text is required").into_response();
    };
    let player_id = req.player_id();

    if req.is_game_start() {
        state.memory.clear(player_id);
    }
    let history = state.memory.get(player_id);

    match llm::timed_generate(state.llm.as_ref(), &history, &prompt).await {
        Ok(text) => {
            state.memory.record_exchange(player_id, &prompt, &text);
            metrics::AI_REQUESTS_TOTAL
                .with_label_values(&["http", "ok"])
                .inc();
            (StatusCode::OK, Json(AiReply { text })).into_response()
        }
        Err(e) => {
            metrics::AI_REQUESTS_TOTAL
                .with_label_values(&["http", "error"])
                .inc();
            llm_error(e).into_response()
        }
    }
}

async fn clear_memory(
    State(state): State<AppState>,
    body: Bytes,
) -> impl IntoResponse {
    // An empty or unreadable body clears the default player
    let req: ClearMemoryRequest = serde_json::from_slice(&body).unwrap_or_default();
    let player_id = req.player_id().to_string();

    let memory_size = state.memory.clear(&player_id);
    tracing::info!(%player_id, "memory cleared on request");
    Json(ClearMemoryReply {
        message: format!("Memory cleared for player {player_id}"),
        memory_size,
    })
}

async fn memory_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.memory.stats())
}

async fn list_scenes() -> impl IntoResponse {
    let maps: Vec<_> = scene::MAPS
        .iter()
        .map(|(id, label)| json!({ "map": id, "label": label }))
        .collect();
    Json(json!(maps))
}

async fn get_scene(Path(map): Path<String>) -> impl IntoResponse {
    match SceneSettings::for_map(&map) {
        Some(settings) => (StatusCode::OK, Json(settings)).into_response(),
        None => json_error(StatusCode::NOT_FOUND, "Unknown map").into_response(),
    }
}

async fn get_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}
