//! HTTP API for the PlaySync server
//!
//! - `GET /health` - Liveness
//! - `GET|POST /api/endpoints` - List / register endpoints
//! - `DELETE /api/endpoints/:id` - Remove an endpoint
//! - `PUT /api/endpoints/:id/group`, `PUT /api/endpoints/:id/offset`
//! - `POST /api/playback/*` - Bulk controls, manual sync, audio focus
//! - `GET|PATCH /api/settings` - Live sync settings
//! - `GET /api/diagnostics`, `GET /api/state`
//! - `GET /ws/endpoints/:id` - Endpoint WebSocket

pub mod endpoints;
pub mod playback;
pub mod settings;
pub mod ws;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use playsync_core::{Diagnostics, PersistedState, SyncEngine};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::hub::ChannelHub;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Synchronization engine
    pub engine: Arc<SyncEngine>,
    /// Per-endpoint channels
    pub hub: Arc<ChannelHub>,
    /// Service configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(engine: Arc<SyncEngine>, hub: Arc<ChannelHub>, config: Arc<Config>) -> Self {
        Self {
            engine,
            hub,
            config,
        }
    }
}

/// Build the HTTP API router
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Registry
        .route(
            "/api/endpoints",
            get(endpoints::list_endpoints).post(endpoints::add_endpoint),
        )
        .route("/api/endpoints/:id", delete(endpoints::remove_endpoint))
        .route("/api/endpoints/:id/group", put(endpoints::set_group))
        .route("/api/endpoints/:id/offset", put(endpoints::set_offset))
        // Playback
        .route("/api/playback/play", post(playback::play_all))
        .route("/api/playback/pause", post(playback::pause_all))
        .route("/api/playback/toggle", post(playback::toggle))
        .route("/api/playback/mute", post(playback::mute_all))
        .route("/api/playback/unmute", post(playback::unmute_all))
        .route("/api/playback/sync", post(playback::sync_all))
        .route("/api/playback/volume", post(playback::set_volume))
        .route("/api/playback/rate", post(playback::set_rate))
        .route("/api/playback/focus", post(playback::set_focus))
        // Settings
        .route(
            "/api/settings",
            get(settings::get_settings).patch(settings::update_settings),
        )
        // Read-only views
        .route("/api/diagnostics", get(diagnostics_handler))
        .route("/api/state", get(state_handler))
        // Endpoint transport
        .route("/ws/endpoints/:id", get(ws::endpoint_socket))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// GET /api/diagnostics
async fn diagnostics_handler(State(state): State<AppState>) -> Json<Diagnostics> {
    Json(state.engine.diagnostics())
}

/// GET /api/state
///
/// Snapshot for an external persistence collaborator.
async fn state_handler(State(state): State<AppState>) -> Json<PersistedState> {
    Json(state.engine.export())
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Handler errors, rendered as JSON [`ErrorResponse`]
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl From<playsync_core::Error> for ApiError {
    fn from(e: playsync_core::Error) -> Self {
        if e.is_not_found() {
            ApiError::NotFound(e.to_string())
        } else if e.is_conflict() {
            ApiError::Conflict(e.to_string())
        } else if e.is_config_error() {
            ApiError::BadRequest(e.to_string())
        } else {
            ApiError::Internal(e.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = self.status();
        (
            status,
            Json(ErrorResponse {
                error: error.to_string(),
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}
