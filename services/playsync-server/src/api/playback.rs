//! Bulk playback handlers
//!
//! These go straight to the dispatcher and bypass reconciliation.

use axum::{extract::State, Json};
use playsync_core::GroupReport;
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState};

/// Number of endpoints a bulk command reached
#[derive(Debug, Serialize)]
pub struct BulkResponse {
    pub delivered: usize,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    /// True if play was issued, false if pause was
    pub playing: bool,
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    pub volume: i64,
}

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub rate: f64,
}

#[derive(Debug, Deserialize)]
pub struct FocusRequest {
    /// `null` unmutes everyone
    #[serde(default)]
    pub endpoint_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FocusResponse {
    pub audio_focus: Option<String>,
}

/// POST /api/playback/play
pub async fn play_all(State(state): State<AppState>) -> Json<BulkResponse> {
    Json(BulkResponse {
        delivered: state.engine.play_all(),
    })
}

/// POST /api/playback/pause
pub async fn pause_all(State(state): State<AppState>) -> Json<BulkResponse> {
    Json(BulkResponse {
        delivered: state.engine.pause_all(),
    })
}

/// POST /api/playback/toggle
pub async fn toggle(State(state): State<AppState>) -> Json<ToggleResponse> {
    Json(ToggleResponse {
        playing: state.engine.toggle_play_pause(),
    })
}

/// POST /api/playback/mute
pub async fn mute_all(State(state): State<AppState>) -> Json<BulkResponse> {
    Json(BulkResponse {
        delivered: state.engine.mute_all(),
    })
}

/// POST /api/playback/unmute
pub async fn unmute_all(State(state): State<AppState>) -> Json<BulkResponse> {
    Json(BulkResponse {
        delivered: state.engine.unmute_all(),
    })
}

/// POST /api/playback/sync
pub async fn sync_all(State(state): State<AppState>) -> Json<Vec<GroupReport>> {
    Json(state.engine.sync_all())
}

/// POST /api/playback/volume
pub async fn set_volume(
    State(state): State<AppState>,
    Json(req): Json<VolumeRequest>,
) -> Json<BulkResponse> {
    Json(BulkResponse {
        delivered: state.engine.set_volume_all(req.volume),
    })
}

/// POST /api/playback/rate
pub async fn set_rate(
    State(state): State<AppState>,
    Json(req): Json<RateRequest>,
) -> Json<BulkResponse> {
    Json(BulkResponse {
        delivered: state.engine.set_rate_all(req.rate),
    })
}

/// POST /api/playback/focus
pub async fn set_focus(
    State(state): State<AppState>,
    Json(req): Json<FocusRequest>,
) -> Result<Json<FocusResponse>, ApiError> {
    state.engine.set_audio_focus(req.endpoint_id.as_deref())?;
    Ok(Json(FocusResponse {
        audio_focus: state.engine.audio_focus(),
    }))
}
