//! Live settings handlers

use axum::{extract::State, Json};
use playsync_core::{SettingsPatch, SyncSettings};

use super::{ApiError, AppState};

/// GET /api/settings
pub async fn get_settings(State(state): State<AppState>) -> Json<SyncSettings> {
    Json(state.engine.settings())
}

/// PATCH /api/settings
///
/// Only present fields change. A new frequency takes effect before the
/// next tick.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<SyncSettings>, ApiError> {
    let updated = state.engine.update_settings(&patch)?;
    Ok(Json(updated))
}
