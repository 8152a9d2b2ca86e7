//! Endpoint registry handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use playsync_core::{Endpoint, TileMetadata};
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState};

/// Request to register an endpoint
#[derive(Debug, Deserialize)]
pub struct AddEndpointRequest {
    pub id: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub offset_ms: i64,
    #[serde(default)]
    pub metadata: Option<TileMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct SetGroupRequest {
    /// `null` or empty ungroups the endpoint
    #[serde(default)]
    pub group: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetOffsetRequest {
    pub offset_ms: i64,
}

/// Endpoint as shown to the control surface
#[derive(Debug, Serialize)]
pub struct EndpointView {
    pub id: String,
    pub group: Option<String>,
    pub offset_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TileMetadata>,
    pub connected: bool,
    pub position: Option<f64>,
    pub status: Option<String>,
}

fn view(state: &AppState, endpoint: &Endpoint) -> EndpointView {
    let tracked = state.engine.state(&endpoint.id);
    EndpointView {
        id: endpoint.id.clone(),
        group: endpoint.group.clone(),
        offset_ms: endpoint.offset_ms,
        metadata: endpoint.metadata.clone(),
        connected: endpoint.is_available(),
        position: tracked.as_ref().and_then(|t| t.position),
        status: tracked.and_then(|t| t.status).map(|s| s.label()),
    }
}

fn lookup(state: &AppState, id: &str) -> Result<EndpointView, ApiError> {
    state
        .engine
        .endpoint(id)
        .map(|endpoint| view(state, &endpoint))
        .ok_or_else(|| ApiError::NotFound(format!("Endpoint not found: {}", id)))
}

/// GET /api/endpoints
pub async fn list_endpoints(State(state): State<AppState>) -> Json<Vec<EndpointView>> {
    let endpoints = state.engine.endpoints();
    Json(endpoints.iter().map(|e| view(&state, e)).collect())
}

/// POST /api/endpoints
pub async fn add_endpoint(
    State(state): State<AppState>,
    Json(req): Json<AddEndpointRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = state.hub.channel_for(&req.id);
    let endpoint = Endpoint::new(req.id.clone(), channel)
        .with_group(req.group)
        .with_offset_ms(req.offset_ms)
        .with_metadata(req.metadata);
    if let Err(e) = state.engine.add_endpoint(endpoint) {
        if state.engine.endpoint(&req.id).is_none() {
            state.hub.remove(&req.id);
        }
        return Err(e.into());
    }

    Ok((StatusCode::CREATED, Json(lookup(&state, &req.id)?)))
}

/// DELETE /api/endpoints/:id
pub async fn remove_endpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.engine.remove_endpoint(&id)?;
    // Ends the socket task of a still-connected player
    if let Some(channel) = state.hub.remove(&id) {
        channel.close();
    }
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/endpoints/:id/group
pub async fn set_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetGroupRequest>,
) -> Result<Json<EndpointView>, ApiError> {
    state.engine.set_group(&id, req.group)?;
    Ok(Json(lookup(&state, &id)?))
}

/// PUT /api/endpoints/:id/offset
pub async fn set_offset(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetOffsetRequest>,
) -> Result<Json<EndpointView>, ApiError> {
    state.engine.set_offset(&id, req.offset_ms)?;
    Ok(Json(lookup(&state, &id)?))
}
