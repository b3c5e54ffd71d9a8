//! HTTP handlers for the box routes.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Json;
use boxes_core::{BoxFilter, BoxId, BoxRecord};
use chrono::Utc;
use serde_json::json;

use crate::auth::require_actor;
use crate::error::ApiError;
use crate::server::AppState;

/// POST /boxes/add/
pub(crate) async fn add_box(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<BoxRecord>), ApiError> {
    let actor = require_actor(state.auth.as_ref(), &headers).await?;
    let record = state.service.add(&actor, &body, Utc::now())?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// PUT|PATCH /boxes/update/{id}/
pub(crate) async fn update_box(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<BoxRecord>, ApiError> {
    let actor = require_actor(state.auth.as_ref(), &headers).await?;
    let record = state.service.update(&actor, parse_id(&id)?, &body, Utc::now())?;
    Ok(Json(record))
}

/// DELETE /boxes/delete/{id}/
pub(crate) async fn delete_box(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let actor = require_actor(state.auth.as_ref(), &headers).await?;
    state.service.delete(&actor, parse_id(&id)?, Utc::now())?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /boxes/list/
pub(crate) async fn list_boxes(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Json<Vec<BoxRecord>>, ApiError> {
    let actor = require_actor(state.auth.as_ref(), &headers).await?;
    let filter = parse_filter(&uri)?;
    Ok(Json(state.service.list(&actor, &filter)?))
}

/// GET /boxes/my-boxes/
pub(crate) async fn list_my_boxes(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Json<Vec<BoxRecord>>, ApiError> {
    let actor = require_actor(state.auth.as_ref(), &headers).await?;
    let filter = parse_filter(&uri)?;
    Ok(Json(state.service.list_own(&actor, &filter)?))
}

/// GET /health
pub(crate) async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.ping() {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "healthy"}))),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unhealthy"})),
            )
        }
    }
}

/// Ids that are not integers cannot name a box.
fn parse_id(raw: &str) -> Result<BoxId, ApiError> {
    raw.parse().map_err(|_| ApiError::NotFound)
}

/// Decoded after authentication so a bad query string never masks a 401.
fn parse_filter(uri: &Uri) -> Result<BoxFilter, ApiError> {
    let Query(params) = Query::<Vec<(String, String)>>::try_from_uri(uri)
        .map_err(|e| ApiError::MalformedQuery(e.body_text()))?;
    Ok(BoxFilter::from_params(
        params.iter().map(|(k, v)| (k.as_str(), v.as_str())),
    )?)
}
