use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use uuid::Uuid;

use crate::{
    dto::session_dto::SessionResponse,
    error::{Error, Result},
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/sessions",
    responses(
        (status = 201, description = "Session created", body = SessionResponse)
    )
)]
#[axum::debug_handler]
pub async fn create_session(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let session = state.sessions.create();
    tracing::info!(session_id = %session.id(), "session created");
    Ok((StatusCode::CREATED, Json(SessionResponse::from(session.as_ref()))))
}

#[utoipa::path(
    get,
    path = "/api/sessions/{id}",
    params(
        ("id" = Uuid, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "Session position", body = SessionResponse),
        (status = 404, description = "Session not found")
    )
)]
#[axum::debug_handler]
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let session = state
        .sessions
        .get(id)
        .ok_or_else(|| Error::NotFound("Session not found".to_string()))?;
    Ok(Json(SessionResponse::from(session.as_ref())))
}

#[utoipa::path(
    delete,
    path = "/api/sessions/{id}",
    params(
        ("id" = Uuid, Path, description = "Session ID")
    ),
    responses(
        (status = 204, description = "Session deleted"),
        (status = 404, description = "Session not found")
    )
)]
#[axum::debug_handler]
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    if !state.sessions.remove(id) {
        return Err(Error::NotFound("Session not found".to_string()));
    }
    tracing::info!(session_id = %id, "session deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/sessions/{id}/reset",
    params(
        ("id" = Uuid, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "Polarity cycle restarted", body = SessionResponse),
        (status = 404, description = "Session not found")
    )
)]
#[axum::debug_handler]
pub async fn reset_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let session = state
        .sessions
        .get(id)
        .ok_or_else(|| Error::NotFound("Session not found".to_string()))?;
    session.reset();
    tracing::info!(session_id = %id, "session reset");
    Ok(Json(SessionResponse::from(session.as_ref())))
}
