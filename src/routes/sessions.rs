use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};

use crate::{
    dto::session::{
        CreateSessionRequest, JoinSessionRequest, SessionDetailResponse, SessionInfoResponse,
        SessionJoinedResponse,
    },
    error::{AppError, ErrorBody},
    services::session_service,
    state::SharedState,
};

/// Routes of the session control plane.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/join", post(join_session))
        .route("/api/sessions/{session_id}", get(session_details))
        .route("/api/sessions/{session_id}/info", get(session_info))
}

/// Open a new session with the caller as first player.
#[utoipa::path(
    post,
    path = "/api/sessions",
    tag = "sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created", body = SessionJoinedResponse),
        (status = 400, description = "Missing or malformed fields", body = ErrorBody),
        (status = 409, description = "Session code already in use", body = ErrorBody),
        (status = 503, description = "No free session code", body = ErrorBody)
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionJoinedResponse>), AppError> {
    let created = session_service::create_session(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Join an existing session.
#[utoipa::path(
    post,
    path = "/api/sessions/join",
    tag = "sessions",
    request_body = JoinSessionRequest,
    responses(
        (status = 200, description = "Player joined", body = SessionJoinedResponse),
        (status = 400, description = "Missing or malformed fields", body = ErrorBody),
        (status = 403, description = "Join window elapsed", body = ErrorBody),
        (status = 404, description = "Unknown session", body = ErrorBody),
        (status = 409, description = "Name already taken in the session", body = ErrorBody)
    )
)]
pub async fn join_session(
    State(state): State<SharedState>,
    Json(payload): Json<JoinSessionRequest>,
) -> Result<Json<SessionJoinedResponse>, AppError> {
    let joined = session_service::join_session(&state, payload).await?;
    Ok(Json(joined))
}

/// Full session record, including player identifiers.
#[utoipa::path(
    get,
    path = "/api/sessions/{session_id}",
    tag = "sessions",
    params(("session_id" = String, Path, description = "Session code, case-insensitive")),
    responses(
        (status = 200, description = "Session found", body = SessionDetailResponse),
        (status = 404, description = "Unknown session", body = ErrorBody)
    )
)]
pub async fn session_details(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionDetailResponse>, AppError> {
    let details = session_service::session_details(&state, &session_id).await?;
    Ok(Json(details))
}

/// Public session summary, answered from storage when the session is no longer live.
#[utoipa::path(
    get,
    path = "/api/sessions/{session_id}/info",
    tag = "sessions",
    params(("session_id" = String, Path, description = "Session code, case-insensitive")),
    responses(
        (status = 200, description = "Session found", body = SessionInfoResponse),
        (status = 404, description = "Unknown session", body = ErrorBody),
        (status = 503, description = "Storage unavailable", body = ErrorBody)
    )
)]
pub async fn session_info(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionInfoResponse>, AppError> {
    let info = session_service::session_info(&state, &session_id).await?;
    Ok(Json(info))
}
