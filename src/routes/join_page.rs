use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Html,
    routing::get,
};

use crate::{services::join_page, state::SharedState};

#[utoipa::path(
    get,
    path = "/join/{session_id}",
    tag = "sessions",
    params(("session_id" = String, Path, description = "Session code, case-insensitive")),
    responses(
        (status = 200, description = "Invitation page", body = String, content_type = "text/html"),
        (status = 404, description = "Unknown session", body = String, content_type = "text/html")
    )
)]
/// Render the invitation page of a session.
pub async fn join_page(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> (StatusCode, Html<String>) {
    let (status, body) = join_page::render(&state, &session_id).await;
    (status, Html(body))
}

/// Configure the invitation page route.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/join/{session_id}", get(join_page))
}
