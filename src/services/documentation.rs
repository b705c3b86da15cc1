use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Sushi Streak Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sessions::create_session,
        crate::routes::sessions::join_session,
        crate::routes::sessions::session_details,
        crate::routes::sessions::session_info,
        crate::routes::join_page::join_page,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::session::CreateSessionRequest,
            crate::dto::session::JoinSessionRequest,
            crate::dto::session::SessionJoinedResponse,
            crate::dto::session::SessionInfoResponse,
            crate::dto::session::SessionDetailResponse,
            crate::dto::session::SessionView,
            crate::dto::session::PlayerView,
            crate::dto::session::PlayerInfo,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
            crate::error::ErrorBody,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Session creation, joining and lookup"),
        (name = "realtime", description = "WebSocket channel for live scores"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_session_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<_> = doc.paths.paths.keys().cloned().collect();
        for expected in [
            "/api/sessions",
            "/api/sessions/join",
            "/api/sessions/{session_id}",
            "/api/sessions/{session_id}/info",
            "/join/{session_id}",
            "/ws",
            "/healthcheck",
        ] {
            assert!(paths.iter().any(|p| p == expected), "missing {expected}");
        }
    }
}
