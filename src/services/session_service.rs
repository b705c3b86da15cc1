use tracing::{info, warn};
use validator::Validate;

use crate::{
    dao::models::SessionRecord,
    dto::session::{
        CreateSessionRequest, JoinSessionRequest, SessionDetailResponse, SessionInfoResponse,
        SessionJoinedResponse, SessionView,
    },
    error::ServiceError,
    state::{SharedState, session::normalize_code},
};

/// Open a session with the caller as its first player.
pub async fn create_session(
    state: &SharedState,
    payload: CreateSessionRequest,
) -> Result<SessionJoinedResponse, ServiceError> {
    payload.validate()?;

    let code = payload.session_id.as_deref().map(normalize_code);
    state.registry().create_session(
        code,
        payload.session_name.trim(),
        payload.player_name.trim(),
    )
}

/// Join a session, bringing it back from storage if it is no longer resident.
pub async fn join_session(
    state: &SharedState,
    payload: JoinSessionRequest,
) -> Result<SessionJoinedResponse, ServiceError> {
    payload.validate()?;

    let code = normalize_code(&payload.session_id);
    let player_name = payload.player_name.trim();

    match state.registry().join_session(&code, player_name).await {
        Err(ServiceError::NotFound(message)) => {
            let Some(record) = load_stored(state, &code).await? else {
                return Err(ServiceError::NotFound(message));
            };
            // Late joins must not bring the session back into memory.
            if record.session.age() > state.config().join_window {
                return Err(ServiceError::Expired(format!(
                    "session `{code}` no longer accepts new players"
                )));
            }
            info!(session = %code, "rehydrating session for join");
            state.registry().restore(record);
            state.registry().join_session(&code, player_name).await
        }
        other => other,
    }
}

/// Public summary of a session; `isActive` tells whether it is resident.
pub async fn session_info(
    state: &SharedState,
    raw_code: &str,
) -> Result<SessionInfoResponse, ServiceError> {
    let (view, is_active) = find_view(state, raw_code).await?;
    Ok(SessionInfoResponse::from_view(view, is_active))
}

/// Full record of a session including player identifiers.
pub async fn session_details(
    state: &SharedState,
    raw_code: &str,
) -> Result<SessionDetailResponse, ServiceError> {
    let (view, _) = find_view(state, raw_code).await?;
    Ok(view.into())
}

/// Look a session up in the registry first, then in the durable store.
pub async fn find_view(
    state: &SharedState,
    raw_code: &str,
) -> Result<(SessionView, bool), ServiceError> {
    let code = normalize_code(raw_code);
    if let Some(view) = state.registry().snapshot(&code).await {
        return Ok((view, true));
    }

    match load_stored(state, &code).await? {
        Some(record) => Ok((SessionView::from_record(&record), false)),
        None => Err(ServiceError::NotFound(format!("session `{code}` not found"))),
    }
}

/// Read a non-resident session from the durable store.
///
/// Sessions with a delete still queued are treated as gone.
async fn load_stored(
    state: &SharedState,
    code: &str,
) -> Result<Option<SessionRecord>, ServiceError> {
    if state.registry().persist_queue().delete_pending(code) {
        return Ok(None);
    }

    let store = state.require_session_store().await?;
    store.find_session(code.to_owned()).await.map_err(|err| {
        warn!(session = %code, error = %err, "failed to load session from storage");
        ServiceError::from(err)
    })
}
