use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod health;
pub mod join_page;
pub mod sessions;
pub mod websocket;

/// Compose the REST, page, realtime and documentation trees over the shared state.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(sessions::router())
        .merge(join_page::router())
        .merge(websocket::router())
        .merge(docs::router())
        .with_state(state)
}
