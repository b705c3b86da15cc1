//! Sushi Streak Back binary entrypoint wiring REST, WebSocket, the session sweep and storage.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, bail};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sushi_streak_back::{
    config::AppConfig,
    dao::{
        session_store::{MemorySessionStore, SessionStore},
        storage::StorageError,
    },
    routes,
    services::{
        storage_supervisor, sweep,
        write_behind::{self, PersistQueue},
    },
    state::{AppState, SharedState},
};

const DEFAULT_PORT: u16 = 3000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let (persist_queue, persist_receiver) = PersistQueue::channel();
    let app_state = AppState::new(config, persist_queue);

    tokio::spawn(write_behind::run(app_state.clone(), persist_receiver));
    tokio::spawn(sweep::run(app_state.clone()));
    start_storage(app_state.clone()).await?;

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Install the storage backend selected by `STORE_BACKEND` (`mongo`, `couch` or `memory`).
///
/// Database backends are connected by the storage supervisor in the background;
/// the server starts in degraded mode until they answer.
async fn start_storage(state: SharedState) -> anyhow::Result<()> {
    let backend = env::var("STORE_BACKEND").unwrap_or_else(|_| "mongo".into());
    info!(backend = %backend, "selecting storage backend");

    match backend.to_ascii_lowercase().as_str() {
        "memory" => {
            warn!("using the in-memory store; sessions will not survive a restart");
            let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
            state.set_session_store(store).await;
        }
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            use sushi_streak_back::dao::session_store::mongodb::{MongoConfig, MongoSessionStore};

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = MongoConfig::from_env().await?;
                let store = MongoSessionStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn SessionStore>)
            }));
        }
        #[cfg(feature = "couch-store")]
        "couch" => {
            use sushi_streak_back::dao::session_store::couchdb::{CouchConfig, CouchSessionStore};

            let config = CouchConfig::from_env().context("reading CouchDB configuration")?;
            tokio::spawn(storage_supervisor::run(state, move || {
                let config = config.clone();
                async move {
                    let store = CouchSessionStore::connect(config).await?;
                    Ok::<_, StorageError>(Arc::new(store) as Arc<dyn SessionStore>)
                }
            }));
        }
        other => bail!("unsupported STORE_BACKEND `{other}`"),
    }

    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
