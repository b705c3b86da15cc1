pub mod registry;
pub mod rooms;
pub mod session;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig, dao::session_store::SessionStore, error::ServiceError,
    services::write_behind::PersistQueue,
};

pub use self::registry::{SessionPolicy, SessionRegistry};
pub use self::rooms::RoomHub;

pub type SharedState = Arc<AppState>;

/// Central application state: the session registry, the broadcast rooms and the storage handle.
pub struct AppState {
    config: Arc<AppConfig>,
    registry: SessionRegistry,
    rooms: Arc<RoomHub>,
    session_store: RwLock<Option<Arc<dyn SessionStore>>>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, persist: PersistQueue) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let rooms = Arc::new(RoomHub::new());
        let registry = SessionRegistry::new(SessionPolicy::from(&config), rooms.clone(), persist);
        Arc::new(Self {
            config: Arc::new(config),
            registry,
            rooms,
            session_store: RwLock::new(None),
            degraded: degraded_tx,
        })
    }

    /// Application configuration loaded at start-up.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// Authoritative registry of resident sessions.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Broadcast rooms of real-time connections.
    pub fn rooms(&self) -> &RoomHub {
        &self.rooms
    }

    /// Obtain a handle to the current session store, if one is installed.
    pub async fn session_store(&self) -> Option<Arc<dyn SessionStore>> {
        let guard = self.session_store.read().await;
        guard.as_ref().cloned()
    }

    /// Like [`Self::session_store`], failing with [`ServiceError::Degraded`] in degraded mode.
    pub async fn require_session_store(&self) -> Result<Arc<dyn SessionStore>, ServiceError> {
        if self.is_degraded().await {
            return Err(ServiceError::Degraded);
        }
        self.session_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new session store implementation and leave degraded mode.
    pub async fn set_session_store(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.session_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current session store and enter degraded mode.
    pub async fn clear_session_store(&self) {
        {
            let mut guard = self.session_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}
