//! Process-local [`SessionStore`] used by tests and by deployments without a database.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use uuid::Uuid;

use super::SessionStore;
use crate::dao::{
    models::{PlayerEntity, SessionEntity, SessionRecord},
    storage::{StorageError, StorageResult},
};

/// Store keeping every row in concurrent maps.
///
/// It can be switched offline to exercise the degraded paths.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    sessions: DashMap<String, SessionEntity>,
    players: DashMap<Uuid, PlayerEntity>,
    offline: AtomicBool,
}

impl MemorySessionStore {
    /// Create an empty, online store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (`true`) or succeed again (`false`).
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of session rows currently held.
    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Current copy of a player row.
    pub fn player(&self, id: Uuid) -> Option<PlayerEntity> {
        self.inner.players.get(&id).map(|entry| entry.value().clone())
    }
}

impl MemoryInner {
    fn ensure_online(&self, operation: &str) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(
                "memory",
                format!("memory store offline during {operation}"),
                io::Error::new(io::ErrorKind::NotConnected, "store switched offline"),
            ));
        }
        Ok(())
    }

    fn find(&self, id: &str) -> Option<SessionRecord> {
        let session = self.sessions.get(id)?.value().clone();
        let players = self
            .players
            .iter()
            .filter(|entry| entry.session_id == id)
            .map(|entry| entry.value().clone())
            .collect();
        Some(SessionRecord::new(session, players))
    }
}

impl SessionStore for MemorySessionStore {
    fn save_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online("save_session")?;
            inner.sessions.insert(session.id.clone(), session);
            Ok(())
        })
    }

    fn save_player(&self, player: PlayerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online("save_player")?;
            inner.players.insert(player.id, player);
            Ok(())
        })
    }

    fn delete_session(&self, id: String) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online("delete_session")?;
            inner.sessions.remove(&id);
            inner.players.retain(|_, player| player.session_id != id);
            Ok(())
        })
    }

    fn find_session(&self, id: String) -> BoxFuture<'static, StorageResult<Option<SessionRecord>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online("find_session")?;
            Ok(inner.find(&id))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.ensure_online("health_check") })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.health_check()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;

    fn player(session_id: &str, name: &str, joined_at: SystemTime) -> PlayerEntity {
        PlayerEntity {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            name: name.into(),
            score: 0,
            finished: false,
            joined_at,
        }
    }

    #[tokio::test]
    async fn find_returns_players_in_join_order() {
        let store = MemorySessionStore::new();
        let now = SystemTime::now();
        store
            .save_session(SessionEntity {
                id: "ABC123".into(),
                name: "Friday".into(),
                created_at: now,
            })
            .await
            .unwrap();
        store
            .save_player(player("ABC123", "Bob", now + Duration::from_secs(5)))
            .await
            .unwrap();
        store.save_player(player("ABC123", "Alice", now)).await.unwrap();
        store.save_player(player("ZZZ999", "Eve", now)).await.unwrap();

        let record = store.find_session("ABC123".into()).await.unwrap().unwrap();
        let names: Vec<_> = record.players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Alice", "Bob"]);
    }

    #[tokio::test]
    async fn delete_removes_session_and_players() {
        let store = MemorySessionStore::new();
        let now = SystemTime::now();
        store
            .save_session(SessionEntity {
                id: "ABC123".into(),
                name: "Friday".into(),
                created_at: now,
            })
            .await
            .unwrap();
        let alice = player("ABC123", "Alice", now);
        let alice_id = alice.id;
        store.save_player(alice).await.unwrap();

        store.delete_session("ABC123".into()).await.unwrap();

        assert!(store.find_session("ABC123".into()).await.unwrap().is_none());
        assert!(store.player(alice_id).is_none());
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let store = MemorySessionStore::new();
        store.set_offline(true);
        assert!(store.health_check().await.is_err());
        assert!(store.find_session("ABC123".into()).await.is_err());

        store.set_offline(false);
        assert!(store.health_check().await.is_ok());
    }
}
