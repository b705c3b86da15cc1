//! Write-behind mirror of the registry into the durable store.
//!
//! The registry enqueues a [`PersistCommand`] while it still holds the session
//! lock, and a single writer drains the queue in order, so rows are always
//! written in the order their mutations happened.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    dao::{
        models::{PlayerEntity, SessionEntity},
        storage::StorageResult,
    },
    state::SharedState,
};

/// One durable write derived from a registry mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistCommand {
    /// Upsert the session row.
    SaveSession(SessionEntity),
    /// Upsert a player row.
    SavePlayer(PlayerEntity),
    /// Remove a session and its players.
    DeleteSession(String),
}

impl PersistCommand {
    fn session_id(&self) -> &str {
        match self {
            Self::SaveSession(session) => &session.id,
            Self::SavePlayer(player) => &player.session_id,
            Self::DeleteSession(id) => id,
        }
    }
}

/// Sending side of the write-behind queue.
#[derive(Clone)]
pub struct PersistQueue {
    tx: mpsc::UnboundedSender<PersistCommand>,
    pending_deletes: Arc<DashMap<String, usize>>,
}

/// Receiving side, consumed by [`run`].
pub struct PersistReceiver {
    rx: mpsc::UnboundedReceiver<PersistCommand>,
    pending_deletes: Arc<DashMap<String, usize>>,
}

impl PersistQueue {
    /// Create a connected queue/receiver pair.
    pub fn channel() -> (Self, PersistReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending_deletes = Arc::new(DashMap::new());
        (
            Self {
                tx,
                pending_deletes: pending_deletes.clone(),
            },
            PersistReceiver {
                rx,
                pending_deletes,
            },
        )
    }

    /// Enqueue a command without waiting for the store.
    pub fn enqueue(&self, command: PersistCommand) {
        if let PersistCommand::DeleteSession(ref id) = command {
            *self.pending_deletes.entry(id.clone()).or_insert(0) += 1;
        }
        if let Err(err) = self.tx.send(command) {
            warn!(command = ?err.0, "write-behind queue closed; dropping command");
            if let PersistCommand::DeleteSession(ref id) = err.0 {
                release_delete(&self.pending_deletes, id);
            }
        }
    }

    /// Whether a delete for `session_id` is queued but not yet applied.
    ///
    /// Store reads must treat such a session as gone.
    pub fn delete_pending(&self, session_id: &str) -> bool {
        self.pending_deletes.contains_key(session_id)
    }
}

fn release_delete(pending: &DashMap<String, usize>, id: &str) {
    if let Some(mut count) = pending.get_mut(id) {
        *count = count.saturating_sub(1);
    }
    pending.remove_if(id, |_, count| *count == 0);
}

impl PersistReceiver {
    /// Next queued command, or `None` once every queue handle is dropped.
    pub async fn recv(&mut self) -> Option<PersistCommand> {
        self.rx.recv().await
    }

    /// Mark a command as handled, whatever its outcome.
    pub fn complete(&self, command: &PersistCommand) {
        if let PersistCommand::DeleteSession(id) = command {
            release_delete(&self.pending_deletes, id);
        }
    }
}

/// Drain the queue for the lifetime of the process.
///
/// Commands arriving while no store is installed are dropped with a warning;
/// failures are logged and never retried.
pub async fn run(state: SharedState, mut receiver: PersistReceiver) {
    while let Some(command) = receiver.recv().await {
        apply(&state, &command).await;
        receiver.complete(&command);
    }
    debug!("write-behind queue closed");
}

async fn apply(state: &SharedState, command: &PersistCommand) {
    let Ok(store) = state.require_session_store().await else {
        warn!(
            session = %command.session_id(),
            command = ?command,
            "storage unavailable (degraded mode); dropping write"
        );
        return;
    };

    let result: StorageResult<()> = match command.clone() {
        PersistCommand::SaveSession(session) => store.save_session(session).await,
        PersistCommand::SavePlayer(player) => store.save_player(player).await,
        PersistCommand::DeleteSession(id) => store.delete_session(id).await,
    };

    if let Err(err) = result {
        warn!(
            session = %command.session_id(),
            command = ?command,
            backend = err.backend(),
            error = %err,
            "durable write failed; in-memory state kept"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::session_store::MemorySessionStore,
        state::AppState,
    };

    fn player(score: u32) -> PlayerEntity {
        PlayerEntity {
            id: Uuid::nil(),
            session_id: "ABC123".into(),
            name: "Alice".into(),
            score,
            finished: false,
            joined_at: SystemTime::UNIX_EPOCH,
        }
    }

    async fn drain(state: &SharedState, receiver: &mut PersistReceiver, count: usize) {
        for _ in 0..count {
            let command = receiver.recv().await.unwrap();
            apply(state, &command).await;
            receiver.complete(&command);
        }
    }

    #[tokio::test]
    async fn commands_are_applied_in_enqueue_order() {
        let (queue, mut receiver) = PersistQueue::channel();
        let state = AppState::new(AppConfig::default(), queue.clone());
        let store = MemorySessionStore::new();
        state.set_session_store(Arc::new(store.clone())).await;

        queue.enqueue(PersistCommand::SaveSession(SessionEntity {
            id: "ABC123".into(),
            name: "Friday".into(),
            created_at: SystemTime::UNIX_EPOCH,
        }));
        for score in 1..=50 {
            queue.enqueue(PersistCommand::SavePlayer(player(score)));
        }
        drain(&state, &mut receiver, 51).await;

        assert_eq!(store.player(Uuid::nil()).map(|p| p.score), Some(50));
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn pending_delete_is_visible_until_applied() {
        let (queue, mut receiver) = PersistQueue::channel();
        queue.enqueue(PersistCommand::DeleteSession("ABC123".into()));
        assert!(queue.delete_pending("ABC123"));
        assert!(!queue.delete_pending("ZZZ999"));

        let command = receiver.recv().await.unwrap();
        receiver.complete(&command);
        assert!(!queue.delete_pending("ABC123"));
    }

    #[tokio::test]
    async fn degraded_mode_drops_writes() {
        let (queue, mut receiver) = PersistQueue::channel();
        let state = AppState::new(AppConfig::default(), queue.clone());
        let store = MemorySessionStore::new();
        state.set_session_store(Arc::new(store.clone())).await;
        state.clear_session_store().await;
        assert!(state.is_degraded().await);

        queue.enqueue(PersistCommand::SavePlayer(player(1)));
        drain(&state, &mut receiver, 1).await;

        assert!(store.player(Uuid::nil()).is_none());
    }
}
