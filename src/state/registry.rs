use std::{sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};
use rand::Rng;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::models::SessionRecord,
    dto::{
        session::{SessionJoinedResponse, SessionView},
        ws::ServerMessage,
    },
    error::ServiceError,
    services::write_behind::{PersistCommand, PersistQueue},
    state::{
        rooms::RoomHub,
        session::{FinishOutcome, Session},
    },
};

/// Characters used for generated session codes.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

type SessionSlot = Arc<Mutex<Session>>;

/// Timing and code-generation knobs the registry needs from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    /// See [`AppConfig::join_window`].
    pub join_window: Duration,
    /// See [`AppConfig::idle_window`].
    pub idle_window: Duration,
    /// See [`AppConfig::code_length`].
    pub code_length: usize,
    /// See [`AppConfig::code_attempts`].
    pub code_attempts: u32,
}

impl From<&AppConfig> for SessionPolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            join_window: config.join_window,
            idle_window: config.idle_window,
            code_length: config.code_length,
            code_attempts: config.code_attempts,
        }
    }
}

/// Authoritative map of resident sessions.
///
/// Each session sits behind its own mutex: operations on one session are
/// serialized, operations on different sessions never wait on each other.
/// Broadcasts and write-behind commands are issued while the session lock is
/// held so observers and the durable store see mutations in order; both are
/// non-blocking.
pub struct SessionRegistry {
    sessions: DashMap<String, SessionSlot>,
    rooms: Arc<RoomHub>,
    persist: PersistQueue,
    policy: SessionPolicy,
}

impl SessionRegistry {
    /// Build an empty registry broadcasting through `rooms`.
    pub fn new(policy: SessionPolicy, rooms: Arc<RoomHub>, persist: PersistQueue) -> Self {
        Self {
            sessions: DashMap::new(),
            rooms,
            persist,
            policy,
        }
    }

    /// Queue shared with the write-behind task.
    pub fn persist_queue(&self) -> &PersistQueue {
        &self.persist
    }

    /// Number of sessions currently in the map.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is resident.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Open a session with `creator` as its first player.
    ///
    /// `code` must already be normalized. Without a code, random codes are
    /// tried against the live registry until one is free or the attempt
    /// budget runs out.
    pub fn create_session(
        &self,
        code: Option<String>,
        name: &str,
        creator: &str,
    ) -> Result<SessionJoinedResponse, ServiceError> {
        if let Some(code) = code {
            return self
                .try_create(code.clone(), name, creator)
                .ok_or_else(|| ServiceError::Conflict(format!("session `{code}` already exists")));
        }

        for attempt in 1..=self.policy.code_attempts {
            let code = generate_code(self.policy.code_length);
            if let Some(created) = self.try_create(code.clone(), name, creator) {
                return Ok(created);
            }
            debug!(%code, attempt, "generated session code collided");
        }
        Err(ServiceError::Exhausted)
    }

    fn try_create(&self, code: String, name: &str, creator: &str) -> Option<SessionJoinedResponse> {
        let build = || {
            let mut session = Session::new(code.clone(), name.to_owned());
            let player = match session.admit(creator) {
                Ok(player) => player.clone(),
                // A fresh session has no players to collide with.
                Err(_) => return None,
            };
            let joined = SessionJoinedResponse {
                session_id: session.code().to_owned(),
                session_name: session.name().to_owned(),
                player_id: player.id,
            };
            self.persist.enqueue(PersistCommand::SaveSession(session.entity()));
            self.persist
                .enqueue(PersistCommand::SavePlayer(session.player_entity(&player)));
            Some((Arc::new(Mutex::new(session)), joined))
        };

        let joined = match self.sessions.entry(code.clone()) {
            Entry::Vacant(vacant) => {
                let (slot, joined) = build()?;
                vacant.insert(slot);
                joined
            }
            Entry::Occupied(mut occupied) => {
                if !self.reclaim_stale(occupied.get()) {
                    return None;
                }
                let (slot, joined) = build()?;
                occupied.insert(slot);
                joined
            }
        };

        // Connections left over from an earlier session under this code must not see the new one.
        let released = self.rooms.close(&joined.session_id);
        if released > 0 {
            debug!(session = %joined.session_id, released, "released stale connections");
        }
                info!(session = %joined.session_id, player = %joined.player_id, "session created");
        Some(joined)
    }

    /// Retire a slot that is evicted or idle so its code can be reused.
    ///
    /// Only uncontended slots are inspected; a locked slot is in use.
    fn reclaim_stale(&self, slot: &SessionSlot) -> bool {
        let Ok(mut session) = slot.try_lock() else {
            return false;
        };
        if session.is_evicted() {
            return true;
        }
        if session.is_idle(self.policy.idle_window) {
            session.mark_evicted();
            self.persist
                .enqueue(PersistCommand::DeleteSession(session.code().to_owned()));
            self.rooms.close(session.code());
            info!(session = %session.code(), "idle session replaced");
            return true;
        }
        false
    }

    /// Lock a resident session, evicting it on the spot if it went idle.
    async fn lock_live(&self, code: &str) -> Option<OwnedMutexGuard<Session>> {
        let slot = self.sessions.get(code).map(|entry| entry.value().clone())?;
        let mut session = slot.clone().lock_owned().await;
        if session.is_evicted() {
            return None;
        }
        if session.is_idle(self.policy.idle_window) {
            self.evict_locked(&slot, &mut session);
            return None;
        }
        Some(session)
    }

    fn evict_locked(&self, slot: &SessionSlot, session: &mut Session) {
        session.mark_evicted();
        let code = session.code().to_owned();
        self.sessions
            .remove_if(&code, |_, current| Arc::ptr_eq(current, slot));
        self.persist.enqueue(PersistCommand::DeleteSession(code.clone()));
        self.rooms.prune(&code);
        info!(session = %code, "idle session evicted");
    }

    /// Whether `code` names a live session.
    pub async fn contains(&self, code: &str) -> bool {
        self.lock_live(code).await.is_some()
    }

    /// Add a player to a resident session.
    ///
    /// Fails with `NotFound` when the session is not resident, `Expired` past
    /// the join window, `Conflict` when the name is taken.
    pub async fn join_session(
        &self,
        code: &str,
        player_name: &str,
    ) -> Result<SessionJoinedResponse, ServiceError> {
        let mut session = self
            .lock_live(code)
            .await
            .ok_or_else(|| ServiceError::NotFound(format!("session `{code}` not found")))?;

        if session.join_window_elapsed(self.policy.join_window) {
            return Err(ServiceError::Expired(format!(
                "session `{code}` no longer accepts new players"
            )));
        }

        let player = match session.admit(player_name) {
            Ok(player) => player.clone(),
            Err(taken) => {
                return Err(ServiceError::Conflict(format!(
                    "name `{}` is already taken in session `{code}`",
                    taken.0
                )));
            }
        };

        self.persist
            .enqueue(PersistCommand::SavePlayer(session.player_entity(&player)));
        self.rooms.broadcast(
            code,
            &ServerMessage::State {
                session: session.view(),
            },
        );
        info!(session = %code, player = %player.id, "player joined");

        Ok(SessionJoinedResponse {
            session_id: session.code().to_owned(),
            session_name: session.name().to_owned(),
            player_id: player.id,
        })
    }

    /// Count one piece for the player. Returns `false` when nothing changed.
    pub async fn add_piece(&self, code: &str, player_id: Uuid) -> bool {
        let Some(mut session) = self.lock_live(code).await else {
            return false;
        };
        let Some(player) = session.add_piece(player_id).cloned() else {
            return false;
        };

        self.persist
            .enqueue(PersistCommand::SavePlayer(session.player_entity(&player)));
        self.rooms.broadcast(
            code,
            &ServerMessage::State {
                session: session.view(),
            },
        );
        true
    }

    /// Mark the player as finished. Returns `false` when nothing changed.
    ///
    /// The call that completes the session also broadcasts `ended`, once.
    pub async fn finish_player(&self, code: &str, player_id: Uuid) -> bool {
        let Some(mut session) = self.lock_live(code).await else {
            return false;
        };
        let FinishOutcome::Finished { ended } = session.finish(player_id) else {
            return false;
        };

        if let Some(player) = session.players().find(|p| p.id == player_id).cloned() {
            self.persist
                .enqueue(PersistCommand::SavePlayer(session.player_entity(&player)));
        }

        let view = session.view();
        self.rooms.broadcast(
            code,
            &ServerMessage::State {
                session: view.clone(),
            },
        );
        if ended {
            info!(session = %code, "all players finished");
            self.rooms
                .broadcast(code, &ServerMessage::Ended { session: view });
        }
        true
    }

    /// Push the current state to the room of `code`. Does not mutate the session.
    pub async fn announce(&self, code: &str) -> bool {
        let Some(session) = self.lock_live(code).await else {
            return false;
        };
        self.rooms.broadcast(
            code,
            &ServerMessage::State {
                session: session.view(),
            },
        );
        true
    }

    /// Copy of the current state of a resident session.
    pub async fn snapshot(&self, code: &str) -> Option<SessionView> {
        self.lock_live(code).await.map(|session| session.view())
    }

    /// Make a stored session resident again. A live session with the same code wins.
    pub fn restore(&self, record: SessionRecord) {
        let code = record.session.id.clone();
        match self.sessions.entry(code.clone()) {
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(Mutex::new(Session::restore(record))));
            }
            Entry::Occupied(mut occupied) => {
                if !self.reclaim_stale(occupied.get()) {
                    return;
                }
                occupied.insert(Arc::new(Mutex::new(Session::restore(record))));
            }
        }
        info!(session = %code, "session restored from storage");
    }

    /// Evict every session idle past the idle window; returns how many were evicted.
    ///
    /// Each session lock is held only for the check and the removal.
    pub async fn evict_idle(&self) -> usize {
        let slots: Vec<SessionSlot> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut evicted = 0;
        for slot in slots {
            let mut session = slot.lock().await;
            if !session.is_evicted() && session.is_idle(self.policy.idle_window) {
                self.evict_locked(&slot, &mut session);
                evicted += 1;
            }
        }
        evicted
    }
}

fn generate_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{services::write_behind::PersistReceiver, state::session::normalize_code};

    fn registry() -> (Arc<SessionRegistry>, Arc<RoomHub>, PersistReceiver) {
        let (queue, receiver) = PersistQueue::channel();
        let rooms = Arc::new(RoomHub::new());
        let registry = SessionRegistry::new(
            SessionPolicy::from(&AppConfig::default()),
            rooms.clone(),
            queue,
        );
        (Arc::new(registry), rooms, receiver)
    }

    fn observe(rooms: &RoomHub, code: &str) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        rooms.attach(code, Uuid::new_v4(), tx);
        rx
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(Message::Text(text)) = rx.try_recv() {
            messages.push(serde_json::from_str(text.as_str()).unwrap());
        }
        messages
    }

    #[test]
    fn generated_codes_use_the_alphabet() {
        let code = generate_code(6);
        assert_eq!(code.len(), 6);
        assert!(code.bytes().all(|c| CODE_ALPHABET.contains(&c)));
    }

    #[tokio::test]
    async fn duplicate_codes_conflict() {
        let (registry, _, _rx) = registry();
        registry
            .create_session(Some("ABC123".into()), "Friday", "Alice")
            .unwrap();
        let err = registry
            .create_session(Some("ABC123".into()), "Other", "Bob")
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn exhausted_when_every_code_is_taken() {
        let (queue, _receiver) = PersistQueue::channel();
        let policy = SessionPolicy {
            code_length: 1,
            code_attempts: 3,
            ..SessionPolicy::from(&AppConfig::default())
        };
        let registry = SessionRegistry::new(policy, Arc::new(RoomHub::new()), queue);
        for c in CODE_ALPHABET {
            let code = (*c as char).to_string();
            registry.create_session(Some(code), "Full", "Alice").unwrap();
        }

        let err = registry.create_session(None, "Late", "Bob").unwrap_err();
        assert!(matches!(err, ServiceError::Exhausted));
    }

    #[tokio::test]
    async fn create_enqueues_session_then_creator() {
        let (registry, _, mut rx) = registry();
        let created = registry.create_session(None, "Friday", "Alice").unwrap();

        match rx.recv().await {
            Some(PersistCommand::SaveSession(session)) => {
                assert_eq!(session.id, created.session_id)
            }
            other => panic!("unexpected command {other:?}"),
        }
        match rx.recv().await {
            Some(PersistCommand::SavePlayer(player)) => assert_eq!(player.id, created.player_id),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[tokio::test]
    async fn join_is_case_insensitive() {
        let (registry, _, _rx) = registry();
        registry
            .create_session(Some("ABC123".into()), "Friday", "Alice")
            .unwrap();

        let joined = registry
            .join_session(&normalize_code("abc123"), "Bob")
            .await
            .unwrap();
        assert_eq!(joined.session_id, "ABC123");
        assert_eq!(joined.session_name, "Friday");

        let err = registry
            .join_session(&normalize_code("AbC123"), "aLiCe")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let err = registry.join_session("NOPE42", "Carol").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let (registry, _, _rx) = registry();
        let created = registry
            .create_session(Some("ABC123".into()), "Friday", "Alice")
            .unwrap();
        let bob = registry.join_session("ABC123", "Bob").await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..200 {
            let registry = registry.clone();
            let player = if i % 2 == 0 { created.player_id } else { bob.player_id };
            tasks.push(tokio::spawn(async move {
                registry.add_piece("ABC123", player).await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap());
        }

        let view = registry.snapshot("ABC123").await.unwrap();
        assert!(view.players.iter().all(|p| p.score == 100));
    }

    #[tokio::test]
    async fn stale_ids_are_silent_no_ops() {
        let (registry, rooms, _rx) = registry();
        let created = registry
            .create_session(Some("ABC123".into()), "Friday", "Alice")
            .unwrap();
        let mut observer = observe(&rooms, "ABC123");

        assert!(!registry.add_piece("ABC123", Uuid::new_v4()).await);
        assert!(!registry.add_piece("NOPE42", created.player_id).await);
        assert!(!registry.finish_player("ABC123", Uuid::new_v4()).await);
        assert!(drain(&mut observer).is_empty());
    }

    #[tokio::test]
    async fn alice_and_bob_race_to_a_single_end() {
        let (registry, rooms, _rx) = registry();
        let alice = registry
            .create_session(Some("ABC123".into()), "Friday", "Alice")
            .unwrap()
            .player_id;
        let bob = registry.join_session("ABC123", "Bob").await.unwrap().player_id;
        let mut observer = observe(&rooms, "ABC123");

        for _ in 0..3 {
            registry.add_piece("ABC123", alice).await;
        }
        for _ in 0..5 {
            registry.add_piece("ABC123", bob).await;
        }
        assert!(registry.finish_player("ABC123", alice).await);
        assert!(registry.finish_player("ABC123", bob).await);
        assert!(!registry.finish_player("ABC123", bob).await);
        assert!(!registry.add_piece("ABC123", bob).await);

        let messages = drain(&mut observer);
        let ended: Vec<_> = messages
            .iter()
            .filter_map(|message| match message {
                ServerMessage::Ended { session } => Some(session),
                ServerMessage::State { .. } => None,
            })
            .collect();
        assert_eq!(ended.len(), 1);
        assert!(matches!(messages.last(), Some(ServerMessage::Ended { .. })));

        let board: Vec<_> = ended[0]
            .players
            .iter()
            .map(|p| (p.name.as_str(), p.score, p.finished))
            .collect();
        assert_eq!(board, [("Bob", 5, true), ("Alice", 3, true)]);
        assert!(ended[0].finished);
    }

    #[tokio::test]
    async fn every_mutation_broadcasts_in_order() {
        let (registry, rooms, _rx) = registry();
        let alice = registry
            .create_session(Some("ABC123".into()), "Friday", "Alice")
            .unwrap()
            .player_id;
        let mut observer = observe(&rooms, "ABC123");

        registry.join_session("ABC123", "Bob").await.unwrap();
        registry.add_piece("ABC123", alice).await;
        registry.add_piece("ABC123", alice).await;

        let scores: Vec<(usize, u32)> = drain(&mut observer)
            .into_iter()
            .map(|message| match message {
                ServerMessage::State { session } | ServerMessage::Ended { session } => (
                    session.players.len(),
                    session.players.iter().map(|p| p.score).sum(),
                ),
            })
            .collect();
        assert_eq!(scores, [(2, 0), (2, 1), (2, 2)]);
    }

    #[tokio::test]
    async fn announce_does_not_touch_the_session() {
        let (registry, rooms, _rx) = registry();
        registry
            .create_session(Some("ABC123".into()), "Friday", "Alice")
            .unwrap();
        let mut observer = observe(&rooms, "ABC123");

        assert!(registry.announce("ABC123").await);
        assert!(!registry.announce("NOPE42").await);
        let messages = drain(&mut observer);
        assert_eq!(messages.len(), 1);
        assert_eq!(registry.snapshot("ABC123").await.unwrap().players.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn join_after_window_is_expired() {
        let (registry, _, _rx) = registry();
        let alice = registry
            .create_session(Some("ABC123".into()), "Friday", "Alice")
            .unwrap();
        let other = registry
            .create_session(Some("OTHER1".into()), "Busy", "Zed")
            .unwrap();

        for _ in 0..11 {
            tokio::time::advance(Duration::from_secs(60)).await;
            // Ongoing play keeps the session resident but does not extend the window.
            registry.add_piece("ABC123", alice.player_id).await;
            registry.add_piece("OTHER1", other.player_id).await;
        }

        let err = registry.join_session("ABC123", "Bob").await.unwrap_err();
        assert!(matches!(err, ServiceError::Expired(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn activity_resets_the_idle_clock() {
        let (registry, _, _rx) = registry();
        let alice = registry
            .create_session(Some("ABC123".into()), "Friday", "Alice")
            .unwrap()
            .player_id;

        tokio::time::advance(Duration::from_secs(9 * 60)).await;
        assert!(registry.add_piece("ABC123", alice).await);
        tokio::time::advance(Duration::from_secs(9 * 60)).await;
        assert_eq!(registry.evict_idle().await, 0);
        assert!(registry.contains("ABC123").await);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!registry.add_piece("ABC123", alice).await);
        let err = registry.join_session("ABC123", "Bob").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn joining_resets_the_idle_clock() {
        let (registry, _, _rx) = registry();
        registry
            .create_session(Some("ABC123".into()), "Friday", "Alice")
            .unwrap();

        tokio::time::advance(Duration::from_secs(9 * 60)).await;
        registry.join_session("ABC123", "Bob").await.unwrap();
        tokio::time::advance(Duration::from_secs(9 * 60)).await;
        assert_eq!(registry.evict_idle().await, 0);
        assert!(registry.contains("ABC123").await);

        tokio::time::advance(Duration::from_secs(10 * 60 + 1)).await;
        assert_eq!(registry.evict_idle().await, 1);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_and_queues_delete() {
        let (registry, rooms, mut rx) = registry();
        registry
            .create_session(Some("ABC123".into()), "Friday", "Alice")
            .unwrap();
        let mut observer = observe(&rooms, "ABC123");
        // Drop the two create commands.
        rx.recv().await;
        rx.recv().await;

        tokio::time::advance(Duration::from_secs(601)).await;
        assert_eq!(registry.evict_idle().await, 1);
        assert_eq!(registry.evict_idle().await, 0);
        assert!(registry.persist_queue().delete_pending("ABC123"));
        assert_eq!(
            rx.recv().await,
            Some(PersistCommand::DeleteSession("ABC123".into()))
        );
        // Attached connections are left alone.
        assert_eq!(rooms.member_count("ABC123"), 1);

        // The code is free again, and the new session starts with an empty room.
        assert!(
            registry
                .create_session(Some("ABC123".into()), "Again", "Bob")
                .is_ok()
        );
        assert_eq!(rooms.member_count("ABC123"), 0);
        registry.join_session("ABC123", "Carol").await.unwrap();
        assert!(drain(&mut observer).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_code_can_be_reused_before_the_sweep() {
        let (registry, rooms, _rx) = registry();
        registry
            .create_session(Some("ABC123".into()), "Friday", "Alice")
            .unwrap();
        let mut observer = observe(&rooms, "ABC123");
        tokio::time::advance(Duration::from_secs(601)).await;

        let created = registry
            .create_session(Some("ABC123".into()), "Saturday", "Bob")
            .unwrap();
        assert_eq!(created.session_name, "Saturday");
        assert_eq!(registry.len(), 1);
        assert_eq!(rooms.member_count("ABC123"), 0);

        registry.join_session("ABC123", "Carol").await.unwrap();
        assert!(drain(&mut observer).is_empty());
    }

    #[tokio::test]
    async fn restore_never_overrides_a_live_session() {
        use std::time::SystemTime;

        use crate::dao::models::SessionEntity;

        let (registry, _, _rx) = registry();
        registry
            .create_session(Some("ABC123".into()), "Live", "Alice")
            .unwrap();
        registry.restore(SessionRecord::new(
            SessionEntity {
                id: "ABC123".into(),
                name: "Stale".into(),
                created_at: SystemTime::now(),
            },
            vec![],
        ));
        assert_eq!(
            registry.snapshot("ABC123").await.unwrap().session_name,
            "Live"
        );

        registry.restore(SessionRecord::new(
            SessionEntity {
                id: "OLD001".into(),
                name: "Stored".into(),
                created_at: SystemTime::now(),
            },
            vec![],
        ));
        let joined = registry.join_session("OLD001", "Bob").await.unwrap();
        assert_eq!(joined.session_name, "Stored");
    }
}
