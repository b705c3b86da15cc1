use std::time::{Duration, SystemTime};

use indexmap::IndexMap;
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    dao::models::{PlayerEntity, SessionEntity, SessionRecord},
    dto::{
        format_system_time,
        session::{PlayerView, SessionView, all_finished, leaderboard},
    },
};

/// Canonical form of a session code: trimmed and upper-cased.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Player tracked inside a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Server-issued identifier.
    pub id: Uuid,
    /// Display name, unique in the session regardless of case.
    pub name: String,
    /// Pieces eaten so far.
    pub score: u32,
    /// Frozen once set; the score stops moving.
    pub finished: bool,
    /// Wall-clock join time, persisted to restore player order.
    pub joined_at: SystemTime,
}

/// Result of [`Session::finish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishOutcome {
    /// No such player in the session.
    UnknownPlayer,
    /// The player had already finished; nothing changed.
    AlreadyFinished,
    /// The player is now finished. `ended` is true only for the call that
    /// completed the whole session for the first time.
    Finished { ended: bool },
}

/// Rejection returned by [`Session::admit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTaken(pub String);

/// Authoritative state of one session while it is resident in memory.
#[derive(Debug)]
pub struct Session {
    code: String,
    name: String,
    created_at: SystemTime,
    /// Monotonic instant at which this process started tracking the session.
    opened_at: Instant,
    /// Age of the session when it was opened (non-zero for rehydrated sessions).
    age_at_open: Duration,
    last_activity: Instant,
    players: IndexMap<Uuid, Player>,
    ended_at: Option<SystemTime>,
    evicted: bool,
}

impl Session {
    /// Open a brand-new, empty session.
    pub fn new(code: String, name: String) -> Self {
        let now = Instant::now();
        Self {
            code,
            name,
            created_at: SystemTime::now(),
            opened_at: now,
            age_at_open: Duration::ZERO,
            last_activity: now,
            players: IndexMap::new(),
            ended_at: None,
            evicted: false,
        }
    }

    /// Rebuild a session read back from the durable store.
    ///
    /// The activity clock restarts now; the join window keeps counting from the
    /// stored creation time. A session whose players all finished before it was
    /// stored is considered already ended.
    pub fn restore(record: SessionRecord) -> Self {
        let now = Instant::now();
        let age_at_open = record.session.age();
        let players: IndexMap<Uuid, Player> = record
            .players
            .into_iter()
            .map(|player| {
                (
                    player.id,
                    Player {
                        id: player.id,
                        name: player.name,
                        score: player.score,
                        finished: player.finished,
                        joined_at: player.joined_at,
                    },
                )
            })
            .collect();
        let ended = !players.is_empty() && players.values().all(|player| player.finished);

        Self {
            code: record.session.id,
            name: record.session.name,
            created_at: record.session.created_at,
            opened_at: now,
            age_at_open,
            last_activity: now,
            players,
            ended_at: ended.then(SystemTime::now),
            evicted: false,
        }
    }

    /// Normalized session code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Display name of the session.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Players in join order.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// Whether every player has finished. Empty sessions are never finished.
    pub fn is_finished(&self) -> bool {
        !self.players.is_empty() && self.players.values().all(|player| player.finished)
    }

    /// Whether the session has been removed from the registry.
    pub fn is_evicted(&self) -> bool {
        self.evicted
    }

    pub(crate) fn mark_evicted(&mut self) {
        self.evicted = true;
    }

    /// True once more than `join_window` has elapsed since creation.
    pub fn join_window_elapsed(&self, join_window: Duration) -> bool {
        self.age_at_open + self.opened_at.elapsed() > join_window
    }

    /// True once more than `idle_window` has elapsed since the last mutation.
    pub fn is_idle(&self, idle_window: Duration) -> bool {
        self.last_activity.elapsed() > idle_window
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Case-insensitive name lookup.
    pub fn name_taken(&self, name: &str) -> bool {
        let wanted = name.to_lowercase();
        self.players
            .values()
            .any(|player| player.name.to_lowercase() == wanted)
    }

    /// Append a new player and refresh the activity clock.
    pub fn admit(&mut self, name: &str) -> Result<&Player, NameTaken> {
        if self.name_taken(name) {
            return Err(NameTaken(name.to_owned()));
        }

        let player = Player {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            score: 0,
            finished: false,
            joined_at: SystemTime::now(),
        };
        let id = player.id;
        self.players.insert(id, player);
        self.touch();
        Ok(&self.players[&id])
    }

    /// Add one piece to the player's score.
    ///
    /// Returns `None` when the player is unknown or already finished.
    pub fn add_piece(&mut self, player_id: Uuid) -> Option<&Player> {
        let player = self.players.get_mut(&player_id)?;
        if player.finished {
            return None;
        }
        player.score = player.score.saturating_add(1);
        self.touch();
        self.players.get(&player_id)
    }

    /// Mark the player as finished and latch the session end the first time
    /// every player is done.
    pub fn finish(&mut self, player_id: Uuid) -> FinishOutcome {
        let Some(player) = self.players.get_mut(&player_id) else {
            return FinishOutcome::UnknownPlayer;
        };
        if player.finished {
            return FinishOutcome::AlreadyFinished;
        }
        player.finished = true;
        self.touch();

        let ended = self.ended_at.is_none() && self.is_finished();
        if ended {
            self.ended_at = Some(SystemTime::now());
        }
        FinishOutcome::Finished { ended }
    }

    /// Copy of the current state in leaderboard order.
    pub fn view(&self) -> SessionView {
        let players: Vec<PlayerView> = self
            .players
            .values()
            .map(|player| PlayerView {
                id: player.id,
                name: player.name.clone(),
                score: player.score,
                finished: player.finished,
            })
            .collect();

        SessionView {
            session_id: self.code.clone(),
            session_name: self.name.clone(),
            created_at: format_system_time(self.created_at),
            finished: all_finished(&players),
            ended_at: self.ended_at.map(format_system_time),
            players: leaderboard(players),
        }
    }

    /// Durable row for the session itself.
    pub fn entity(&self) -> SessionEntity {
        SessionEntity {
            id: self.code.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
        }
    }

    /// Durable row for one player.
    pub fn player_entity(&self, player: &Player) -> PlayerEntity {
        PlayerEntity {
            id: player.id,
            session_id: self.code.clone(),
            name: player.name.clone(),
            score: player.score,
            finished: player.finished,
            joined_at: player.joined_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with(names: &[&str]) -> (Session, Vec<Uuid>) {
        let mut session = Session::new("ABC123".into(), "Friday".into());
        let ids = names
            .iter()
            .map(|name| session.admit(name).unwrap().id)
            .collect();
        (session, ids)
    }

    #[test]
    fn codes_are_trimmed_and_uppercased() {
        assert_eq!(normalize_code("  abc123 "), "ABC123");
        assert_eq!(normalize_code("AbC"), "ABC");
    }

    #[test]
    fn names_collide_regardless_of_case() {
        let (mut session, _) = session_with(&["Alice"]);
        assert_eq!(session.admit("alice"), Err(NameTaken("alice".into())));
        assert_eq!(session.admit("ALICE").unwrap_err().0, "ALICE");
        assert!(session.admit("Bob").is_ok());
    }

    #[test]
    fn finished_players_score_is_frozen() {
        let (mut session, ids) = session_with(&["Alice", "Bob"]);
        assert_eq!(session.add_piece(ids[0]).map(|p| p.score), Some(1));
        assert_eq!(session.finish(ids[0]), FinishOutcome::Finished { ended: false });
        assert!(session.add_piece(ids[0]).is_none());
        assert!(session.add_piece(Uuid::new_v4()).is_none());
        assert_eq!(session.players().next().map(|p| p.score), Some(1));
    }

    #[test]
    fn finish_is_idempotent_and_ends_once() {
        let (mut session, ids) = session_with(&["Alice", "Bob"]);
        assert_eq!(session.finish(ids[0]), FinishOutcome::Finished { ended: false });
        assert_eq!(session.finish(ids[0]), FinishOutcome::AlreadyFinished);
        assert!(!session.is_finished());
        assert_eq!(session.finish(ids[1]), FinishOutcome::Finished { ended: true });
        assert_eq!(session.finish(ids[1]), FinishOutcome::AlreadyFinished);
        assert_eq!(session.finish(Uuid::new_v4()), FinishOutcome::UnknownPlayer);
        assert!(session.is_finished());
    }

    #[test]
    fn late_joiner_does_not_rearm_the_end_latch() {
        let (mut session, ids) = session_with(&["Alice"]);
        assert_eq!(session.finish(ids[0]), FinishOutcome::Finished { ended: true });

        let carol = session.admit("Carol").unwrap().id;
        assert!(!session.is_finished());
        assert_eq!(session.finish(carol), FinishOutcome::Finished { ended: false });
        assert!(session.view().ended_at.is_some());
    }

    #[test]
    fn view_is_a_sorted_copy() {
        let (mut session, ids) = session_with(&["Alice", "Bob"]);
        session.add_piece(ids[1]);
        let view = session.view();
        session.add_piece(ids[0]);
        session.add_piece(ids[0]);

        let names: Vec<_> = view.players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Bob", "Alice"]);
        assert_eq!(view.players[1].score, 0);
        assert_eq!(view.session_id, "ABC123");
    }

    #[tokio::test(start_paused = true)]
    async fn clocks_track_creation_and_activity_separately() {
        let join_window = Duration::from_secs(600);
        let idle_window = Duration::from_secs(600);
        let (mut session, ids) = session_with(&["Alice"]);

        tokio::time::advance(Duration::from_secs(400)).await;
        session.add_piece(ids[0]);
        tokio::time::advance(Duration::from_secs(400)).await;

        assert!(session.join_window_elapsed(join_window));
        assert!(!session.is_idle(idle_window));

        tokio::time::advance(Duration::from_secs(201)).await;
        assert!(session.is_idle(idle_window));
    }

    #[test]
    fn restore_keeps_age_and_end_state() {
        let created_at = SystemTime::now() - Duration::from_secs(15 * 60);
        let record = SessionRecord::new(
            SessionEntity {
                id: "ABC123".into(),
                name: "Friday".into(),
                created_at,
            },
            vec![PlayerEntity {
                id: Uuid::new_v4(),
                session_id: "ABC123".into(),
                name: "Alice".into(),
                score: 7,
                finished: true,
                joined_at: created_at,
            }],
        );

        let mut session = Session::restore(record);
        assert!(session.join_window_elapsed(Duration::from_secs(600)));
        assert!(!session.is_idle(Duration::from_secs(600)));
        assert!(session.is_finished());

        let bob = session.admit("Bob").unwrap().id;
        assert_eq!(session.finish(bob), FinishOutcome::Finished { ended: false });
    }
}
