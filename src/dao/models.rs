use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Session row mirrored to the durable store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// Normalized session code (primary key).
    pub id: String,
    /// Display name chosen by the creator.
    pub name: String,
    /// Creation timestamp; gates late joins after a restart.
    pub created_at: SystemTime,
}

impl SessionEntity {
    /// Wall-clock time elapsed since creation; zero if the clock went backwards.
    pub fn age(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.created_at)
            .unwrap_or_default()
    }
}

/// Player row mirrored to the durable store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Server-issued player identifier.
    pub id: Uuid,
    /// Code of the session the player belongs to.
    pub session_id: String,
    /// Display name, unique inside the session (case-insensitive).
    pub name: String,
    /// Pieces eaten so far.
    pub score: u32,
    /// Whether the player declared they are done.
    pub finished: bool,
    /// Join timestamp, used to restore the original player order.
    pub joined_at: SystemTime,
}

/// A session together with all of its players, as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// The session row.
    pub session: SessionEntity,
    /// Player rows ordered by join time.
    pub players: Vec<PlayerEntity>,
}

impl SessionRecord {
    /// Assemble a record, ordering the players by join time.
    pub fn new(session: SessionEntity, mut players: Vec<PlayerEntity>) -> Self {
        players.sort_by_key(|player| player.joined_at);
        Self { session, players }
    }
}
