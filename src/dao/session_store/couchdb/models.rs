use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dao::models::{PlayerEntity, SessionEntity};

pub const SESSION_PREFIX: &str = "session::";
pub const PLAYER_PREFIX: &str = "player::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    pub id: String,
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Minimal view of any document, used to fetch the current revision.
#[derive(Debug, Deserialize)]
pub struct RevisionOnly {
    #[serde(rename = "_rev")]
    pub rev: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchSessionDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub session_id: String,
    pub name: String,
    pub created_at: SystemTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchPlayerDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub player_id: Uuid,
    pub session_id: String,
    pub name: String,
    pub score: u32,
    #[serde(default)]
    pub finished: bool,
    pub joined_at: SystemTime,
}

impl CouchSessionDocument {
    pub fn from_entity(session: SessionEntity) -> Self {
        Self {
            id: session_doc_id(&session.id),
            rev: None,
            session_id: session.id,
            name: session.name,
            created_at: session.created_at,
        }
    }

    pub fn into_entity(self) -> SessionEntity {
        SessionEntity {
            id: self.session_id,
            name: self.name,
            created_at: self.created_at,
        }
    }
}

impl CouchPlayerDocument {
    pub fn from_entity(player: PlayerEntity) -> Self {
        Self {
            id: player_doc_id(&player.session_id, player.id),
            rev: None,
            player_id: player.id,
            session_id: player.session_id,
            name: player.name,
            score: player.score,
            finished: player.finished,
            joined_at: player.joined_at,
        }
    }

    pub fn into_entity(self) -> PlayerEntity {
        PlayerEntity {
            id: self.player_id,
            session_id: self.session_id,
            name: self.name,
            score: self.score,
            finished: self.finished,
            joined_at: self.joined_at,
        }
    }
}

pub fn session_doc_id(session_id: &str) -> String {
    format!("{SESSION_PREFIX}{session_id}")
}

/// Prefix shared by every player document of a session.
pub fn player_prefix(session_id: &str) -> String {
    format!("{PLAYER_PREFIX}{session_id}::")
}

pub fn player_doc_id(session_id: &str, player_id: Uuid) -> String {
    format!("{}{}", player_prefix(session_id), player_id)
}
