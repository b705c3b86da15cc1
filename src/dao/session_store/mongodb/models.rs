use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::dao::models::{PlayerEntity, SessionEntity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    created_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    /// Player UUID in its hyphenated text form.
    #[serde(rename = "_id")]
    id: String,
    session_id: String,
    name: String,
    score: i64,
    #[serde(default)]
    finished: bool,
    joined_at: DateTime,
}

impl From<SessionEntity> for MongoSessionDocument {
    fn from(value: SessionEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl From<MongoSessionDocument> for SessionEntity {
    fn from(value: MongoSessionDocument) -> Self {
        Self {
            id: value.id,
            name: value.name,
            created_at: value.created_at.to_system_time(),
        }
    }
}

impl From<PlayerEntity> for MongoPlayerDocument {
    fn from(value: PlayerEntity) -> Self {
        Self {
            id: value.id.to_string(),
            session_id: value.session_id,
            name: value.name,
            score: i64::from(value.score),
            finished: value.finished,
            joined_at: DateTime::from_system_time(value.joined_at),
        }
    }
}

impl TryFrom<MongoPlayerDocument> for PlayerEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoPlayerDocument) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&value.id).map_err(|source| MongoDaoError::CorruptPlayerId {
            id: value.id.clone(),
            source,
        })?;
        Ok(Self {
            id,
            session_id: value.session_id,
            name: value.name,
            score: u32::try_from(value.score.max(0)).unwrap_or(u32::MAX),
            finished: value.finished,
            joined_at: value.joined_at.to_system_time(),
        })
    }
}

impl MongoPlayerDocument {
    pub fn id(&self) -> &str {
        &self.id
    }
}

pub fn doc_id(id: &str) -> Document {
    doc! {"_id": id}
}

pub fn by_session(session_id: &str) -> Document {
    doc! {"session_id": session_id}
}
