use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{PlayerEntity, SessionRecord},
    dto::{
        format_system_time,
        validation::{validate_display_name, validate_session_code},
    },
};

/// Payload used to open a new session with its creator as first player.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Display name of the session.
    #[serde(default)]
    #[validate(custom(function = "validate_display_name"))]
    pub session_name: String,
    /// Display name of the creator.
    #[serde(default)]
    #[validate(custom(function = "validate_display_name"))]
    pub player_name: String,
    /// Optional code chosen by the caller. A random code is generated when absent.
    #[serde(default)]
    #[validate(custom(function = "validate_session_code"))]
    pub session_id: Option<String>,
}

/// Payload used to join an existing session.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinSessionRequest {
    /// Code of the session, matched case-insensitively.
    #[serde(default)]
    #[validate(custom(function = "validate_session_code"))]
    pub session_id: String,
    /// Display name of the joining player.
    #[serde(default)]
    #[validate(custom(function = "validate_display_name"))]
    pub player_name: String,
}

/// Returned by create and join: the identity the client must use on the real-time channel.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionJoinedResponse {
    /// Normalized session code.
    pub session_id: String,
    /// Display name of the session.
    pub session_name: String,
    /// Identifier of the new player inside the session.
    pub player_id: Uuid,
}

/// One leaderboard row.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct PlayerView {
    /// Player identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Pieces eaten so far.
    pub score: u32,
    /// Whether the player is done eating.
    pub finished: bool,
}

impl From<&PlayerEntity> for PlayerView {
    fn from(player: &PlayerEntity) -> Self {
        Self {
            id: player.id,
            name: player.name.clone(),
            score: player.score,
            finished: player.finished,
        }
    }
}

/// Read-only snapshot of a session pushed to real-time clients.
///
/// Players are in leaderboard order: score descending, ties kept in join order.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    /// Normalized session code.
    pub session_id: String,
    /// Display name of the session.
    pub session_name: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// True once every player has finished.
    pub finished: bool,
    /// RFC 3339 timestamp of the moment the last player finished.
    pub ended_at: Option<String>,
    /// Leaderboard rows.
    pub players: Vec<PlayerView>,
}

impl SessionView {
    /// Rebuild a view from a stored record. Stored sessions carry no end timestamp.
    pub fn from_record(record: &SessionRecord) -> Self {
        let players: Vec<PlayerView> = record.players.iter().map(PlayerView::from).collect();
        Self {
            session_id: record.session.id.clone(),
            session_name: record.session.name.clone(),
            created_at: format_system_time(record.session.created_at),
            finished: all_finished(&players),
            ended_at: None,
            players: leaderboard(players),
        }
    }
}

/// Whether a non-empty roster has nobody left eating.
pub fn all_finished(players: &[PlayerView]) -> bool {
    !players.is_empty() && players.iter().all(|player| player.finished)
}

/// Order players by score descending; `sort_by` is stable so ties keep join order.
pub fn leaderboard(mut players: Vec<PlayerView>) -> Vec<PlayerView> {
    players.sort_by(|a, b| b.score.cmp(&a.score));
    players
}

/// Player row exposed by the session-info endpoint.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct PlayerInfo {
    /// Display name.
    pub name: String,
    /// Pieces eaten so far.
    pub score: u32,
    /// Whether the player is done eating.
    pub finished: bool,
}

/// Public summary of a session, served from memory or from the durable store.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfoResponse {
    /// Normalized session code.
    pub session_id: String,
    /// Display name of the session.
    pub session_name: String,
    /// Number of players in the session.
    pub players_count: usize,
    /// False when the session was answered from the durable store.
    pub is_active: bool,
    /// Players in leaderboard order.
    pub players: Vec<PlayerInfo>,
}

impl SessionInfoResponse {
    /// Project a snapshot, flagging whether it came from the live registry.
    pub fn from_view(view: SessionView, is_active: bool) -> Self {
        Self {
            session_id: view.session_id,
            session_name: view.session_name,
            players_count: view.players.len(),
            is_active,
            players: view
                .players
                .into_iter()
                .map(|player| PlayerInfo {
                    name: player.name,
                    score: player.score,
                    finished: player.finished,
                })
                .collect(),
        }
    }
}

/// Full session record including player identifiers.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetailResponse {
    /// Normalized session code.
    pub id: String,
    /// Display name of the session.
    pub name: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// Players in leaderboard order.
    pub players: Vec<PlayerView>,
}

impl From<SessionView> for SessionDetailResponse {
    fn from(view: SessionView) -> Self {
        Self {
            id: view.session_id,
            name: view.session_name,
            created_at: view.created_at,
            players: view.players,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use serde_json::json;

    use super::*;
    use crate::dao::models::SessionEntity;

    fn entity(name: &str, score: u32, finished: bool, offset: u64) -> PlayerEntity {
        PlayerEntity {
            id: Uuid::new_v4(),
            session_id: "ABC123".into(),
            name: name.into(),
            score,
            finished,
            joined_at: SystemTime::UNIX_EPOCH + Duration::from_secs(offset),
        }
    }

    #[test]
    fn leaderboard_keeps_join_order_on_ties() {
        let record = SessionRecord::new(
            SessionEntity {
                id: "ABC123".into(),
                name: "Friday".into(),
                created_at: SystemTime::UNIX_EPOCH,
            },
            vec![
                entity("Carol", 2, false, 3),
                entity("Alice", 4, false, 1),
                entity("Bob", 4, false, 2),
            ],
        );

        let view = SessionView::from_record(&record);
        let names: Vec<_> = view.players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Alice", "Bob", "Carol"]);
        assert!(!view.finished);
        assert_eq!(view.created_at, "1970-01-01T00:00:00Z");
    }

    #[test]
    fn view_omits_missing_end_timestamp() {
        let record = SessionRecord::new(
            SessionEntity {
                id: "ABC123".into(),
                name: "Friday".into(),
                created_at: SystemTime::UNIX_EPOCH,
            },
            vec![entity("Alice", 1, true, 0)],
        );
        let value = serde_json::to_value(SessionView::from_record(&record)).unwrap();
        assert_eq!(value["finished"], json!(true));
        assert!(value.get("endedAt").is_none());
        assert_eq!(value["sessionId"], json!("ABC123"));
    }

    #[test]
    fn missing_fields_deserialize_as_blank_and_fail_validation() {
        let request: CreateSessionRequest =
            serde_json::from_value(json!({ "sessionName": "Friday" })).unwrap();
        assert!(request.validate().is_err());

        let request: CreateSessionRequest = serde_json::from_value(
            json!({ "sessionName": "Friday", "playerName": "Alice", "sessionId": "ab" }),
        )
        .unwrap();
        assert!(request.validate().is_err());

        let request: JoinSessionRequest =
            serde_json::from_value(json!({ "sessionId": "abc123", "playerName": "Bob" })).unwrap();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn info_response_counts_players() {
        let record = SessionRecord::new(
            SessionEntity {
                id: "ABC123".into(),
                name: "Friday".into(),
                created_at: SystemTime::UNIX_EPOCH,
            },
            vec![entity("Alice", 3, true, 0), entity("Bob", 5, true, 1)],
        );
        let info = SessionInfoResponse::from_view(SessionView::from_record(&record), false);
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["playersCount"], json!(2));
        assert_eq!(value["isActive"], json!(false));
        assert_eq!(
            value["players"],
            json!([
                { "name": "Bob", "score": 5, "finished": true },
                { "name": "Alice", "score": 3, "finished": true },
            ])
        );
    }
}
