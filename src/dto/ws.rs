use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::session::SessionView;

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
/// Messages accepted from real-time clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join the broadcast room of a session. Must be the first message.
    #[serde(rename_all = "camelCase")]
    Attach {
        /// Session to watch.
        session_id: String,
        /// Player identity returned by create or join.
        player_id: Uuid,
        /// Display name, for logs only.
        #[serde(default)]
        player_name: Option<String>,
    },
    /// One more piece eaten.
    #[serde(rename_all = "camelCase")]
    Increment {
        /// Attached session.
        session_id: String,
        /// Player who ate the piece.
        player_id: Uuid,
    },
    /// The player is done eating.
    #[serde(rename_all = "camelCase")]
    Finish {
        /// Attached session.
        session_id: String,
        /// Player who is done.
        player_id: Uuid,
    },
    /// Any other `type`; ignored.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse a text frame.
    pub fn from_json_str(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }

    /// Session targeted by the message, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Attach { session_id, .. }
            | Self::Increment { session_id, .. }
            | Self::Finish { session_id, .. } => Some(session_id),
            Self::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
/// Messages pushed to every connection attached to a session.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent after every change to the session.
    State {
        /// Current snapshot.
        session: SessionView,
    },
    /// Sent once, when the last player finishes.
    Ended {
        /// Final snapshot.
        session: SessionView,
    },
}
