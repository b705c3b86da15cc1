use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dto::ws::ServerMessage;

/// Outbound half of a real-time connection.
pub type ConnectionTx = mpsc::UnboundedSender<Message>;

/// Per-session broadcast groups of real-time connections.
///
/// Sending only enqueues on each connection's writer channel, so a slow peer
/// never delays the others.
#[derive(Default)]
pub struct RoomHub {
    rooms: DashMap<String, DashMap<Uuid, ConnectionTx>>,
    memberships: DashMap<Uuid, String>,
}

impl RoomHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to the room of `code`, leaving any room it was in before.
    pub fn attach(&self, code: &str, connection_id: Uuid, tx: ConnectionTx) {
        if let Some(previous) = self.memberships.insert(connection_id, code.to_owned()) {
            if previous != code {
                self.leave(&previous, connection_id);
            }
        }
        self.rooms
            .entry(code.to_owned())
            .or_default()
            .insert(connection_id, tx);
        debug!(session = %code, connection = %connection_id, "connection attached");
    }

    /// Remove a connection from its room. Unknown or already detached connections are ignored.
    pub fn detach(&self, connection_id: Uuid) {
        let Some((_, code)) = self.memberships.remove(&connection_id) else {
            return;
        };
        self.leave(&code, connection_id);
        debug!(session = %code, connection = %connection_id, "connection detached");
    }

    fn leave(&self, code: &str, connection_id: Uuid) {
        if let Some(room) = self.rooms.get(code) {
            room.remove(&connection_id);
        }
        self.prune(code);
    }

    /// Drop the room of `code` if nobody is attached to it.
    pub fn prune(&self, code: &str) {
        self.rooms.remove_if(code, |_, room| room.is_empty());
    }

    /// Drop the room of `code` and release its connections, returning how many were attached.
    ///
    /// The connections stay open; they simply stop receiving frames for `code`.
    pub fn close(&self, code: &str) -> usize {
        let Some((_, room)) = self.rooms.remove(code) else {
            return 0;
        };
        for entry in room.iter() {
            self.memberships
                .remove_if(entry.key(), |_, current| current == code);
        }
        if !room.is_empty() {
            debug!(session = %code, connections = room.len(), "room closed");
        }
        room.len()
    }

    /// Number of connections attached to `code`.
    pub fn member_count(&self, code: &str) -> usize {
        self.rooms.get(code).map(|room| room.len()).unwrap_or(0)
    }

    /// Push `message` to every connection attached to `code`, returning how many accepted it.
    ///
    /// Connections whose writer has gone away are removed from the room.
    pub fn broadcast(&self, code: &str, message: &ServerMessage) -> usize {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(session = %code, error = %err, "failed to serialize broadcast");
                return 0;
            }
        };
        let frame = Message::Text(payload.into());

        let mut delivered = 0;
        let mut dead = Vec::new();
        if let Some(room) = self.rooms.get(code) {
            for member in room.iter() {
                if member.value().send(frame.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(*member.key());
                }
            }
        }

        for connection_id in dead {
            debug!(session = %code, connection = %connection_id, "dropping closed connection");
            self.detach(connection_id);
        }
        delivered
    }
}
