#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{PlayerEntity, SessionEntity, SessionRecord};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;

pub use memory::MemorySessionStore;

/// Abstraction over the durable mirror of sessions and their players.
///
/// The in-memory registry stays authoritative while a session is resident;
/// implementations only have to keep the last written value of each row.
pub trait SessionStore: Send + Sync {
    /// Insert or replace the session row.
    fn save_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Insert or replace a player row.
    fn save_player(&self, player: PlayerEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Remove the session row and every player row attached to it.
    fn delete_session(&self, id: String) -> BoxFuture<'static, StorageResult<()>>;
    /// Load a session and its players, if the session row exists.
    fn find_session(&self, id: String) -> BoxFuture<'static, StorageResult<Option<SessionRecord>>>;
    /// Cheap connectivity probe.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
