use mongodb::error::Error as MongoError;
use thiserror::Error;

/// Convenient result alias returning [`MongoDaoError`] failures.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures that can occur while interacting with MongoDB.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// The connection string could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    /// The driver refused the parsed options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    /// The server never answered during the initial connection.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    /// Periodic ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    /// Index creation failed at startup.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    /// Writing the session document failed.
    #[error("failed to save session `{id}`")]
    SaveSession {
        id: String,
        #[source]
        source: MongoError,
    },
    /// Writing a player document failed.
    #[error("failed to save player `{player_id}` of session `{session_id}`")]
    SavePlayer {
        session_id: String,
        player_id: String,
        #[source]
        source: MongoError,
    },
    /// Removing a session or its players failed.
    #[error("failed to delete session `{id}`")]
    DeleteSession {
        id: String,
        #[source]
        source: MongoError,
    },
    /// Reading a session or its players failed.
    #[error("failed to load session `{id}`")]
    LoadSession {
        id: String,
        #[source]
        source: MongoError,
    },
    /// A stored player id is not a valid UUID.
    #[error("stored player id `{id}` is not a valid UUID")]
    CorruptPlayerId {
        id: String,
        #[source]
        source: uuid::Error,
    },
}
