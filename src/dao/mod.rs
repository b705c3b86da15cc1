/// Database model definitions.
pub mod models;
/// Durable mirror of sessions and players, with its backends.
pub mod session_store;
/// Storage abstraction layer for database operations.
pub mod storage;
