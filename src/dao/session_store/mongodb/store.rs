use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{Client, Collection, Database, IndexModel, bson::doc, options::IndexOptions};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoPlayerDocument, MongoSessionDocument, by_session, doc_id},
};
use crate::dao::{
    models::{PlayerEntity, SessionEntity, SessionRecord},
    session_store::SessionStore,
    storage::StorageResult,
};

const SESSION_COLLECTION_NAME: &str = "sessions";
const PLAYER_COLLECTION_NAME: &str = "players";

/// [`SessionStore`] backed by two MongoDB collections (`sessions`, `players`).
#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    // Kept alive alongside the database handle it produced.
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoSessionStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let players = self.player_collection().await;
        let index = IndexModel::builder()
            .keys(doc! {"session_id": 1, "joined_at": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("player_session_idx".to_owned()))
                    .build(),
            )
            .build();

        players
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PLAYER_COLLECTION_NAME,
                index: "session_id,joined_at",
                source,
            })?;

        Ok(())
    }

    async fn session_collection(&self) -> Collection<MongoSessionDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoSessionDocument>(SESSION_COLLECTION_NAME)
    }

    async fn player_collection(&self) -> Collection<MongoPlayerDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoPlayerDocument>(PLAYER_COLLECTION_NAME)
    }

    async fn save_session(&self, session: SessionEntity) -> MongoResult<()> {
        let id = session.id.clone();
        let document: MongoSessionDocument = session.into();
        self.session_collection()
            .await
            .replace_one(doc_id(&id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveSession { id, source })?;
        Ok(())
    }

    async fn save_player(&self, player: PlayerEntity) -> MongoResult<()> {
        let session_id = player.session_id.clone();
        let document: MongoPlayerDocument = player.into();
        self.player_collection()
            .await
            .replace_one(doc_id(document.id()), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SavePlayer {
                session_id,
                player_id: document.id().to_owned(),
                source,
            })?;
        Ok(())
    }

    async fn delete_session(&self, id: String) -> MongoResult<()> {
        // Players first: a crash in between leaves no orphaned player rows
        // visible through `find_session`.
        self.player_collection()
            .await
            .delete_many(by_session(&id))
            .await
            .map_err(|source| MongoDaoError::DeleteSession {
                id: id.clone(),
                source,
            })?;

        self.session_collection()
            .await
            .delete_one(doc_id(&id))
            .await
            .map_err(|source| MongoDaoError::DeleteSession { id, source })?;
        Ok(())
    }

    async fn find_session(&self, id: String) -> MongoResult<Option<SessionRecord>> {
        let Some(session) = self
            .session_collection()
            .await
            .find_one(doc_id(&id))
            .await
            .map_err(|source| MongoDaoError::LoadSession {
                id: id.clone(),
                source,
            })?
        else {
            return Ok(None);
        };

        let documents: Vec<MongoPlayerDocument> = self
            .player_collection()
            .await
            .find(by_session(&id))
            .sort(doc! {"joined_at": 1})
            .await
            .map_err(|source| MongoDaoError::LoadSession {
                id: id.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadSession {
                id: id.clone(),
                source,
            })?;

        let players = documents
            .into_iter()
            .map(PlayerEntity::try_from)
            .collect::<MongoResult<Vec<_>>>()?;

        Ok(Some(SessionRecord::new(session.into(), players)))
    }
}

impl SessionStore for MongoSessionStore {
    fn save_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_session(session).await.map_err(Into::into) })
    }

    fn save_player(&self, player: PlayerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_player(player).await.map_err(Into::into) })
    }

    fn delete_session(&self, id: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.delete_session(id).await.map_err(Into::into) })
    }

    fn find_session(&self, id: String) -> BoxFuture<'static, StorageResult<Option<SessionRecord>>> {
        let store = self.clone();
        Box::pin(async move { store.find_session(id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
