use async_trait::async_trait;
use bson::doc;
use futures::TryStreamExt;
use mea::mutex::{Mutex, MutexGuard};
use mongodb::{
    Client, ClientSession, Collection,
    options::{ClientOptions, FindOptions},
};
use std::{fmt, sync::Arc};
use tracing::{debug, info};

use querylayer_core::{
    document::Document,
    driver::{DocumentDriver, DocumentDriverBuilder, DocumentTransaction, NativeQuery, transaction_finished},
    error::{DatabaseError, DatabaseResult},
};

fn backend_error(err: mongodb::error::Error) -> DatabaseError {
    DatabaseError::Backend(err.to_string())
}

type SessionSlot = Arc<Mutex<Option<ClientSession>>>;

/// The session of a transaction-scoped driver, or `None` outside a transaction.
fn open_session<'a>(
    guard: &'a mut Option<MutexGuard<'_, Option<ClientSession>>>,
) -> DatabaseResult<Option<&'a mut ClientSession>> {
    match guard {
        Some(slot) => slot.as_mut().map(Some).ok_or_else(transaction_finished),
        None => Ok(None),
    }
}

/// [`DocumentDriver`] over the official MongoDB client.
///
/// A driver returned by [`MongoTransaction`] issues every read and write
/// through the transaction's client session. Multi-document transactions need
/// a replica set or a sharded cluster.
#[derive(Clone)]
pub struct MongoDriver {
    client: Client,
    database: String,
    session: Option<SessionSlot>,
}

impl MongoDriver {
    pub fn new(client: Client, database: impl Into<String>) -> Self {
        Self { client, database: database.into(), session: None }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDriverBuilder {
        MongoDriverBuilder::new(dsn, database)
    }

    /// The underlying client, for operations outside the query layer.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.client.database(&self.database).collection(name)
    }

    async fn lock_session(&self) -> Option<MutexGuard<'_, Option<ClientSession>>> {
        match &self.session {
            Some(slot) => Some(slot.lock().await),
            None => None,
        }
    }

    fn find_options(query: &NativeQuery) -> FindOptions {
        let mut options = FindOptions::default();

        options.sort = query.sort.clone();
        options.projection = query.projection.clone();
        options.skip = query.skip;
        options.limit = query.limit.map(|limit| i64::try_from(limit).unwrap_or(i64::MAX));

        options
    }
}

impl fmt::Debug for MongoDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoDriver")
            .field("database", &self.database)
            .field("in_transaction", &self.session.is_some())
            .finish()
    }
}

#[async_trait]
impl DocumentDriver for MongoDriver {
    async fn find(&self, collection: &str, query: &NativeQuery) -> DatabaseResult<Vec<Document>> {
        let collection = self.collection(collection);
        let options = Self::find_options(query);
        let mut guard = self.lock_session().await;

        match open_session(&mut guard)? {
            Some(session) => {
                let mut cursor = collection
                    .find(query.filter.clone())
                    .with_options(options)
                    .session(&mut *session)
                    .await
                    .map_err(backend_error)?;

                cursor.stream(session).try_collect().await.map_err(backend_error)
            }
            None => collection
                .find(query.filter.clone())
                .with_options(options)
                .await
                .map_err(backend_error)?
                .try_collect()
                .await
                .map_err(backend_error),
        }
    }

    async fn count(&self, collection: &str, filter: &Document) -> DatabaseResult<u64> {
        let collection = self.collection(collection);
        let mut guard = self.lock_session().await;

        match open_session(&mut guard)? {
            Some(session) => collection.count_documents(filter.clone()).session(session).await,
            None => collection.count_documents(filter.clone()).await,
        }
        .map_err(backend_error)
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DatabaseResult<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let collection = self.collection(collection);
        let mut guard = self.lock_session().await;

        match open_session(&mut guard)? {
            Some(session) => collection.insert_many(documents).session(session).await,
            None => collection.insert_many(documents).await,
        }
        .map_err(backend_error)?;

        Ok(())
    }

    async fn update_many(&self, collection: &str, filter: &Document, set: &Document) -> DatabaseResult<u64> {
        let collection = self.collection(collection);
        let update = doc! { "$set": set.clone() };
        let mut guard = self.lock_session().await;

        let result = match open_session(&mut guard)? {
            Some(session) => collection.update_many(filter.clone(), update).session(session).await,
            None => collection.update_many(filter.clone(), update).await,
        }
        .map_err(backend_error)?;

        Ok(result.matched_count)
    }

    async fn delete_many(&self, collection: &str, filter: &Document) -> DatabaseResult<u64> {
        let collection = self.collection(collection);
        let mut guard = self.lock_session().await;

        let result = match open_session(&mut guard)? {
            Some(session) => collection.delete_many(filter.clone()).session(session).await,
            None => collection.delete_many(filter.clone()).await,
        }
        .map_err(backend_error)?;

        Ok(result.deleted_count)
    }

    async fn create_collection(&self, name: &str) -> DatabaseResult<()> {
        self.client
            .database(&self.database)
            .create_collection(name)
            .await
            .map_err(backend_error)
    }

    async fn drop_collection(&self, name: &str) -> DatabaseResult<()> {
        self.collection(name).drop().await.map_err(backend_error)
    }

    async fn list_collections(&self) -> DatabaseResult<Vec<String>> {
        self.client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(backend_error)
    }

    async fn begin(&self) -> DatabaseResult<Box<dyn DocumentTransaction>> {
        if self.session.is_some() {
            return Err(DatabaseError::Unsupported("nested transactions on mongodb".to_string()));
        }

        let mut session = self.client.start_session().await.map_err(backend_error)?;
        session.start_transaction().await.map_err(backend_error)?;

        debug!(database = %self.database, "started mongodb session transaction");

        let scoped = MongoDriver { session: Some(Arc::new(Mutex::new(Some(session)))), ..self.clone() };
        Ok(Box::new(MongoTransaction { driver: Arc::new(scoped) }))
    }

    async fn shutdown(&self) -> DatabaseResult<()> {
        self.client.clone().shutdown().await;

        info!(database = %self.database, "closed mongodb client");
        Ok(())
    }
}

/// A MongoDB transaction bound to one client session.
///
/// Dropping it without committing lets the client abort the transaction.
#[derive(Debug)]
pub struct MongoTransaction {
    driver: Arc<MongoDriver>,
}

impl MongoTransaction {
    async fn take_session(&self) -> DatabaseResult<ClientSession> {
        self.lock_slot().await?.take().ok_or_else(transaction_finished)
    }

    async fn lock_slot(&self) -> DatabaseResult<MutexGuard<'_, Option<ClientSession>>> {
        match &self.driver.session {
            Some(slot) => Ok(slot.lock().await),
            None => Err(transaction_finished()),
        }
    }
}

#[async_trait]
impl DocumentTransaction for MongoTransaction {
    fn driver(&self) -> Arc<dyn DocumentDriver> {
        self.driver.clone()
    }

    async fn commit(&self) -> DatabaseResult<()> {
        self.take_session().await?.commit_transaction().await.map_err(backend_error)
    }

    async fn rollback(&self) -> DatabaseResult<()> {
        self.take_session().await?.abort_transaction().await.map_err(backend_error)
    }
}

/// Connects a [`MongoDriver`] from a connection string and database name.
#[derive(Debug, Clone)]
pub struct MongoDriverBuilder {
    dsn: String,
    database: String,
}

impl MongoDriverBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self { dsn: dsn.to_string(), database: database.to_string() }
    }

    pub async fn connect(&self) -> DatabaseResult<MongoDriver> {
        let options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| DatabaseError::Initialization(e.to_string()))?;
        let client = Client::with_options(options).map_err(|e| DatabaseError::Initialization(e.to_string()))?;

        info!(database = %self.database, "connected mongodb client");

        Ok(MongoDriver::new(client, self.database.clone()))
    }
}

#[async_trait]
impl DocumentDriverBuilder for MongoDriverBuilder {
    async fn build(&self) -> DatabaseResult<Arc<dyn DocumentDriver>> {
        Ok(Arc::new(self.connect().await?))
    }
}
