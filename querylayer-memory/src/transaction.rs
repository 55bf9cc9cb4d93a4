use async_trait::async_trait;
use mea::{
    mutex::Mutex,
    rwlock::{OwnedRwLockWriteGuard, RwLock},
};
use std::{fmt, sync::Arc};
use tracing::debug;

use querylayer_core::{
    document::Document,
    driver::{DocumentDriver, DocumentTransaction, NativeQuery, transaction_finished},
    error::{DatabaseError, DatabaseResult},
};

use crate::store::{StoreMap, count_in, delete_in, drop_in, find_in, insert_into, list_in, update_in};

struct Staged {
    /// Keeps every other reader and writer out until the transaction ends.
    store: OwnedRwLockWriteGuard<StoreMap>,
    collections: StoreMap,
}

/// A transaction on a [`MemoryDriver`](crate::MemoryDriver).
///
/// Holds the store's write lock from `begin` until commit or rollback and
/// works on a private copy of the collections. Commit publishes the copy;
/// rollback, or dropping the transaction, discards it.
#[derive(Clone)]
pub struct MemoryTransaction {
    staged: Arc<Mutex<Option<Staged>>>,
}

impl MemoryTransaction {
    pub(crate) async fn begin(state: Arc<RwLock<StoreMap>>) -> Self {
        let store = state.write_owned().await;
        let collections = store.clone();

        Self { staged: Arc::new(Mutex::new(Some(Staged { store, collections }))) }
    }

    /// Runs `f` on the staged collections.
    async fn with_staged<R, F>(&self, f: F) -> DatabaseResult<R>
    where
        F: FnOnce(&mut StoreMap) -> DatabaseResult<R> + Send,
    {
        let mut staged = self.staged.lock().await;
        let staged = staged.as_mut().ok_or_else(transaction_finished)?;

        f(&mut staged.collections)
    }

    async fn finish(&self) -> DatabaseResult<Staged> {
        self.staged.lock().await.take().ok_or_else(transaction_finished)
    }
}

impl fmt::Debug for MemoryTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransaction").finish_non_exhaustive()
    }
}

#[async_trait]
impl DocumentDriver for MemoryTransaction {
    async fn find(&self, collection: &str, query: &NativeQuery) -> DatabaseResult<Vec<Document>> {
        self.with_staged(|collections| find_in(collections, collection, query)).await
    }

    async fn count(&self, collection: &str, filter: &Document) -> DatabaseResult<u64> {
        self.with_staged(|collections| count_in(collections, collection, filter)).await
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DatabaseResult<()> {
        self.with_staged(|collections| insert_into(collections, collection, documents)).await
    }

    async fn update_many(&self, collection: &str, filter: &Document, set: &Document) -> DatabaseResult<u64> {
        self.with_staged(|collections| update_in(collections, collection, filter, set)).await
    }

    async fn delete_many(&self, collection: &str, filter: &Document) -> DatabaseResult<u64> {
        self.with_staged(|collections| delete_in(collections, collection, filter)).await
    }

    async fn create_collection(&self, name: &str) -> DatabaseResult<()> {
        self.with_staged(|collections| {
            collections.entry(name.to_string()).or_default();
            Ok(())
        })
        .await
    }

    async fn drop_collection(&self, name: &str) -> DatabaseResult<()> {
        self.with_staged(|collections| drop_in(collections, name)).await
    }

    async fn list_collections(&self) -> DatabaseResult<Vec<String>> {
        self.with_staged(|collections| Ok(list_in(collections))).await
    }

    async fn begin(&self) -> DatabaseResult<Box<dyn DocumentTransaction>> {
        Err(DatabaseError::Unsupported("nested transactions on the memory store".to_string()))
    }
}

#[async_trait]
impl DocumentTransaction for MemoryTransaction {
    fn driver(&self) -> Arc<dyn DocumentDriver> {
        Arc::new(self.clone())
    }

    async fn commit(&self) -> DatabaseResult<()> {
        let Staged { mut store, collections } = self.finish().await?;
        *store = collections;

        debug!("committed memory transaction");
        Ok(())
    }

    async fn rollback(&self) -> DatabaseResult<()> {
        self.finish().await?;

        debug!("rolled back memory transaction");
        Ok(())
    }
}
