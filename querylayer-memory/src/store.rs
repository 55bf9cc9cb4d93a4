//! In-memory storage implementation of the document driver.
//!
//! Collections are vectors of BSON documents kept in insertion order, held
//! behind an async-aware read-write lock. A transaction takes the write lock
//! and stages its writes on a copy of the collections, see
//! [`MemoryTransaction`].

use async_trait::async_trait;
use bson::Bson;
use mea::rwlock::RwLock;
use std::{cmp::Ordering, collections::HashMap, sync::Arc};
use tracing::debug;

use querylayer_core::{
    document::Document,
    driver::{DocumentDriver, DocumentDriverBuilder, DocumentTransaction, NativeQuery},
    error::{DatabaseError, DatabaseResult},
    identifier::ObjectIdConcern,
};

use crate::{
    evaluator::{DocumentEvaluator, resolve, sort_order},
    transaction::MemoryTransaction,
};

pub(crate) type StoreMap = HashMap<String, Vec<Document>>;

const ID_FIELD: &str = ObjectIdConcern::NATIVE_FIELD;

/// Thread-safe in-memory document store.
///
/// `MemoryDriver` is cloneable and every clone shares the same collections,
/// so it can be handed to several executors or tasks. Queries scan the whole
/// collection; there is no indexing.
///
/// # Example
///
/// ```ignore
/// use querylayer_memory::MemoryDriver;
/// use querylayer_core::driver::{DocumentDriver, NativeQuery};
/// use bson::doc;
///
/// let driver = MemoryDriver::new();
/// driver.insert_many("people", vec![doc! { "_id": 1, "name": "Ann" }]).await?;
///
/// let found = driver.find("people", &NativeQuery::default()).await?;
/// assert_eq!(found.len(), 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct MemoryDriver {
    state: Arc<RwLock<StoreMap>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> MemoryDriverBuilder {
        MemoryDriverBuilder
    }
}

fn not_found(collection: &str) -> DatabaseError {
    DatabaseError::Backend(format!("collection '{collection}' not found"))
}

fn sort_documents(documents: &mut [&Document], sort: &Document) {
    documents.sort_by(|a, b| {
        for (field, direction) in sort {
            let ordering = sort_order(resolve(a, field), resolve(b, field));
            let descending = matches!(direction, Bson::Int32(d) if *d < 0)
                || matches!(direction, Bson::Int64(d) if *d < 0)
                || matches!(direction, Bson::Double(d) if *d < 0.0);

            let ordering = if descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    });
}

/// Positions of the documents matching `filter`, in ascending order. Evaluated
/// before any mutation so a failing filter leaves the collection untouched.
fn matching_positions(documents: &[Document], filter: &Document) -> DatabaseResult<Vec<usize>> {
    let mut positions = Vec::new();

    for (position, document) in documents.iter().enumerate() {
        if DocumentEvaluator::new(document).evaluate(filter)? {
            positions.push(position);
        }
    }

    Ok(positions)
}

fn is_included(flag: &Bson) -> bool {
    match flag {
        Bson::Boolean(included) => *included,
        Bson::Int32(value) => *value != 0,
        Bson::Int64(value) => *value != 0,
        Bson::Double(value) => *value != 0.0,
        _ => true,
    }
}

/// Applies an inclusion or exclusion projection. `_id` is kept unless it is
/// excluded explicitly.
fn project(document: &Document, projection: &Document) -> Document {
    let inclusive = projection
        .iter()
        .any(|(field, flag)| field != ID_FIELD && is_included(flag));

    if !inclusive {
        return document
            .iter()
            .filter(|(field, _)| projection.get(field.as_str()).is_none_or(is_included))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
    }

    let keep_id = projection.get(ID_FIELD).is_none_or(is_included);

    document
        .iter()
        .filter(|(field, _)| {
            if field.as_str() == ID_FIELD {
                keep_id
            } else {
                projection.get(field.as_str()).is_some_and(is_included)
            }
        })
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect()
}

fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

pub(crate) fn find_in(collections: &StoreMap, collection: &str, query: &NativeQuery) -> DatabaseResult<Vec<Document>> {
    let Some(documents) = collections.get(collection) else {
        return Ok(Vec::new());
    };

    let mut matched = DocumentEvaluator::filter_documents(documents, &query.filter)?;

    if let Some(sort) = &query.sort {
        sort_documents(&mut matched, sort);
    }

    let skip = query.skip.map(to_usize).unwrap_or(0);
    let limit = query.limit.map(to_usize).unwrap_or(usize::MAX);

    Ok(matched
        .into_iter()
        .skip(skip)
        .take(limit)
        .map(|document| match &query.projection {
            Some(projection) => project(document, projection),
            None => document.clone(),
        })
        .collect())
}

pub(crate) fn count_in(collections: &StoreMap, collection: &str, filter: &Document) -> DatabaseResult<u64> {
    let Some(documents) = collections.get(collection) else {
        return Ok(0);
    };

    Ok(DocumentEvaluator::filter_documents(documents, filter)?.len() as u64)
}

pub(crate) fn insert_into(collections: &mut StoreMap, collection: &str, documents: Vec<Document>) -> DatabaseResult<()> {
    let existing = collections.entry(collection.to_string()).or_default();

    for (position, document) in documents.iter().enumerate() {
        let id = document
            .get(ID_FIELD)
            .ok_or_else(|| DatabaseError::InvalidDocument(format!("document without '{ID_FIELD}'")))?;

        let duplicate = existing.iter().chain(&documents[..position]).any(|other| other.get(ID_FIELD) == Some(id));
        if duplicate {
            return Err(DatabaseError::Backend(format!(
                "duplicate key {id} in collection '{collection}'"
            )));
        }
    }

    debug!(collection, count = documents.len(), "inserting documents");
    existing.extend(documents);

    Ok(())
}

pub(crate) fn update_in(collections: &mut StoreMap, collection: &str, filter: &Document, set: &Document) -> DatabaseResult<u64> {
    let Some(documents) = collections.get_mut(collection) else {
        return Ok(0);
    };

    let matched = matching_positions(documents, filter)?;

    for &position in &matched {
        let document = &mut documents[position];
        for (field, value) in set {
            document.insert(field.clone(), value.clone());
        }
    }

    Ok(matched.len() as u64)
}

pub(crate) fn delete_in(collections: &mut StoreMap, collection: &str, filter: &Document) -> DatabaseResult<u64> {
    let Some(documents) = collections.get_mut(collection) else {
        return Ok(0);
    };

    let matched = matching_positions(documents, filter)?;
    let mut position = 0;

    documents.retain(|_| {
        let keep = matched.binary_search(&position).is_err();
        position += 1;
        keep
    });

    Ok(matched.len() as u64)
}

pub(crate) fn drop_in(collections: &mut StoreMap, name: &str) -> DatabaseResult<()> {
    collections.remove(name).map(|_| ()).ok_or_else(|| not_found(name))
}

pub(crate) fn list_in(collections: &StoreMap) -> Vec<String> {
    let mut names = collections.keys().cloned().collect::<Vec<_>>();

    names.sort();
    names
}

#[async_trait]
impl DocumentDriver for MemoryDriver {
    async fn find(&self, collection: &str, query: &NativeQuery) -> DatabaseResult<Vec<Document>> {
        find_in(&*self.state.read().await, collection, query)
    }

    async fn count(&self, collection: &str, filter: &Document) -> DatabaseResult<u64> {
        count_in(&*self.state.read().await, collection, filter)
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DatabaseResult<()> {
        insert_into(&mut *self.state.write().await, collection, documents)
    }

    async fn update_many(&self, collection: &str, filter: &Document, set: &Document) -> DatabaseResult<u64> {
        update_in(&mut *self.state.write().await, collection, filter, set)
    }

    async fn delete_many(&self, collection: &str, filter: &Document) -> DatabaseResult<u64> {
        delete_in(&mut *self.state.write().await, collection, filter)
    }

    async fn create_collection(&self, name: &str) -> DatabaseResult<()> {
        self.state.write().await.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> DatabaseResult<()> {
        drop_in(&mut *self.state.write().await, name)
    }

    async fn list_collections(&self) -> DatabaseResult<Vec<String>> {
        Ok(list_in(&*self.state.read().await))
    }

    async fn begin(&self) -> DatabaseResult<Box<dyn DocumentTransaction>> {
        let transaction = MemoryTransaction::begin(self.state.clone()).await;
        debug!("began memory transaction");

        Ok(Box::new(transaction))
    }
}

/// Builder for [`MemoryDriver`]. Building always succeeds with an empty store.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryDriverBuilder;

#[async_trait]
impl DocumentDriverBuilder for MemoryDriverBuilder {
    async fn build(&self) -> DatabaseResult<Arc<dyn DocumentDriver>> {
        Ok(Arc::new(MemoryDriver::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    async fn seeded() -> MemoryDriver {
        let driver = MemoryDriver::new();
        driver
            .insert_many(
                "people",
                vec![
                    doc! { "_id": 1_i64, "name": "Ann", "age": 31_i64 },
                    doc! { "_id": 2_i64, "name": "Bob", "age": 24_i64 },
                    doc! { "_id": 3_i64, "name": "Cid" },
                ],
            )
            .await
            .unwrap();
        driver
    }

    #[tokio::test]
    async fn find_sorts_pages_and_projects() {
        let driver = seeded().await;

        let query = NativeQuery {
            sort: Some(doc! { "age": -1 }),
            projection: Some(doc! { "name": 1, "_id": 0 }),
            skip: Some(1),
            limit: Some(1),
            ..Default::default()
        };

        assert_eq!(driver.find("people", &query).await.unwrap(), vec![doc! { "name": "Bob" }]);
    }

    #[tokio::test]
    async fn duplicate_ids_reject_the_whole_batch() {
        let driver = seeded().await;

        let err = driver
            .insert_many("people", vec![doc! { "_id": 9_i64 }, doc! { "_id": 1_i64 }])
            .await
            .unwrap_err();

        assert!(matches!(err, DatabaseError::Backend(_)));
        assert_eq!(driver.count("people", &Document::new()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn updates_and_deletes_report_counts() {
        let driver = seeded().await;

        let updated = driver
            .update_many("people", &doc! { "age": { "$gt": 20_i64 } }, &doc! { "active": true })
            .await
            .unwrap();
        assert_eq!(updated, 2);

        assert_eq!(driver.delete_many("people", &doc! { "active": true }).await.unwrap(), 2);
        assert_eq!(driver.count("people", &Document::new()).await.unwrap(), 1);
        assert_eq!(driver.delete_many("missing", &Document::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn find_treats_huge_limits_as_unbounded() {
        let driver = seeded().await;

        let query = NativeQuery { skip: Some(1), limit: Some(u64::MAX), ..Default::default() };

        assert_eq!(driver.find("people", &query).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn collections_are_created_and_dropped() {
        let driver = MemoryDriver::new();

        driver.create_collection("b").await.unwrap();
        driver.create_collection("a").await.unwrap();
        assert_eq!(driver.list_collections().await.unwrap(), vec!["a".to_string(), "b".to_string()]);

        driver.drop_collection("a").await.unwrap();
        assert!(driver.drop_collection("a").await.is_err());
    }
}
